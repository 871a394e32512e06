use crate::error::{TrainingError, TrainingResult};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single hyperparameter value.
///
/// Transformer references (e.g. a fit transformer for a model family) are
/// carried as `Text` holding the transformer name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<ParamValue>),
}

impl ParamValue {
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(s) => f.write_str(&s),
            Err(_) => Err(fmt::Error),
        }
    }
}

/// Named hyperparameters for one model family.
///
/// The orchestration layer treats a set as an opaque, comparable value; only
/// trainers interpret individual fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HyperParams(BTreeMap<String, ParamValue>);

impl HyperParams {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    #[must_use]
    pub fn with(mut self, name: &str, value: ParamValue) -> Self {
        self.0.insert(name.to_string(), value);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    #[must_use]
    pub fn f64_or(&self, name: &str, default: f64) -> f64 {
        self.get(name).and_then(ParamValue::as_f64).unwrap_or(default)
    }

    #[must_use]
    pub fn usize_or(&self, name: &str, default: usize) -> usize {
        self.get(name)
            .and_then(ParamValue::as_i64)
            .and_then(|v| usize::try_from(v).ok())
            .unwrap_or(default)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ParamValue)> {
        self.0.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// A new set with `overrides` layered on top; `self` is untouched.
    #[must_use]
    pub fn merged(&self, overrides: &Self) -> Self {
        let mut out = self.clone();
        for (k, v) in &overrides.0 {
            out.0.insert(k.clone(), v.clone());
        }
        out
    }

    /// Parse a JSON object such as `{"learning_rate": 0.001, "batch_size": 64}`.
    pub fn from_json(json: &str) -> TrainingResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| TrainingError::config(format!("invalid hyperparameter JSON: {e}")))
    }
}

impl FromIterator<(String, ParamValue)> for HyperParams {
    fn from_iter<I: IntoIterator<Item = (String, ParamValue)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Default hyperparameter sets by model family.
///
/// Built once per process and never mutated; callers derive new sets with
/// [`HyperParams::merged`].
#[derive(Debug)]
pub struct PresetRegistry {
    presets: BTreeMap<&'static str, HyperParams>,
}

static BUILTIN: Lazy<PresetRegistry> = Lazy::new(PresetRegistry::build);

impl PresetRegistry {
    /// The process-wide registry.
    #[must_use]
    pub fn builtin() -> &'static Self {
        &BUILTIN
    }

    pub fn get(&self, model: &str) -> TrainingResult<&HyperParams> {
        self.presets
            .get(model)
            .ok_or_else(|| TrainingError::config(format!("unrecognized model name: {model}")))
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.presets.keys().copied()
    }

    fn build() -> Self {
        use ParamValue::{Float, Int, List};

        let floats = |v: &[f64]| List(v.iter().copied().map(Float).collect());
        let ints = |v: &[i64]| List(v.iter().copied().map(Int).collect());
        let mut presets = BTreeMap::new();

        presets.insert(
            "linear",
            HyperParams::new()
                .with("batch_size", Int(64))
                .with("nb_epoch", Int(30))
                .with("learning_rate", Float(0.05))
                .with("penalty", Float(1e-4))
                .with("seed", Int(123)),
        );
        presets.insert(
            "linear_regression",
            HyperParams::new()
                .with("batch_size", Int(64))
                .with("nb_epoch", Int(60))
                .with("learning_rate", Float(0.01))
                .with("penalty", Float(1e-4))
                .with("seed", Int(123)),
        );
        presets.insert(
            "tf",
            HyperParams::new()
                .with("layer_sizes", ints(&[1500]))
                .with("weight_init_stddevs", floats(&[0.02]))
                .with("bias_init_consts", floats(&[1.0]))
                .with("dropouts", floats(&[0.5]))
                .with("penalty", Float(0.1))
                .with("penalty_type", ParamValue::Text("l2".to_string()))
                .with("batch_size", Int(50))
                .with("nb_epoch", Int(10))
                .with("learning_rate", Float(0.001))
                .with("num_dense_layer", Int(3))
                .with("dense_cmb_layer_size", Int(512)),
        );
        presets.insert(
            "tf_regression",
            HyperParams::new()
                .with("layer_sizes", ints(&[1000, 1000]))
                .with("weight_init_stddevs", floats(&[0.02, 0.02]))
                .with("bias_init_consts", floats(&[1.0, 1.0]))
                .with("dropouts", floats(&[0.25, 0.25]))
                .with("dropout_prob", Float(0.262))
                .with("penalty", Float(0.0005))
                .with("penalty_type", ParamValue::Text("l2".to_string()))
                .with("batch_size", Int(155))
                .with("nb_epoch", Int(100))
                .with("learning_rate", Float(0.000_311))
                .with("num_dense_layer", Int(2))
                .with("dense_cmb_layer_size", Int(1211)),
        );
        presets.insert(
            "graphconv",
            HyperParams::new()
                .with("batch_size", Int(64))
                .with("nb_epoch", Int(40))
                .with("learning_rate", Float(0.0005))
                .with("n_filters", Int(64))
                .with("n_fully_connected_nodes", Int(128))
                .with("dropout_prob", Float(0.2))
                .with("num_dense_layer", Int(3))
                .with("dense_cmb_layer_size", Int(512))
                .with("seed", Int(123)),
        );
        presets.insert(
            "graphconvreg",
            HyperParams::new()
                .with("batch_size", Int(128))
                .with("nb_epoch", Int(100))
                .with("learning_rate", Float(9.789_365_954_742_421e-5))
                .with("n_filters", Int(128))
                .with("n_fully_connected_nodes", Int(256))
                .with("dropout_prob", Float(0.1))
                .with("num_dense_layer", Int(3))
                .with("dense_cmb_layer_size", Int(512))
                .with("seed", Int(123)),
        );
        presets.insert(
            "weave",
            HyperParams::new()
                .with("batch_size", Int(230))
                .with("nb_epoch", Int(66))
                .with("learning_rate", Float(3.385e-5))
                .with("n_graph_feat", Int(194))
                .with("n_pair_feat", Int(14))
                .with("n_hidden", Int(509))
                .with("dropout_prob", Float(0.100_25))
                .with("num_dense_layer", Int(3))
                .with("dense_cmb_layer_size", Int(512))
                .with("seed", Int(123)),
        );
        presets.insert(
            "weave_regression",
            HyperParams::new()
                .with("batch_size", Int(168))
                .with("nb_epoch", Int(100))
                .with("learning_rate", Float(5.233e-5))
                .with("n_graph_feat", Int(150))
                .with("n_pair_feat", Int(14))
                .with("n_hidden", Int(110))
                .with("dropout_prob", Float(0.1052))
                .with("num_dense_layer", Int(3))
                .with("dense_cmb_layer_size", Int(512))
                .with("seed", Int(123)),
        );

        Self { presets }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_model_is_configuration_error() {
        let err = PresetRegistry::builtin().get("transformer-xl").unwrap_err();
        assert!(matches!(err, TrainingError::Configuration(_)));
    }

    #[test]
    fn test_merged_leaves_registry_untouched() {
        let registry = PresetRegistry::builtin();
        let base = registry.get("weave_regression").unwrap();
        let overrides = HyperParams::from_json(r#"{"batch_size": 32, "extra": true}"#).unwrap();

        let merged = base.merged(&overrides);
        assert_eq!(merged.usize_or("batch_size", 0), 32);
        assert_eq!(merged.get("extra"), Some(&ParamValue::Bool(true)));
        assert_eq!(registry.get("weave_regression").unwrap().usize_or("batch_size", 0), 168);
    }

    #[test]
    fn test_json_values_keep_their_kind() {
        let hp = HyperParams::from_json(r#"{"a": 3, "b": 0.5, "c": [1, 2], "d": "l2"}"#).unwrap();
        assert_eq!(hp.get("a"), Some(&ParamValue::Int(3)));
        assert_eq!(hp.get("b"), Some(&ParamValue::Float(0.5)));
        assert_eq!(hp.get("c"), Some(&ParamValue::List(vec![ParamValue::Int(1), ParamValue::Int(2)])));
        assert_eq!(hp.get("d"), Some(&ParamValue::Text("l2".to_string())));
    }

    #[test]
    fn test_invalid_json_is_configuration_error() {
        assert!(matches!(HyperParams::from_json("[1, 2]"), Err(TrainingError::Configuration(_))));
    }
}
