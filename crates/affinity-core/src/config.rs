//! Experiment configuration file support.
//!
//! An [`ExperimentConfig`] is read from TOML (every key optional), overridden
//! by command-line flags, and then resolved once into an [`ExperimentPlan`].

use affinity_training::{
    Direction, EarlyStoppingPolicy, HyperParams, Mode, PresetRegistry, SplitLayout, SplitStrategy, TrainingError,
    TrainingResult,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Raw experiment settings, as written in a config file or on the command line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    pub dataset: String,
    pub featurizer: String,
    /// `regression`, `classification` or `reg-threshold`.
    pub mode: String,
    pub split: String,
    /// Positive-class threshold for `reg-threshold`.
    pub threshold: f64,
    /// `maximize` or `minimize`; the metric's natural direction when unset.
    pub direction: Option<String>,
    pub out_path: PathBuf,
    /// Defaults to `<dataset>_data`.
    pub data_dir: Option<PathBuf>,
    pub fold_num: usize,
    /// Model family; defaults per mode.
    pub model: Option<String>,
    /// Overrides layered onto the model family's preset.
    pub hyper_parameters: Option<HyperParams>,
    pub hyper_param_search: bool,
    pub max_iter: usize,
    pub search_range: f64,
    pub reload: bool,
    pub cross_validation: bool,
    pub test: bool,
    pub predict_cold: bool,
    pub early_stopping: bool,
    pub evaluate_freq: usize,
    pub patience: usize,
    pub seed: u64,
    pub log_file: PathBuf,
    pub model_dir: PathBuf,
    pub prot_desc_path: Vec<PathBuf>,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            dataset: "davis".to_string(),
            featurizer: "ngram".to_string(),
            mode: "regression".to_string(),
            split: "random".to_string(),
            threshold: 7.0,
            direction: None,
            out_path: PathBuf::from("."),
            data_dir: None,
            fold_num: 5,
            model: None,
            hyper_parameters: None,
            hyper_param_search: false,
            max_iter: 42,
            search_range: 3.0,
            reload: true,
            cross_validation: false,
            test: false,
            predict_cold: false,
            early_stopping: false,
            evaluate_freq: 3,
            patience: 3,
            seed: 123,
            log_file: PathBuf::from("GPhypersearch_temp.log"),
            model_dir: PathBuf::from("./model_dir"),
            prot_desc_path: vec![PathBuf::from("davis_data/prot_desc.csv"), PathBuf::from("metz_data/prot_desc.csv")],
        }
    }
}

/// Errors that can occur while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(String),

    #[error("Failed to read configuration file: {0}")]
    ReadError(String),

    #[error("Failed to parse configuration file: {0}")]
    ParseError(String),
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Search settings of a plan with hyperparameter search enabled.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchSettings {
    pub max_iter: usize,
    pub search_range: f64,
}

/// A validated experiment, with every name resolved to its typed value.
#[derive(Debug, Clone, PartialEq)]
pub struct ExperimentPlan {
    pub dataset: String,
    pub featurizer: String,
    pub mode: Mode,
    pub split: SplitStrategy,
    pub direction: Direction,
    pub layout: SplitLayout,
    pub cold: bool,
    pub reload: bool,
    pub early_stopping: EarlyStoppingPolicy,
    pub seed: u64,
    pub model: String,
    /// Preset of `model` merged with the configured overrides.
    pub hyper_parameters: HyperParams,
    pub search: Option<SearchSettings>,
    pub out_path: PathBuf,
    pub data_dir: PathBuf,
    pub model_dir: PathBuf,
    pub log_file: PathBuf,
    pub prot_desc_paths: Vec<PathBuf>,
}

impl ExperimentPlan {
    #[must_use]
    pub fn cross_validation(&self) -> bool {
        matches!(self.layout, SplitLayout::CrossValidation { .. })
    }

    #[must_use]
    pub fn with_test(&self) -> bool {
        self.layout == SplitLayout::Test
    }

    /// `<out_path>/<dataset><model>.json`
    #[must_use]
    pub fn snapshot_path(&self) -> PathBuf {
        self.out_path.join(format!("{}{}.json", self.dataset, self.model))
    }
}

impl ExperimentConfig {
    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(format!("{}: {}", path.display(), e)))?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(format!("{}: {}", path.display(), e)))
    }

    /// Validate and resolve into a plan. No files are touched.
    pub fn resolve(&self) -> TrainingResult<ExperimentPlan> {
        let mode = Mode::parse(&self.mode, self.threshold)?;
        let split: SplitStrategy = self.split.parse()?;
        let direction = match &self.direction {
            Some(d) => d.parse()?,
            None => mode.default_direction(),
        };

        if self.cross_validation && self.test {
            return Err(TrainingError::config("cross-validation and a held-out test set are mutually exclusive"));
        }
        if self.cross_validation && self.hyper_param_search {
            return Err(TrainingError::config("hyperparameter search is not supported under cross-validation"));
        }
        if self.cross_validation && self.fold_num < 2 {
            return Err(TrainingError::config(format!("fold_num must be at least 2, got {}", self.fold_num)));
        }
        if self.hyper_param_search && self.max_iter == 0 {
            return Err(TrainingError::config("max_iter must be at least 1"));
        }
        if self.hyper_param_search && (self.search_range.is_nan() || self.search_range < 1.0) {
            return Err(TrainingError::config(format!("search_range must be >= 1, got {}", self.search_range)));
        }
        if self.prot_desc_path.is_empty() {
            return Err(TrainingError::config("at least one protein descriptor path is required"));
        }

        let early_stopping = if self.cross_validation {
            if self.early_stopping {
                tracing::warn!("early stopping does not apply to cross-validation; disabled");
            }
            EarlyStoppingPolicy::disabled()
        } else {
            if self.early_stopping && (self.evaluate_freq == 0 || self.patience == 0) {
                return Err(TrainingError::config("evaluate_freq and patience must be at least 1"));
            }
            EarlyStoppingPolicy { enabled: self.early_stopping, evaluate_freq: self.evaluate_freq, patience: self.patience }
        };

        let model = self.model.clone().unwrap_or_else(|| mode.default_model().to_string());
        let preset = PresetRegistry::builtin().get(&model)?;
        let hyper_parameters = match &self.hyper_parameters {
            Some(overrides) => preset.merged(overrides),
            None => preset.clone(),
        };

        Ok(ExperimentPlan {
            dataset: self.dataset.clone(),
            featurizer: self.featurizer.clone(),
            mode,
            split,
            direction,
            layout: SplitLayout::from_flags(self.test, self.cross_validation, self.fold_num),
            cold: self.predict_cold,
            reload: self.reload,
            early_stopping,
            seed: self.seed,
            model,
            hyper_parameters,
            search: self
                .hyper_param_search
                .then_some(SearchSettings { max_iter: self.max_iter, search_range: self.search_range }),
            out_path: self.out_path.clone(),
            data_dir: self.data_dir.clone().unwrap_or_else(|| PathBuf::from(format!("{}_data", self.dataset))),
            model_dir: self.model_dir.clone(),
            log_file: self.log_file.clone(),
            prot_desc_paths: self.prot_desc_path.clone(),
        })
    }
}
