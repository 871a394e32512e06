use crate::error::{TrainingError, TrainingResult};
use crate::metrics::Metric;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Whether a larger or a smaller metric value is better.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Maximize,
    Minimize,
}

impl Direction {
    /// `true` when `candidate` strictly improves on `incumbent`.
    #[must_use]
    pub fn improves(self, candidate: f64, incumbent: f64) -> bool {
        if candidate.is_nan() {
            return false;
        }
        if incumbent.is_nan() {
            return true;
        }
        match self {
            Self::Maximize => candidate > incumbent,
            Self::Minimize => candidate < incumbent,
        }
    }

    /// The value every real score improves on.
    #[must_use]
    pub fn worst(self) -> f64 {
        match self {
            Self::Maximize => f64::NEG_INFINITY,
            Self::Minimize => f64::INFINITY,
        }
    }
}

impl FromStr for Direction {
    type Err = TrainingError;

    fn from_str(s: &str) -> TrainingResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "maximize" | "max" | "true" => Ok(Self::Maximize),
            "minimize" | "min" | "false" => Ok(Self::Minimize),
            other => Err(TrainingError::config(format!("unknown metric direction: {other}"))),
        }
    }
}

/// Label transformation applied to the whole dataset before splitting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformerKind {
    /// Zero-mean, unit-variance labels per task.
    Normalization,
    /// Per-task positive-class weights so both classes carry equal mass.
    Balancing,
}

/// The three experiment modes.
///
/// Everything that differs between modes is carried here so the pipeline
/// reads it as data instead of branching on the mode at each step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Mode {
    Regression,
    Classification,
    /// Regression training scored as classification of values above `threshold`.
    RegThreshold { threshold: f64 },
}

impl Mode {
    /// Parse a mode name; `threshold` is only used by `reg-threshold`.
    pub fn parse(name: &str, threshold: f64) -> TrainingResult<Self> {
        match name {
            "regression" => Ok(Self::Regression),
            "classification" => Ok(Self::Classification),
            "reg-threshold" => Ok(Self::RegThreshold { threshold }),
            other => Err(TrainingError::config(format!("unrecognized mode: {other}"))),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Regression => "regression",
            Self::Classification => "classification",
            Self::RegThreshold { .. } => "reg-threshold",
        }
    }

    #[must_use]
    pub fn is_regression_family(&self) -> bool {
        !matches!(self, Self::Classification)
    }

    #[must_use]
    pub fn label_column(&self) -> &'static str {
        if self.is_regression_family() { "interaction_value" } else { "interaction_bin" }
    }

    #[must_use]
    pub fn raw_file_name(&self) -> &'static str {
        if self.is_regression_family() { "restructured.csv" } else { "restructured_bin.csv" }
    }

    /// Directory component used in the cache path. `reg-threshold` shares the
    /// regression bundle because the labels and transformer are identical.
    #[must_use]
    pub fn cache_label(&self) -> &'static str {
        if self.is_regression_family() { "regression" } else { "classification" }
    }

    #[must_use]
    pub fn transformer(&self) -> TransformerKind {
        if self.is_regression_family() {
            TransformerKind::Normalization
        } else {
            TransformerKind::Balancing
        }
    }

    #[must_use]
    pub fn metric(&self) -> Metric {
        match self {
            Self::Regression => Metric::Rms,
            Self::Classification => Metric::RocAuc,
            Self::RegThreshold { threshold } => Metric::ThresholdRocAuc { threshold: *threshold },
        }
    }

    #[must_use]
    pub fn default_direction(&self) -> Direction {
        self.metric().natural_direction()
    }

    /// Model family used when the configuration does not name one.
    #[must_use]
    pub fn default_model(&self) -> &'static str {
        if self.is_regression_family() { "linear_regression" } else { "linear" }
    }

    #[must_use]
    pub fn results_suffix(&self) -> &'static str {
        match self {
            Self::Regression => "",
            Self::Classification => "_cls",
            Self::RegThreshold { .. } => "_thrhd",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_mode_is_configuration_error() {
        let err = Mode::parse("ranking", 7.0).unwrap_err();
        assert!(matches!(err, TrainingError::Configuration(_)));
    }

    #[test]
    fn test_reg_threshold_shares_regression_data() {
        let mode = Mode::parse("reg-threshold", 7.0).unwrap();
        assert_eq!(mode.cache_label(), "regression");
        assert_eq!(mode.label_column(), "interaction_value");
        assert_eq!(mode.transformer(), TransformerKind::Normalization);
        assert_eq!(mode.default_direction(), Direction::Maximize);
        assert_eq!(mode.results_suffix(), "_thrhd");
    }

    #[test]
    fn test_direction_improves() {
        assert!(Direction::Minimize.improves(0.4, 0.5));
        assert!(!Direction::Minimize.improves(0.5, 0.5));
        assert!(Direction::Maximize.improves(0.9, Direction::Maximize.worst()));
        assert!(!Direction::Maximize.improves(f64::NAN, 0.1));
    }
}
