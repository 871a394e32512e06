//! Affinity Core
//!
//! Experiment configuration, the reference featurizer and linear backend, the
//! dataset store and the end-to-end experiment pipeline.

pub mod config;
pub mod featurizer;
pub mod linear_trainer;
pub mod pipeline;
pub mod store;

pub use config::{ConfigError, ConfigResult, ExperimentConfig, ExperimentPlan, SearchSettings};
pub use featurizer::{featurizer_by_id, Featurizer, NgramFeaturizer};
pub use linear_trainer::{LinearModel, LinearTrainer, Objective};
pub use pipeline::{run_experiment, run_with_linear_backend, ExperimentReport, TrainerContext};
pub use store::load_or_build;
