//! Affinity Training
//!
//! Backend-agnostic experiment primitives for drug-target interaction models:
//! - Datasets, label transformers and the split bundle cache
//! - Splitters, metrics and the protein descriptor table
//! - Trainer traits and hyperparameter presets
//! - Early stopping, cross-validation and hyperparameter search
//! - The append-only results file

pub mod cache;
pub mod cross_validation;
pub mod dataset;
pub mod descriptors;
pub mod early_stopping;
pub mod error;
pub mod hyperparams;
pub mod metrics;
pub mod mode;
pub mod results;
pub mod search;
pub mod split;
pub mod trainer;
pub mod transform;

pub use cache::{CacheIdentity, CacheManifest, CachedBundle, FingerprintInputs};
pub use cross_validation::{cross_validate, FoldScores};
pub use dataset::{Dataset, DatasetBundle, Fold, LoadedDataset, Sample, SplitLayout};
pub use descriptors::DescriptorTable;
pub use early_stopping::{EarlyStopping, EarlyStoppingPolicy, RunData, RunScores, Scoring, StopState};
pub use error::{TrainingError, TrainingResult};
pub use hyperparams::{HyperParams, ParamValue, PresetRegistry};
pub use metrics::{mean_score, Metric, TaskScores};
pub use mode::{Direction, Mode, TransformerKind};
pub use results::{results_file_name, ResultRecorder, ResultRow};
pub use search::{search, NeighborhoodSearch, SearchOutcome, SearchRequest, SearchStrategy, Trial};
pub use split::{split, SplitStrategy, Splitter};
pub use trainer::{Model, Trainer};
pub use transform::{untransform_all, Transformer};
