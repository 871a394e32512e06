use thiserror::Error;

pub type TrainingResult<T> = std::result::Result<T, TrainingError>;

#[derive(Debug, Error)]
pub enum TrainingError {
    /// Unrecognized mode, split, featurizer or model name, or an invalid flag combination.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The same entity id appeared twice while loading descriptor sources.
    #[error("duplicate descriptor key '{key}' in {source_path}")]
    DuplicateKey { key: String, source_path: String },

    /// Raised by a trainer, model or metric while fitting or scoring.
    #[error("evaluation failure: {0}")]
    Evaluation(String),

    #[error("dataset error: {0}")]
    Dataset(String),

    #[error("descriptor error: {0}")]
    Descriptor(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TrainingError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn evaluation(msg: impl Into<String>) -> Self {
        Self::Evaluation(msg.into())
    }
}
