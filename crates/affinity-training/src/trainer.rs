use crate::dataset::Dataset;
use crate::error::TrainingResult;
use crate::hyperparams::HyperParams;
use async_trait::async_trait;

/// A model instance owned by exactly one training run.
///
/// `Clone` snapshots the model; early stopping keeps the best snapshot.
#[async_trait]
pub trait Model: Clone + Send + Sync {
    /// Train for `epochs` more passes over `data`.
    async fn fit(&mut self, data: &Dataset, epochs: usize) -> TrainingResult<()>;

    /// One row of task outputs per sample, in the transformed label space.
    async fn predict(&self, data: &Dataset) -> TrainingResult<Vec<Vec<f64>>>;
}

/// Backend that creates fresh models for a model family.
#[async_trait]
pub trait Trainer: Send + Sync {
    type Model: Model;

    /// Model family name written to the results file.
    fn model_name(&self) -> &str;

    /// Total epochs a run may use under `hp`.
    fn epoch_budget(&self, hp: &HyperParams) -> usize;

    /// A new, untrained model. Nothing is shared between instances.
    async fn init_model(&self, hp: &HyperParams, n_tasks: usize, seed: u64) -> TrainingResult<Self::Model>;
}
