use crate::dataset::Dataset;
use crate::error::{TrainingError, TrainingResult};
use crate::mode::TransformerKind;
use serde::{Deserialize, Serialize};

/// A fitted dataset transformation, persisted with the cached bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transformer {
    /// `y' = (y - mean) / std`, per task.
    Normalization { means: Vec<f64>, stds: Vec<f64> },
    /// Negatives keep weight 1, positives get `n_neg / n_pos`, per task.
    Balancing { positive_weights: Vec<f64> },
}

impl Transformer {
    /// Fit a transformer of `kind` on `dataset`.
    pub fn fit(kind: TransformerKind, dataset: &Dataset) -> TrainingResult<Self> {
        if dataset.is_empty() {
            return Err(TrainingError::Dataset("cannot fit a transformer on an empty dataset".to_string()));
        }
        let n_tasks = dataset.n_tasks();
        match kind {
            TransformerKind::Normalization => {
                let mut means = Vec::with_capacity(n_tasks);
                let mut stds = Vec::with_capacity(n_tasks);
                for task in 0..n_tasks {
                    let n = dataset.len() as f64;
                    let mean = dataset.labels(task).sum::<f64>() / n;
                    let var = dataset.labels(task).map(|y| (y - mean).powi(2)).sum::<f64>() / n;
                    let std = var.sqrt();
                    means.push(mean);
                    // A constant column would divide by zero.
                    stds.push(if std > f64::EPSILON { std } else { 1.0 });
                }
                Ok(Self::Normalization { means, stds })
            }
            TransformerKind::Balancing => {
                let mut positive_weights = Vec::with_capacity(n_tasks);
                for task in 0..n_tasks {
                    let positives = dataset.labels(task).filter(|&y| y > 0.5).count();
                    let negatives = dataset.len() - positives;
                    if positives == 0 {
                        return Err(TrainingError::Dataset(format!(
                            "task '{}' has no positive examples to balance",
                            dataset.tasks[task]
                        )));
                    }
                    positive_weights.push(negatives as f64 / positives as f64);
                }
                Ok(Self::Balancing { positive_weights })
            }
        }
    }

    /// Apply the transformation, returning a new dataset.
    #[must_use]
    pub fn transform(&self, dataset: &Dataset) -> Dataset {
        let mut out = dataset.clone();
        for sample in &mut out.samples {
            match self {
                Self::Normalization { means, stds } => {
                    for (t, y) in sample.labels.iter_mut().enumerate() {
                        *y = (*y - means[t]) / stds[t];
                    }
                }
                Self::Balancing { positive_weights } => {
                    for (t, w) in sample.weights.iter_mut().enumerate() {
                        if sample.labels[t] > 0.5 {
                            *w *= positive_weights[t];
                        }
                    }
                }
            }
        }
        out
    }

    /// Map a label-space value of task `task` back to raw units.
    #[must_use]
    pub fn untransform(&self, task: usize, value: f64) -> f64 {
        match self {
            Self::Normalization { means, stds } => value * stds[task] + means[task],
            Self::Balancing { .. } => value,
        }
    }
}

/// Undo every label transformer, last applied first.
#[must_use]
pub fn untransform_all(transformers: &[Transformer], task: usize, value: f64) -> f64 {
    transformers.iter().rev().fold(value, |v, t| t.untransform(task, v))
}
