use crate::error::{TrainingError, TrainingResult};
use crate::transform::Transformer;
use serde::{Deserialize, Serialize};

/// One drug–target pair with its features and per-task labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Drug identifier (SMILES string).
    pub drug: String,
    /// Target identifier (protein name).
    pub target: String,
    pub features: Vec<f64>,
    pub labels: Vec<f64>,
    pub weights: Vec<f64>,
}

/// Featurized interaction records sharing one task list.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dataset {
    pub tasks: Vec<String>,
    pub samples: Vec<Sample>,
}

impl Dataset {
    #[must_use]
    pub fn new(tasks: Vec<String>, samples: Vec<Sample>) -> Self {
        Self { tasks, samples }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn n_tasks(&self) -> usize {
        self.tasks.len()
    }

    /// Column of labels for task `task`.
    pub fn labels(&self, task: usize) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(move |s| s.labels[task])
    }

    /// Subset of samples, in the order of `indices`.
    #[must_use]
    pub fn select(&self, indices: &[usize]) -> Self {
        Self {
            tasks: self.tasks.clone(),
            samples: indices.iter().map(|&i| self.samples[i].clone()).collect(),
        }
    }

    /// All samples restricted to the given task columns.
    #[must_use]
    pub fn select_tasks(&self, task_indices: &[usize]) -> Self {
        let pick = |v: &[f64]| task_indices.iter().map(|&t| v[t]).collect::<Vec<_>>();
        Self {
            tasks: task_indices.iter().map(|&t| self.tasks[t].clone()).collect(),
            samples: self
                .samples
                .iter()
                .map(|s| Sample {
                    drug: s.drug.clone(),
                    target: s.target.clone(),
                    features: s.features.clone(),
                    labels: pick(&s.labels),
                    weights: pick(&s.weights),
                })
                .collect(),
        }
    }

    pub fn validate(&self) -> TrainingResult<()> {
        if self.tasks.is_empty() {
            return Err(TrainingError::Dataset("dataset has no tasks".to_string()));
        }
        let width = self.samples.first().map(|s| s.features.len());
        for (idx, s) in self.samples.iter().enumerate() {
            if s.labels.len() != self.tasks.len() || s.weights.len() != self.tasks.len() {
                return Err(TrainingError::Dataset(format!(
                    "sample[{idx}] has {} labels and {} weights for {} tasks",
                    s.labels.len(),
                    s.weights.len(),
                    self.tasks.len()
                )));
            }
            if Some(s.features.len()) != width {
                return Err(TrainingError::Dataset(format!("sample[{idx}] has a different feature width")));
            }
        }
        Ok(())
    }
}

/// One (train, validation) partition of a k-fold split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fold {
    pub train: Dataset,
    pub valid: Dataset,
}

/// The partitioned dataset handed to the training stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DatasetBundle {
    Holdout { train: Dataset, valid: Dataset, test: Dataset },
    Folds { folds: Vec<Fold> },
}

/// Which partition a split invocation must produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SplitLayout {
    /// Train/valid/test with a held-out test part.
    Test,
    /// Train/valid only; the test part is empty.
    Validation,
    /// `k` (train, valid) folds.
    CrossValidation { k: usize },
}

impl SplitLayout {
    #[must_use]
    pub fn from_flags(test: bool, cross_validation: bool, k: usize) -> Self {
        if cross_validation {
            Self::CrossValidation { k }
        } else if test {
            Self::Test
        } else {
            Self::Validation
        }
    }

    /// (train, valid, test) fractions for the holdout layouts.
    #[must_use]
    pub fn fractions(&self) -> Option<(f64, f64, f64)> {
        match self {
            Self::Test => Some((0.8, 0.1, 0.1)),
            Self::Validation => Some((0.8, 0.2, 0.0)),
            Self::CrossValidation { .. } => None,
        }
    }
}

/// Task names, the split bundle and the transformers that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadedDataset {
    pub tasks: Vec<String>,
    pub bundle: DatasetBundle,
    pub transformers: Vec<Transformer>,
    /// `true` when the bundle was read back from the cache directory.
    pub from_cache: bool,
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// `n` samples over `drugs` x `targets` with one regression task.
    pub fn grid_dataset(drugs: usize, targets: usize) -> Dataset {
        let mut samples = Vec::new();
        for d in 0..drugs {
            for t in 0..targets {
                let x = d as f64 + 0.1 * t as f64;
                samples.push(Sample {
                    drug: format!("C{}", "C".repeat(d)),
                    target: format!("P{t}"),
                    features: vec![d as f64, t as f64, 1.0],
                    labels: vec![2.0 * x + 1.0],
                    weights: vec![1.0],
                });
            }
        }
        Dataset::new(vec!["interaction_value".to_string()], samples)
    }
}
