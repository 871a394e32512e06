//! Dataset splitters.
//!
//! Every strategy produces exactly one partition per call: a holdout
//! (train/valid/test) split or `k` folds, chosen by [`SplitLayout`].

mod butina;
mod random;
mod scaffold;
mod task;

pub use butina::ButinaSplitter;
pub use random::RandomSplitter;
pub use scaffold::{framework_key, ScaffoldSplitter};
pub use task::TaskSplitter;

use crate::dataset::{Dataset, DatasetBundle, Fold, SplitLayout};
use crate::error::{TrainingError, TrainingResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Train/valid/test parts of a holdout split.
pub type Holdout = (Dataset, Dataset, Dataset);

pub trait Splitter {
    fn name(&self) -> &'static str;

    fn train_valid_test(&self, dataset: &Dataset, fractions: (f64, f64, f64), seed: u64) -> TrainingResult<Holdout>;

    fn k_fold(&self, dataset: &Dataset, k: usize, seed: u64) -> TrainingResult<Vec<Fold>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitStrategy {
    Index,
    Random,
    Scaffold,
    Butina,
    Task,
}

impl SplitStrategy {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Random => "random",
            Self::Scaffold => "scaffold",
            Self::Butina => "butina",
            Self::Task => "task",
        }
    }

    /// Build the splitter. Only `random` honours the cold-start modifier.
    #[must_use]
    pub fn splitter(self, cold: bool) -> Box<dyn Splitter> {
        if cold && self != Self::Random {
            tracing::warn!(strategy = self.name(), "cold-start split is only implemented for the random splitter; ignoring");
        }
        match self {
            Self::Index => Box::new(IndexSplitter),
            Self::Random => Box::new(RandomSplitter::new(cold)),
            Self::Scaffold => Box::new(ScaffoldSplitter),
            Self::Butina => Box::new(ButinaSplitter::default()),
            Self::Task => Box::new(TaskSplitter),
        }
    }
}

impl FromStr for SplitStrategy {
    type Err = TrainingError;

    fn from_str(s: &str) -> TrainingResult<Self> {
        match s {
            "index" => Ok(Self::Index),
            "random" => Ok(Self::Random),
            "scaffold" => Ok(Self::Scaffold),
            "butina" => Ok(Self::Butina),
            "task" => Ok(Self::Task),
            other => Err(TrainingError::config(format!("unrecognized split strategy: {other}"))),
        }
    }
}

impl fmt::Display for SplitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Partition `dataset` with `strategy` according to `layout`.
pub fn split(
    dataset: &Dataset,
    strategy: SplitStrategy,
    cold: bool,
    layout: SplitLayout,
    seed: u64,
) -> TrainingResult<DatasetBundle> {
    let splitter = strategy.splitter(cold);
    tracing::info!(splitter = splitter.name(), cold, ?layout, samples = dataset.len(), "splitting dataset");
    match layout {
        SplitLayout::CrossValidation { k } => {
            if k < 2 {
                return Err(TrainingError::config(format!("k-fold split needs at least 2 folds, got {k}")));
            }
            Ok(DatasetBundle::Folds { folds: splitter.k_fold(dataset, k, seed)? })
        }
        SplitLayout::Test | SplitLayout::Validation => {
            let fractions = layout.fractions().unwrap_or((0.8, 0.1, 0.1));
            let (train, valid, test) = splitter.train_valid_test(dataset, fractions, seed)?;
            if valid.is_empty() {
                return Err(TrainingError::Dataset(format!(
                    "{} split left the validation set empty ({} samples)",
                    splitter.name(),
                    dataset.len()
                )));
            }
            Ok(DatasetBundle::Holdout { train, valid, test })
        }
    }
}

/// Keeps the dataset order.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndexSplitter;

impl Splitter for IndexSplitter {
    fn name(&self) -> &'static str {
        "index"
    }

    fn train_valid_test(&self, dataset: &Dataset, fractions: (f64, f64, f64), _seed: u64) -> TrainingResult<Holdout> {
        let groups: Vec<Vec<usize>> = (0..dataset.len()).map(|i| vec![i]).collect();
        Ok(holdout_from_groups(dataset, &groups, fractions))
    }

    fn k_fold(&self, dataset: &Dataset, k: usize, _seed: u64) -> TrainingResult<Vec<Fold>> {
        let groups: Vec<Vec<usize>> = (0..dataset.len()).map(|i| vec![i]).collect();
        folds_from_groups(dataset, &groups, k)
    }
}

/// Fill train, then valid, then test with whole groups, in group order.
pub(crate) fn holdout_from_groups(dataset: &Dataset, groups: &[Vec<usize>], fractions: (f64, f64, f64)) -> Holdout {
    let (frac_train, frac_valid, _) = fractions;
    let n = dataset.len() as f64;
    let train_cutoff = frac_train * n;
    let valid_cutoff = (frac_train + frac_valid) * n;

    let (mut train, mut valid, mut test) = (Vec::new(), Vec::new(), Vec::new());
    for group in groups {
        if (train.len() + group.len()) as f64 > train_cutoff {
            if (train.len() + valid.len() + group.len()) as f64 > valid_cutoff {
                test.extend_from_slice(group);
            } else {
                valid.extend_from_slice(group);
            }
        } else {
            train.extend_from_slice(group);
        }
    }
    (dataset.select(&train), dataset.select(&valid), dataset.select(&test))
}

/// Assign groups to folds sequentially until each fold reaches its share.
pub(crate) fn folds_from_groups(dataset: &Dataset, groups: &[Vec<usize>], k: usize) -> TrainingResult<Vec<Fold>> {
    let n = dataset.len();
    let mut assignment = vec![0usize; n];
    let mut fold = 0;
    let mut filled = 0;
    for group in groups {
        for &i in group {
            assignment[i] = fold;
        }
        filled += group.len();
        while fold + 1 < k && filled * k >= (fold + 1) * n {
            fold += 1;
        }
    }

    let mut valid_members: Vec<Vec<usize>> = vec![Vec::new(); k];
    for group in groups {
        for &i in group {
            valid_members[assignment[i]].push(i);
        }
    }
    folds_from_members(dataset, &valid_members, |i, f| assignment[i] != f)
}

/// Build folds where `valid_members[f]` is fold `f`'s validation set and
/// `in_train(i, f)` decides train membership.
pub(crate) fn folds_from_members(
    dataset: &Dataset,
    valid_members: &[Vec<usize>],
    in_train: impl Fn(usize, usize) -> bool,
) -> TrainingResult<Vec<Fold>> {
    valid_members
        .iter()
        .enumerate()
        .map(|(f, valid)| {
            let train: Vec<usize> = (0..dataset.len()).filter(|&i| in_train(i, f)).collect();
            if valid.is_empty() || train.is_empty() {
                return Err(TrainingError::Dataset(format!(
                    "fold {f} of {} is empty; not enough samples or groups",
                    valid_members.len()
                )));
            }
            Ok(Fold { train: dataset.select(&train), valid: dataset.select(valid) })
        })
        .collect()
}
