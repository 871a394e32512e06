use super::{Holdout, Splitter};
use crate::dataset::{Dataset, Fold};
use crate::error::{TrainingError, TrainingResult};

/// Splits the task columns instead of the samples.
///
/// Every part keeps all samples; models are evaluated on tasks they never saw.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaskSplitter;

impl Splitter for TaskSplitter {
    fn name(&self) -> &'static str {
        "task"
    }

    fn train_valid_test(&self, dataset: &Dataset, fractions: (f64, f64, f64), _seed: u64) -> TrainingResult<Holdout> {
        let (frac_train, frac_valid, frac_test) = fractions;
        let n_tasks = dataset.n_tasks();
        let needed = 1 + usize::from(frac_valid > 0.0) + usize::from(frac_test > 0.0);
        if n_tasks < needed {
            return Err(TrainingError::config(format!(
                "task split needs at least {needed} tasks, dataset has {n_tasks}"
            )));
        }

        let train_cut = ((frac_train * n_tasks as f64) as usize).clamp(1, n_tasks - (needed - 1));
        let valid_cut = if frac_test > 0.0 {
            (((frac_train + frac_valid) * n_tasks as f64) as usize).clamp(train_cut + 1, n_tasks - 1)
        } else {
            n_tasks
        };

        let train: Vec<usize> = (0..train_cut).collect();
        let valid: Vec<usize> = (train_cut..valid_cut).collect();
        let test: Vec<usize> = (valid_cut..n_tasks).collect();
        Ok((dataset.select_tasks(&train), dataset.select_tasks(&valid), dataset.select_tasks(&test)))
    }

    fn k_fold(&self, dataset: &Dataset, k: usize, _seed: u64) -> TrainingResult<Vec<Fold>> {
        let n_tasks = dataset.n_tasks();
        if n_tasks < k {
            return Err(TrainingError::config(format!("task k-fold needs at least {k} tasks, dataset has {n_tasks}")));
        }
        Ok((0..k)
            .map(|f| {
                let in_fold = |t: usize| t * k / n_tasks == f;
                let valid: Vec<usize> = (0..n_tasks).filter(|&t| in_fold(t)).collect();
                let train: Vec<usize> = (0..n_tasks).filter(|&t| !in_fold(t)).collect();
                Fold { train: dataset.select_tasks(&train), valid: dataset.select_tasks(&valid) }
            })
            .collect())
    }
}
