use crate::dataset::Dataset;
use crate::error::{TrainingError, TrainingResult};
use crate::mode::Direction;
use crate::transform::{untransform_all, Transformer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Task name → metric value for one phase.
pub type TaskScores = BTreeMap<String, f64>;

/// Metric used to score a model on one dataset, averaged over tasks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Metric {
    /// Root-mean-square error in raw label units.
    Rms,
    /// Area under the ROC curve for binary labels.
    RocAuc,
    /// ROC-AUC of regression outputs where labels above `threshold` are positive.
    ThresholdRocAuc { threshold: f64 },
}

impl Metric {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Rms => "rms_score",
            Self::RocAuc | Self::ThresholdRocAuc { .. } => "roc_auc_score",
        }
    }

    #[must_use]
    pub fn natural_direction(&self) -> Direction {
        match self {
            Self::Rms => Direction::Minimize,
            Self::RocAuc | Self::ThresholdRocAuc { .. } => Direction::Maximize,
        }
    }

    /// Score one task. Samples with zero weight are treated as missing.
    pub fn compute(&self, y_true: &[f64], y_pred: &[f64], weights: &[f64]) -> TrainingResult<f64> {
        let pairs: Vec<(f64, f64)> = y_true
            .iter()
            .zip(y_pred)
            .zip(weights)
            .filter(|(_, w)| **w != 0.0)
            .map(|((t, p), _)| (*t, *p))
            .collect();
        if pairs.is_empty() {
            return Err(TrainingError::evaluation(format!("{}: no labelled samples to score", self.name())));
        }
        match self {
            Self::Rms => {
                let mse = pairs.iter().map(|(t, p)| (t - p).powi(2)).sum::<f64>() / pairs.len() as f64;
                Ok(mse.sqrt())
            }
            Self::RocAuc => roc_auc(&pairs, |t| t > 0.5),
            Self::ThresholdRocAuc { threshold } => roc_auc(&pairs, |t| t > *threshold),
        }
    }
}

/// Mann–Whitney formulation with average ranks for tied predictions.
fn roc_auc(pairs: &[(f64, f64)], positive: impl Fn(f64) -> bool) -> TrainingResult<f64> {
    let mut ranked: Vec<(f64, bool)> = pairs.iter().map(|(t, p)| (*p, positive(*t))).collect();
    ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

    let n_pos = ranked.iter().filter(|(_, pos)| *pos).count();
    let n_neg = ranked.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return Err(TrainingError::evaluation("roc_auc_score is undefined when only one class is present"));
    }

    let mut rank_sum = 0.0;
    let mut i = 0;
    while i < ranked.len() {
        let mut j = i;
        while j + 1 < ranked.len() && ranked[j + 1].0 == ranked[i].0 {
            j += 1;
        }
        // Ranks are 1-based; tied block i..=j shares the mean rank.
        let avg_rank = (i + j) as f64 / 2.0 + 1.0;
        rank_sum += avg_rank * ranked[i..=j].iter().filter(|(_, pos)| *pos).count() as f64;
        i = j + 1;
    }

    let n_pos = n_pos as f64;
    Ok((rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64))
}

/// Score predictions against `dataset`, undoing label transformers first.
///
/// `predictions[i][t]` is the model output for sample `i`, task `t`, in the
/// transformed label space.
pub fn score_predictions(
    dataset: &Dataset,
    predictions: &[Vec<f64>],
    transformers: &[Transformer],
    metric: Metric,
) -> TrainingResult<TaskScores> {
    if predictions.len() != dataset.len() {
        return Err(TrainingError::evaluation(format!(
            "model returned {} predictions for {} samples",
            predictions.len(),
            dataset.len()
        )));
    }
    if let Some(row) = predictions.iter().find(|p| p.len() != dataset.n_tasks()) {
        return Err(TrainingError::evaluation(format!(
            "model predicts {} tasks but the dataset has {}",
            row.len(),
            dataset.n_tasks()
        )));
    }

    let mut scores = TaskScores::new();
    for (t, task) in dataset.tasks.iter().enumerate() {
        let y_true: Vec<f64> = dataset.labels(t).map(|y| untransform_all(transformers, t, y)).collect();
        let y_pred: Vec<f64> = predictions.iter().map(|p| untransform_all(transformers, t, p[t])).collect();
        let weights: Vec<f64> = dataset.samples.iter().map(|s| s.weights[t]).collect();
        let value = metric
            .compute(&y_true, &y_pred, &weights)
            .map_err(|e| TrainingError::evaluation(format!("task '{task}': {e}")))?;
        scores.insert(task.clone(), value);
    }
    Ok(scores)
}

/// Mean over tasks; what early stopping and the search compare.
#[must_use]
pub fn mean_score(scores: &TaskScores) -> f64 {
    if scores.is_empty() {
        return f64::NAN;
    }
    scores.values().sum::<f64>() / scores.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rms() {
        let v = Metric::Rms.compute(&[1.0, 2.0], &[1.0, 4.0], &[1.0, 1.0]).unwrap();
        assert!((v - 2.0_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_roc_auc_perfect_and_inverted() {
        let y = [0.0, 0.0, 1.0, 1.0];
        let w = [1.0; 4];
        assert!((Metric::RocAuc.compute(&y, &[0.1, 0.2, 0.8, 0.9], &w).unwrap() - 1.0).abs() < 1e-12);
        assert!(Metric::RocAuc.compute(&y, &[0.9, 0.8, 0.2, 0.1], &w).unwrap().abs() < 1e-12);
    }

    #[test]
    fn test_roc_auc_ties_count_half() {
        let v = Metric::RocAuc.compute(&[0.0, 1.0], &[0.5, 0.5], &[1.0, 1.0]).unwrap();
        assert!((v - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_threshold_auc_binarizes_labels() {
        let metric = Metric::ThresholdRocAuc { threshold: 7.0 };
        let v = metric.compute(&[5.0, 6.0, 8.0, 9.0], &[5.5, 6.5, 7.5, 8.5], &[1.0; 4]).unwrap();
        assert!((v - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_single_class_is_evaluation_failure() {
        let err = Metric::RocAuc.compute(&[1.0, 1.0], &[0.2, 0.3], &[1.0, 1.0]).unwrap_err();
        assert!(matches!(err, TrainingError::Evaluation(_)));
    }

    #[test]
    fn test_zero_weight_samples_are_ignored() {
        let v = Metric::Rms.compute(&[0.0, 10.0], &[0.0, 0.0], &[1.0, 0.0]).unwrap();
        assert!(v.abs() < 1e-12);
    }
}
