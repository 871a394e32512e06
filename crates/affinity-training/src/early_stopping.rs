//! Epoch loop with periodic validation and patience-based stopping.

use crate::dataset::Dataset;
use crate::error::TrainingResult;
use crate::metrics::{mean_score, score_predictions, Metric, TaskScores};
use crate::mode::Direction;
use crate::trainer::Model;
use crate::transform::Transformer;
use serde::{Deserialize, Serialize};

/// How a run decides when to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EarlyStoppingPolicy {
    pub enabled: bool,
    /// Epochs between validation checkpoints.
    pub evaluate_freq: usize,
    /// Non-improving checkpoints tolerated before stopping.
    pub patience: usize,
}

impl EarlyStoppingPolicy {
    #[must_use]
    pub fn disabled() -> Self {
        Self { enabled: false, evaluate_freq: 1, patience: 1 }
    }
}

/// Metric, improvement direction and the transformers to undo before scoring.
#[derive(Debug, Clone, Copy)]
pub struct Scoring<'a> {
    pub metric: Metric,
    pub direction: Direction,
    pub transformers: &'a [Transformer],
}

/// Datasets of one training run.
#[derive(Debug, Clone, Copy)]
pub struct RunData<'a> {
    pub train: &'a Dataset,
    pub valid: &'a Dataset,
    pub test: Option<&'a Dataset>,
}

/// Scores of one finished run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunScores {
    pub train: TaskScores,
    pub valid: TaskScores,
    pub test: Option<TaskScores>,
    /// Epoch whose model produced these scores.
    pub best_epoch: usize,
    /// Epochs actually trained before the loop ended.
    pub stopped_epoch: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopState {
    Training,
    Evaluating,
    Stopped,
}

/// Early-stopping state for one run.
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    policy: EarlyStoppingPolicy,
    direction: Direction,
    best_score: f64,
    best_epoch: usize,
    stale: usize,
    state: StopState,
}

impl EarlyStopping {
    #[must_use]
    pub fn new(policy: EarlyStoppingPolicy, direction: Direction) -> Self {
        Self {
            policy,
            direction,
            best_score: direction.worst(),
            best_epoch: 0,
            stale: 0,
            state: StopState::Training,
        }
    }

    #[must_use]
    pub fn state(&self) -> StopState {
        self.state
    }

    #[must_use]
    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }

    /// Record the validation score at checkpoint `epoch`.
    ///
    /// Returns `true` when it is a new best.
    pub fn observe(&mut self, epoch: usize, score: f64) -> bool {
        self.state = StopState::Evaluating;
        let improved = self.direction.improves(score, self.best_score);
        if improved {
            self.best_score = score;
            self.best_epoch = epoch;
            self.stale = 0;
        } else {
            self.stale += 1;
        }
        tracing::debug!(epoch, score, best = self.best_score, stale = self.stale, "validation checkpoint");

        self.state = if self.stale >= self.policy.patience { StopState::Stopped } else { StopState::Training };
        improved
    }

    /// Train `model` for up to `epochs` epochs and score the best snapshot.
    ///
    /// With the policy disabled, or a budget of zero epochs, the full budget
    /// is used and the last epoch is reported as best. Errors from the model
    /// propagate unchanged.
    pub async fn run<M: Model>(
        mut self,
        mut model: M,
        data: RunData<'_>,
        scoring: &Scoring<'_>,
        epochs: usize,
    ) -> TrainingResult<RunScores> {
        if !self.policy.enabled || epochs == 0 {
            model.fit(data.train, epochs).await?;
            return score_run(&model, data, scoring, epochs, epochs).await;
        }

        let freq = self.policy.evaluate_freq.max(1);
        let mut best_model = model.clone();
        let mut epoch = 0;
        while epoch < epochs && self.state != StopState::Stopped {
            let step = freq.min(epochs - epoch);
            model.fit(data.train, step).await?;
            epoch += step;

            let valid = evaluate(&model, data.valid, scoring).await?;
            if self.observe(epoch, mean_score(&valid)) {
                best_model = model.clone();
            }
        }

        if self.state == StopState::Stopped {
            tracing::info!(
                stopped_at = epoch,
                best_epoch = self.best_epoch,
                best_score = self.best_score,
                "early stopping: no improvement for {} checkpoints",
                self.policy.patience
            );
        }
        self.state = StopState::Stopped;
        score_run(&best_model, data, scoring, self.best_epoch, epoch).await
    }
}

/// Score `model` on `data` with the configured metric.
pub async fn evaluate<M: Model>(model: &M, data: &Dataset, scoring: &Scoring<'_>) -> TrainingResult<TaskScores> {
    let predictions = model.predict(data).await?;
    score_predictions(data, &predictions, scoring.transformers, scoring.metric)
}

async fn score_run<M: Model>(
    model: &M,
    data: RunData<'_>,
    scoring: &Scoring<'_>,
    best_epoch: usize,
    stopped_epoch: usize,
) -> TrainingResult<RunScores> {
    let train = evaluate(model, data.train, scoring).await?;
    let valid = evaluate(model, data.valid, scoring).await?;
    let test = match data.test {
        Some(test) if !test.is_empty() => Some(evaluate(model, test, scoring).await?),
        _ => None,
    };
    Ok(RunScores { train, valid, test, best_epoch, stopped_epoch })
}


#[cfg(test)]
mod tests {
    use super::testing::{zero_labels, ScriptedModel};
    use super::*;

    fn scoring() -> Scoring<'static> {
        Scoring { metric: Metric::Rms, direction: Direction::Minimize, transformers: &[] }
    }

    #[tokio::test]
    async fn test_halts_patience_checkpoints_after_best() {
        // Improves until epoch 6, then worsens every epoch.
        let schedule: Vec<f64> = (0..=60).map(|e| if e <= 6 { 10.0 - e as f64 } else { e as f64 }).collect();
        let ds = zero_labels(4);
        let data = RunData { train: &ds, valid: &ds, test: None };
        let policy = EarlyStoppingPolicy { enabled: true, evaluate_freq: 3, patience: 2 };

        let scores = EarlyStopping::new(policy, Direction::Minimize)
            .run(ScriptedModel::new(schedule), data, &scoring(), 60)
            .await
            .unwrap();

        assert_eq!(scores.best_epoch, 6);
        assert_eq!(scores.stopped_epoch, 6 + 2 * 3);
        // Scores come from the best snapshot, not the last model.
        assert!((scores.valid["interaction_value"] - 4.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_disabled_uses_full_budget() {
        let ds = zero_labels(2);
        let data = RunData { train: &ds, valid: &ds, test: Some(&ds) };
        let scores = EarlyStopping::new(EarlyStoppingPolicy::disabled(), Direction::Minimize)
            .run(ScriptedModel::new(vec![5.0; 20]), data, &scoring(), 12)
            .await
            .unwrap();
        assert_eq!(scores.best_epoch, 12);
        assert_eq!(scores.stopped_epoch, 12);
        assert!(scores.test.is_some());
    }

    #[tokio::test]
    async fn test_budget_caps_training_without_stop() {
        let schedule: Vec<f64> = (0..=10).map(|e| 20.0 - e as f64).collect();
        let ds = zero_labels(2);
        let data = RunData { train: &ds, valid: &ds, test: None };
        let policy = EarlyStoppingPolicy { enabled: true, evaluate_freq: 4, patience: 3 };
        let scores = EarlyStopping::new(policy, Direction::Minimize)
            .run(ScriptedModel::new(schedule), data, &scoring(), 10)
            .await
            .unwrap();
        // Checkpoints at 4, 8 and a final partial step at 10.
        assert_eq!(scores.stopped_epoch, 10);
        assert_eq!(scores.best_epoch, 10);
    }

    #[tokio::test]
    async fn test_zero_budget_matches_disabled_policy() {
        let ds = zero_labels(2);
        let data = RunData { train: &ds, valid: &ds, test: None };
        let policy = EarlyStoppingPolicy { enabled: true, evaluate_freq: 2, patience: 2 };
        let enabled = EarlyStopping::new(policy, Direction::Minimize)
            .run(ScriptedModel::new(vec![3.0, 1.0]), data, &scoring(), 0)
            .await
            .unwrap();
        let disabled = EarlyStopping::new(EarlyStoppingPolicy::disabled(), Direction::Minimize)
            .run(ScriptedModel::new(vec![3.0, 1.0]), data, &scoring(), 0)
            .await
            .unwrap();
        assert_eq!(enabled, disabled);
        assert_eq!((enabled.best_epoch, enabled.stopped_epoch), (0, 0));
    }

    #[tokio::test]
    async fn test_model_error_propagates() {
        let ds = zero_labels(2);
        let data = RunData { train: &ds, valid: &ds, test: None };
        let mut model = ScriptedModel::new(vec![1.0]);
        model.fail_on_fit = true;
        let err = EarlyStopping::new(EarlyStoppingPolicy::disabled(), Direction::Minimize)
            .run(model, data, &scoring(), 3)
            .await
            .unwrap_err();
        assert!(matches!(err, crate::error::TrainingError::Evaluation(_)));
    }

    #[test]
    fn test_state_transitions() {
        let policy = EarlyStoppingPolicy { enabled: true, evaluate_freq: 1, patience: 1 };
        let mut es = EarlyStopping::new(policy, Direction::Maximize);
        assert_eq!(es.state(), StopState::Training);
        assert!(es.observe(1, 0.7));
        assert_eq!(es.state(), StopState::Training);
        assert!(!es.observe(2, 0.6));
        assert_eq!(es.state(), StopState::Stopped);
        assert_eq!(es.best_epoch(), 1);
    }
}
