use crate::dataset::Fold;
use crate::early_stopping::{EarlyStopping, EarlyStoppingPolicy, RunData, RunScores, Scoring};
use crate::error::TrainingResult;
use crate::hyperparams::HyperParams;
use crate::trainer::Trainer;
use std::time::{Duration, Instant};

/// Scores of one fold, tagged with its index.
#[derive(Debug, Clone, PartialEq)]
pub struct FoldScores {
    pub fold: usize,
    pub scores: RunScores,
    /// Wall-clock time spent fitting and scoring this fold.
    pub elapsed: Duration,
}

/// Train and score one fresh model per fold, in fold order.
///
/// Early stopping is always off here. The first failing fold aborts the
/// remaining ones and its error is returned; no partial list is produced.
pub async fn cross_validate<T: Trainer>(
    trainer: &T,
    folds: &[Fold],
    hp: &HyperParams,
    scoring: &Scoring<'_>,
    seed: u64,
) -> TrainingResult<Vec<FoldScores>> {
    let epochs = trainer.epoch_budget(hp);
    let mut results = Vec::with_capacity(folds.len());

    for (i, fold) in folds.iter().enumerate() {
        tracing::info!(fold = i + 1, of = folds.len(), train = fold.train.len(), valid = fold.valid.len(), "cross-validation fold");
        let started = Instant::now();
        let fold_hp = hp.clone();
        let model = trainer.init_model(&fold_hp, fold.train.n_tasks(), seed).await?;
        let data = RunData { train: &fold.train, valid: &fold.valid, test: None };
        let scores = EarlyStopping::new(EarlyStoppingPolicy::disabled(), scoring.direction)
            .run(model, data, scoring, epochs)
            .await?;
        results.push(FoldScores { fold: i, scores, elapsed: started.elapsed() });
    }

    Ok(results)
}
