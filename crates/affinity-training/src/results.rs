//! Append-only CSV record of experiment scores.

use crate::cross_validation::FoldScores;
use crate::early_stopping::RunScores;
use crate::error::TrainingResult;
use crate::mode::Mode;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// `results[_cls|_thrhd][_cold][_cv].csv`
#[must_use]
pub fn results_file_name(mode: &Mode, cold: bool, cross_validation: bool) -> String {
    format!(
        "results{}{}{}.csv",
        mode.results_suffix(),
        if cold { "_cold" } else { "" },
        if cross_validation { "_cv" } else { "" }
    )
}

/// Scores of one task for one run or fold.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultRow {
    pub dataset: String,
    pub model: String,
    pub task: String,
    pub train: f64,
    pub valid: f64,
    pub test: Option<f64>,
    pub elapsed: Duration,
    /// Only recorded when early stopping chose the epoch.
    pub optimal_epoch: Option<usize>,
}

impl ResultRow {
    /// One row per task of a finished holdout run.
    #[must_use]
    pub fn from_run(dataset: &str, model: &str, scores: &RunScores, elapsed: Duration, early_stopping: bool) -> Vec<Self> {
        scores
            .valid
            .iter()
            .map(|(task, &valid)| Self {
                dataset: dataset.to_string(),
                model: model.to_string(),
                task: task.clone(),
                train: scores.train.get(task).copied().unwrap_or(f64::NAN),
                valid,
                test: scores.test.as_ref().and_then(|t| t.get(task).copied()),
                elapsed,
                optimal_epoch: early_stopping.then_some(scores.best_epoch),
            })
            .collect()
    }

    /// Rows for every fold, fold order first and task order second.
    #[must_use]
    pub fn from_folds(dataset: &str, model: &str, folds: &[FoldScores]) -> Vec<Self> {
        folds
            .iter()
            .flat_map(|f| Self::from_run(dataset, model, &f.scores, f.elapsed, false))
            .collect()
    }

    fn record(&self) -> Vec<String> {
        let mut fields = vec![
            self.dataset.clone(),
            self.model.clone(),
            self.task.clone(),
            "train".to_string(),
            self.train.to_string(),
            "valid".to_string(),
            self.valid.to_string(),
        ];
        if let Some(test) = self.test {
            fields.push("test".to_string());
            fields.push(test.to_string());
        }
        fields.push("time_for_running".to_string());
        fields.push(self.elapsed.as_secs_f64().to_string());
        if let Some(epoch) = self.optimal_epoch {
            fields.push("optimal epoch".to_string());
            fields.push(epoch.to_string());
        }
        fields
    }
}

/// Writes score rows to the results file of one output directory.
#[derive(Debug, Clone)]
pub struct ResultRecorder {
    path: PathBuf,
}

impl ResultRecorder {
    #[must_use]
    pub fn new(out_dir: &Path, mode: &Mode, cold: bool, cross_validation: bool) -> Self {
        Self { path: out_dir.join(results_file_name(mode, cold, cross_validation)) }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `rows`; existing content is never rewritten.
    pub fn append(&self, rows: &[ResultRow]) -> TrainingResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut writer = csv::WriterBuilder::new().has_headers(false).flexible(true).from_writer(file);
        for row in rows {
            writer.write_record(row.record())?;
        }
        writer.flush()?;
        tracing::info!(path = %self.path.display(), rows = rows.len(), "recorded results");
        Ok(())
    }
}
