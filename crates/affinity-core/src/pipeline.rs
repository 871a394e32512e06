//! End-to-end experiment: dataset store, optional search, training and result recording.

use crate::config::ExperimentPlan;
use crate::featurizer::{featurizer_by_id, Featurizer};
use crate::linear_trainer::LinearTrainer;
use crate::store;
use affinity_training::{
    cross_validate, search, DatasetBundle, DescriptorTable, EarlyStopping, HyperParams, Mode, NeighborhoodSearch,
    ResultRecorder, ResultRow, RunData, Scoring, SearchOutcome, SearchRequest, Trainer, TrainingError,
    TrainingResult,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// What a trainer factory gets to build its backend from.
#[derive(Debug, Clone)]
pub struct TrainerContext<'a> {
    pub model: &'a str,
    pub mode: Mode,
    pub descriptors: Arc<DescriptorTable>,
    pub model_dir: &'a Path,
}

/// Outcome of one finished experiment.
#[derive(Debug, Clone)]
pub struct ExperimentReport {
    pub mode: Mode,
    pub model: String,
    pub results_path: PathBuf,
    pub rows: Vec<ResultRow>,
    /// Hyperparameters of the recorded run.
    pub hyper_parameters: HyperParams,
    pub search: Option<SearchOutcome>,
    pub snapshot_path: Option<PathBuf>,
    pub from_cache: bool,
}

/// Run `plan` with the trainer built by `make_trainer`.
///
/// Result rows and the hyperparameter snapshot are written only after every
/// stage succeeded, and a failure to write either leaves neither behind.
pub async fn run_experiment<T, F>(
    plan: &ExperimentPlan,
    featurizer: &dyn Featurizer,
    make_trainer: F,
) -> TrainingResult<ExperimentReport>
where
    T: Trainer,
    F: FnOnce(TrainerContext<'_>) -> TrainingResult<T>,
{
    tracing::info!(
        dataset = %plan.dataset,
        mode = %plan.mode,
        split = %plan.split,
        model = %plan.model,
        layout = ?plan.layout,
        "starting experiment"
    );

    let descriptors = Arc::new(DescriptorTable::load(&plan.prot_desc_paths)?);
    let trainer = make_trainer(TrainerContext {
        model: &plan.model,
        mode: plan.mode,
        descriptors,
        model_dir: &plan.model_dir,
    })?;

    let loaded = store::load_or_build(plan, featurizer)?;
    let scoring = Scoring { metric: plan.mode.metric(), direction: plan.direction, transformers: &loaded.transformers };

    let mut hyper_parameters = plan.hyper_parameters.clone();
    let mut search_outcome = None;
    let rows = match &loaded.bundle {
        DatasetBundle::Folds { folds } => {
            if !plan.cross_validation() {
                return Err(TrainingError::Cache("cached bundle holds folds but no cross-validation was requested".into()));
            }
            let results = cross_validate(&trainer, folds, &hyper_parameters, &scoring, plan.seed).await?;
            ResultRow::from_folds(&plan.dataset, &plan.model, &results)
        }
        DatasetBundle::Holdout { train, valid, test } => {
            if plan.cross_validation() {
                return Err(TrainingError::Cache("cached bundle is a holdout split but cross-validation was requested".into()));
            }
            if let Some(settings) = plan.search {
                tracing::info!(max_iter = settings.max_iter, range = settings.search_range, "hyperparameter search");
                let mut strategy = NeighborhoodSearch::new(settings.search_range, plan.seed);
                let request = SearchRequest {
                    initial: &plan.hyper_parameters,
                    train,
                    valid,
                    scoring,
                    max_iter: settings.max_iter,
                    early_stopping: plan.early_stopping,
                    seed: plan.seed,
                    log_file: Some(plan.log_file.as_path()),
                };
                let outcome = search(&trainer, &mut strategy, &request).await?;
                tracing::info!(best_score = outcome.best_score, trials = outcome.trials.len(), "search finished");
                hyper_parameters = outcome.best_hp.clone();
                search_outcome = Some(outcome);
            }

            let started = Instant::now();
            let model = trainer.init_model(&hyper_parameters, train.n_tasks(), plan.seed).await?;
            let data = RunData { train, valid, test: plan.with_test().then_some(test) };
            let scores = EarlyStopping::new(plan.early_stopping, plan.direction)
                .run(model, data, &scoring, trainer.epoch_budget(&hyper_parameters))
                .await?;
            let elapsed = started.elapsed();
            tracing::info!(
                best_epoch = scores.best_epoch,
                stopped_epoch = scores.stopped_epoch,
                secs = elapsed.as_secs_f64(),
                "training finished"
            );
            ResultRow::from_run(&plan.dataset, &plan.model, &scores, elapsed, plan.early_stopping.enabled)
        }
    };

    let snapshot_path = match &search_outcome {
        Some(outcome) => {
            let path = plan.snapshot_path();
            let json = serde_json::to_string_pretty(&outcome.best_hp)?;
            std::fs::create_dir_all(&plan.out_path)?;
            std::fs::write(&path, json)?;
            Some(path)
        }
        None => None,
    };

    // The snapshot only survives when the rows made it into the results file.
    let recorder = ResultRecorder::new(&plan.out_path, &plan.mode, plan.cold, plan.cross_validation());
    if let Err(e) = recorder.append(&rows) {
        if let Some(path) = &snapshot_path {
            if let Err(cleanup) = std::fs::remove_file(path) {
                tracing::warn!(path = %path.display(), error = %cleanup, "could not remove hyperparameter snapshot");
            }
        }
        return Err(e);
    }
    if let Some(path) = &snapshot_path {
        tracing::info!(path = %path.display(), "saved hyperparameter snapshot");
    }

    Ok(ExperimentReport {
        mode: plan.mode,
        model: plan.model.clone(),
        results_path: recorder.path().to_path_buf(),
        rows,
        hyper_parameters,
        search: search_outcome,
        snapshot_path,
        from_cache: loaded.from_cache,
    })
}

/// Run `plan` with the registered featurizer and the linear backend.
pub async fn run_with_linear_backend(plan: &ExperimentPlan) -> TrainingResult<ExperimentReport> {
    let featurizer = featurizer_by_id(&plan.featurizer)?;
    run_experiment(plan, featurizer.as_ref(), |ctx| {
        Ok(LinearTrainer::new(ctx.model, &ctx.mode, ctx.descriptors)?.with_log_dir(ctx.model_dir.to_path_buf()))
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExperimentConfig;
    use affinity_training::{HyperParams, ParamValue};
    use tempfile::TempDir;

    const RAW: &str = "smiles,proteinName,interaction_value\n\
        CCO,P0,5.0\nCCN,P1,6.5\nc1ccccc1,P0,7.2\nCC(=O)O,P1,5.5\nCCCC,P0,8.0\n\
        CCCl,P1,6.1\nOCCO,P0,5.9\nC1CC1,P1,7.7\nCCOC,P0,6.6\nNCCN,P1,5.2\n\
        CCCO,P0,6.3\nCCCN,P1,7.0\nc1ccncc1,P0,5.8\nCC(C)O,P1,6.9\nCCS,P0,5.4\n";

    fn config(dir: &Path) -> ExperimentConfig {
        std::fs::write(dir.join("restructured.csv"), RAW).unwrap();
        std::fs::write(dir.join("prot_desc.csv"), "id,d1,d2\nP0,0.1,0.9\nP1,0.8,0.2\n").unwrap();
        ExperimentConfig {
            data_dir: Some(dir.to_path_buf()),
            out_path: dir.join("out"),
            model_dir: dir.join("model_dir"),
            log_file: dir.join("out/search.log"),
            prot_desc_path: vec![dir.join("prot_desc.csv")],
            hyper_parameters: Some(HyperParams::new().with("nb_epoch", ParamValue::Int(4))),
            ..Default::default()
        }
    }

    fn lines(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path).unwrap().lines().map(str::to_string).collect()
    }

    #[tokio::test]
    async fn test_results_accumulate_across_runs() {
        let temp = TempDir::new().unwrap();
        let plan = config(temp.path()).resolve().unwrap();

        let first = run_with_linear_backend(&plan).await.unwrap();
        let second = run_with_linear_backend(&plan).await.unwrap();

        assert!(!first.from_cache);
        assert!(second.from_cache);
        assert_eq!(first.results_path, temp.path().join("out/results.csv"));
        let rows = lines(&first.results_path);
        assert_eq!(rows.len(), 2);
        assert!(rows[0].starts_with("davis,linear_regression,interaction_value,train,"));
        assert!(rows[0].contains(",time_for_running,"));
        assert!(first.snapshot_path.is_none());
    }

    #[tokio::test]
    async fn test_test_and_early_stopping_columns() {
        let temp = TempDir::new().unwrap();
        let plan = ExperimentConfig { test: true, early_stopping: true, evaluate_freq: 1, patience: 2, ..config(temp.path()) }
            .resolve()
            .unwrap();

        let report = run_with_linear_backend(&plan).await.unwrap();
        let row = &lines(&report.results_path)[0];
        assert!(row.contains(",test,"));
        assert!(row.contains(",optimal epoch,"));
        assert!(report.rows[0].optimal_epoch.is_some_and(|e| (1..=4).contains(&e)));
    }

    #[tokio::test]
    async fn test_cross_validation_writes_one_row_per_fold() {
        let temp = TempDir::new().unwrap();
        let plan = ExperimentConfig { cross_validation: true, fold_num: 3, ..config(temp.path()) }.resolve().unwrap();

        let report = run_with_linear_backend(&plan).await.unwrap();
        assert_eq!(report.results_path, temp.path().join("out/results_cv.csv"));
        assert_eq!(lines(&report.results_path).len(), 3);
        assert!(temp.path().join("ngram_CV/regression/random/manifest.json").is_file());
    }

    #[tokio::test]
    async fn test_search_writes_snapshot_and_log() {
        let temp = TempDir::new().unwrap();
        let plan = ExperimentConfig { hyper_param_search: true, max_iter: 3, ..config(temp.path()) }.resolve().unwrap();

        let report = run_with_linear_backend(&plan).await.unwrap();
        let outcome = report.search.as_ref().unwrap();
        assert_eq!(outcome.trials.len(), 3);
        assert_eq!(outcome.trials[0].params, plan.hyper_parameters);
        assert_eq!(report.hyper_parameters, outcome.best_hp);

        let snapshot = report.snapshot_path.unwrap();
        assert_eq!(snapshot, temp.path().join("out/davislinear_regression.json"));
        let saved = HyperParams::from_json(&std::fs::read_to_string(snapshot).unwrap()).unwrap();
        assert_eq!(saved, outcome.best_hp);
        assert_eq!(lines(&plan.log_file).iter().filter(|l| l.starts_with("trial ")).count(), 3);
    }

    /// 40 rows alternating between two label values, so every index-split part holds both.
    fn alternating_table(label_column: &str, low: &str, high: &str) -> String {
        let mut table = format!("smiles,proteinName,{label_column}\n");
        for i in 0..40 {
            let label = if i % 2 == 0 { low } else { high };
            table.push_str(&format!("C{}O{},P{},{label}\n", "C".repeat(i % 7), "N".repeat(i / 7), (i / 2) % 2));
        }
        table
    }

    fn row_fields(row: &str) -> Vec<&str> {
        row.split(',').collect()
    }

    #[tokio::test]
    async fn test_classification_records_auc_rows() {
        let temp = TempDir::new().unwrap();
        let base = config(temp.path());
        std::fs::write(temp.path().join("restructured_bin.csv"), alternating_table("interaction_bin", "0", "1")).unwrap();
        let plan = ExperimentConfig {
            mode: "classification".to_string(),
            split: "index".to_string(),
            test: true,
            ..base
        }
        .resolve()
        .unwrap();
        assert_eq!(plan.model, "linear");

        let report = run_with_linear_backend(&plan).await.unwrap();
        assert_eq!(report.results_path, temp.path().join("out/results_cls.csv"));
        assert!(temp.path().join("ngram/classification/index/manifest.json").is_file());
        let rows = lines(&report.results_path);
        assert_eq!(rows.len(), 1);
        let fields = row_fields(&rows[0]);
        assert_eq!(fields.len(), 11);
        assert_eq!(&fields[..4], ["davis", "linear", "interaction_bin", "train"]);
        assert_eq!((fields[5], fields[7], fields[9]), ("valid", "test", "time_for_running"));
        for score in [fields[4], fields[6], fields[8]] {
            let auc: f64 = score.parse().unwrap();
            assert!((0.0..=1.0).contains(&auc), "auc {auc}");
        }
    }

    #[tokio::test]
    async fn test_reg_threshold_records_threshold_auc_rows() {
        let temp = TempDir::new().unwrap();
        let base = config(temp.path());
        std::fs::write(temp.path().join("restructured.csv"), alternating_table("interaction_value", "5.0", "8.0")).unwrap();
        let plan = ExperimentConfig { mode: "reg-threshold".to_string(), split: "index".to_string(), ..base }
            .resolve()
            .unwrap();

        let report = run_with_linear_backend(&plan).await.unwrap();
        assert_eq!(report.results_path, temp.path().join("out/results_thrhd.csv"));
        assert!(temp.path().join("ngram/regression/index/manifest.json").is_file());
        let rows = lines(&report.results_path);
        let fields = row_fields(&rows[0]);
        assert_eq!(fields.len(), 9);
        assert_eq!(&fields[..4], ["davis", "linear_regression", "interaction_value", "train"]);
        assert_eq!((fields[5], fields[7]), ("valid", "time_for_running"));
        let valid_auc: f64 = fields[6].parse().unwrap();
        assert!((0.0..=1.0).contains(&valid_auc), "auc {valid_auc}");
    }

    #[tokio::test]
    async fn test_unwritable_snapshot_leaves_no_rows() {
        let temp = TempDir::new().unwrap();
        let plan = ExperimentConfig { hyper_param_search: true, max_iter: 2, ..config(temp.path()) }.resolve().unwrap();
        std::fs::create_dir_all(plan.snapshot_path()).unwrap();

        let err = run_with_linear_backend(&plan).await.unwrap_err();
        assert!(matches!(err, TrainingError::Io(_)));
        assert!(!temp.path().join("out/results.csv").exists());
    }

    #[tokio::test]
    async fn test_unwritable_results_leave_no_snapshot() {
        let temp = TempDir::new().unwrap();
        let plan = ExperimentConfig { hyper_param_search: true, max_iter: 2, ..config(temp.path()) }.resolve().unwrap();
        std::fs::create_dir_all(temp.path().join("out/results.csv")).unwrap();

        let err = run_with_linear_backend(&plan).await.unwrap_err();
        assert!(matches!(err, TrainingError::Io(_)));
        assert!(!plan.snapshot_path().exists());
    }

    #[tokio::test]
    async fn test_failed_run_writes_no_results() {
        let temp = TempDir::new().unwrap();
        let plan = config(temp.path()).resolve().unwrap();
        std::fs::write(temp.path().join("prot_desc.csv"), "id,d1,d2\nP0,0.1,0.9\n").unwrap();

        let err = run_with_linear_backend(&plan).await.unwrap_err();
        assert!(matches!(err, TrainingError::Evaluation(_)));
        assert!(!temp.path().join("out/results.csv").exists());
    }

    #[tokio::test]
    async fn test_model_without_backend_fails_before_loading_data() {
        let temp = TempDir::new().unwrap();
        let plan = ExperimentConfig { model: Some("weave_regression".to_string()), ..config(temp.path()) }
            .resolve()
            .unwrap();

        let err = run_with_linear_backend(&plan).await.unwrap_err();
        assert!(matches!(err, TrainingError::Configuration(_)));
        assert!(!temp.path().join("ngram").exists());
    }
}
