//! Argument types shared by the command implementations.

use affinity_core::ExperimentConfig;
use affinity_training::HyperParams;
use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

/// Flags of `affinity run`. Every flag left unset keeps the config file value.
#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// TOML experiment file; flags override its values
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Dataset name (used in result rows and the snapshot file name)
    #[arg(long)]
    pub dataset: Option<String>,

    /// Featurizer id
    #[arg(long)]
    pub featurizer: Option<String>,

    /// Experiment mode (regression, classification, reg-threshold)
    #[arg(long)]
    pub mode: Option<String>,

    /// Split strategy (index, random, scaffold, butina, task)
    #[arg(long)]
    pub split: Option<String>,

    /// Positive-class threshold for reg-threshold
    #[arg(long)]
    pub threshold: Option<f64>,

    /// Metric direction (maximize, minimize)
    #[arg(long)]
    pub direction: Option<String>,

    /// Directory for results files and hyperparameter snapshots
    #[arg(long)]
    pub out_path: Option<PathBuf>,

    /// Directory holding the raw tables and the bundle cache
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Number of folds under cross-validation
    #[arg(long)]
    pub fold_num: Option<usize>,

    /// Model family (see `affinity presets`)
    #[arg(long)]
    pub model: Option<String>,

    /// Hyperparameter overrides as a JSON object
    #[arg(long)]
    pub hyper_parameters: Option<String>,

    /// Search hyperparameters before the final run
    #[arg(long)]
    pub hyper_param_search: bool,

    /// Maximum number of search trials
    #[arg(long)]
    pub max_iter: Option<usize>,

    /// Ratio around each value explored by the search
    #[arg(long)]
    pub search_range: Option<f64>,

    /// Always rebuild the dataset bundle and never write the cache
    #[arg(long)]
    pub no_reload: bool,

    /// Run k-fold cross-validation
    #[arg(long)]
    pub cross_validation: bool,

    /// Hold out a test set
    #[arg(long)]
    pub test: bool,

    /// Withhold whole drugs and targets from training
    #[arg(long)]
    pub predict_cold: bool,

    /// Stop training when validation stops improving
    #[arg(long)]
    pub early_stopping: bool,

    /// Epochs between validation checks under early stopping
    #[arg(long)]
    pub evaluate_freq: Option<usize>,

    /// Non-improving checks tolerated under early stopping
    #[arg(long)]
    pub patience: Option<usize>,

    #[arg(long)]
    pub seed: Option<u64>,

    /// Search log file
    #[arg(long)]
    pub log_file: Option<PathBuf>,

    /// Directory for per-model training logs
    #[arg(long)]
    pub model_dir: Option<PathBuf>,

    /// Protein descriptor CSV (repeatable)
    #[arg(long = "prot-desc-path")]
    pub prot_desc_path: Vec<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    /// Config file (or defaults) with every given flag layered on top.
    pub fn to_config(&self) -> Result<ExperimentConfig> {
        let mut config = match &self.config {
            Some(path) => ExperimentConfig::load_from_file(path)?,
            None => ExperimentConfig::default(),
        };

        macro_rules! set {
            ($($field:ident),* $(,)?) => {
                $(if let Some(v) = &self.$field {
                    config.$field = v.clone();
                })*
            };
        }
        set!(dataset, featurizer, mode, split, threshold, out_path, fold_num, max_iter, search_range);
        set!(evaluate_freq, patience, seed, log_file, model_dir);

        if let Some(direction) = &self.direction {
            config.direction = Some(direction.clone());
        }
        if let Some(data_dir) = &self.data_dir {
            config.data_dir = Some(data_dir.clone());
        }
        if let Some(model) = &self.model {
            config.model = Some(model.clone());
        }
        if let Some(json) = &self.hyper_parameters {
            let overrides = HyperParams::from_json(json).context("Invalid --hyper-parameters")?;
            config.hyper_parameters = Some(match &config.hyper_parameters {
                Some(existing) => existing.merged(&overrides),
                None => overrides,
            });
        }
        if !self.prot_desc_path.is_empty() {
            config.prot_desc_path.clone_from(&self.prot_desc_path);
        }

        config.hyper_param_search |= self.hyper_param_search;
        config.cross_validation |= self.cross_validation;
        config.test |= self.test;
        config.predict_cold |= self.predict_cold;
        config.early_stopping |= self.early_stopping;
        if self.no_reload {
            config.reload = false;
        }
        Ok(config)
    }
}
