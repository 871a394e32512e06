//! Hyperparameter search over a black-box train-and-validate objective.

use crate::dataset::Dataset;
use crate::early_stopping::{EarlyStopping, EarlyStoppingPolicy, RunData, Scoring};
use crate::error::{TrainingError, TrainingResult};
use crate::hyperparams::{HyperParams, ParamValue};
use crate::metrics::mean_score;
use crate::trainer::Trainer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

/// One evaluated candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub index: usize,
    pub params: HyperParams,
    /// Mean validation score.
    pub score: f64,
}

/// Proposes candidates; trial order and selection policy live here.
pub trait SearchStrategy {
    fn name(&self) -> &'static str;

    /// Next candidate to evaluate, or `None` when the strategy is exhausted.
    fn propose(&mut self, initial: &HyperParams, history: &[Trial]) -> Option<HyperParams>;
}

/// Samples every numeric field log-uniformly in `[v / range, v * range]`.
///
/// Integers are rounded and kept at 1 or above; non-numeric, non-positive and
/// frozen fields keep their initial value.
#[derive(Debug, Clone)]
pub struct NeighborhoodSearch {
    search_range: f64,
    frozen: Vec<String>,
    rng: StdRng,
}

impl NeighborhoodSearch {
    #[must_use]
    pub fn new(search_range: f64, seed: u64) -> Self {
        Self {
            search_range,
            frozen: vec!["seed".to_string(), "nb_epoch".to_string()],
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn sample_around(&mut self, v: f64) -> f64 {
        let (lo, hi) = ((v / self.search_range).ln(), (v * self.search_range).ln());
        self.rng.gen_range(lo..=hi).exp()
    }
}

impl SearchStrategy for NeighborhoodSearch {
    fn name(&self) -> &'static str {
        "neighborhood"
    }

    fn propose(&mut self, initial: &HyperParams, _history: &[Trial]) -> Option<HyperParams> {
        if self.search_range <= 1.0 {
            return None;
        }
        let mut fields = Vec::with_capacity(initial.len());
        for (name, value) in initial.iter() {
            let value = match value {
                _ if self.frozen.contains(name) => value.clone(),
                ParamValue::Int(v) if *v > 0 => ParamValue::Int((self.sample_around(*v as f64).round() as i64).max(1)),
                ParamValue::Float(v) if *v > 0.0 => ParamValue::Float(self.sample_around(*v)),
                other => other.clone(),
            };
            fields.push((name.clone(), value));
        }
        Some(fields.into_iter().collect())
    }
}

/// Inputs of one search.
#[derive(Debug, Clone, Copy)]
pub struct SearchRequest<'a> {
    pub initial: &'a HyperParams,
    pub train: &'a Dataset,
    pub valid: &'a Dataset,
    pub scoring: Scoring<'a>,
    pub max_iter: usize,
    pub early_stopping: EarlyStoppingPolicy,
    pub seed: u64,
    /// Append-only audit log of every trial.
    pub log_file: Option<&'a Path>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub best_hp: HyperParams,
    pub best_score: f64,
    pub trials: Vec<Trial>,
}

/// Run up to `max_iter` isolated trials and keep the best.
///
/// The first trial is always `request.initial` itself. If a later trial
/// fails the search stops and returns the best completed trial; a failing
/// first trial is returned as an error.
pub async fn search<T: Trainer, S: SearchStrategy>(
    trainer: &T,
    strategy: &mut S,
    request: &SearchRequest<'_>,
) -> TrainingResult<SearchOutcome> {
    if request.max_iter == 0 {
        return Err(TrainingError::config("hyperparameter search needs max_iter >= 1"));
    }
    let mut log = TrialLog::open(request.log_file)?;
    log.line(&format!(
        "search model={} strategy={} max_iter={} direction={:?}",
        trainer.model_name(),
        strategy.name(),
        request.max_iter,
        request.scoring.direction
    ))?;

    let mut trials: Vec<Trial> = Vec::new();
    for index in 0..request.max_iter {
        let candidate = if index == 0 {
            request.initial.clone()
        } else {
            match strategy.propose(request.initial, &trials) {
                Some(candidate) => candidate,
                None => break,
            }
        };

        match run_trial(trainer, &candidate, request).await {
            Ok(score) => {
                tracing::info!(trial = index, score, "hyperparameter trial");
                log.line(&format!("trial {index}\tscore={score}\tparams={}", serde_json::to_string(&candidate)?))?;
                trials.push(Trial { index, params: candidate, score });
            }
            Err(e) if trials.is_empty() => return Err(e),
            Err(e) => {
                tracing::warn!(trial = index, error = %e, "hyperparameter trial failed; keeping best so far");
                log.line(&format!("trial {index}\tfailed: {e}"))?;
                break;
            }
        }
    }

    let direction = request.scoring.direction;
    let best = trials
        .iter()
        .fold(None::<&Trial>, |best, t| match best {
            Some(b) if !direction.improves(t.score, b.score) => Some(b),
            _ => Some(t),
        })
        .ok_or_else(|| TrainingError::evaluation("hyperparameter search completed no trials"))?;

    log.line(&format!("best trial {}\tscore={}", best.index, best.score))?;
    let (best_hp, best_score) = (best.params.clone(), best.score);
    Ok(SearchOutcome { best_hp, best_score, trials })
}

async fn run_trial<T: Trainer>(trainer: &T, hp: &HyperParams, request: &SearchRequest<'_>) -> TrainingResult<f64> {
    let model = trainer.init_model(hp, request.train.n_tasks(), request.seed).await?;
    let data = RunData { train: request.train, valid: request.valid, test: None };
    let scores = EarlyStopping::new(request.early_stopping, request.scoring.direction)
        .run(model, data, &request.scoring, trainer.epoch_budget(hp))
        .await?;
    Ok(mean_score(&scores.valid))
}

struct TrialLog {
    file: Option<File>,
}

impl TrialLog {
    fn open(path: Option<&Path>) -> TrainingResult<Self> {
        let file = match path {
            Some(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                Some(OpenOptions::new().create(true).append(true).open(path)?)
            }
            None => None,
        };
        Ok(Self { file })
    }

    fn line(&mut self, text: &str) -> TrainingResult<()> {
        if let Some(file) = self.file.as_mut() {
            writeln!(file, "{text}")?;
        }
        Ok(())
    }
}
