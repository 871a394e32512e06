//! Linear SGD backend for the `linear` and `linear_regression` model families.
//!
//! Each sample's input is its drug features followed by the descriptor of its
//! target. Regression fits a per-task least-squares model; classification fits
//! per-task logistic regression weighted by the sample weights.

use affinity_training::{Dataset, DescriptorTable, HyperParams, Mode, Model, Trainer, TrainingError, TrainingResult};
use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    LeastSquares,
    Logistic,
}

/// Trainer handing out [`LinearModel`]s.
#[derive(Debug, Clone)]
pub struct LinearTrainer {
    model_name: String,
    objective: Objective,
    descriptors: Arc<DescriptorTable>,
    log_dir: Option<PathBuf>,
}

impl LinearTrainer {
    pub const MODELS: [&'static str; 2] = ["linear", "linear_regression"];

    pub fn new(model_name: &str, mode: &Mode, descriptors: Arc<DescriptorTable>) -> TrainingResult<Self> {
        if !Self::MODELS.contains(&model_name) {
            return Err(TrainingError::config(format!(
                "model family '{model_name}' has no backend; available: {}",
                Self::MODELS.join(", ")
            )));
        }
        let objective = if mode.is_regression_family() { Objective::LeastSquares } else { Objective::Logistic };
        Ok(Self { model_name: model_name.to_string(), objective, descriptors, log_dir: None })
    }

    /// Append per-epoch training loss to `<dir>/<model>_loss.csv`.
    #[must_use]
    pub fn with_log_dir(mut self, dir: PathBuf) -> Self {
        self.log_dir = Some(dir);
        self
    }
}

#[async_trait]
impl Trainer for LinearTrainer {
    type Model = LinearModel;

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn epoch_budget(&self, hp: &HyperParams) -> usize {
        hp.usize_or("nb_epoch", 30)
    }

    async fn init_model(&self, hp: &HyperParams, n_tasks: usize, seed: u64) -> TrainingResult<LinearModel> {
        let learning_rate = hp.f64_or("learning_rate", 0.01);
        if !(learning_rate.is_finite() && learning_rate > 0.0) {
            return Err(TrainingError::evaluation(format!("learning_rate must be positive, got {learning_rate}")));
        }
        if n_tasks == 0 {
            return Err(TrainingError::evaluation("cannot build a model with no tasks"));
        }
        if let Some(dir) = &self.log_dir {
            std::fs::create_dir_all(dir)?;
        }
        Ok(LinearModel {
            objective: self.objective,
            descriptors: Arc::clone(&self.descriptors),
            n_tasks,
            learning_rate,
            penalty: hp.f64_or("penalty", 0.0).max(0.0),
            batch_size: hp.usize_or("batch_size", 32).max(1),
            seed: hp.get("seed").and_then(|v| v.as_i64()).map_or(seed, |s| s as u64),
            scale: Vec::new(),
            weights: Vec::new(),
            bias: vec![0.0; n_tasks],
            epochs_trained: 0,
            loss_log: self.log_dir.as_ref().map(|d| d.join(format!("{}_loss.csv", self.model_name))),
        })
    }
}

#[derive(Debug, Clone)]
pub struct LinearModel {
    objective: Objective,
    descriptors: Arc<DescriptorTable>,
    n_tasks: usize,
    learning_rate: f64,
    penalty: f64,
    batch_size: usize,
    seed: u64,
    /// Per-input max-abs scale, fixed on the first `fit`.
    scale: Vec<f64>,
    /// `weights[task][input]`
    weights: Vec<Vec<f64>>,
    bias: Vec<f64>,
    epochs_trained: usize,
    loss_log: Option<PathBuf>,
}

impl LinearModel {
    #[must_use]
    pub fn epochs_trained(&self) -> usize {
        self.epochs_trained
    }

    fn inputs(&self, data: &Dataset) -> TrainingResult<Vec<Vec<f64>>> {
        data.samples
            .iter()
            .map(|s| {
                let desc = self.descriptors.get(&s.target).ok_or_else(|| {
                    TrainingError::evaluation(format!("no protein descriptor for target '{}'", s.target))
                })?;
                let mut x = Vec::with_capacity(s.features.len() + desc.len());
                x.extend_from_slice(&s.features);
                x.extend_from_slice(desc);
                Ok(x)
            })
            .collect()
    }

    fn ensure_shape(&mut self, inputs: &[Vec<f64>]) -> TrainingResult<()> {
        let dim = inputs.first().map_or(0, Vec::len);
        if self.weights.is_empty() {
            let mut scale = vec![0.0_f64; dim];
            for x in inputs {
                for (s, v) in scale.iter_mut().zip(x) {
                    *s = s.max(v.abs());
                }
            }
            self.scale = scale.into_iter().map(|s| if s > 0.0 { 1.0 / s } else { 1.0 }).collect();
            self.weights = vec![vec![0.0; dim]; self.n_tasks];
        } else if self.scale.len() != dim {
            return Err(TrainingError::evaluation(format!(
                "input width changed from {} to {dim}",
                self.scale.len()
            )));
        }
        Ok(())
    }

    fn output(&self, task: usize, x: &[f64]) -> f64 {
        let z = self.weights[task].iter().zip(x).zip(&self.scale).map(|((w, v), s)| w * v * s).sum::<f64>()
            + self.bias[task];
        match self.objective {
            Objective::LeastSquares => z,
            Objective::Logistic => 1.0 / (1.0 + (-z).exp()),
        }
    }

    fn epoch(&mut self, data: &Dataset, inputs: &[Vec<f64>]) -> f64 {
        let mut order: Vec<usize> = (0..inputs.len()).collect();
        let mut rng = StdRng::seed_from_u64(self.seed.wrapping_add(self.epochs_trained as u64));
        order.shuffle(&mut rng);

        let mut loss = 0.0;
        for batch in order.chunks(self.batch_size) {
            for task in 0..self.n_tasks {
                let mut grad = vec![0.0; self.scale.len()];
                let mut grad_bias = 0.0;
                for &i in batch {
                    let (x, sample) = (&inputs[i], &data.samples[i]);
                    let (y, w) = (sample.labels[task], sample.weights[task]);
                    let out = self.output(task, x);
                    let err = (out - y) * w;
                    loss += match self.objective {
                        Objective::LeastSquares => 0.5 * err * (out - y),
                        Objective::Logistic => -w * (y * out.max(1e-12).ln() + (1.0 - y) * (1.0 - out).max(1e-12).ln()),
                    };
                    for ((g, v), s) in grad.iter_mut().zip(x).zip(&self.scale) {
                        *g += err * v * s;
                    }
                    grad_bias += err;
                }
                let n = batch.len() as f64;
                for (w, g) in self.weights[task].iter_mut().zip(&grad) {
                    *w -= self.learning_rate * (g / n + self.penalty * *w);
                }
                self.bias[task] -= self.learning_rate * grad_bias / n;
            }
        }
        self.epochs_trained += 1;
        loss / (inputs.len() * self.n_tasks) as f64
    }

    fn log_loss(&self, loss: f64) -> TrainingResult<()> {
        if let Some(path) = &self.loss_log {
            let mut file = std::fs::OpenOptions::new().create(true).append(true).open(path)?;
            writeln!(file, "{},{loss}", self.epochs_trained)?;
        }
        Ok(())
    }
}

#[async_trait]
impl Model for LinearModel {
    async fn fit(&mut self, data: &Dataset, epochs: usize) -> TrainingResult<()> {
        if data.is_empty() {
            return Err(TrainingError::evaluation("cannot fit on an empty dataset"));
        }
        if data.n_tasks() != self.n_tasks {
            return Err(TrainingError::evaluation(format!(
                "model has {} tasks, dataset has {}",
                self.n_tasks,
                data.n_tasks()
            )));
        }
        let inputs = self.inputs(data)?;
        self.ensure_shape(&inputs)?;
        for _ in 0..epochs {
            let loss = self.epoch(data, &inputs);
            if !loss.is_finite() {
                return Err(TrainingError::evaluation(format!("training diverged at epoch {}", self.epochs_trained)));
            }
            tracing::trace!(epoch = self.epochs_trained, loss, "linear epoch");
            self.log_loss(loss)?;
        }
        Ok(())
    }

    async fn predict(&self, data: &Dataset) -> TrainingResult<Vec<Vec<f64>>> {
        if self.weights.is_empty() {
            return Err(TrainingError::evaluation("predict called before fit"));
        }
        let inputs = self.inputs(data)?;
        if inputs.first().is_some_and(|x| x.len() != self.scale.len()) {
            return Err(TrainingError::evaluation("input width does not match the fitted model"));
        }
        Ok(inputs.iter().map(|x| (0..self.n_tasks).map(|t| self.output(t, x)).collect()).collect())
    }
}
