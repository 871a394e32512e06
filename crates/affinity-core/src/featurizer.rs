//! Drug featurizers.

use affinity_training::{TrainingError, TrainingResult};
use rustc_hash::FxHasher;
use std::hash::{Hash, Hasher};

/// Turns a SMILES string into a fixed-width feature vector.
pub trait Featurizer: Send + Sync {
    /// Identifier used in cache paths and fingerprints.
    fn id(&self) -> &str;

    fn width(&self) -> usize;

    /// `None` when the molecule cannot be featurized; such rows are dropped.
    fn featurize(&self, smiles: &str) -> Option<Vec<f64>>;
}

/// Counts of hashed character n-grams of the SMILES string.
#[derive(Debug, Clone)]
pub struct NgramFeaturizer {
    max_n: usize,
    width: usize,
}

impl NgramFeaturizer {
    pub const ID: &'static str = "ngram";

    #[must_use]
    pub fn new(max_n: usize, width: usize) -> Self {
        Self { max_n: max_n.max(1), width: width.max(1) }
    }

    fn bucket(&self, gram: &[char]) -> usize {
        let mut hasher = FxHasher::default();
        gram.hash(&mut hasher);
        (hasher.finish() % self.width as u64) as usize
    }
}

impl Default for NgramFeaturizer {
    fn default() -> Self {
        Self::new(3, 256)
    }
}

impl Featurizer for NgramFeaturizer {
    fn id(&self) -> &str {
        Self::ID
    }

    fn width(&self) -> usize {
        self.width
    }

    fn featurize(&self, smiles: &str) -> Option<Vec<f64>> {
        let chars: Vec<char> = smiles.trim().chars().collect();
        if chars.is_empty() || chars.iter().any(|c| c.is_whitespace()) {
            return None;
        }
        let mut counts = vec![0.0; self.width];
        for n in 1..=self.max_n.min(chars.len()) {
            for gram in chars.windows(n) {
                counts[self.bucket(gram)] += 1.0;
            }
        }
        Some(counts)
    }
}

/// Featurizer registered under `id`.
pub fn featurizer_by_id(id: &str) -> TrainingResult<Box<dyn Featurizer>> {
    match id {
        NgramFeaturizer::ID => Ok(Box::new(NgramFeaturizer::default())),
        other => Err(TrainingError::config(format!("unrecognized featurizer: {other}"))),
    }
}
