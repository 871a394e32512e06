use super::{folds_from_groups, folds_from_members, holdout_from_groups, Holdout, Splitter};
use crate::dataset::{Dataset, Fold};
use crate::error::TrainingResult;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::{BTreeSet, HashMap};

/// Seeded shuffle split.
///
/// With `cold` set, whole drugs and whole targets are withheld: a pair can only
/// land in train when neither of its entities was drawn into a held-out set.
/// Cold k-fold validates each pair in the fold of its drug; the fold's targets
/// are also kept out of that fold's training part, so pairs sharing only a
/// target with the fold are in neither part.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomSplitter {
    cold: bool,
}

impl RandomSplitter {
    #[must_use]
    pub fn new(cold: bool) -> Self {
        Self { cold }
    }
}

impl Splitter for RandomSplitter {
    fn name(&self) -> &'static str {
        if self.cold { "random-cold" } else { "random" }
    }

    fn train_valid_test(&self, dataset: &Dataset, fractions: (f64, f64, f64), seed: u64) -> TrainingResult<Holdout> {
        let mut rng = StdRng::seed_from_u64(seed);
        if !self.cold {
            let groups = shuffled_singletons(dataset.len(), &mut rng);
            return Ok(holdout_from_groups(dataset, &groups, fractions));
        }

        let (_, frac_valid, frac_test) = fractions;
        let drugs = ColdEntities::draw(entity_ids(dataset, |s| &s.drug), frac_valid, frac_test, &mut rng);
        let targets = ColdEntities::draw(entity_ids(dataset, |s| &s.target), frac_valid, frac_test, &mut rng);

        let (mut train, mut valid, mut test) = (Vec::new(), Vec::new(), Vec::new());
        for (i, s) in dataset.samples.iter().enumerate() {
            if drugs.test.contains(&s.drug) || targets.test.contains(&s.target) {
                test.push(i);
            } else if drugs.valid.contains(&s.drug) || targets.valid.contains(&s.target) {
                valid.push(i);
            } else {
                train.push(i);
            }
        }
        Ok((dataset.select(&train), dataset.select(&valid), dataset.select(&test)))
    }

    fn k_fold(&self, dataset: &Dataset, k: usize, seed: u64) -> TrainingResult<Vec<Fold>> {
        let mut rng = StdRng::seed_from_u64(seed);
        if !self.cold {
            let groups = shuffled_singletons(dataset.len(), &mut rng);
            return folds_from_groups(dataset, &groups, k);
        }

        let drug_fold = entity_folds(entity_ids(dataset, |s| &s.drug), k, &mut rng);
        let target_fold = entity_folds(entity_ids(dataset, |s| &s.target), k, &mut rng);
        let mut valid_members: Vec<Vec<usize>> = vec![Vec::new(); k];
        for (i, s) in dataset.samples.iter().enumerate() {
            valid_members[drug_fold[&s.drug]].push(i);
        }
        folds_from_members(dataset, &valid_members, |i, f| {
            let s = &dataset.samples[i];
            drug_fold[&s.drug] != f && target_fold[&s.target] != f
        })
    }
}

fn shuffled_singletons(n: usize, rng: &mut StdRng) -> Vec<Vec<usize>> {
    let mut order: Vec<usize> = (0..n).collect();
    order.shuffle(rng);
    order.into_iter().map(|i| vec![i]).collect()
}

/// Distinct entity ids in a stable order, so a seed always draws the same set.
fn entity_ids<'a>(dataset: &'a Dataset, field: impl Fn(&'a crate::dataset::Sample) -> &'a String) -> Vec<String> {
    dataset
        .samples
        .iter()
        .map(field)
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

struct ColdEntities {
    valid: BTreeSet<String>,
    test: BTreeSet<String>,
}

impl ColdEntities {
    /// Withhold a share of `ids` such that, with drugs and targets drawn
    /// independently, roughly `frac_valid + frac_test` of all pairs are held out.
    fn draw(mut ids: Vec<String>, frac_valid: f64, frac_test: f64, rng: &mut StdRng) -> Self {
        ids.shuffle(rng);
        let held = (frac_valid + frac_test).clamp(0.0, 1.0);
        let entity_frac = 1.0 - (1.0 - held).sqrt();

        let needs_valid = usize::from(frac_valid > 0.0);
        let needs_test = usize::from(frac_test > 0.0);
        let mut n_cold = (entity_frac * ids.len() as f64).round() as usize;
        if ids.len() > needs_valid + needs_test {
            n_cold = n_cold.clamp(needs_valid + needs_test, ids.len() - 1);
        } else {
            n_cold = n_cold.min(ids.len());
        }
        let n_test = if held > 0.0 { ((frac_test / held) * n_cold as f64).round() as usize } else { 0 };
        let n_test = if n_cold >= needs_valid + needs_test {
            n_test.clamp(needs_test, n_cold - needs_valid)
        } else {
            n_test.min(n_cold)
        };

        Self {
            test: ids[..n_test].iter().cloned().collect(),
            valid: ids[n_test..n_cold].iter().cloned().collect(),
        }
    }
}

fn entity_folds(mut ids: Vec<String>, k: usize, rng: &mut StdRng) -> HashMap<String, usize> {
    ids.shuffle(rng);
    ids.into_iter().enumerate().map(|(i, id)| (id, i % k)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::fixtures::grid_dataset;

    fn ids(ds: &Dataset, f: impl Fn(&crate::dataset::Sample) -> &str) -> BTreeSet<String> {
        ds.samples.iter().map(|s| f(s).to_string()).collect()
    }

    #[test]
    fn test_random_split_is_seed_deterministic() {
        let ds = grid_dataset(6, 5);
        let a = RandomSplitter::new(false).train_valid_test(&ds, (0.8, 0.1, 0.1), 11).unwrap();
        let b = RandomSplitter::new(false).train_valid_test(&ds, (0.8, 0.1, 0.1), 11).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.0.len() + a.1.len() + a.2.len(), ds.len());
    }

    #[test]
    fn test_cold_holdout_entities_disjoint_from_train() {
        let ds = grid_dataset(12, 10);
        let (train, valid, test) = RandomSplitter::new(true).train_valid_test(&ds, (0.8, 0.1, 0.1), 3).unwrap();
        assert!(!train.is_empty());
        assert!(!valid.is_empty());
        assert!(!test.is_empty());

        let train_drugs = ids(&train, |s| s.drug.as_str());
        let train_targets = ids(&train, |s| s.target.as_str());
        for held in [&valid, &test] {
            for s in &held.samples {
                // Each held-out pair has at least one entity never seen in training.
                assert!(!train_drugs.contains(&s.drug) || !train_targets.contains(&s.target));
            }
        }
        assert_eq!(train.len() + valid.len() + test.len(), ds.len());
    }

    #[test]
    fn test_cold_k_fold_keeps_fold_entities_out_of_train() {
        let ds = grid_dataset(8, 6);
        let folds = RandomSplitter::new(true).k_fold(&ds, 4, 5).unwrap();
        assert_eq!(folds.len(), 4);
        assert_eq!(folds.iter().map(|f| f.valid.len()).sum::<usize>(), ds.len());
        let mut seen: Vec<(String, String)> =
            folds.iter().flat_map(|f| f.valid.samples.iter().map(|s| (s.drug.clone(), s.target.clone()))).collect();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), ds.len());
        for fold in &folds {
            let train_drugs = ids(&fold.train, |s| s.drug.as_str());
            let train_targets = ids(&fold.train, |s| s.target.as_str());
            for s in &fold.valid.samples {
                assert!(!train_drugs.contains(&s.drug) || !train_targets.contains(&s.target));
            }
        }
    }
}
