use super::{folds_from_groups, holdout_from_groups, Holdout, Splitter};
use crate::dataset::{Dataset, Fold};
use crate::error::TrainingResult;
use std::collections::{BTreeMap, BTreeSet};

/// Taylor–Butina clustering of drug fingerprints; each cluster stays in one part.
///
/// The fingerprint of a drug is the set of its non-zero feature positions.
#[derive(Debug, Clone, Copy)]
pub struct ButinaSplitter {
    /// Tanimoto distance at or below which two drugs are neighbours.
    pub cutoff: f64,
}

impl Default for ButinaSplitter {
    fn default() -> Self {
        Self { cutoff: 0.6 }
    }
}

impl ButinaSplitter {
    fn groups(&self, dataset: &Dataset) -> Vec<Vec<usize>> {
        let mut by_drug: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
        for (i, s) in dataset.samples.iter().enumerate() {
            by_drug.entry(s.drug.as_str()).or_default().push(i);
        }
        let drugs: Vec<&str> = by_drug.keys().copied().collect();
        let prints: Vec<BTreeSet<usize>> = drugs
            .iter()
            .map(|d| {
                let first = by_drug[d][0];
                dataset.samples[first]
                    .features
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| **v != 0.0)
                    .map(|(j, _)| j)
                    .collect()
            })
            .collect();

        let n = drugs.len();
        let mut neighbours: Vec<Vec<usize>> = vec![Vec::new(); n];
        for a in 0..n {
            for b in (a + 1)..n {
                if 1.0 - tanimoto(&prints[a], &prints[b]) <= self.cutoff {
                    neighbours[a].push(b);
                    neighbours[b].push(a);
                }
            }
        }

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| neighbours[b].len().cmp(&neighbours[a].len()).then(a.cmp(&b)));

        let mut assigned = vec![false; n];
        let mut clusters: Vec<Vec<usize>> = Vec::new();
        for centroid in order {
            if assigned[centroid] {
                continue;
            }
            assigned[centroid] = true;
            let mut members = by_drug[drugs[centroid]].clone();
            for &nb in &neighbours[centroid] {
                if !assigned[nb] {
                    assigned[nb] = true;
                    members.extend_from_slice(&by_drug[drugs[nb]]);
                }
            }
            members.sort_unstable();
            clusters.push(members);
        }
        clusters.sort_by(|a, b| b.len().cmp(&a.len()).then(a[0].cmp(&b[0])));
        clusters
    }
}

fn tanimoto(a: &BTreeSet<usize>, b: &BTreeSet<usize>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f64 / union as f64
}

impl Splitter for ButinaSplitter {
    fn name(&self) -> &'static str {
        "butina"
    }

    fn train_valid_test(&self, dataset: &Dataset, fractions: (f64, f64, f64), _seed: u64) -> TrainingResult<Holdout> {
        Ok(holdout_from_groups(dataset, &self.groups(dataset), fractions))
    }

    fn k_fold(&self, dataset: &Dataset, k: usize, _seed: u64) -> TrainingResult<Vec<Fold>> {
        folds_from_groups(dataset, &self.groups(dataset), k)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Sample;

    fn sample(drug: &str, features: Vec<f64>) -> Sample {
        Sample { drug: drug.to_string(), target: "P".to_string(), features, labels: vec![0.0], weights: vec![1.0] }
    }

    #[test]
    fn test_similar_drugs_share_a_cluster() {
        let ds = Dataset::new(
            vec!["t".to_string()],
            vec![
                sample("A", vec![1.0, 1.0, 1.0, 0.0, 0.0, 0.0]),
                sample("B", vec![1.0, 1.0, 1.0, 1.0, 0.0, 0.0]),
                sample("C", vec![0.0, 0.0, 0.0, 0.0, 1.0, 1.0]),
                sample("A", vec![1.0, 1.0, 1.0, 0.0, 0.0, 0.0]),
            ],
        );
        let groups = ButinaSplitter::default().groups(&ds);
        assert_eq!(groups, vec![vec![0, 1, 3], vec![2]]);
    }

    #[test]
    fn test_tanimoto() {
        let a: BTreeSet<usize> = [0, 1, 2].into_iter().collect();
        let b: BTreeSet<usize> = [1, 2, 3].into_iter().collect();
        assert!((tanimoto(&a, &b) - 0.5).abs() < 1e-12);
    }
}
