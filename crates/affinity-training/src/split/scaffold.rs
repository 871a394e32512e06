use super::{folds_from_groups, holdout_from_groups, Holdout, Splitter};
use crate::dataset::{Dataset, Fold};
use crate::error::TrainingResult;
use std::collections::BTreeMap;

/// Groups drugs by molecular framework and keeps each group in one part.
///
/// Largest frameworks are placed first, so rare chemotypes end up in the
/// validation and test parts.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScaffoldSplitter;

impl ScaffoldSplitter {
    fn groups(dataset: &Dataset) -> Vec<Vec<usize>> {
        let mut by_key: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (i, s) in dataset.samples.iter().enumerate() {
            by_key.entry(framework_key(&s.drug)).or_default().push(i);
        }
        let mut groups: Vec<Vec<usize>> = by_key.into_values().collect();
        groups.sort_by(|a, b| b.len().cmp(&a.len()).then(a[0].cmp(&b[0])));
        groups
    }
}

impl Splitter for ScaffoldSplitter {
    fn name(&self) -> &'static str {
        "scaffold"
    }

    fn train_valid_test(&self, dataset: &Dataset, fractions: (f64, f64, f64), _seed: u64) -> TrainingResult<Holdout> {
        Ok(holdout_from_groups(dataset, &Self::groups(dataset), fractions))
    }

    fn k_fold(&self, dataset: &Dataset, k: usize, _seed: u64) -> TrainingResult<Vec<Fold>> {
        folds_from_groups(dataset, &Self::groups(dataset), k)
    }
}

/// Atom- and bond-generic skeleton of a SMILES string.
///
/// Every atom (bracketed or not, aromatic or aliphatic) becomes `*`, bond
/// symbols and stereo marks are dropped, and branches and ring closures are
/// kept, so molecules that differ only in element types or bond orders share
/// a key.
#[must_use]
pub fn framework_key(smiles: &str) -> String {
    let mut key = String::with_capacity(smiles.len());
    let mut chars = smiles.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '[' => {
                for inner in chars.by_ref() {
                    if inner == ']' {
                        break;
                    }
                }
                key.push('*');
            }
            'A'..='Z' => {
                // Two-letter organic-subset symbols.
                if matches!((c, chars.peek()), ('C', Some('l')) | ('B', Some('r'))) {
                    chars.next();
                }
                key.push('*');
            }
            'b' | 'c' | 'n' | 'o' | 'p' | 's' => key.push('*'),
            '(' | ')' | '%' | '.' | '0'..='9' => key.push(c),
            _ => {}
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Sample;

    fn sample(drug: &str) -> Sample {
        Sample {
            drug: drug.to_string(),
            target: "P1".to_string(),
            features: vec![1.0],
            labels: vec![0.0],
            weights: vec![1.0],
        }
    }

    #[test]
    fn test_framework_key_ignores_elements_and_bonds() {
        assert_eq!(framework_key("c1ccccc1O"), framework_key("C1=CC=CC=C1Cl"));
        assert_ne!(framework_key("c1ccccc1"), framework_key("CCCCCC"));
        assert_eq!(framework_key("[NH4+]"), "*");
    }

    #[test]
    fn test_scaffold_groups_never_straddle_parts() {
        let mut samples = Vec::new();
        for _ in 0..6 {
            samples.push(sample("c1ccccc1"));
        }
        for _ in 0..2 {
            samples.push(sample("CCO"));
        }
        for _ in 0..2 {
            samples.push(sample("C1CC1"));
        }
        let ds = Dataset::new(vec!["t".to_string()], samples);

        let (train, valid, test) = ScaffoldSplitter.train_valid_test(&ds, (0.8, 0.1, 0.1), 0).unwrap();
        assert_eq!(train.len(), 8);
        assert_eq!(valid.len() + test.len(), 2);
        let train_keys: Vec<String> = train.samples.iter().map(|s| framework_key(&s.drug)).collect();
        for s in valid.samples.iter().chain(&test.samples) {
            assert!(!train_keys.contains(&framework_key(&s.drug)));
        }
    }
}
