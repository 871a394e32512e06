//! Dataset store: raw interaction table to cached, split bundle.

use crate::config::ExperimentPlan;
use crate::featurizer::Featurizer;
use affinity_training::cache::{self, CacheIdentity, CachedBundle, FingerprintInputs};
use affinity_training::{split, Dataset, LoadedDataset, Sample, TrainingError, TrainingResult, Transformer};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const DRUG_COLUMN: &str = "smiles";
const TARGET_COLUMN: &str = "proteinName";

/// Parse the raw table, featurizing each drug.
///
/// Rows whose drug the featurizer rejects, or whose label cell is empty, are
/// dropped with a warning.
pub fn read_raw_dataset(bytes: &[u8], label_column: &str, featurizer: &dyn Featurizer) -> TrainingResult<Dataset> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_reader(bytes);
    let headers = reader.headers()?.clone();
    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h.trim() == name)
            .ok_or_else(|| TrainingError::Dataset(format!("raw table has no '{name}' column")))
    };
    let (drug_idx, target_idx, label_idx) = (column(DRUG_COLUMN)?, column(TARGET_COLUMN)?, column(label_column)?);

    let mut samples = Vec::new();
    let mut dropped = 0usize;
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let field = |i: usize| record.get(i).unwrap_or("").trim();
        let label = field(label_idx);
        if label.is_empty() {
            dropped += 1;
            continue;
        }
        let label: f64 = label
            .parse()
            .map_err(|_| TrainingError::Dataset(format!("line {}: non-numeric label '{label}'", line + 2)))?;
        let Some(features) = featurizer.featurize(field(drug_idx)) else {
            dropped += 1;
            continue;
        };
        if features.len() != featurizer.width() {
            return Err(TrainingError::Dataset(format!(
                "featurizer '{}' returned {} features for '{}', expected {}",
                featurizer.id(),
                features.len(),
                field(drug_idx),
                featurizer.width()
            )));
        }
        samples.push(Sample {
            drug: field(drug_idx).to_string(),
            target: field(target_idx).to_string(),
            features,
            labels: vec![label],
            weights: vec![1.0],
        });
    }

    if dropped > 0 {
        tracing::warn!(dropped, kept = samples.len(), "dropped raw rows that could not be featurized");
    }
    if samples.is_empty() {
        return Err(TrainingError::Dataset("no usable rows in the raw table".to_string()));
    }
    let dataset = Dataset::new(vec![label_column.to_string()], samples);
    dataset.validate()?;
    Ok(dataset)
}

#[must_use]
pub fn raw_table_path(plan: &ExperimentPlan) -> PathBuf {
    plan.data_dir.join(plan.mode.raw_file_name())
}

#[must_use]
pub fn cache_dir(plan: &ExperimentPlan) -> PathBuf {
    CacheIdentity::new(&plan.featurizer, &plan.mode, plan.cold, plan.cross_validation(), plan.split).dir(&plan.data_dir)
}

/// Load the split bundle for `plan`, from cache when allowed and valid.
pub fn load_or_build(plan: &ExperimentPlan, featurizer: &dyn Featurizer) -> TrainingResult<LoadedDataset> {
    if featurizer.id() != plan.featurizer {
        return Err(TrainingError::config(format!(
            "featurizer '{}' does not match the configured '{}'",
            featurizer.id(),
            plan.featurizer
        )));
    }
    let raw_path = raw_table_path(plan);
    let dir = cache_dir(plan);
    let raw = read_optional(&raw_path)?;
    let inputs = FingerprintInputs {
        featurizer: plan.featurizer.clone(),
        transformer: plan.mode.transformer(),
        split: plan.split,
        layout: plan.layout,
        cold: plan.cold,
        seed: plan.seed,
    };
    let fingerprint = raw.as_deref().map(|bytes| inputs.fingerprint(bytes)).transpose()?;

    if plan.reload {
        if raw.is_none() {
            tracing::warn!(path = %raw_path.display(), "raw table missing; trusting the cached bundle");
        }
        if let Some(cached) = cache::load(&dir, &inputs, fingerprint.as_deref())? {
            tracing::info!(dir = %dir.display(), "reusing cached dataset bundle");
            return Ok(LoadedDataset {
                tasks: cached.tasks,
                bundle: cached.bundle,
                transformers: cached.transformers,
                from_cache: true,
            });
        }
    }

    let (Some(raw), Some(fingerprint)) = (raw, fingerprint) else {
        return Err(TrainingError::Dataset(format!("raw table not found: {}", raw_path.display())));
    };

    tracing::info!(path = %raw_path.display(), mode = %plan.mode, "building dataset bundle");
    let dataset = read_raw_dataset(&raw, plan.mode.label_column(), featurizer)?;
    let transformer = Transformer::fit(plan.mode.transformer(), &dataset)?;
    let dataset = transformer.transform(&dataset);
    let bundle = split(&dataset, plan.split, plan.cold, plan.layout, plan.seed)?;

    let cached = CachedBundle { tasks: dataset.tasks, bundle, transformers: vec![transformer] };
    if plan.reload {
        cache::save(&dir, &inputs, &fingerprint, &cached)?;
    }
    Ok(LoadedDataset { tasks: cached.tasks, bundle: cached.bundle, transformers: cached.transformers, from_cache: false })
}

fn read_optional(path: &Path) -> TrainingResult<Option<Vec<u8>>> {
    match std::fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExperimentConfig;
    use crate::featurizer::NgramFeaturizer;
    use affinity_training::{DatasetBundle, SplitLayout};
    use tempfile::TempDir;

    const RAW: &str = "smiles,proteinName,interaction_value\n\
        CCO,P0,5.0\nCCN,P1,6.5\nc1ccccc1,P0,7.2\nCC(=O)O,P1,5.5\nCCCC,P0,8.0\n\
        CCCl,P1,6.1\nOCCO,P0,5.9\nC1CC1,P1,7.7\nCCOC,P0,6.6\nNCCN,P1,5.2\n";

    fn plan(dir: &Path) -> ExperimentPlan {
        ExperimentConfig {
            data_dir: Some(dir.to_path_buf()),
            out_path: dir.join("out"),
            prot_desc_path: vec![dir.join("prot_desc.csv")],
            ..Default::default()
        }
        .resolve()
        .unwrap()
    }

    #[test]
    fn test_read_raw_drops_unusable_rows() {
        let raw = "smiles,proteinName,interaction_value\nCCO,P0,5.0\n,P1,6.0\nCCN,P1,\n";
        let ds = read_raw_dataset(raw.as_bytes(), "interaction_value", &NgramFeaturizer::default()).unwrap();
        assert_eq!(ds.len(), 1);
        assert_eq!(ds.samples[0].target, "P0");
    }

    #[test]
    fn test_read_raw_rejects_features_of_wrong_width() {
        struct Narrow;
        impl Featurizer for Narrow {
            fn id(&self) -> &str {
                "narrow"
            }
            fn width(&self) -> usize {
                4
            }
            fn featurize(&self, _smiles: &str) -> Option<Vec<f64>> {
                Some(vec![1.0; 3])
            }
        }
        let raw = "smiles,proteinName,interaction_value\nCCO,P0,5.0\n";
        let err = read_raw_dataset(raw.as_bytes(), "interaction_value", &Narrow).unwrap_err();
        assert!(matches!(err, TrainingError::Dataset(_)));
    }

    #[test]
    fn test_read_raw_requires_label_column() {
        let raw = "smiles,proteinName,interaction_bin\nCCO,P0,1\n";
        let err = read_raw_dataset(raw.as_bytes(), "interaction_value", &NgramFeaturizer::default()).unwrap_err();
        assert!(matches!(err, TrainingError::Dataset(_)));
    }

    #[test]
    fn test_reload_is_idempotent_without_raw_file() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("restructured.csv"), RAW).unwrap();
        let plan = plan(temp.path());
        let featurizer = NgramFeaturizer::default();

        let first = load_or_build(&plan, &featurizer).unwrap();
        assert!(!first.from_cache);
        assert!(cache_dir(&plan).join(cache::MANIFEST_FILE).is_file());

        std::fs::remove_file(temp.path().join("restructured.csv")).unwrap();
        let second = load_or_build(&plan, &featurizer).unwrap();
        assert!(second.from_cache);
        assert_eq!(second.bundle, first.bundle);
        assert_eq!(second.transformers, first.transformers);
    }

    #[test]
    fn test_changed_raw_file_forces_rebuild() {
        let temp = TempDir::new().unwrap();
        let raw_path = temp.path().join("restructured.csv");
        std::fs::write(&raw_path, RAW).unwrap();
        let plan = plan(temp.path());
        let featurizer = NgramFeaturizer::default();

        load_or_build(&plan, &featurizer).unwrap();
        std::fs::write(&raw_path, format!("{RAW}CCCCO,P0,6.0\n")).unwrap();
        let rebuilt = load_or_build(&plan, &featurizer).unwrap();
        assert!(!rebuilt.from_cache);
        let DatasetBundle::Holdout { train, valid, test } = &rebuilt.bundle else {
            panic!("expected a holdout bundle");
        };
        assert_eq!(train.len() + valid.len() + test.len(), 11);
    }

    #[test]
    fn test_no_reload_never_writes_cache() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("restructured.csv"), RAW).unwrap();
        let plan = ExperimentPlan { reload: false, ..plan(temp.path()) };

        let loaded = load_or_build(&plan, &NgramFeaturizer::default()).unwrap();
        assert!(!loaded.from_cache);
        assert!(!cache_dir(&plan).exists());
    }

    #[test]
    fn test_cache_without_raw_file_must_match_requested_layout() {
        let temp = TempDir::new().unwrap();
        std::fs::write(temp.path().join("restructured.csv"), RAW).unwrap();
        let five_folds = ExperimentPlan { layout: SplitLayout::CrossValidation { k: 5 }, ..plan(temp.path()) };
        let validation = plan(temp.path());
        let featurizer = NgramFeaturizer::default();
        load_or_build(&five_folds, &featurizer).unwrap();
        load_or_build(&validation, &featurizer).unwrap();
        std::fs::remove_file(temp.path().join("restructured.csv")).unwrap();

        let three_folds = ExperimentPlan { layout: SplitLayout::CrossValidation { k: 3 }, ..plan(temp.path()) };
        assert_eq!(cache_dir(&three_folds), cache_dir(&five_folds));
        let err = load_or_build(&three_folds, &featurizer).unwrap_err();
        assert!(matches!(err, TrainingError::Cache(_)));

        let with_test = ExperimentPlan { layout: SplitLayout::Test, ..plan(temp.path()) };
        assert_eq!(cache_dir(&with_test), cache_dir(&validation));
        let err = load_or_build(&with_test, &featurizer).unwrap_err();
        assert!(matches!(err, TrainingError::Cache(_)));

        assert!(load_or_build(&five_folds, &featurizer).unwrap().from_cache);
    }

    #[test]
    fn test_missing_raw_and_cache_is_dataset_error() {
        let temp = TempDir::new().unwrap();
        let err = load_or_build(&plan(temp.path()), &NgramFeaturizer::default()).unwrap_err();
        assert!(matches!(err, TrainingError::Dataset(_)));
    }
}
