//! On-disk cache of split dataset bundles.
//!
//! A bundle lives in `<data_dir>/<featurizer>[_cold][_CV]/<mode>/<split>/` as
//! `bundle.json` plus a `manifest.json` holding its content fingerprint.

use crate::dataset::{DatasetBundle, SplitLayout};
use crate::error::{TrainingError, TrainingResult};
use crate::mode::{Mode, TransformerKind};
use crate::split::SplitStrategy;
use crate::transform::Transformer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

pub const BUNDLE_FILE: &str = "bundle.json";
pub const MANIFEST_FILE: &str = "manifest.json";

/// Everything that selects a cache directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheIdentity {
    pub featurizer: String,
    pub mode_label: &'static str,
    pub cold: bool,
    pub cross_validation: bool,
    pub split: SplitStrategy,
}

impl CacheIdentity {
    #[must_use]
    pub fn new(featurizer: &str, mode: &Mode, cold: bool, cross_validation: bool, split: SplitStrategy) -> Self {
        Self { featurizer: featurizer.to_string(), mode_label: mode.cache_label(), cold, cross_validation, split }
    }

    #[must_use]
    pub fn dir(&self, data_dir: &Path) -> PathBuf {
        let mut top = self.featurizer.clone();
        if self.cold {
            top.push_str("_cold");
        }
        if self.cross_validation {
            top.push_str("_CV");
        }
        data_dir.join(top).join(self.mode_label).join(self.split.name())
    }
}

/// Inputs that determine a bundle's content besides the raw bytes.
///
/// Stored in the manifest so a bundle can still be matched against a run
/// after the raw table is gone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintInputs {
    pub featurizer: String,
    pub transformer: TransformerKind,
    pub split: SplitStrategy,
    pub layout: SplitLayout,
    pub cold: bool,
    pub seed: u64,
}

impl FingerprintInputs {
    /// SHA-256 over the raw table bytes followed by the canonical JSON of `self`.
    pub fn fingerprint(&self, raw: &[u8]) -> TrainingResult<String> {
        let mut hasher = Sha256::new();
        hasher.update(raw);
        hasher.update([0u8]);
        hasher.update(serde_json::to_vec(self)?);
        Ok(hex::encode(hasher.finalize()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheManifest {
    pub fingerprint: String,
    pub bundle_sha256: String,
    pub created_at: DateTime<Utc>,
    pub tasks: Vec<String>,
    pub inputs: FingerprintInputs,
}

/// Serialized content of `bundle.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedBundle {
    pub tasks: Vec<String>,
    pub bundle: DatasetBundle,
    pub transformers: Vec<Transformer>,
}

#[must_use]
pub fn sha256_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Read a bundle back if its manifest matches `fingerprint`.
///
/// Returns `Ok(None)` when nothing is cached or the cache is stale; a stale
/// cache is left on disk for the caller to overwrite. With `fingerprint`
/// unset (raw table no longer available) the manifest inputs must equal
/// `inputs`, otherwise the bundle cannot be rebuilt and this is a
/// [`TrainingError::Cache`].
pub fn load(dir: &Path, inputs: &FingerprintInputs, fingerprint: Option<&str>) -> TrainingResult<Option<CachedBundle>> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let bundle_path = dir.join(BUNDLE_FILE);
    if !manifest_path.is_file() || !bundle_path.is_file() {
        return Ok(None);
    }

    let manifest: CacheManifest = match serde_json::from_slice(&std::fs::read(&manifest_path)?) {
        Ok(manifest) => manifest,
        Err(e) => {
            tracing::warn!(path = %manifest_path.display(), error = %e, "unreadable cache manifest; rebuilding");
            return Ok(None);
        }
    };
    match fingerprint {
        Some(f) if f != manifest.fingerprint => {
            tracing::info!(dir = %dir.display(), "cache fingerprint changed; rebuilding");
            return Ok(None);
        }
        Some(_) => {}
        None if manifest.inputs != *inputs => {
            return Err(TrainingError::Cache(format!(
                "bundle in {} was built with {:?} but the run needs {:?}, and the raw table is unavailable to rebuild it",
                dir.display(),
                manifest.inputs,
                inputs
            )));
        }
        None => {}
    }

    let bytes = std::fs::read(&bundle_path)?;
    if sha256_bytes(&bytes) != manifest.bundle_sha256 {
        tracing::warn!(path = %bundle_path.display(), "cached bundle does not match its manifest; rebuilding");
        return Ok(None);
    }
    let cached: CachedBundle = serde_json::from_slice(&bytes)
        .map_err(|e| TrainingError::Cache(format!("{}: {e}", bundle_path.display())))?;
    Ok(Some(cached))
}

/// Write `bundle.json` then `manifest.json`; the manifest is the commit point.
pub fn save(
    dir: &Path,
    inputs: &FingerprintInputs,
    fingerprint: &str,
    cached: &CachedBundle,
) -> TrainingResult<CacheManifest> {
    std::fs::create_dir_all(dir)?;
    let bytes = serde_json::to_vec(cached)?;
    std::fs::write(dir.join(BUNDLE_FILE), &bytes)?;

    let manifest = CacheManifest {
        fingerprint: fingerprint.to_string(),
        bundle_sha256: sha256_bytes(&bytes),
        created_at: Utc::now(),
        tasks: cached.tasks.clone(),
        inputs: inputs.clone(),
    };
    std::fs::write(dir.join(MANIFEST_FILE), serde_json::to_vec_pretty(&manifest)?)?;
    tracing::info!(dir = %dir.display(), "cached dataset bundle");
    Ok(manifest)
}
