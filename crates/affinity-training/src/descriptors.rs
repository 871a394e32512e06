//! Per-entity descriptor lookup (protein descriptors by default).

use crate::error::{TrainingError, TrainingResult};
use std::collections::HashMap;
use std::path::Path;

/// Entity id → fixed-width numeric descriptor, merged from one or more CSV files.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescriptorTable {
    rows: HashMap<String, Vec<f64>>,
    width: Option<usize>,
}

impl DescriptorTable {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Load and merge every file in `paths`.
    ///
    /// Each id must appear in exactly one row across all files; a repeat is a
    /// `DuplicateKey` error.
    pub fn load<P: AsRef<Path>>(paths: &[P]) -> TrainingResult<Self> {
        let mut table = Self::new();
        for path in paths {
            table.load_file(path.as_ref())?;
        }
        tracing::info!(entities = table.len(), width = table.width().unwrap_or(0), "loaded descriptor table");
        Ok(table)
    }

    /// Merge one CSV whose first column is the id and the rest are numbers.
    pub fn load_file(&mut self, path: &Path) -> TrainingResult<()> {
        let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(path).map_err(|e| {
            TrainingError::Descriptor(format!("failed to open {}: {e}", path.display()))
        })?;

        for (line, record) in reader.records().enumerate() {
            let record = record?;
            let mut fields = record.iter();
            let Some(id) = fields.next() else {
                continue;
            };
            let values = fields
                .map(|v| {
                    v.trim().parse::<f64>().map_err(|_| {
                        TrainingError::Descriptor(format!(
                            "{}:{}: non-numeric descriptor value '{v}' for '{id}'",
                            path.display(),
                            line + 2
                        ))
                    })
                })
                .collect::<TrainingResult<Vec<f64>>>()?;
            self.insert(id.to_string(), values, path)?;
        }
        Ok(())
    }

    fn insert(&mut self, id: String, values: Vec<f64>, path: &Path) -> TrainingResult<()> {
        if self.rows.contains_key(&id) {
            return Err(TrainingError::DuplicateKey { key: id, source_path: path.display().to_string() });
        }
        match self.width {
            Some(w) if w != values.len() => {
                return Err(TrainingError::Descriptor(format!(
                    "descriptor for '{id}' in {} has {} values, expected {w}",
                    path.display(),
                    values.len()
                )));
            }
            None => self.width = Some(values.len()),
            _ => {}
        }
        self.rows.insert(id, values);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&[f64]> {
        self.rows.get(id).map(Vec::as_slice)
    }

    /// Descriptor length shared by every row; `None` while empty.
    #[must_use]
    pub fn width(&self) -> Option<usize> {
        self.width
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn test_disjoint_files_merge() {
        let temp = TempDir::new().unwrap();
        let a = write(&temp, "a.csv", "id,d0,d1\nP1,0.1,0.2\nP2,0.3,0.4\n");
        let b = write(&temp, "b.csv", "id,d0,d1\nP3,1.0,2.0\n");

        let table = DescriptorTable::load(&[a, b]).unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.width(), Some(2));
        assert_eq!(table.get("P3"), Some(&[1.0, 2.0][..]));
    }

    #[test]
    fn test_duplicate_across_files_is_rejected() {
        let temp = TempDir::new().unwrap();
        let a = write(&temp, "a.csv", "id,d0\nP1,0.1\n");
        let b = write(&temp, "b.csv", "id,d0\nP1,0.9\n");

        let err = DescriptorTable::load(&[a, b]).unwrap_err();
        assert!(matches!(err, TrainingError::DuplicateKey { ref key, .. } if key == "P1"));
    }

    #[test]
    fn test_duplicate_within_file_is_rejected() {
        let temp = TempDir::new().unwrap();
        let a = write(&temp, "a.csv", "id,d0\nP1,0.1\nP1,0.2\n");
        assert!(matches!(DescriptorTable::load(&[a]), Err(TrainingError::DuplicateKey { .. })));
    }

    #[test]
    fn test_width_mismatch_is_rejected() {
        let temp = TempDir::new().unwrap();
        let a = write(&temp, "a.csv", "id,d0,d1\nP1,0.1,0.2\n");
        let b = write(&temp, "b.csv", "id,d0\nP2,0.1\n");
        assert!(matches!(DescriptorTable::load(&[a, b]), Err(TrainingError::Descriptor(_))));
    }
}
