//! `normalize-classes`: re-apply therapeutic class cleanup to the published dataset.

use crate::config::Config;
use crate::dataset::DatasetStore;
use crate::therapeutic::normalize_therapeutic_classes;
use serde_json::Value;
use std::collections::BTreeSet;
use std::path::Path;

use super::update::UpdateError;

const FIELD: &str = "therapeuticClass";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizeReport {
    pub processed: usize,
    pub modified: usize,
    pub unique_before: usize,
    pub unique_after: usize,
}

impl std::fmt::Display for NormalizeReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Processed {} drugs, modified {} | unique classes: {} -> {}",
            self.processed, self.modified, self.unique_before, self.unique_after
        )
    }
}

/// Normalize `therapeuticClass` on every row of the dataset under `data_dir`.
///
/// The field may be a string or a list; it is rewritten as a list, or removed
/// when nothing survives cleanup. Duplicate rows are left as they are.
pub fn run_normalize_classes_command(data_dir: &Path, dry_run: bool) -> Result<NormalizeReport, UpdateError> {
    let store = DatasetStore::new(data_dir.join(Config::DATASET_FILE));
    let mut rows = store.load_raw()?;
    let report = normalize_rows(&mut rows);

    tracing::info!("{}", report);
    if report.unique_before >= report.unique_after {
        tracing::info!(
            "Removed {} duplicate/junk class labels",
            report.unique_before - report.unique_after
        );
    }

    if dry_run {
        tracing::info!("Dry-run: {} was not rewritten", store.path().display());
    } else if report.modified > 0 {
        store.save(&rows)?;
        tracing::info!("Wrote {}", store.path().display());
    }

    Ok(report)
}

fn normalize_rows(rows: &mut [Value]) -> NormalizeReport {
    let mut report = NormalizeReport {
        processed: rows.len(),
        ..NormalizeReport::default()
    };
    let mut before = BTreeSet::new();
    let mut after = BTreeSet::new();

    for row in rows.iter_mut() {
        let Value::Object(record) = row else {
            continue;
        };
        let Some(current) = record.get(FIELD) else {
            continue;
        };

        let labels: Vec<String> = match current {
            Value::String(s) => vec![s.clone()],
            Value::Array(items) => items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
            _ => Vec::new(),
        };
        before.extend(labels.iter().cloned());

        let cleaned = normalize_therapeutic_classes(&labels);
        after.extend(cleaned.iter().cloned());

        let replacement = (!cleaned.is_empty()).then(|| Value::from(cleaned));
        if replacement.as_ref() != Some(current) {
            report.modified += 1;
            match replacement {
                Some(value) => {
                    record.insert(FIELD.to_string(), value);
                }
                None => {
                    record.remove(FIELD);
                }
            }
        }
    }

    report.unique_before = before.len();
    report.unique_after = after.len();
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_normalize_rows() {
        let mut rows = vec![
            json!({"id": "a", "therapeuticClass": ["antidepresseur", "Antidépresseur"]}),
            json!({"id": "b", "therapeuticClass": "Antibiotique"}),
            json!({"id": "c", "therapeuticClass": ["Antibiotique"]}),
            json!({"id": "d", "therapeuticClass": ["3400936123"]}),
            json!({"id": "e"}),
        ];
        let report = normalize_rows(&mut rows);

        assert_eq!(report.processed, 5);
        assert_eq!(report.modified, 3);
        assert_eq!(report.unique_before, 4);
        assert_eq!(report.unique_after, 2);
        assert_eq!(rows[0]["therapeuticClass"], json!(["Antidépresseur"]));
        assert_eq!(rows[1]["therapeuticClass"], json!(["Antibiotique"]));
        assert!(rows[3].get("therapeuticClass").is_none());
    }

    #[test]
    fn test_command_rewrites_dataset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(Config::DATASET_FILE);
        std::fs::write(&path, r#"[{"id": "a", "name": "A", "therapeuticClass": "anxolytique"}]"#).unwrap();

        let report = run_normalize_classes_command(dir.path(), false).unwrap();
        assert_eq!(report.modified, 1);

        let written: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written[0]["therapeuticClass"], json!(["Anxiolytique"]));
        assert_eq!(written[0]["name"], "A");
    }

    #[test]
    fn test_dry_run_leaves_file_alone() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(Config::DATASET_FILE);
        let original = r#"[{"id": "a", "therapeuticClass": "anxolytique"}]"#;
        std::fs::write(&path, original).unwrap();

        let report = run_normalize_classes_command(dir.path(), true).unwrap();
        assert_eq!(report.modified, 1);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn test_non_array_dataset_is_an_error() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join(Config::DATASET_FILE), "{}").unwrap();
        let err = run_normalize_classes_command(dir.path(), false).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
