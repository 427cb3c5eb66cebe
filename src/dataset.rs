//! The published dataset: a JSON array of records keyed by their `id` field.

use crate::json_utils::{read_json_value, write_json_atomic, StoreError};
use crate::models::Record;
use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Previous run's dataset, indexed by external id.
///
/// Rows sharing an id (a legacy anomaly) are kept in file order under that id;
/// nothing here collapses them.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    rows_by_id: BTreeMap<String, Vec<Record>>,
    raw_len: usize,
}

impl Dataset {
    /// Index loaded rows. Non-object items and rows without an `id` count toward
    /// the previous size but cannot be tracked across runs.
    pub fn from_rows(rows: Vec<Value>) -> Self {
        let raw_len = rows.len();
        let mut rows_by_id: BTreeMap<String, Vec<Record>> = BTreeMap::new();
        let mut untracked = 0usize;

        for row in rows {
            let Value::Object(record) = row else {
                untracked += 1;
                continue;
            };
            match record_id(&record) {
                Some(id) => rows_by_id.entry(id).or_default().push(record),
                None => untracked += 1,
            }
        }

        if untracked > 0 {
            tracing::warn!("Ignoring {} dataset rows without a usable id", untracked);
        }

        Self { rows_by_id, raw_len }
    }

    /// Number of items in the file as loaded (the drop-guard baseline).
    pub fn len(&self) -> usize {
        self.raw_len
    }

    pub fn is_empty(&self) -> bool {
        self.raw_len == 0
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rows_by_id.contains_key(id)
    }

    /// The canonical row for `id` (first in file order).
    pub fn first(&self, id: &str) -> Option<&Record> {
        self.rows_by_id.get(id).and_then(|rows| rows.first())
    }

    pub fn rows(&self, id: &str) -> &[Record] {
        self.rows_by_id.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `(id, rows)` pairs in id order.
    pub fn groups(&self) -> impl Iterator<Item = (&str, &[Record])> {
        self.rows_by_id
            .iter()
            .map(|(id, rows)| (id.as_str(), rows.as_slice()))
    }
}

/// `id` as a string; numeric ids are accepted and stringified.
pub fn record_id(record: &Record) -> Option<String> {
    match record.get("id") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

/// Display ordering for the published file: `(lowercase name, lowercase id)`.
pub fn sort_for_display(records: &mut [Record]) {
    records.sort_by_cached_key(|record| (lower_field(record, "name"), lower_field(record, "id")));
}

fn lower_field(record: &Record, key: &str) -> String {
    match record.get(key) {
        Some(Value::String(s)) => s.to_lowercase(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string().to_lowercase(),
    }
}

/// Owns the dataset file for the duration of a run.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    path: PathBuf,
}

impl DatasetStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file means an empty dataset; anything other than an array is fatal.
    pub fn load(&self) -> Result<Dataset, StoreError> {
        match read_json_value(&self.path)? {
            None => Ok(Dataset::default()),
            Some(Value::Array(rows)) => Ok(Dataset::from_rows(rows)),
            Some(_) => Err(StoreError::Shape {
                path: self.path.clone(),
                msg: "expected a JSON array of records".to_string(),
            }),
        }
    }

    pub fn load_raw(&self) -> Result<Vec<Value>, StoreError> {
        match read_json_value(&self.path)? {
            None => Ok(Vec::new()),
            Some(Value::Array(rows)) => Ok(rows),
            Some(_) => Err(StoreError::Shape {
                path: self.path.clone(),
                msg: "expected a JSON array of records".to_string(),
            }),
        }
    }

    /// Write rows (records or raw JSON values) as a pretty-printed array.
    pub fn save<T: Serialize>(&self, rows: &[T]) -> Result<(), StoreError> {
        write_json_atomic(&self.path, rows)
    }
}
