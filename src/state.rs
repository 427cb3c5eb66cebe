use crate::json_utils::{read_json_value, write_json_atomic, StoreError};
use crate::models::{EntityState, RunStats};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Per-entity lifecycle records keyed by external id.
pub type StateRecords = BTreeMap<String, EntityState>;

/// On-disk state document: run-level summary plus every entity ever seen.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StateDocument {
    pub source: String,
    pub generated_at: String,
    pub request_delay_sec: f64,
    pub request_jitter_sec: f64,
    pub total_sitemaps: usize,
    pub total_discovered: usize,
    pub total_records: usize,
    pub stats: RunStats,
    pub records: StateRecords,
}

/// Owns the state file for the duration of a run.
#[derive(Debug, Clone)]
pub struct EntityStateStore {
    path: PathBuf,
}

impl EntityStateStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the entity records.
    ///
    /// The state file is advisory: an unreadable or malformed file is logged
    /// and treated as absent (which puts the run in bootstrap mode), and
    /// individual malformed entries are skipped.
    pub fn load(&self) -> StateRecords {
        let document = match read_json_value(&self.path) {
            Ok(Some(document)) => document,
            Ok(None) => return StateRecords::new(),
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", self.path.display(), e);
                return StateRecords::new();
            }
        };

        let Some(Value::Object(records)) = document.get("records") else {
            tracing::warn!("{} has no records object; starting from empty state", self.path.display());
            return StateRecords::new();
        };

        let mut states = StateRecords::new();
        for (id, raw) in records {
            match serde_json::from_value::<EntityState>(raw.clone()) {
                Ok(mut state) => {
                    state.external_id = id.clone();
                    states.insert(id.clone(), state);
                }
                Err(e) => tracing::warn!("Skipping malformed state entry {}: {}", id, e),
            }
        }
        states
    }

    pub fn save(&self, document: &StateDocument) -> Result<(), StoreError> {
        write_json_atomic(&self.path, document)
    }
}
