use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// One dataset row. The core only looks at its `id` (and `name` for ordering);
/// every other field belongs to the normalizer.
pub type Record = serde_json::Map<String, Value>;

/// A catalog item discovered in the sitemap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    /// Stable identifier extracted from the URL (the page slug)
    pub external_id: String,

    /// Detail page URL
    pub url: String,

    /// Raw `<lastmod>` value; only ever compared as a string
    pub last_modified: Option<String>,
}

impl Entity {
    pub fn new(external_id: impl Into<String>, url: impl Into<String>, last_modified: Option<String>) -> Self {
        Self {
            external_id: external_id.into(),
            url: url.into(),
            last_modified,
        }
    }
}

/// Lifecycle status persisted per entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityStatus {
    Ok,
    Missing,
    Absent,
    Error,
    /// Written by older tooling for rows that were never fetched
    Unknown,
}

impl EntityStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityStatus::Ok => "ok",
            EntityStatus::Missing => "missing",
            EntityStatus::Absent => "absent",
            EntityStatus::Error => "error",
            EntityStatus::Unknown => "unknown",
        }
    }

    fn from_label(label: &str) -> Self {
        match label {
            "ok" => EntityStatus::Ok,
            "missing" => EntityStatus::Missing,
            "absent" => EntityStatus::Absent,
            "error" => EntityStatus::Error,
            _ => EntityStatus::Unknown,
        }
    }
}

impl Default for EntityStatus {
    fn default() -> Self {
        EntityStatus::Unknown
    }
}

impl std::fmt::Display for EntityStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EntityStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = Option::<String>::deserialize(deserializer)?;
        Ok(label.as_deref().map(EntityStatus::from_label).unwrap_or_default())
    }
}

/// Per-entity lifecycle record kept in the state store.
///
/// Every field has an explicit default so state files written by older
/// versions (or by hand) load without surprises: absent counters are 0,
/// absent status is `unknown`, absent timestamps stay `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityState {
    #[serde(default)]
    pub external_id: String,

    #[serde(default)]
    pub url: String,

    #[serde(rename = "lastmod", default)]
    pub last_modified: Option<String>,

    #[serde(default)]
    pub status: EntityStatus,

    /// Consecutive runs the page answered "not found" while still listed
    #[serde(default, deserialize_with = "lenient_count")]
    pub missing_streak: u32,

    /// Consecutive runs the entity was no longer listed in the sitemap
    #[serde(default, deserialize_with = "lenient_count")]
    pub absent_streak: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen_at: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fetched_at: Option<String>,

    #[serde(default)]
    pub last_message: String,
}

impl EntityState {
    /// Fresh state for a first-seen entity.
    pub fn new(entity: &Entity) -> Self {
        Self {
            external_id: entity.external_id.clone(),
            url: entity.url.clone(),
            last_modified: entity.last_modified.clone(),
            status: EntityStatus::Unknown,
            missing_streak: 0,
            absent_streak: 0,
            last_seen_at: None,
            last_fetched_at: None,
            last_message: String::new(),
        }
    }

    /// Copy the discovery-side fields of `entity` into this state.
    pub fn observe(&mut self, entity: &Entity, now: &str) {
        self.external_id = entity.external_id.clone();
        self.url = entity.url.clone();
        self.last_modified = entity.last_modified.clone();
        self.last_seen_at = Some(now.to_string());
    }
}

// Older state files sometimes carry `null` or floats for counters.
fn lenient_count<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .map(|n| u32::try_from(n).unwrap_or(u32::MAX))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    })
}

/// Classified result of fetching one entity page.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Page parsed into a record
    Ok(Record),
    /// The source explicitly reported the page as gone
    Missing { message: String },
    /// Transport or parse failure; says nothing about existence
    Error { message: String },
}

impl FetchOutcome {
    pub fn missing(message: impl Into<String>) -> Self {
        FetchOutcome::Missing { message: message.into() }
    }

    pub fn error(message: impl Into<String>) -> Self {
        FetchOutcome::Error { message: message.into() }
    }

    pub fn status(&self) -> EntityStatus {
        match self {
            FetchOutcome::Ok(_) => EntityStatus::Ok,
            FetchOutcome::Missing { .. } => EntityStatus::Missing,
            FetchOutcome::Error { .. } => EntityStatus::Error,
        }
    }
}

/// Counters for one run, persisted alongside the state records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunStats {
    pub previous_count: usize,
    pub new_count: usize,
    pub delta: i64,
    pub reused_unchanged: usize,
    pub fetched_ok: usize,
    pub fetched_missing: usize,
    pub fetched_error: usize,
    pub retained_absent: usize,
    pub retained_duplicate_rows: usize,
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "prev={} new={} delta={:+} | reused={} | fetched ok={} missing={} error={} | retained absent={}",
            self.previous_count,
            self.new_count,
            self.delta,
            self.reused_unchanged,
            self.fetched_ok,
            self.fetched_missing,
            self.fetched_error,
            self.retained_absent,
        )
    }
}
