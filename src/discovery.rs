//! Trait implemented by entity sources so the update pipeline does not care where entities come from.

use crate::models::Entity;
use crate::network::FetchError;
use async_trait::async_trait;
use thiserror::Error;

/// Any failure here aborts the run before a single page is fetched.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("transport failure reading {url}: {source}")]
    Transport {
        url: String,
        #[source]
        source: FetchError,
    },

    #[error("{url} answered HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("malformed sitemap {url}: {message}")]
    Parse { url: String, message: String },
}

/// One complete discovery pass.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryResult {
    /// Deduplicated by external id, sorted by external id
    pub entities: Vec<Entity>,

    /// Number of sub-sitemaps read
    pub sitemap_count: usize,
}

#[async_trait]
pub trait Discovery: Send + Sync {
    /// Enumerate the full current universe of entities. Partial results are never returned.
    async fn discover(&self) -> Result<DiscoveryResult, DiscoveryError>;

    /// Human-readable source name for logs.
    fn name(&self) -> &str;
}

/// Collapse entries sharing an external id, keeping the greatest `last_modified`.
///
/// A missing `last_modified` loses every comparison; on a tie the first entry wins.
pub fn dedup_entities(entities: impl IntoIterator<Item = Entity>) -> Vec<Entity> {
    let mut by_id: std::collections::BTreeMap<String, Entity> = std::collections::BTreeMap::new();

    for entity in entities {
        match by_id.get(&entity.external_id) {
            Some(prev) if lastmod_key(&entity) <= lastmod_key(prev) => {}
            _ => {
                by_id.insert(entity.external_id.clone(), entity);
            }
        }
    }

    by_id.into_values().collect()
}

fn lastmod_key(entity: &Entity) -> &str {
    entity.last_modified.as_deref().unwrap_or("")
}
