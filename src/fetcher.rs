//! The per-entity fetch capability and its medicament.ma implementation.

use crate::models::{Entity, FetchOutcome};
use crate::network::HttpClient;
use crate::normalizer::normalize_fields;
use crate::parser::{parse_medicament_page, ParsedPage};
use async_trait::async_trait;
use std::sync::Arc;

/// Fetch one entity and classify the result.
///
/// Implementations never fail: transport and parse problems come back as
/// [`FetchOutcome::Error`], an explicit "gone" signal as [`FetchOutcome::Missing`].
/// Pacing is the caller's job.
#[async_trait]
pub trait EntityFetcher: Send + Sync {
    async fn fetch_entity(&self, entity: &Entity) -> FetchOutcome;
}

pub struct MedicamentFetcher {
    http: Arc<HttpClient>,
}

impl MedicamentFetcher {
    pub fn new(http: Arc<HttpClient>) -> Self {
        Self { http }
    }
}

#[async_trait]
impl EntityFetcher for MedicamentFetcher {
    async fn fetch_entity(&self, entity: &Entity) -> FetchOutcome {
        let response = match self.http.fetch(&entity.url).await {
            Ok(response) => response,
            Err(e) => return FetchOutcome::error(format!("request failed: {}", e)),
        };

        if response.status_code >= 400 {
            return FetchOutcome::missing(format!("http {}", response.status_code));
        }

        classify_page(entity, &response.content, &today())
    }
}

/// Turn a fetched detail page into an outcome. `today` backs `updatedAt`
/// for pages without an update notice.
pub fn classify_page(entity: &Entity, html: &str, today: &str) -> FetchOutcome {
    match parse_medicament_page(html) {
        ParsedPage::NotFound => FetchOutcome::missing("not found marker"),
        ParsedPage::Invalid(message) => FetchOutcome::error(message),
        ParsedPage::Page(page) => FetchOutcome::Ok(normalize_fields(entity, &page, today)),
    }
}

fn today() -> String {
    chrono::Local::now().date_naive().format("%Y-%m-%d").to_string()
}
