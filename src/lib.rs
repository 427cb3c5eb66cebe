pub mod backoff;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod discovery;
pub mod drop_guard;
pub mod fetcher;
pub mod json_utils;
pub mod logging;
pub mod models;
pub mod network;
pub mod normalizer;
pub mod orchestration;
pub mod parser;
pub mod rate_limiter;
pub mod reconcile;
pub mod scheduler;
pub mod sitemap_reader;
pub mod state;
pub mod text;
pub mod therapeutic;

// Re-export main types for library usage
pub use config::{Config, ConfigError, UpdateConfig};
pub use dataset::{Dataset, DatasetStore};
pub use discovery::{Discovery, DiscoveryError, DiscoveryResult};
pub use drop_guard::{DropGuard, DropGuardTripped};
pub use fetcher::{EntityFetcher, MedicamentFetcher};
pub use models::{Entity, EntityState, EntityStatus, FetchOutcome, Record, RunStats};
pub use network::{FetchError, FetchResult, HttpClient};
pub use orchestration::{run_update, RunReport, UpdateError};
pub use rate_limiter::RateLimiter;
pub use reconcile::{Reconciliation, ReconciliationEngine};
pub use scheduler::{FetchPlan, FetchScheduler, PlanOptions};
pub use sitemap_reader::{SitemapReader, SitemapSource};
pub use state::{EntityStateStore, StateDocument, StateRecords};
