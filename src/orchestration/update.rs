//! The `update` run: discover, plan, fetch, reconcile, guard, persist.

use crate::cli::UpdateArgs;
use crate::config::{ConfigError, UpdateConfig};
use crate::dataset::DatasetStore;
use crate::discovery::{Discovery, DiscoveryError};
use crate::drop_guard::{DropGuard, DropGuardTripped};
use crate::fetcher::{EntityFetcher, MedicamentFetcher};
use crate::json_utils::StoreError;
use crate::models::RunStats;
use crate::network::{FetchError, HttpClient};
use crate::rate_limiter::RateLimiter;
use crate::reconcile::ReconciliationEngine;
use crate::scheduler::{FetchPlan, FetchScheduler, PlanOptions};
use crate::sitemap_reader::SitemapReader;
use crate::state::{EntityStateStore, StateDocument};
use std::sync::Arc;
use thiserror::Error;

use super::config::build_update_config;

#[derive(Error, Debug)]
pub enum UpdateError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("HTTP client setup failed: {0}")]
    Client(#[from] FetchError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Sitemap discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("Drop guard triggered: {0}")]
    DropGuard(#[from] DropGuardTripped),
}

impl UpdateError {
    /// Process exit code for this failure (2 is reserved for CLI usage errors).
    pub fn exit_code(&self) -> u8 {
        match self {
            UpdateError::Config(_) | UpdateError::Client(_) | UpdateError::Store(_) => 3,
            UpdateError::Discovery(_) => 4,
            UpdateError::DropGuard(_) => 5,
        }
    }
}

/// What one update run did.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub stats: RunStats,
    pub sitemap_count: usize,
    pub discovered: usize,
    pub fetched: usize,
    pub bootstrap: bool,
    /// False for dry runs
    pub written: bool,
}

/// Run one update against arbitrary discovery and fetch implementations.
///
/// Nothing is written unless every step up to and including the drop guard
/// succeeded; a failure at any point leaves both files as they were.
pub async fn run_update(
    config: &UpdateConfig,
    discovery: &dyn Discovery,
    fetcher: Arc<dyn EntityFetcher>,
) -> Result<RunReport, UpdateError> {
    config.validate()?;
    tracing::info!(
        "Rate limit configured: delay={:.3}s jitter={:.3}s concurrency={}",
        config.request_delay_secs,
        config.request_jitter_secs,
        config.concurrency
    );

    let dataset_store = DatasetStore::new(config.dataset_path());
    let state_store = EntityStateStore::new(config.state_path());
    let dataset = dataset_store.load()?;
    let prior_states = state_store.load();

    let discovered = discovery.discover().await.map_err(|e| {
        tracing::error!("Cannot read sitemaps from {}: {}", discovery.name(), e);
        e
    })?;
    let sitemap_count = discovered.sitemap_count;
    let mut entities = discovered.entities;
    // A truncated universe would mark everything past the limit as absent.
    let mut dry_run = config.dry_run;
    if let Some(limit) = config.limit {
        entities.truncate(limit);
        tracing::info!("Limit enabled: processing first {} entries", entities.len());
        if !dry_run {
            tracing::warn!("Limit set without dry-run; nothing will be written");
            dry_run = true;
        }
    }
    tracing::info!(
        "Discovered {} medicament URLs from {} sitemap files",
        entities.len(),
        sitemap_count
    );

    let bootstrap = prior_states.is_empty() && !config.full_refresh;
    if bootstrap {
        tracing::info!("No state file detected: bootstrap mode, reusing existing local records where possible");
    }

    let options = PlanOptions {
        full_refresh: config.full_refresh,
        bootstrap,
    };
    let plan = FetchPlan::build(&entities, &prior_states, &dataset, options);

    let limiter = Arc::new(RateLimiter::from_config(config));
    let scheduler = FetchScheduler::new(fetcher, limiter, config.concurrency);
    let outcomes = scheduler.execute(plan.fetch.clone()).await;
    let fetched = outcomes.len();

    let now = now_iso();
    let engine = ReconciliationEngine::from_config(config);
    let result = engine.reconcile(&plan, outcomes, &prior_states, &dataset, &now);

    tracing::info!("Summary: {}", result.stats);
    if result.stats.retained_duplicate_rows > 0 {
        tracing::info!("Preserved {} duplicate legacy rows", result.stats.retained_duplicate_rows);
    }

    DropGuard::new(config.drop_guard_ratio, config.force_accept_drop)
        .check(result.stats.previous_count, result.stats.new_count)
        .map_err(|e| {
            tracing::error!("{}", e);
            e
        })?;

    let mut report = RunReport {
        stats: result.stats.clone(),
        sitemap_count,
        discovered: entities.len(),
        fetched,
        bootstrap,
        written: false,
    };

    if dry_run {
        tracing::info!("Dry-run: no files were written");
        return Ok(report);
    }

    dataset_store.save(&result.records)?;
    state_store.save(&StateDocument {
        source: config.sitemap_index_url.clone(),
        generated_at: now,
        request_delay_sec: config.request_delay_secs,
        request_jitter_sec: config.request_jitter_secs,
        total_sitemaps: sitemap_count,
        total_discovered: entities.len(),
        total_records: result.stats.new_count,
        stats: result.stats,
        records: result.states,
    })?;
    tracing::info!(
        "Wrote {} and {}",
        dataset_store.path().display(),
        state_store.path().display()
    );

    report.written = true;
    Ok(report)
}

/// `update` subcommand: wire the live sitemap reader and page fetcher.
pub async fn run_update_command(args: &UpdateArgs) -> Result<RunReport, UpdateError> {
    let config = build_update_config(args);
    config.validate()?;

    let http = Arc::new(HttpClient::new(&config)?);
    let reader = SitemapReader::new(Arc::clone(&http), &config);
    let fetcher: Arc<dyn EntityFetcher> = Arc::new(MedicamentFetcher::new(http));

    run_update(&config, &reader, fetcher).await
}

fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
