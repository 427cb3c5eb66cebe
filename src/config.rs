// Global configuration constants - single source of truth

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

pub struct Config;

impl Config {
    // Source
    pub const SITEMAP_INDEX_URL: &'static str = "https://medicament.ma/wp-sitemap.xml";
    pub const SITEMAP_FILTER: &'static str = "posts-medicament";
    pub const USER_AGENT: &'static str =
        "PharmaDW-Medicaments-Updater/1.0 (+https://github.com/MokokAf/PharmaDW)";

    // Files inside the data directory
    pub const DATASET_FILE: &'static str = "medicament_ma_optimized.json";
    pub const STATE_FILE: &'static str = "medicament_ma_state.json";

    // HTTP/Network config
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;
    pub const MAX_ATTEMPTS: u32 = 3;
    pub const RETRY_BASE_DELAY_MS: u64 = 1000;
    pub const RETRY_MAX_DELAY_MS: u64 = 30_000;
    pub const MAX_CONTENT_SIZE: usize = 10 * 1024 * 1024; // 10MB

    // Pacing
    pub const DEFAULT_REQUEST_DELAY_SECS: f64 = 0.35;
    pub const DEFAULT_REQUEST_JITTER_SECS: f64 = 0.08;
    pub const DEFAULT_CONCURRENCY: usize = 1;

    // Retention
    pub const MISSING_GRACE_RUNS: u32 = 3;
    pub const ABSENT_GRACE_RUNS: u32 = 7;
    pub const DROP_GUARD_RATIO: f64 = 0.30;

    // Progress logging cadence (completed fetches)
    pub const PROGRESS_INTERVAL: usize = 100;
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("--request-delay must be a finite value >= 0 (got {0})")]
    InvalidDelay(f64),

    #[error("--request-jitter must be a finite value >= 0 (got {0})")]
    InvalidJitter(f64),

    #[error("--concurrency must be >= 1")]
    InvalidConcurrency,

    #[error("--timeout must be >= 1 second")]
    InvalidTimeout,

    #[error("fetch attempts must be >= 1")]
    InvalidAttempts,

    #[error("drop guard threshold must be within (0, 1] (got {0})")]
    InvalidDropThreshold(f64),

    #[error("grace periods must be at least one run")]
    InvalidGracePeriod,
}

/// Everything one update run needs, built once and handed to each component.
#[derive(Debug, Clone)]
pub struct UpdateConfig {
    pub data_dir: PathBuf,
    pub sitemap_index_url: String,
    /// Only sub-sitemaps whose location contains this marker are read
    pub sitemap_filter: String,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub request_delay_secs: f64,
    pub request_jitter_secs: f64,
    pub concurrency: usize,
    pub full_refresh: bool,
    pub force_accept_drop: bool,
    pub dry_run: bool,
    pub limit: Option<usize>,
    pub drop_guard_ratio: f64,
    pub missing_grace_runs: u32,
    pub absent_grace_runs: u32,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./public/data"),
            sitemap_index_url: Config::SITEMAP_INDEX_URL.to_string(),
            sitemap_filter: Config::SITEMAP_FILTER.to_string(),
            user_agent: Config::USER_AGENT.to_string(),
            timeout_secs: Config::REQUEST_TIMEOUT_SECS,
            max_attempts: Config::MAX_ATTEMPTS,
            retry_base_delay_ms: Config::RETRY_BASE_DELAY_MS,
            request_delay_secs: Config::DEFAULT_REQUEST_DELAY_SECS,
            request_jitter_secs: Config::DEFAULT_REQUEST_JITTER_SECS,
            concurrency: Config::DEFAULT_CONCURRENCY,
            full_refresh: false,
            force_accept_drop: false,
            dry_run: false,
            limit: None,
            drop_guard_ratio: Config::DROP_GUARD_RATIO,
            missing_grace_runs: Config::MISSING_GRACE_RUNS,
            absent_grace_runs: Config::ABSENT_GRACE_RUNS,
        }
    }
}

impl UpdateConfig {
    /// Reject contradictory or out-of-range parameters before any I/O happens.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.request_delay_secs.is_finite() || self.request_delay_secs < 0.0 {
            return Err(ConfigError::InvalidDelay(self.request_delay_secs));
        }
        if !self.request_jitter_secs.is_finite() || self.request_jitter_secs < 0.0 {
            return Err(ConfigError::InvalidJitter(self.request_jitter_secs));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidConcurrency);
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidTimeout);
        }
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidAttempts);
        }
        if !(self.drop_guard_ratio > 0.0 && self.drop_guard_ratio <= 1.0) {
            return Err(ConfigError::InvalidDropThreshold(self.drop_guard_ratio));
        }
        if self.missing_grace_runs == 0 || self.absent_grace_runs == 0 {
            return Err(ConfigError::InvalidGracePeriod);
        }
        Ok(())
    }

    pub fn dataset_path(&self) -> PathBuf {
        self.data_dir.join(Config::DATASET_FILE)
    }

    pub fn state_path(&self) -> PathBuf {
        self.data_dir.join(Config::STATE_FILE)
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_secs_f64(self.request_delay_secs)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_secs_f64(self.request_jitter_secs)
    }
}
