use crate::backoff::ExponentialBackoff;
use crate::config::{Config, UpdateConfig};
use std::time::Duration;
use tokio::time::timeout;

/// HTTP client shared by sitemap discovery and page fetching.
///
/// Any HTTP status is a successful fetch here; deciding what a 404 means is
/// left to the caller. Only transport-level failures are retried.
#[derive(Debug)]
pub struct HttpClient {
    client: reqwest::Client,
    timeout_duration: Duration,
    user_agent: String,
    max_attempts: u32,
    backoff: ExponentialBackoff,
    max_content_size: usize,
}

impl HttpClient {
    pub fn new(config: &UpdateConfig) -> Result<Self, FetchError> {
        let timeout_duration = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .user_agent(&config.user_agent)
            .timeout(timeout_duration)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(8)
            .pool_idle_timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            timeout_duration,
            user_agent: config.user_agent.clone(),
            max_attempts: config.max_attempts.max(1),
            backoff: ExponentialBackoff::from_config(config).with_jitter(10),
            max_content_size: Config::MAX_CONTENT_SIZE,
        })
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Fetch a URL, retrying transient failures with exponential backoff.
    pub async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
        let mut attempt = 1;
        loop {
            match self.fetch_once(url).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let wait = self.backoff.delay(attempt - 1);
                    tracing::warn!(
                        "GET failed ({}) for {}, retry {}/{} in {:?}",
                        e,
                        url,
                        attempt,
                        self.max_attempts - 1,
                        wait
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<FetchResult, FetchError> {
        let response = timeout(
            self.timeout_duration,
            self.client
                .get(url)
                .header(
                    "Accept",
                    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
                )
                .header("Accept-Language", "fr,en;q=0.5")
                .send(),
        )
        .await
        .map_err(|_| FetchError::Timeout)?
        .map_err(Self::classify_error)?;

        let status_code = response.status().as_u16();

        if let Some(length) = response.content_length() {
            let length = usize::try_from(length).unwrap_or(usize::MAX);
            if length > self.max_content_size {
                return Err(FetchError::ContentTooLarge(length, self.max_content_size));
            }
        }

        let content = timeout(self.timeout_duration, response.text())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(|e| FetchError::Body(e.to_string()))?;

        if content.len() > self.max_content_size {
            return Err(FetchError::ContentTooLarge(content.len(), self.max_content_size));
        }

        Ok(FetchResult {
            content,
            status_code,
        })
    }

    fn classify_error(error: reqwest::Error) -> FetchError {
        if error.is_builder() {
            return FetchError::InvalidUrl(error.to_string());
        }
        if error.is_timeout() {
            return FetchError::Timeout;
        }
        FetchError::Network(error.to_string())
    }
}

/// Result of a completed HTTP exchange
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub content: String,
    pub status_code: u16,
}

impl FetchResult {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Errors that can occur during HTTP fetching
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP client setup failed: {0}")]
    Client(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout")]
    Timeout,

    #[error("Failed to read response body: {0}")]
    Body(String),

    #[error("Content too large: {0} bytes (max: {1} bytes)")]
    ContentTooLarge(usize, usize),
}

impl FetchError {
    /// Transport hiccups are worth another attempt; malformed requests are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::Timeout | FetchError::Body(_) => true,
            FetchError::Client(_) | FetchError::InvalidUrl(_) | FetchError::ContentTooLarge(_, _) => false,
        }
    }
}
