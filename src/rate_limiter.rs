//! Minimum spacing between request starts, shared by every fetch worker.

use crate::config::UpdateConfig;
use parking_lot::Mutex;
use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

/// Grants request slots at least `min_interval` (± jitter) apart.
///
/// The next-allowed instant is computed and advanced inside one critical
/// section, so N concurrent callers still start at most one request per
/// interval on average. The lock is never held across an await.
#[derive(Debug)]
pub struct RateLimiter {
    min_interval: Duration,
    jitter: Duration,
    next_allowed: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration, jitter: Duration) -> Self {
        Self {
            min_interval,
            jitter,
            next_allowed: Mutex::new(None),
        }
    }

    pub fn from_config(config: &UpdateConfig) -> Self {
        Self::new(config.min_interval(), config.jitter())
    }

    /// Wait for this caller's slot.
    pub async fn wait(&self) {
        let slot = self.reserve_slot();
        tokio::time::sleep_until(slot).await;
    }

    fn reserve_slot(&self) -> Instant {
        let mut next_allowed = self.next_allowed.lock();
        let now = Instant::now();
        let slot = match *next_allowed {
            Some(next) if next > now => next,
            _ => now,
        };
        *next_allowed = Some(slot + self.next_interval());
        slot
    }

    fn next_interval(&self) -> Duration {
        if self.jitter.is_zero() {
            return self.min_interval;
        }
        let jitter = self.jitter.as_secs_f64();
        let offset = rand::thread_rng().gen_range(-jitter..=jitter);
        Duration::from_secs_f64((self.min_interval.as_secs_f64() + offset).max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_first_slot_is_immediate() {
        let limiter = RateLimiter::new(Duration::from_secs(5), Duration::ZERO);
        let start = Instant::now();
        limiter.wait().await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sequential_spacing() {
        let limiter = RateLimiter::new(Duration::from_millis(500), Duration::ZERO);
        let start = Instant::now();
        for _ in 0..5 {
            limiter.wait().await;
        }
        assert!(start.elapsed() >= Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_clock() {
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(500), Duration::ZERO));
        let starts = Arc::new(Mutex::new(Vec::new()));

        let mut workers = tokio::task::JoinSet::new();
        for _ in 0..4 {
            let limiter = Arc::clone(&limiter);
            let starts = Arc::clone(&starts);
            workers.spawn(async move {
                for _ in 0..5 {
                    limiter.wait().await;
                    starts.lock().push(Instant::now());
                }
            });
        }
        while workers.join_next().await.is_some() {}

        let mut starts = starts.lock().clone();
        starts.sort();
        assert_eq!(starts.len(), 20);
        let span = *starts.last().unwrap() - *starts.first().unwrap();
        assert!(span >= Duration::from_millis(19 * 500), "span was {:?}", span);
    }

    #[test]
    fn test_jitter_never_negative() {
        let limiter = RateLimiter::new(Duration::from_millis(10), Duration::from_millis(50));
        for _ in 0..200 {
            let interval = limiter.next_interval();
            assert!(interval <= Duration::from_millis(60));
        }
    }

    #[test]
    fn test_jitter_window() {
        let limiter = RateLimiter::new(Duration::from_millis(350), Duration::from_millis(80));
        for _ in 0..200 {
            let interval = limiter.next_interval();
            assert!(interval >= Duration::from_millis(269) && interval <= Duration::from_millis(431));
        }
    }
}
