//! Fetch-or-reuse planning and the rate-limited fetch worker pool.

use crate::config::Config;
use crate::dataset::Dataset;
use crate::fetcher::EntityFetcher;
use crate::models::{Entity, EntityState, EntityStatus, FetchOutcome};
use crate::rate_limiter::RateLimiter;
use crate::state::StateRecords;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::JoinSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FetchReason {
    /// Every entity is re-fetched on request
    FullRefresh,
    /// No dataset record exists yet
    New,
    /// Upstream `lastmod` differs from the stored one
    Changed,
    /// Last run ended in a non-ok status
    Retry,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDecision {
    Reuse,
    Fetch(FetchReason),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PlanOptions {
    pub full_refresh: bool,
    /// No state existed at start: trust existing records instead of crawling everything
    pub bootstrap: bool,
}

/// Decide whether `entity` must be fetched this run. First matching rule wins.
pub fn decide(
    entity: &Entity,
    prior: Option<&EntityState>,
    has_record: bool,
    options: PlanOptions,
) -> FetchDecision {
    if options.full_refresh {
        return FetchDecision::Fetch(FetchReason::FullRefresh);
    }
    if !has_record {
        return FetchDecision::Fetch(FetchReason::New);
    }
    if options.bootstrap {
        return FetchDecision::Reuse;
    }

    let stored_lastmod = prior.and_then(|state| state.last_modified.as_deref());
    if stored_lastmod != entity.last_modified.as_deref() {
        return FetchDecision::Fetch(FetchReason::Changed);
    }

    match prior.map(|state| state.status) {
        Some(status) if status != EntityStatus::Ok => FetchDecision::Fetch(FetchReason::Retry),
        _ => FetchDecision::Reuse,
    }
}

/// Discovered entities split by decision, each half in discovery order.
#[derive(Debug, Clone, Default)]
pub struct FetchPlan {
    pub reuse: Vec<Entity>,
    pub fetch: Vec<Entity>,
}

impl FetchPlan {
    pub fn build(entities: &[Entity], states: &StateRecords, dataset: &Dataset, options: PlanOptions) -> Self {
        let mut plan = FetchPlan::default();
        let (mut new, mut changed, mut retry) = (0usize, 0usize, 0usize);

        for entity in entities {
            let prior = states.get(&entity.external_id);
            let has_record = dataset.contains(&entity.external_id);
            match decide(entity, prior, has_record, options) {
                FetchDecision::Reuse => plan.reuse.push(entity.clone()),
                FetchDecision::Fetch(reason) => {
                    tracing::debug!("fetch {} ({:?})", entity.external_id, reason);
                    match reason {
                        FetchReason::New => new += 1,
                        FetchReason::Changed => changed += 1,
                        FetchReason::Retry => retry += 1,
                        FetchReason::FullRefresh => {}
                    }
                    plan.fetch.push(entity.clone());
                }
            }
        }

        tracing::info!(
            "Reusing {} unchanged records, fetching {} (new={} changed={} retry={})",
            plan.reuse.len(),
            plan.fetch.len(),
            new,
            changed,
            retry
        );
        plan
    }
}

/// Runs planned fetches on a bounded pool of workers sharing one rate limiter.
pub struct FetchScheduler {
    fetcher: Arc<dyn EntityFetcher>,
    limiter: Arc<RateLimiter>,
    concurrency: usize,
}

impl FetchScheduler {
    pub fn new(fetcher: Arc<dyn EntityFetcher>, limiter: Arc<RateLimiter>, concurrency: usize) -> Self {
        Self {
            fetcher,
            limiter,
            concurrency: concurrency.max(1),
        }
    }

    /// Fetch every entity and return the outcomes in completion order.
    ///
    /// One entity's failure (even a panic inside the fetcher) never affects
    /// its siblings; it simply comes back as an error outcome.
    pub async fn execute(&self, entities: Vec<Entity>) -> Vec<(Entity, FetchOutcome)> {
        let total = entities.len();
        if total == 0 {
            return Vec::new();
        }
        if self.concurrency > 1 {
            tracing::info!("Parallel fetching enabled: {} workers", self.concurrency);
        }

        let mut pending = entities.into_iter();
        let mut in_flight = JoinSet::new();
        let mut outcomes = Vec::with_capacity(total);

        loop {
            // Fill the worker pool
            while in_flight.len() < self.concurrency {
                let Some(entity) = pending.next() else {
                    break;
                };
                let fetcher = Arc::clone(&self.fetcher);
                let limiter = Arc::clone(&self.limiter);

                in_flight.spawn(async move {
                    limiter.wait().await;
                    let outcome = AssertUnwindSafe(fetcher.fetch_entity(&entity))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| FetchOutcome::error("fetch worker panicked"));
                    (entity, outcome)
                });
            }

            // Collect one completed fetch
            match in_flight.join_next().await {
                Some(Ok((entity, outcome))) => {
                    if let FetchOutcome::Missing { message } | FetchOutcome::Error { message } = &outcome {
                        tracing::warn!("{} -> {}: {}", entity.external_id, outcome.status(), message);
                    }
                    outcomes.push((entity, outcome));
                    if outcomes.len() % Config::PROGRESS_INTERVAL == 0 {
                        tracing::info!("Progress: fetched {}/{}", outcomes.len(), total);
                    }
                }
                Some(Err(e)) => tracing::error!("Fetch task join error: {}", e),
                None => break,
            }
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::time::Duration;
    use tokio::time::Instant;

    fn entity(id: &str, lastmod: Option<&str>) -> Entity {
        Entity::new(id, format!("https://medicament.ma/medicament/{}/", id), lastmod.map(str::to_string))
    }

    fn state(lastmod: Option<&str>, status: EntityStatus) -> EntityState {
        let mut state = EntityState::new(&entity("x", lastmod));
        state.status = status;
        state
    }

    const STEADY: PlanOptions = PlanOptions {
        full_refresh: false,
        bootstrap: false,
    };

    #[test]
    fn test_full_refresh_always_fetches() {
        let options = PlanOptions {
            full_refresh: true,
            bootstrap: true,
        };
        let prior = state(Some("a"), EntityStatus::Ok);
        assert_eq!(
            decide(&entity("x", Some("a")), Some(&prior), true, options),
            FetchDecision::Fetch(FetchReason::FullRefresh)
        );
    }

    #[test]
    fn test_missing_record_always_fetches() {
        let prior = state(Some("a"), EntityStatus::Ok);
        let bootstrap = PlanOptions {
            full_refresh: false,
            bootstrap: true,
        };
        assert_eq!(
            decide(&entity("x", Some("a")), Some(&prior), false, STEADY),
            FetchDecision::Fetch(FetchReason::New)
        );
        assert_eq!(
            decide(&entity("x", None), None, false, bootstrap),
            FetchDecision::Fetch(FetchReason::New)
        );
    }

    #[test]
    fn test_bootstrap_reuses_existing_records() {
        let bootstrap = PlanOptions {
            full_refresh: false,
            bootstrap: true,
        };
        assert_eq!(decide(&entity("x", Some("b")), None, true, bootstrap), FetchDecision::Reuse);
    }

    #[test]
    fn test_changed_lastmod_fetches() {
        let prior = state(Some("2024-01-01"), EntityStatus::Ok);
        assert_eq!(
            decide(&entity("x", Some("2024-02-01")), Some(&prior), true, STEADY),
            FetchDecision::Fetch(FetchReason::Changed)
        );
        assert_eq!(
            decide(&entity("x", None), Some(&prior), true, STEADY),
            FetchDecision::Fetch(FetchReason::Changed)
        );
    }

    #[test]
    fn test_non_ok_status_retried() {
        for status in [EntityStatus::Missing, EntityStatus::Error, EntityStatus::Absent, EntityStatus::Unknown] {
            let prior = state(Some("a"), status);
            assert_eq!(
                decide(&entity("x", Some("a")), Some(&prior), true, STEADY),
                FetchDecision::Fetch(FetchReason::Retry),
                "status {}",
                status
            );
        }
    }

    #[test]
    fn test_unchanged_ok_reused() {
        let prior = state(Some("a"), EntityStatus::Ok);
        assert_eq!(decide(&entity("x", Some("a")), Some(&prior), true, STEADY), FetchDecision::Reuse);
    }

    #[test]
    fn test_no_state_and_no_lastmod_reused() {
        assert_eq!(decide(&entity("x", None), None, true, STEADY), FetchDecision::Reuse);
    }

    #[test]
    fn test_plan_splits_entities() {
        let dataset = Dataset::from_rows(vec![json!({"id": "kept"}), json!({"id": "changed"})]);
        let mut states = StateRecords::new();
        states.insert("kept".into(), state(Some("1"), EntityStatus::Ok));
        states.insert("changed".into(), state(Some("1"), EntityStatus::Ok));

        let entities = vec![entity("changed", Some("2")), entity("kept", Some("1")), entity("new", Some("1"))];
        let plan = FetchPlan::build(&entities, &states, &dataset, STEADY);

        let reuse: Vec<_> = plan.reuse.iter().map(|e| e.external_id.as_str()).collect();
        let fetch: Vec<_> = plan.fetch.iter().map(|e| e.external_id.as_str()).collect();
        assert_eq!(reuse, vec!["kept"]);
        assert_eq!(fetch, vec!["changed", "new"]);
    }

    struct RecordingFetcher {
        starts: Mutex<Vec<Instant>>,
    }

    #[async_trait]
    impl EntityFetcher for RecordingFetcher {
        async fn fetch_entity(&self, entity: &Entity) -> FetchOutcome {
            self.starts.lock().push(Instant::now());
            tokio::time::sleep(Duration::from_millis(50)).await;
            if entity.external_id == "boom" {
                panic!("parser bug");
            }
            FetchOutcome::missing("gone")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pool_respects_rate_limit() {
        let fetcher = Arc::new(RecordingFetcher {
            starts: Mutex::new(Vec::new()),
        });
        let limiter = Arc::new(RateLimiter::new(Duration::from_millis(500), Duration::ZERO));
        let scheduler = FetchScheduler::new(fetcher.clone(), limiter, 4);

        let entities: Vec<_> = (0..20).map(|i| entity(&format!("e{}", i), None)).collect();
        let outcomes = scheduler.execute(entities).await;
        assert_eq!(outcomes.len(), 20);

        let mut starts = fetcher.starts.lock().clone();
        starts.sort();
        let span = *starts.last().unwrap() - *starts.first().unwrap();
        assert!(span >= Duration::from_millis(19 * 500), "span was {:?}", span);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_fetch_becomes_error() {
        let fetcher = Arc::new(RecordingFetcher {
            starts: Mutex::new(Vec::new()),
        });
        let limiter = Arc::new(RateLimiter::new(Duration::ZERO, Duration::ZERO));
        let scheduler = FetchScheduler::new(fetcher, limiter, 2);

        let outcomes = scheduler
            .execute(vec![entity("boom", None), entity("fine", None)])
            .await;
        assert_eq!(outcomes.len(), 2);

        for (entity, outcome) in outcomes {
            match entity.external_id.as_str() {
                "boom" => assert_eq!(outcome.status(), EntityStatus::Error),
                _ => assert_eq!(outcome.status(), EntityStatus::Missing),
            }
        }
    }
}
