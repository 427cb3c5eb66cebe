//! Folds one run's fetch outcomes and the previous stores into the next dataset
//! and the next entity state map.
//!
//! Lifecycle per entity, across runs:
//!
//! ```text
//!   ok ──(explicit not-found)──▶ missing ──(streak++)──▶ missing
//!    ▲                              │
//!    └──────────(page back)─────────┘
//!   ok | missing ──(not in sitemap)──▶ absent ──(re-discovered)──▶ ok
//! ```
//!
//! A missing page keeps its record for `missing_grace_runs - 1` runs, an absent
//! one for `absent_grace_runs - 1` runs. Errors never remove a record. State
//! rows are never deleted.

use crate::config::UpdateConfig;
use crate::dataset::{sort_for_display, Dataset};
use crate::models::{Entity, EntityState, EntityStatus, FetchOutcome, Record, RunStats};
use crate::scheduler::FetchPlan;
use crate::state::StateRecords;
use std::collections::{BTreeMap, HashMap, HashSet};

/// Next dataset rows (display-sorted), next state records and run counters.
#[derive(Debug, Clone, Default)]
pub struct Reconciliation {
    pub records: Vec<Record>,
    pub states: StateRecords,
    pub stats: RunStats,
}

#[derive(Debug, Clone, Copy)]
pub struct ReconciliationEngine {
    missing_grace_runs: u32,
    absent_grace_runs: u32,
}

impl ReconciliationEngine {
    pub fn new(missing_grace_runs: u32, absent_grace_runs: u32) -> Self {
        Self {
            missing_grace_runs,
            absent_grace_runs,
        }
    }

    pub fn from_config(config: &UpdateConfig) -> Self {
        Self::new(config.missing_grace_runs, config.absent_grace_runs)
    }

    /// Outcomes are matched to the plan by external id, so their order is irrelevant.
    pub fn reconcile(
        &self,
        plan: &FetchPlan,
        outcomes: Vec<(Entity, FetchOutcome)>,
        prior_states: &StateRecords,
        dataset: &Dataset,
        now: &str,
    ) -> Reconciliation {
        let mut stats = RunStats::default();
        let mut next_records: BTreeMap<String, Record> = BTreeMap::new();
        let mut next_states = StateRecords::new();

        for entity in &plan.reuse {
            let id = &entity.external_id;
            let prior = prior_states.get(id);
            let mut state = base_state(prior, entity);
            state.observe(entity, now);
            state.absent_streak = 0;

            match dataset.first(id) {
                Some(record) => {
                    next_records.insert(id.clone(), record.clone());
                    state.status = EntityStatus::Ok;
                    stats.reused_unchanged += 1;
                }
                None => {
                    state.status = prior.map(|p| p.status).unwrap_or_default();
                }
            }
            next_states.insert(id.clone(), state);
        }

        let mut by_id: HashMap<String, FetchOutcome> = outcomes
            .into_iter()
            .map(|(entity, outcome)| (entity.external_id, outcome))
            .collect();

        for entity in &plan.fetch {
            let id = &entity.external_id;
            let outcome = by_id
                .remove(id)
                .unwrap_or_else(|| FetchOutcome::error("fetch did not complete"));
            let prior = prior_states.get(id);
            let existing = dataset.first(id);

            let mut state = base_state(prior, entity);
            state.observe(entity, now);
            state.absent_streak = 0;
            state.last_fetched_at = Some(now.to_string());
            state.status = outcome.status();

            match outcome {
                FetchOutcome::Ok(record) => {
                    stats.fetched_ok += 1;
                    next_records.insert(id.clone(), record);
                    state.missing_streak = 0;
                    state.last_message.clear();
                }
                FetchOutcome::Missing { message } => {
                    stats.fetched_missing += 1;
                    state.missing_streak = prior.map_or(0, |p| p.missing_streak).saturating_add(1);
                    if state.missing_streak < self.missing_grace_runs {
                        if let Some(record) = existing {
                            next_records.insert(id.clone(), record.clone());
                        }
                    }
                    state.last_message = message;
                }
                FetchOutcome::Error { message } => {
                    stats.fetched_error += 1;
                    if let Some(record) = existing {
                        next_records.insert(id.clone(), record.clone());
                    }
                    state.last_message = message;
                }
            }
            next_states.insert(id.clone(), state);
        }

        for id in by_id.keys() {
            tracing::warn!("Ignoring fetch outcome for unplanned entity {}", id);
        }

        let discovered: HashSet<&str> = plan
            .reuse
            .iter()
            .chain(plan.fetch.iter())
            .map(|entity| entity.external_id.as_str())
            .collect();

        let mut preserved_rows: Vec<Record> = Vec::new();
        for (id, rows) in dataset.groups() {
            if next_records.contains_key(id) {
                // Legacy duplicates of an active id are published untouched.
                if rows.len() > 1 {
                    preserved_rows.extend(rows[1..].iter().cloned());
                    stats.retained_duplicate_rows += rows.len() - 1;
                }
                continue;
            }
            if discovered.contains(id) {
                continue;
            }

            let state = self.absent_state(id, prior_states.get(id));
            if state.absent_streak < self.absent_grace_runs {
                preserved_rows.extend(rows.iter().cloned());
                stats.retained_absent += rows.len();
            }
            next_states.insert(id.to_string(), state);
        }

        // Entities that already left both the sitemap and the dataset keep their audit row.
        for (id, prior) in prior_states {
            if !next_states.contains_key(id) {
                next_states.insert(id.clone(), self.absent_state(id, Some(prior)));
            }
        }

        let mut records: Vec<Record> = next_records.into_values().chain(preserved_rows).collect();
        sort_for_display(&mut records);

        stats.previous_count = dataset.len();
        stats.new_count = records.len();
        stats.delta = stats.new_count as i64 - stats.previous_count as i64;

        Reconciliation {
            records,
            states: next_states,
            stats,
        }
    }

    /// State for an entity missing from this discovery pass.
    ///
    /// The streak saturates at the grace limit so repeated runs over an
    /// unchanged source produce identical state.
    fn absent_state(&self, id: &str, prior: Option<&EntityState>) -> EntityState {
        let mut state = prior.cloned().unwrap_or_else(|| EntityState {
            external_id: id.to_string(),
            ..empty_state()
        });
        state.external_id = id.to_string();
        state.status = EntityStatus::Absent;
        state.absent_streak = state.absent_streak.saturating_add(1).min(self.absent_grace_runs);
        state.missing_streak = 0;
        state
    }
}

fn base_state(prior: Option<&EntityState>, entity: &Entity) -> EntityState {
    prior.cloned().unwrap_or_else(|| EntityState::new(entity))
}

fn empty_state() -> EntityState {
    EntityState::new(&Entity::new("", "", None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    const NOW: &str = "2025-01-02T03:04:05Z";

    fn engine() -> ReconciliationEngine {
        ReconciliationEngine::new(3, 7)
    }

    fn entity(id: &str) -> Entity {
        Entity::new(id, format!("https://medicament.ma/medicament/{}/", id), Some("2024-01-01".into()))
    }

    fn record(id: &str, name: &str) -> Record {
        match json!({"id": id, "name": name}) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    fn ok_state(id: &str) -> EntityState {
        let mut state = EntityState::new(&entity(id));
        state.status = EntityStatus::Ok;
        state
    }

    fn ids(records: &[Record]) -> Vec<&str> {
        records.iter().map(|r| r["id"].as_str().unwrap()).collect()
    }

    #[test]
    fn test_reuse_keeps_record_and_marks_ok() {
        let dataset = Dataset::from_rows(vec![json!({"id": "a", "name": "A"})]);
        let mut prior = StateRecords::new();
        let mut state = ok_state("a");
        state.missing_streak = 1;
        state.absent_streak = 2;
        prior.insert("a".into(), state);

        let plan = FetchPlan {
            reuse: vec![entity("a")],
            fetch: vec![],
        };
        let result = engine().reconcile(&plan, vec![], &prior, &dataset, NOW);

        assert_eq!(ids(&result.records), vec!["a"]);
        let state = &result.states["a"];
        assert_eq!(state.status, EntityStatus::Ok);
        assert_eq!(state.missing_streak, 1);
        assert_eq!(state.absent_streak, 0);
        assert_eq!(state.last_seen_at.as_deref(), Some(NOW));
        assert_eq!(result.stats.reused_unchanged, 1);
    }

    #[test]
    fn test_fetched_ok_replaces_record() {
        let dataset = Dataset::from_rows(vec![json!({"id": "a", "name": "Old"})]);
        let mut prior = StateRecords::new();
        let mut state = ok_state("a");
        state.status = EntityStatus::Missing;
        state.missing_streak = 2;
        state.last_message = "http 404".into();
        prior.insert("a".into(), state);

        let plan = FetchPlan {
            reuse: vec![],
            fetch: vec![entity("a")],
        };
        let outcomes = vec![(entity("a"), FetchOutcome::Ok(record("a", "New")))];
        let result = engine().reconcile(&plan, outcomes, &prior, &dataset, NOW);

        assert_eq!(result.records[0]["name"], "New");
        let state = &result.states["a"];
        assert_eq!(state.status, EntityStatus::Ok);
        assert_eq!(state.missing_streak, 0);
        assert!(state.last_message.is_empty());
        assert_eq!(state.last_fetched_at.as_deref(), Some(NOW));
    }

    #[test]
    fn test_missing_grace_period() {
        let dataset = Dataset::from_rows(vec![json!({"id": "a", "name": "A"})]);
        let plan = FetchPlan {
            reuse: vec![],
            fetch: vec![entity("a")],
        };

        let mut prior = StateRecords::new();
        prior.insert("a".into(), ok_state("a"));

        for (run, kept) in [(1, true), (2, true), (3, false)] {
            let outcomes = vec![(entity("a"), FetchOutcome::missing("http 404"))];
            let result = engine().reconcile(&plan, outcomes, &prior, &dataset, NOW);
            assert_eq!(result.states["a"].missing_streak, run);
            assert_eq!(result.states["a"].status, EntityStatus::Missing);
            assert_eq!(!result.records.is_empty(), kept, "run {}", run);
            prior = result.states;
        }
    }

    #[test]
    fn test_error_keeps_record_and_missing_streak() {
        let dataset = Dataset::from_rows(vec![json!({"id": "a", "name": "A"})]);
        let mut prior = StateRecords::new();
        let mut state = ok_state("a");
        state.status = EntityStatus::Missing;
        state.missing_streak = 2;
        state.absent_streak = 3;
        prior.insert("a".into(), state);

        let plan = FetchPlan {
            reuse: vec![],
            fetch: vec![entity("a")],
        };
        let outcomes = vec![(entity("a"), FetchOutcome::error("request failed: timeout"))];
        let result = engine().reconcile(&plan, outcomes, &prior, &dataset, NOW);

        assert_eq!(ids(&result.records), vec!["a"]);
        let state = &result.states["a"];
        assert_eq!(state.status, EntityStatus::Error);
        assert_eq!(state.missing_streak, 2);
        assert_eq!(state.absent_streak, 0);
        assert_eq!(state.last_message, "request failed: timeout");
        assert_eq!(result.stats.fetched_error, 1);
    }

    #[test]
    fn test_unfinished_fetch_counts_as_error() {
        let dataset = Dataset::from_rows(vec![json!({"id": "a", "name": "A"})]);
        let plan = FetchPlan {
            reuse: vec![],
            fetch: vec![entity("a")],
        };
        let result = engine().reconcile(&plan, vec![], &StateRecords::new(), &dataset, NOW);
        assert_eq!(result.states["a"].status, EntityStatus::Error);
        assert_eq!(result.records.len(), 1);
    }

    #[test]
    fn test_absent_grace_period() {
        let dataset = Dataset::from_rows(vec![json!({"id": "gone", "name": "G"})]);
        let plan = FetchPlan::default();
        let mut prior = StateRecords::new();
        let mut state = ok_state("gone");
        state.missing_streak = 1;
        state.last_seen_at = Some("2024-12-01T00:00:00Z".into());
        prior.insert("gone".into(), state);

        for run in 1..=6u32 {
            let result = engine().reconcile(&plan, vec![], &prior, &dataset, NOW);
            let state = &result.states["gone"];
            assert_eq!(state.absent_streak, run);
            assert_eq!(state.status, EntityStatus::Absent);
            assert_eq!(state.missing_streak, 0);
            assert_eq!(state.last_seen_at.as_deref(), Some("2024-12-01T00:00:00Z"));
            assert_eq!(result.records.len(), 1, "run {}", run);
            assert_eq!(result.stats.retained_absent, 1);
            prior = result.states;
        }

        let result = engine().reconcile(&plan, vec![], &prior, &dataset, NOW);
        assert!(result.records.is_empty());
        assert_eq!(result.states["gone"].absent_streak, 7);
        assert_eq!(result.stats.retained_absent, 0);
    }

    #[test]
    fn test_vanished_state_rows_are_kept() {
        let mut prior = StateRecords::new();
        let mut state = ok_state("old");
        state.status = EntityStatus::Absent;
        state.absent_streak = 7;
        prior.insert("old".into(), state);

        let result = engine().reconcile(&FetchPlan::default(), vec![], &prior, &Dataset::default(), NOW);
        let state = &result.states["old"];
        assert_eq!(state.status, EntityStatus::Absent);
        assert_eq!(state.absent_streak, 7);
    }

    #[test]
    fn test_rediscovered_absent_entity_resets() {
        let dataset = Dataset::from_rows(vec![json!({"id": "a", "name": "A"})]);
        let mut prior = StateRecords::new();
        let mut state = ok_state("a");
        state.status = EntityStatus::Absent;
        state.absent_streak = 4;
        prior.insert("a".into(), state);

        let plan = FetchPlan {
            reuse: vec![],
            fetch: vec![entity("a")],
        };
        let outcomes = vec![(entity("a"), FetchOutcome::Ok(record("a", "A")))];
        let result = engine().reconcile(&plan, outcomes, &prior, &dataset, NOW);
        assert_eq!(result.states["a"].status, EntityStatus::Ok);
        assert_eq!(result.states["a"].absent_streak, 0);
    }

    #[test]
    fn test_duplicates_preserved_for_active_ids() {
        let dataset = Dataset::from_rows(vec![
            json!({"id": "a", "name": "A", "v": 1}),
            json!({"id": "a", "name": "A", "v": 2}),
            json!({"id": "b", "name": "B"}),
        ]);
        let plan = FetchPlan {
            reuse: vec![entity("a"), entity("b")],
            fetch: vec![],
        };
        let result = engine().reconcile(&plan, vec![], &StateRecords::new(), &dataset, NOW);

        assert_eq!(ids(&result.records), vec!["a", "a", "b"]);
        assert_eq!(result.stats.retained_duplicate_rows, 1);
        assert_eq!(result.stats.previous_count, 3);
        assert_eq!(result.stats.new_count, 3);
        assert_eq!(result.stats.delta, 0);
    }

    #[test]
    fn test_outcome_order_does_not_matter() {
        let dataset = Dataset::from_rows(vec![json!({"id": "b", "name": "B"})]);
        let plan = FetchPlan {
            reuse: vec![],
            fetch: vec![entity("a"), entity("b"), entity("c")],
        };
        let outcomes = vec![
            (entity("a"), FetchOutcome::Ok(record("a", "A"))),
            (entity("b"), FetchOutcome::missing("http 404")),
            (entity("c"), FetchOutcome::error("boom")),
        ];
        let mut reversed = outcomes.clone();
        reversed.reverse();

        let forward = engine().reconcile(&plan, outcomes, &StateRecords::new(), &dataset, NOW);
        let backward = engine().reconcile(&plan, reversed, &StateRecords::new(), &dataset, NOW);

        assert_eq!(forward.records, backward.records);
        assert_eq!(forward.states, backward.states);
        assert_eq!(forward.stats, backward.stats);
    }

    #[test]
    fn test_output_sorted_by_name_then_id() {
        let plan = FetchPlan {
            reuse: vec![],
            fetch: vec![entity("z"), entity("y")],
        };
        let outcomes = vec![
            (entity("z"), FetchOutcome::Ok(record("z", "alpha"))),
            (entity("y"), FetchOutcome::Ok(record("y", "Beta"))),
        ];
        let result = engine().reconcile(&plan, outcomes, &StateRecords::new(), &Dataset::default(), NOW);
        assert_eq!(ids(&result.records), vec!["z", "y"]);
    }
}
