use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use medicament_sync::dataset::Dataset;
use medicament_sync::models::{Entity, EntityState, EntityStatus, FetchOutcome};
use medicament_sync::reconcile::ReconciliationEngine;
use medicament_sync::scheduler::{FetchPlan, PlanOptions};
use medicament_sync::state::StateRecords;
use serde_json::{json, Value};

const NOW: &str = "2024-06-01T00:00:00Z";

// Catalog of `size` entities where every tenth page changed since the last run
// and every fiftieth dropped out of the sitemap.
fn catalog(size: usize) -> (Vec<Entity>, StateRecords, Dataset) {
    let mut entities = Vec::with_capacity(size);
    let mut states = StateRecords::new();
    let mut rows: Vec<Value> = Vec::with_capacity(size);

    for i in 0..size {
        let id = format!("medicament-{:06}", i);
        let url = format!("https://medicament.ma/medicament/{}/", id);
        let stored = Entity::new(id.clone(), url.clone(), Some("2024-01-01".to_string()));

        let mut state = EntityState::new(&stored);
        state.status = EntityStatus::Ok;
        states.insert(id.clone(), state);
        rows.push(json!({"@type": "Drug", "id": id, "name": format!("Drug {}", i), "price": 12.5}));

        if i % 50 == 0 {
            continue;
        }
        let lastmod = if i % 10 == 0 { "2024-05-01" } else { "2024-01-01" };
        entities.push(Entity::new(id, url, Some(lastmod.to_string())));
    }

    (entities, states, Dataset::from_rows(rows))
}

fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("fetch_plan");

    for size in [1_000, 10_000] {
        let (entities, states, dataset) = catalog(size);
        group.bench_with_input(BenchmarkId::new("build", size), &size, |b, _| {
            b.iter(|| black_box(FetchPlan::build(&entities, &states, &dataset, PlanOptions::default())));
        });
    }

    group.finish();
}

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");
    let engine = ReconciliationEngine::new(3, 7);

    for size in [1_000, 10_000] {
        let (entities, states, dataset) = catalog(size);
        let plan = FetchPlan::build(&entities, &states, &dataset, PlanOptions::default());
        let outcomes: Vec<(Entity, FetchOutcome)> = plan
            .fetch
            .iter()
            .map(|e| {
                let record = json!({"@type": "Drug", "id": e.external_id, "name": "Refetched"});
                match record {
                    Value::Object(map) => (e.clone(), FetchOutcome::Ok(map)),
                    _ => unreachable!(),
                }
            })
            .collect();

        group.bench_with_input(BenchmarkId::new("mixed_catalog", size), &size, |b, _| {
            b.iter(|| black_box(engine.reconcile(&plan, outcomes.clone(), &states, &dataset, NOW)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_plan, bench_reconcile);
criterion_main!(benches);
