use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};

use chrono::Utc;
use propdesk_core::{PropertyId, UserId};
use propdesk_infra::memory::{MemoryDb, MemoryStore};
use propdesk_properties::{NewProperty, Property, PropertyCache, PropertyStore};
use tokio::runtime::Runtime;

fn property(manager_id: UserId) -> Property {
    NewProperty {
        manager_id,
        name: "Bench Tower".into(),
        address_level_1_id: 1,
        address_level_2_id: 1,
        address_level_3_id: 1,
        street: "1 Bench St".into(),
    }
    .into_property(PropertyId::new(), Utc::now())
}

/// Fill the store with `n` properties, one manager each.
fn seeded(rt: &Runtime, n: usize) -> (MemoryStore, Vec<Property>) {
    let store = MemoryDb::new().store();
    let rows: Vec<Property> = (0..n).map(|_| property(UserId::new())).collect();
    rt.block_on(async {
        for p in &rows {
            PropertyStore::create(&store, p).await.unwrap();
        }
    });
    (store, rows)
}

fn bench_query_by_id(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("property_query_by_id");

    for size in [100usize, 1_000, 5_000] {
        let (store, rows) = seeded(&rt, size);
        let target = rows[size / 2].id;

        group.bench_with_input(BenchmarkId::new("uncached", size), &target, |b, &id| {
            b.iter(|| rt.block_on(PropertyStore::query_by_id(&store, black_box(id))).unwrap())
        });

        let cache = PropertyCache::new(store.clone());
        rt.block_on(cache.query_by_id(target)).unwrap();
        group.bench_with_input(BenchmarkId::new("cached", size), &target, |b, &id| {
            b.iter(|| rt.block_on(cache.query_by_id(black_box(id))).unwrap())
        });
    }

    group.finish();
}

fn bench_query_by_manager(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let (store, rows) = seeded(&rt, 1_000);
    let manager = rows[500].manager_id;
    let cache = PropertyCache::new(store.clone());
    rt.block_on(cache.query_by_manager_id(manager)).unwrap();

    let mut group = c.benchmark_group("property_query_by_manager_id");
    group.bench_function("uncached", |b| {
        b.iter(|| rt.block_on(PropertyStore::query_by_manager_id(&store, black_box(manager))).unwrap())
    });
    group.bench_function("cached", |b| {
        b.iter(|| rt.block_on(cache.query_by_manager_id(black_box(manager))).unwrap())
    });
    group.finish();
}

criterion_group!(benches, bench_query_by_id, bench_query_by_manager);
criterion_main!(benches);
