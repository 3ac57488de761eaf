//! Performance benchmarks for quay-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use quay_engine::{
    filter, resolve, MutationKind, PendingMutation, RemoteModel, SyncMetadata,
};
use serde_json::json;

fn make_batch(size: u64) -> Vec<RemoteModel> {
    (0..size)
        .map(|i| {
            RemoteModel::new(
                json!({"title": format!("post {i}"), "likes": i}),
                SyncMetadata::new("Post", format!("post-{i}"), i % 5 + 1, i % 7 == 0, 1000 + i),
            )
        })
        .collect()
}

fn make_pending(size: u64) -> Vec<PendingMutation> {
    // Every third id has an in-flight update
    (0..size)
        .step_by(3)
        .map(|i| {
            PendingMutation::new(
                "Post",
                format!("post-{i}"),
                MutationKind::Update,
                Some(i % 5 + 1),
                900,
            )
        })
        .collect()
}

fn make_metadata(size: u64) -> Vec<SyncMetadata> {
    // Every other id is already known locally
    (0..size)
        .step_by(2)
        .map(|i| SyncMetadata::new("Post", format!("post-{i}"), i % 4 + 1, false, 500))
        .collect()
}

fn bench_filter(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter");

    for size in [10u64, 100, 1_000] {
        let batch = make_batch(size);
        let pending = make_pending(size);

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| filter(black_box(batch.clone()), black_box(&pending)))
        });
    }

    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let mut group = c.benchmark_group("resolve");

    for size in [10u64, 100, 1_000] {
        let batch = make_batch(size);
        let metadata = make_metadata(size);

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| resolve(black_box(batch.clone()), black_box(&metadata)))
        });
    }

    group.finish();
}

fn bench_full_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("filter_then_resolve");

    let batch = make_batch(1_000);
    let pending = make_pending(1_000);
    let metadata = make_metadata(1_000);

    group.bench_function("1000_models", |b| {
        b.iter(|| {
            let retained = filter(black_box(batch.clone()), black_box(&pending));
            resolve(retained, black_box(&metadata))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_filter, bench_resolve, bench_full_pass);
criterion_main!(benches);
