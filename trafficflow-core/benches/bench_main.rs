//! Criterion benchmarks over a synthetic grid network.
//!
//! Run with: cargo bench -p trafficflow_core

use std::hint::black_box;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};

use trafficflow_core::prelude::*;
use trafficflow_core::{OptimizerConfig, SourceTag};

/// Two-way street grid of `side` x `side` intersections, 100 m blocks
fn grid(side: usize) -> GraphStore {
    let id = |x: usize, y: usize| format!("n{x}_{y}");
    let mut nodes = Vec::with_capacity(side * side);
    let mut segments = Vec::with_capacity(side * side * 4);

    for y in 0..side {
        for x in 0..side {
            nodes.push(NodeDefinition::new(
                &id(x, y),
                x as f64 * 0.001,
                y as f64 * 0.001,
            ));
            let mut link = |tx: usize, ty: usize| {
                // Vary speeds so the optimum is not trivially straight
                let speed = 30.0 + ((x * 7 + y * 13) % 5) as f64 * 10.0;
                segments.push(SegmentDefinition::new(
                    &format!("{}-{}", id(x, y), id(tx, ty)),
                    &id(x, y),
                    &id(tx, ty),
                    100.0,
                    speed,
                ));
                segments.push(SegmentDefinition::new(
                    &format!("{}-{}", id(tx, ty), id(x, y)),
                    &id(tx, ty),
                    &id(x, y),
                    100.0,
                    speed,
                ));
            };
            if x + 1 < side {
                link(x + 1, y);
            }
            if y + 1 < side {
                link(x, y + 1);
            }
        }
    }
    GraphStore::load(nodes, segments).expect("grid network is well formed")
}

fn bench_optimize(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimize");
    for side in [10, 30, 60] {
        let optimizer = RouteOptimizer::new(
            Arc::new(grid(side)),
            Arc::new(FixedForecaster::new(Utc::now(), [])),
            OptimizerConfig::default(),
            Arc::new(Metrics::default()),
        );
        let far = format!("n{}_{}", side - 1, side - 1);
        let query = RouteQuery::between_nodes("n0_0", &far);

        group.bench_with_input(BenchmarkId::new("corner_to_corner", side), &query, |b, q| {
            b.iter(|| optimizer.optimize(black_box(q)).expect("search completes"));
        });
        group.bench_with_input(
            BenchmarkId::new("corner_to_corner_single", side),
            &query.clone().with_alternatives(1),
            |b, q| b.iter(|| optimizer.optimize(black_box(q)).expect("search completes")),
        );
    }
    group.finish();
}

fn bench_updates(c: &mut Criterion) {
    let store = grid(60);
    let segment_ids: Vec<SegmentId> = store
        .snapshot()
        .segments()
        .map(|(info, _)| info.id.clone())
        .collect();
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap();

    c.bench_function("snapshot_60", |b| b.iter(|| black_box(store.snapshot())));

    let mut tick = 0_i64;
    c.bench_function("apply_sample", |b| {
        b.iter(|| {
            tick += 1;
            let sample = TrafficSample {
                segment_id: segment_ids[tick as usize % segment_ids.len()].clone(),
                speed_kmh: 40.0,
                congestion: 0.3,
                timestamp: base + Duration::seconds(tick),
                source: SourceTag::Probe,
            };
            store.apply_sample(black_box(&sample)).expect("known segment")
        });
    });
}

criterion_group!(benches, bench_optimize, bench_updates);
criterion_main!(benches);
