//! Performance benchmarks for the per-round hot paths
//!
//! Targets:
//! - Rubric evaluation: <1µs per score
//! - UCB pick + update: <1µs for 16 arms
//! - State save/load: <5ms for a warm state document

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use metaloop_core::evaluation::{RubricExpression, FALLBACK_RUBRIC};
use metaloop_core::{LoopConfig, MetaLoop, SimulatedExecutor, Telemetry, TracePaths, UcbSelector};
use tempfile::TempDir;

fn telemetry() -> Telemetry {
    [("pass", 1.0), ("time", 2.0), ("cost", 1.0), ("mdl", 5.0)]
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect()
}

/// Benchmark 1: Rubric parse and evaluate
fn bench_rubric(c: &mut Criterion) {
    let mut group = c.benchmark_group("rubric");
    group.throughput(Throughput::Elements(1));
    let keys = ["pass", "time", "cost", "mdl"];

    group.bench_function("validate", |b| {
        b.iter(|| RubricExpression::validate(black_box(FALLBACK_RUBRIC), keys))
    });

    let rubric = RubricExpression::validate(FALLBACK_RUBRIC, keys).unwrap();
    let t = telemetry();
    group.bench_function("evaluate", |b| b.iter(|| rubric.evaluate(black_box(&t))));

    group.finish();
}

/// Benchmark 2: UCB pick + update across arm counts
fn bench_ucb(c: &mut Criterion) {
    let mut group = c.benchmark_group("ucb");

    for num_arms in [2usize, 4, 16, 64] {
        group.bench_with_input(
            BenchmarkId::new("pick_update", num_arms),
            &num_arms,
            |b, &n| {
                let mut selector = UcbSelector::with_arm_count(n).unwrap();
                let mut round = 0u64;
                b.iter(|| {
                    let i = selector.pick();
                    round += 1;
                    selector.update(i, (round % 7) as f64 / 7.0);
                    black_box(i)
                })
            },
        );
    }

    group.finish();
}

/// Benchmark 3: Full round against a warm state file
fn bench_round(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let paths = TracePaths {
        config: dir.path().join("absent.json"),
        state: dir.path().join("state.json"),
        receipts: dir.path().join("receipts.jsonl"),
    };
    let engine = MetaLoop::new(LoopConfig::default(), &paths).unwrap();
    let mut executor = SimulatedExecutor::seeded(1);
    for _ in 0..50 {
        engine.run_round("warmup", &mut executor).unwrap();
    }

    c.bench_function("round/simulated", |b| {
        b.iter(|| engine.run_round(black_box("bench"), &mut executor).unwrap())
    });

    c.bench_function("state/load_save", |b| {
        b.iter_batched(
            || engine.store().load(),
            |state| engine.store().save(&state),
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_rubric, bench_ucb, bench_round);
criterion_main!(benches);
