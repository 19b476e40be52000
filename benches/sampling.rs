//! Sampler throughput benchmarks
//!
//! Toyota Way: Genchi Genbutsu (measure, don't guess)
//!
//! Run with: cargo bench --bench sampling

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use runledger::params::{compile_with, CompileOptions, ParameterSet};
use serde_json::json;

/// Benchmark one draw per directive kind
fn bench_sample(c: &mut Criterion) {
    let mut group = c.benchmark_group("sample");
    let options = CompileOptions::with_eval();

    for (label, raw) in [
        ("literal", json!(42)),
        ("uni", json!("!uni(0.0001, 0.1)")),
        ("rint", json!("!rint(0, 1000)")),
        ("eval", json!("!eval(10 ^ uniform(-4, -1))")),
    ] {
        let sampler = compile_with(&raw, options).unwrap();
        group.bench_with_input(BenchmarkId::new("directive", label), &sampler, |b, s| {
            b.iter(|| black_box(s.sample().unwrap()));
        });
    }

    group.finish();
}

/// Benchmark a full resolve pass over a typical sweep spec
fn bench_resolve_all(c: &mut Criterion) {
    let mut params = ParameterSet::from_json(json!({
        "lr": "!uni(0.0001, 0.1)",
        "batch": "!rint(16, 257)",
        "dropout": "!uni(0.0, 0.5)",
        "seed": 42,
        "optimizer": "adam",
    }))
    .unwrap();

    c.bench_function("resolve_all_5_params", |b| {
        b.iter(|| black_box(params.items().unwrap()));
    });
}

criterion_group!(benches, bench_sample, bench_resolve_all);
criterion_main!(benches);
