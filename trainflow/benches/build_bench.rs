//! Benchmarks for graph construction.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use trainflow::testing::execution_context;
use trainflow::workflow::{build_pipeline, PipelineConfig};

fn build_benchmark(c: &mut Criterion) {
    let ctx = execution_context().expect("fixture context");
    let single = PipelineConfig::default();
    let multi = PipelineConfig::default().with_training_instance_count(4);

    c.bench_function("build_pipeline", |b| {
        b.iter(|| build_pipeline(black_box(&single), black_box(&ctx)))
    });
    c.bench_function("build_pipeline_distributed", |b| {
        b.iter(|| build_pipeline(black_box(&multi), black_box(&ctx)))
    });

    let graph = build_pipeline(&single, &ctx).expect("workflow graph");
    c.bench_function("render_definition", |b| {
        b.iter(|| black_box(&graph).definition().to_json_pretty())
    });
}

criterion_group!(benches, build_benchmark);
criterion_main!(benches);
