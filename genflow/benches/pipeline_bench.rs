//! Benchmarks for session naming and pipeline assembly.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use genflow::context::StepContext;
use genflow::pipeline::PipelineAssembler;
use genflow::session::{temp_resource_name, SessionId, COHORT_PURPOSE};
use genflow::source::TargetSource;
use genflow::testing::{RecordingConnection, RecordingStep, SingleConnectionProvider};
use std::sync::Arc;

fn naming_benchmark(c: &mut Criterion) {
    let session = SessionId::generate();
    c.bench_function("temp_resource_name", |b| {
        b.iter(|| temp_resource_name(black_box(&session), black_box(COHORT_PURPOSE)));
    });
}

fn assembly_benchmark(c: &mut Criterion) {
    let assembler = PipelineAssembler::new(Arc::new(SingleConnectionProvider::new(Arc::new(
        RecordingConnection::new(),
    ))));
    let source = TargetSource::new("synpuf", "pg", "synpuf-conn");
    let analysis = Arc::new(RecordingStep::new());

    c.bench_function("assemble_cohort_based", |b| {
        b.iter(|| {
            let descriptor = assembler
                .assemble_cohort_based(
                    "cc",
                    &source,
                    Arc::new(|_ctx: &StepContext| Ok(Vec::new())),
                    analysis.clone(),
                )
                .unwrap();
            black_box(descriptor.step_names().len())
        });
    });
}

criterion_group!(benches, naming_benchmark, assembly_benchmark);
criterion_main!(benches);
