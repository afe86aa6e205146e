//! Benchmark suite for the scoring and decision hot path.
//!
//! The audit runs once per iteration, but scoring walks every result,
//! failure, and coverage tag, so it is the only pure-CPU section whose
//! cost grows with report size.
//!
//! # Running Benchmarks
//!
//! ```bash
//! # Run all benchmarks
//! cargo bench
//!
//! # Save baseline for comparison
//! cargo bench -- --save-baseline main
//!
//! # Compare against baseline
//! cargo bench -- --baseline main
//! ```

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use crucible::audit::{decide, score, AuditContext};
use crucible::{
    AnalysisArtifact, Failure, FailureCategory, FailureSeverity, IoExample, LoopConfig,
    Requirement, TestResult, ValidationReport,
};

/// Build a report/analysis pair with `n` examples, every third failing.
fn fixture(n: usize) -> (ValidationReport, AnalysisArtifact) {
    let mut analysis = AnalysisArtifact::default();
    let mut report = ValidationReport::default();

    for i in 0..n {
        let req_id = format!("R{i}");
        let example_id = format!("E{i}");
        analysis
            .requirements
            .push(Requirement::new(&req_id, format!("requirement {i}")));
        analysis.examples.push(
            IoExample::new(&example_id, format!("in{i}"), format!("out{i}")).covering(&req_id),
        );
        if i % 3 == 0 {
            report
                .results
                .push(TestResult::failed(&example_id, "wrong output"));
            report.failures.push(
                Failure::new(
                    FailureCategory::Correctness,
                    FailureSeverity::Major,
                    format!("example {example_id} produced wrong output"),
                )
                .with_location(&example_id),
            );
        } else {
            report.results.push(TestResult::passed(&example_id, ""));
        }
    }
    report.passed = report.failures.is_empty();
    let total = report.total_count();
    report.score = if total == 0 {
        0.0
    } else {
        report.passed_count() as f64 / total as f64
    };
    (report, analysis)
}

fn bench_score(c: &mut Criterion) {
    let mut group = c.benchmark_group("audit_score");
    let config = LoopConfig::default();

    for size in [10, 100, 1_000] {
        let (report, analysis) = fixture(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(
            BenchmarkId::new("score", size),
            &(report, analysis),
            |b, (report, analysis)| {
                b.iter(|| {
                    black_box(score(
                        black_box(report),
                        black_box(analysis),
                        &config.weights,
                    ))
                });
            },
        );
    }
    group.finish();
}

fn bench_decide(c: &mut Criterion) {
    let mut group = c.benchmark_group("audit_decide");
    let config = LoopConfig::default();
    let ctx = AuditContext {
        iteration_index: 2,
        max_iterations: 5,
        previous_overall: Some(0.6),
    };

    for size in [10, 100, 1_000] {
        let (report, analysis) = fixture(size);
        let breakdown = score(&report, &analysis, &config.weights);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(
            BenchmarkId::new("decide", size),
            &report,
            |b, report| {
                b.iter(|| black_box(decide(&breakdown, black_box(report), &ctx, &config)));
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_score, bench_decide);
criterion_main!(benches);
