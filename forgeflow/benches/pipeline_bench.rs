//! Benchmarks for artifact handling and evaluation.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use forgeflow::evaluation::{
    BranchComplexityAnalyzer, Dimension, EvaluationAggregator, Evaluator, LintStyleChecker,
    PatternSecurityScanner,
};
use forgeflow::format::FormatConverter;
use forgeflow::review::ReviewVerdict;
use forgeflow::testing::{review_verdict, FixedEvaluator, SAMPLE_CODE};
use std::sync::Arc;

const SOURCE: &str = r#"
import os

def load(path):
    if not path:
        raise ValueError("path required")
    with open(path) as f:
        for line in f:
            if line.startswith("#") or not line.strip():
                continue
            yield line.strip()

def run(cmd):
    return os.system(cmd)
"#;

fn format_benchmark(c: &mut Criterion) {
    c.bench_function("extract_code_fenced", |b| {
        b.iter(|| FormatConverter::extract_code(black_box(SAMPLE_CODE)));
    });

    let verdict = format!("Review complete.\n```json\n{}\n```", review_verdict(true));
    c.bench_function("review_verdict_parse", |b| {
        b.iter(|| ReviewVerdict::parse(black_box(&verdict)));
    });
}

fn evaluation_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();

    let security = PatternSecurityScanner::new();
    c.bench_function("security_scan", |b| {
        b.iter(|| rt.block_on(security.evaluate(black_box(SOURCE), None)));
    });

    let lint = LintStyleChecker::new();
    c.bench_function("lint_style", |b| {
        b.iter(|| rt.block_on(lint.evaluate(black_box(SOURCE), None)));
    });

    let complexity = BranchComplexityAnalyzer::new();
    c.bench_function("complexity", |b| {
        b.iter(|| rt.block_on(complexity.evaluate(black_box(SOURCE), None)));
    });

    let aggregator = Dimension::ALL
        .iter()
        .fold(EvaluationAggregator::default(), |agg, d| {
            agg.with_evaluator(Arc::new(FixedEvaluator::new(*d, 0.8)))
        });
    c.bench_function("aggregate_four_dimensions", |b| {
        b.iter(|| rt.block_on(aggregator.evaluate(black_box(SOURCE), None)));
    });
}

criterion_group!(benches, format_benchmark, evaluation_benchmark);
criterion_main!(benches);
