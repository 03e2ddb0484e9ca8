//! catalog-roi benchmark suite.
//!
//! Benchmarks for key operations:
//! - Payload normalization
//! - Batch validation
//! - Licensing tables and ROI
//! - CSV encoding

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};


use catalog_roi::pipeline::build_tables;
use catalog_roi::roi::{AttributionRates, compute_roi};
use catalog_roi::table;
use catalog_roi::transform::parse_title;
use catalog_roi::validate::{check_title, validate_batch};

/// Parsing raw payloads into catalog records, with and without the
/// per-record checks.
fn transform_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("transform");

    for size in [100, 1000, 10000] {
        let payloads = bench_utils::generate_payloads(size);
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("parse_title", size), &payloads, |b, payloads| {
            b.iter(|| {
                payloads
                    .iter()
                    .filter_map(|p| parse_title(p).ok())
                    .count()
            });
        });

        group.bench_with_input(
            BenchmarkId::new("parse_and_check", size),
            &payloads,
            |b, payloads| {
                b.iter(|| {
                    payloads
                        .iter()
                        .filter_map(|p| parse_title(p).ok())
                        .filter(|r| check_title(r).is_ok())
                        .count()
                });
            },
        );
    }

    group.finish();
}

fn validation_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("validation");

    for size in [1000, 10000] {
        let titles = bench_utils::generate_titles(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("validate_batch", size), &titles, |b, titles| {
            b.iter(|| validate_batch(titles));
        });
    }

    group.finish();
}

/// ROI alone and the full licensing build (parse, check, enrich, ROI).
fn roi_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("roi");
    let rates = AttributionRates::default();
    let regional = bench_utils::generate_regional();

    for size in [1000, 10000] {
        let enriched = bench_utils::generate_enriched(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("compute_roi", size), &enriched, |b, enriched| {
            b.iter(|| compute_roi(enriched, &regional, &rates));
        });

        let titles = bench_utils::generate_titles(1000);
        let deal_rows = bench_utils::generate_deal_rows(size, 1000);
        let regional_rows: Vec<_> = regional
            .iter()
            .map(|r| catalog_roi::model::RegionalSourceRow {
                region_code: Some(r.region_code.clone()),
                quarter_date: r.period.clone(),
                estimated_subscriber_count: r.subscriber_count.map(|s| s.to_string()),
                estimated_revenue_usd: Some(r.revenue_usd.to_string()),
                arpu_usd: None,
                churn_rate_percent: None,
            })
            .collect();
        group.bench_with_input(BenchmarkId::new("build_tables", size), &deal_rows, |b, rows| {
            b.iter(|| build_tables(rows, &regional_rows, &titles, &rates));
        });
    }

    group.finish();
}

fn csv_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("csv");

    for size in [1000, 10000] {
        let titles = bench_utils::generate_titles(size);
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("encode_catalog", size), &titles, |b, titles| {
            b.iter(|| table::encode("title_catalog", titles).unwrap());
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    transform_benchmarks,
    validation_benchmarks,
    roi_benchmarks,
    csv_benchmarks,
);
criterion_main!(benches);
