//! Ingestion and Flush Benchmarks
//!
//! Measures sample aggregation throughput across series cardinalities and
//! the cost of mapping plus encoding a populated store.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use prw_output::ingestion::{Ingester, PipelineMetrics};
use prw_output::remote::{self, WireMapper, WriteRequest};
use prw_output::tsdb::{InMemoryRepository, Repository, TagCache};
use prw_output::types::{Metric, MetricType, Sample};
use std::collections::HashMap;
use std::hint::black_box;
use std::sync::Arc;

// =============================================================================
// Test Data Generators
// =============================================================================

/// Create samples spread over `cardinality` distinct tag sets
fn create_samples(metric: &Arc<Metric>, count: usize, cardinality: usize) -> Vec<Sample> {
    (0..count)
        .map(|i| {
            let mut tags = HashMap::new();
            tags.insert("method".to_string(), "GET".to_string());
            tags.insert("status".to_string(), "200".to_string());
            tags.insert("url".to_string(), format!("/api/{}", i % cardinality));
            Sample::at(
                Arc::clone(metric),
                tags,
                (i as f64 * 0.1).sin().abs() * 250.0,
                1_700_000_000_000 + i as i64,
            )
        })
        .collect()
}

fn new_ingester() -> (Arc<InMemoryRepository>, Ingester) {
    let repo = Arc::new(InMemoryRepository::new());
    let ingester = Ingester::new(
        repo.clone(),
        Arc::new(TagCache::new()),
        Arc::new(PipelineMetrics::new()),
    );
    (repo, ingester)
}

// =============================================================================
// Benchmarks
// =============================================================================

fn bench_ingest(c: &mut Criterion) {
    let mut group = c.benchmark_group("ingest");

    for kind in [MetricType::Counter, MetricType::Trend] {
        let metric = Metric::shared("http_req_duration", kind);
        for cardinality in [1, 100, 1_000] {
            let samples = create_samples(&metric, 10_000, cardinality);
            group.throughput(Throughput::Elements(samples.len() as u64));

            group.bench_with_input(
                BenchmarkId::new(kind.to_string(), cardinality),
                &samples,
                |b, samples| {
                    let (_, ingester) = new_ingester();
                    b.iter(|| black_box(ingester.ingest(black_box(std::slice::from_ref(samples)))))
                },
            );
        }
    }

    group.finish();
}

fn bench_map_and_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("map_and_encode");
    let mapper = WireMapper::default();

    for cardinality in [100, 1_000] {
        let (repo, ingester) = new_ingester();
        let trend = Metric::shared("http_req_duration", MetricType::Trend);
        let counter = Metric::shared("http_reqs", MetricType::Counter);
        ingester.ingest(&[
            create_samples(&trend, 20_000, cardinality),
            create_samples(&counter, 20_000, cardinality),
        ]);
        group.throughput(Throughput::Elements(repo.len() as u64));

        group.bench_with_input(BenchmarkId::from_parameter(cardinality), &repo, |b, repo| {
            b.iter(|| {
                let timeseries: Vec<_> = repo
                    .get_series()
                    .iter()
                    .flat_map(|s| mapper.map(s, 0))
                    .collect();
                black_box(remote::encode(&WriteRequest { timeseries }).unwrap())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_ingest, bench_map_and_encode);
criterion_main!(benches);
