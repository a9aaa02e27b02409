//! Property Tests for Aggregation and Mapping
//!
//! Uses property-based testing (proptest) to check the aggregation
//! semantics of each sink, the order independence of ingestion, and the
//! label invariants of the wire mapping.

use proptest::prelude::*;
use prw_output::ingestion::{Ingester, PipelineMetrics};
use prw_output::remote::{self, WireMapper, NAME_LABEL};
use prw_output::tsdb::{InMemoryRepository, Repository, Sink, Tag, TagCache, TagSet, TimeSeries};
use prw_output::types::{Metric, MetricType, Sample};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

// =============================================================================
// Test Data Strategies
// =============================================================================

/// Observation values as a load generator would report them
fn observation() -> impl Strategy<Value = f64> {
    prop_oneof![
        (0.0..10_000.0f64),
        (-100.0..100.0f64),
        Just(0.0),
        (0i32..1000).prop_map(|i| i as f64),
    ]
}

/// Tag maps with keys that never collide with reserved label names
fn tag_map() -> impl Strategy<Value = BTreeMap<String, String>> {
    prop::collection::btree_map("[a-z][a-z_]{0,7}", "[a-zA-Z0-9/]{1,8}", 0..6)
}

fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

fn ingest_all(samples: &[Sample]) -> Arc<InMemoryRepository> {
    let repo = Arc::new(InMemoryRepository::new());
    let ingester = Ingester::new(
        repo.clone(),
        Arc::new(TagCache::new()),
        Arc::new(PipelineMetrics::new()),
    );
    ingester.ingest(&[samples.to_vec()]);
    repo
}

// =============================================================================
// Sink Properties
// =============================================================================

mod sinks {
    use super::*;

    proptest! {
        /// Counters sum every non-negative increment
        #[test]
        fn counter_sums_non_negative(values in prop::collection::vec(observation(), 0..200)) {
            let sink = Sink::for_kind(MetricType::Counter);
            for &v in &values {
                sink.add(v);
            }
            let expected: f64 = values.iter().filter(|v| **v >= 0.0).sum();
            prop_assert!(approx_eq(sink.value(), expected), "{} vs {}", sink.value(), expected);
        }

        /// Gauges report the last value
        #[test]
        fn gauge_keeps_last(values in prop::collection::vec(observation(), 1..100)) {
            let sink = Sink::for_kind(MetricType::Gauge);
            for &v in &values {
                sink.add(v);
            }
            prop_assert_eq!(sink.value(), *values.last().unwrap());
        }

        /// Rates report the share of positive observations
        #[test]
        fn rate_is_positive_share(values in prop::collection::vec(observation(), 1..200)) {
            let sink = Sink::for_kind(MetricType::Rate);
            for &v in &values {
                sink.add(v);
            }
            let trues = values.iter().filter(|v| **v > 0.0).count() as f64;
            let expected = trues / values.len() as f64;
            prop_assert!(approx_eq(sink.value(), expected));
            prop_assert!((0.0..=1.0).contains(&sink.value()));
        }

        /// Trend statistics stay ordered and within the observed range
        #[test]
        fn trend_stats_ordered(values in prop::collection::vec(observation(), 1..2000)) {
            let sink = Sink::for_kind(MetricType::Trend);
            for &v in &values {
                sink.add(v);
            }
            let Sink::Trend(trend) = &sink else {
                unreachable!("trend kind builds a trend sink");
            };
            let stats = trend.stats();

            let min = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let max = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            let sum: f64 = values.iter().sum();

            prop_assert_eq!(stats.count, values.len() as u64);
            prop_assert_eq!(stats.min, min);
            prop_assert_eq!(stats.max, max);
            prop_assert!(approx_eq(stats.sum, sum));
            prop_assert!(stats.min <= stats.med);
            prop_assert!(stats.med <= stats.p90);
            prop_assert!(stats.p90 <= stats.p95);
            prop_assert!(stats.p95 <= stats.max);
            prop_assert_eq!(sink.value(), stats.p95);
        }
    }
}

// =============================================================================
// Ingestion Properties
// =============================================================================

mod ingestion {
    use super::*;

    /// Samples over a handful of tag sets
    fn samples() -> impl Strategy<Value = Vec<(u8, f64)>> {
        prop::collection::vec((0u8..5, 0.0..1000.0f64), 1..300)
    }

    fn build(metric: &Arc<Metric>, raw: &[(u8, f64)]) -> Vec<Sample> {
        raw.iter()
            .enumerate()
            .map(|(i, (set, value))| {
                let mut tags = HashMap::new();
                tags.insert("status".to_string(), format!("{}00", set));
                tags.insert("method".to_string(), "GET".to_string());
                Sample::at(Arc::clone(metric), tags, *value, i as i64)
            })
            .collect()
    }

    proptest! {
        /// Delivery order does not change counter aggregates
        #[test]
        fn counter_order_independent(
            (raw, shuffled) in samples().prop_flat_map(|raw| {
                let shuffled = Just(raw.clone()).prop_shuffle();
                (Just(raw), shuffled)
            })
        ) {
            let metric = Metric::shared("http_reqs", MetricType::Counter);
            let a = ingest_all(&build(&metric, &raw));
            let b = ingest_all(&build(&metric, &shuffled));

            prop_assert_eq!(a.len(), b.len());
            for series in a.get_series() {
                let other = b.get_series_by_id(series.id).expect("same identities");
                prop_assert!(approx_eq(series.sink.value(), other.sink.value()));
            }
        }

        /// One series per distinct tag set
        #[test]
        fn series_per_tag_set(raw in samples()) {
            let metric = Metric::shared("http_req_duration", MetricType::Trend);
            let repo = ingest_all(&build(&metric, &raw));

            let mut distinct: Vec<u8> = raw.iter().map(|(set, _)| *set).collect();
            distinct.sort_unstable();
            distinct.dedup();
            prop_assert_eq!(repo.len(), distinct.len());
        }
    }
}

// =============================================================================
// Wire Mapping Properties
// =============================================================================

mod mapping {
    use super::*;

    fn series_from(tags: &BTreeMap<String, String>, kind: MetricType) -> TimeSeries {
        let mut set = TagSet::new();
        for (k, v) in tags {
            set.add(Tag::new(k.as_str(), v.as_str()));
        }
        let series = TimeSeries::new("metric", set, kind);
        series.add_point(1.0, 1);
        series
    }

    proptest! {
        /// Every record has sorted labels and exactly one metric name
        #[test]
        fn labels_sorted_with_single_name(
            tags in tag_map(),
            trend in any::<bool>(),
            keep_name in any::<bool>(),
            keep_url in any::<bool>(),
        ) {
            let kind = if trend { MetricType::Trend } else { MetricType::Gauge };
            let mapper = WireMapper::default().keep_name_tag(keep_name).keep_url_tag(keep_url);
            let records = mapper.map(&series_from(&tags, kind), 0);

            prop_assert_eq!(records.len(), if trend { 8 } else { 1 });
            for record in &records {
                let names: Vec<&str> = record.labels.iter().map(|l| l.name.as_str()).collect();
                prop_assert!(names.windows(2).all(|w| w[0] <= w[1]), "unsorted: {:?}", names);
                prop_assert_eq!(names.iter().filter(|n| **n == NAME_LABEL).count(), 1);
                prop_assert_eq!(names.contains(&"name"), keep_name && tags.contains_key("name"));
                prop_assert_eq!(names.contains(&"url"), keep_url && tags.contains_key("url"));
            }
        }

        /// Arbitrary payloads never panic the decoder
        #[test]
        fn decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
            let _ = remote::decode(&bytes);
        }
    }
}
