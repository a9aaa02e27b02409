//! In-memory time-series aggregation store
//!
//! Observations are deduplicated into one [`TimeSeries`] per identity
//! (metric name plus canonical tag set). Each series carries a [`Sink`]
//! holding its running aggregate.
//!
//! # Architecture
//!
//! ```text
//! Sample ──► TagCache ──► TagSet ──► hash_key ──► Repository
//!                                                    │
//!                                          Arc<TimeSeries> { Sink }
//! ```
//!
//! Series are created once, never removed, and shared read-only through
//! `Arc`; all mutation goes through the sink's own lock.

pub mod repository;
pub mod sink;
pub mod tag_cache;
pub mod tags;

use std::sync::atomic::{AtomicI64, Ordering};

pub use repository::{InMemoryRepository, Repository};
pub use sink::{CounterSink, GaugeSink, RateSink, Sink, TrendSink, TrendStats};
pub use tag_cache::TagCache;
pub use tags::{hash_key, Tag, TagSet};

use crate::types::MetricType;

/// Watermark value meaning "no observation yet"
const NO_TIMESTAMP: i64 = i64::MIN;

/// One aggregated series
#[derive(Debug)]
pub struct TimeSeries {
    /// Identity hash of `metric` and `tags`
    pub id: u64,
    /// Metric name without any prefix
    pub metric: String,
    /// Canonical tag set
    pub tags: TagSet,
    /// Running aggregate
    pub sink: Sink,
    latest_ms: AtomicI64,
}

impl TimeSeries {
    /// Create a series with an empty sink for `kind`
    pub fn new(metric: impl Into<String>, tags: TagSet, kind: MetricType) -> Self {
        let metric = metric.into();
        let id = hash_key(&metric, &tags);
        Self {
            id,
            metric,
            tags,
            sink: Sink::for_kind(kind),
            latest_ms: AtomicI64::new(NO_TIMESTAMP),
        }
    }

    /// Metric kind of the sink
    pub fn kind(&self) -> MetricType {
        self.sink.kind()
    }

    /// Record a value observed at `timestamp_ms`
    pub fn add_point(&self, value: f64, timestamp_ms: i64) {
        self.sink.add(value);
        self.latest_ms.fetch_max(timestamp_ms, Ordering::AcqRel);
    }

    /// Latest observation time in milliseconds, if any was recorded
    pub fn latest_timestamp_ms(&self) -> Option<i64> {
        match self.latest_ms.load(Ordering::Acquire) {
            NO_TIMESTAMP => None,
            ts => Some(ts),
        }
    }
}
