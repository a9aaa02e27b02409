//! Ingestion path
//!
//! Turns batches of raw samples into sink updates:
//!
//! 1. Drop tags with an empty key or an empty value
//! 2. Build the canonical [`TagSet`] from interned strings
//! 3. Hash the identity and resolve the series (per-batch cache, then store)
//! 4. Apply the value to the sink and advance the series watermark
//!
//! Non-finite values are counted as dropped and never reach a sink. The
//! store only grows; series are never evicted.
//!
//! # Example
//!
//! ```rust
//! use prw_output::ingestion::{Ingester, PipelineMetrics};
//! use prw_output::tsdb::{InMemoryRepository, Repository, TagCache};
//! use prw_output::types::{Metric, MetricType, Sample};
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! let repo = Arc::new(InMemoryRepository::new());
//! let ingester = Ingester::new(
//!     repo.clone(),
//!     Arc::new(TagCache::new()),
//!     Arc::new(PipelineMetrics::new()),
//! );
//!
//! let reqs = Metric::shared("http_reqs", MetricType::Counter);
//! let batch = vec![
//!     Sample::at(reqs.clone(), HashMap::new(), 1.0, 1_000),
//!     Sample::at(reqs, HashMap::new(), 1.0, 2_000),
//! ];
//!
//! let report = ingester.ingest(&[batch]);
//! assert_eq!(report.accepted, 2);
//! assert_eq!(repo.len(), 1);
//! ```

pub mod metrics;

pub use metrics::{PipelineMetrics, PipelineSnapshot};

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use crate::tsdb::{hash_key, Repository, TagCache, TagSet, TimeSeries};
use crate::types::{Sample, SampleContainer};

/// Outcome of one ingestion call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Samples applied to a sink
    pub accepted: u64,
    /// Samples rejected for carrying a non-finite value
    pub dropped: u64,
    /// Series created by this call
    pub series_created: u64,
}

impl IngestReport {
    /// Total samples seen
    pub fn total(&self) -> u64 {
        self.accepted + self.dropped
    }
}

/// Applies samples to the series store
pub struct Ingester {
    repository: Arc<dyn Repository>,
    tag_cache: Arc<TagCache>,
    metrics: Arc<PipelineMetrics>,
}

impl Ingester {
    /// Create an ingester writing into `repository`
    pub fn new(
        repository: Arc<dyn Repository>,
        tag_cache: Arc<TagCache>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            repository,
            tag_cache,
            metrics,
        }
    }

    /// Ingest every sample of every container
    ///
    /// Safe to call from many tasks at once; concurrent calls resolving the
    /// same identity share one series.
    pub fn ingest<C: SampleContainer>(&self, containers: &[C]) -> IngestReport {
        let mut report = IngestReport::default();
        // Series resolved earlier in this batch, skipping the store lock
        let mut resolved: HashMap<u64, Arc<TimeSeries>> = HashMap::new();

        for container in containers {
            for sample in container.samples() {
                if !sample.value.is_finite() {
                    trace!(
                        metric = %sample.metric.name,
                        value = sample.value,
                        "dropping non-finite sample"
                    );
                    report.dropped += 1;
                    continue;
                }

                let tags = self.canonical_tags(sample);
                let id = hash_key(&sample.metric.name, &tags);

                let series = match resolved.get(&id) {
                    Some(series) => Arc::clone(series),
                    None => {
                        let (series, created) = self.resolve(id, sample, tags);
                        if created {
                            report.series_created += 1;
                        }
                        resolved.insert(id, Arc::clone(&series));
                        series
                    },
                };

                series.add_point(sample.value, sample.timestamp_ms);
                report.accepted += 1;
            }
        }

        // Batch atomic updates once per call
        self.metrics.record_received(report.total());
        if report.dropped > 0 {
            self.metrics.record_dropped(report.dropped);
        }
        if report.series_created > 0 {
            self.metrics.record_series_created(report.series_created);
            debug!(
                "Created {} new series ({} total)",
                report.series_created,
                self.repository.len()
            );
        }

        report
    }

    /// Build the sorted tag set, skipping empty keys and values
    fn canonical_tags(&self, sample: &Sample) -> TagSet {
        let mut tags = TagSet::with_capacity(sample.tags.len());
        for (key, value) in &sample.tags {
            if key.is_empty() || value.is_empty() {
                continue;
            }
            tags.add(self.tag_cache.tag(key, value));
        }
        tags
    }

    fn resolve(&self, id: u64, sample: &Sample, tags: TagSet) -> (Arc<TimeSeries>, bool) {
        let mut tags = Some(tags);
        self.repository.get_or_insert_with(id, &mut || {
            TimeSeries::new(
                sample.metric.name.clone(),
                tags.take().unwrap_or_default(),
                sample.metric.kind,
            )
        })
    }
}
