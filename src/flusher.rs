//! Periodic flush pipeline
//!
//! Drains the aggregated state of the series store to the remote-write
//! endpoint on a fixed cadence.
//!
//! # Flush Cycle
//!
//! ```text
//! Repository::get_series ──► WireMapper::map ──► WriteRequest
//!                                                     │
//!                                       prost encode + snappy block
//!                                                     │
//!                                           WriteClient::store
//! ```
//!
//! # Single Flight
//!
//! At most one flush runs at a time. The timer task awaits each flush
//! before waiting for its next tick, and ticks missed during a slow flush
//! are delayed rather than bunched up. Manual [`Flusher::flush_once`] calls
//! racing with the timer (or each other) are skipped with a warning.
//!
//! There is no retry: a failed batch is logged and dropped, and the next
//! cycle sends the then-current aggregates.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::error::FlushError;
use crate::ingestion::PipelineMetrics;
use crate::remote::{self, WireMapper, WriteClient, WriteRequest};
use crate::tsdb::Repository;

// ============================================================================
// Outcome
// ============================================================================

/// Result of one flush attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Payload delivered
    Sent {
        /// Series drained from the store
        series: usize,
        /// Remote-write records in the payload
        records: usize,
        /// Compressed payload size
        bytes: usize,
    },
    /// Store was empty, nothing sent
    Empty,
    /// Another flush was in flight
    Overlapped,
    /// Encoding or delivery failed, batch dropped
    Failed,
}

/// Clears the in-flight flag when a flush ends, even if it is cancelled
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ============================================================================
// Flusher
// ============================================================================

/// Periodic single-flight flusher
pub struct Flusher {
    repository: Arc<dyn Repository>,
    mapper: WireMapper,
    client: Arc<dyn WriteClient>,
    metrics: Arc<PipelineMetrics>,
    period: Duration,
    in_flight: AtomicBool,
}

impl Flusher {
    /// Create a flusher draining `repository` into `client` every `period`
    pub fn new(
        repository: Arc<dyn Repository>,
        mapper: WireMapper,
        client: Arc<dyn WriteClient>,
        metrics: Arc<PipelineMetrics>,
        period: Duration,
    ) -> Self {
        Self {
            repository,
            mapper,
            client,
            metrics,
            period,
            in_flight: AtomicBool::new(false),
        }
    }

    /// Flush period
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Whether a flush is currently running
    pub fn is_flushing(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run one flush cycle
    ///
    /// Never returns an error: failures are logged, counted and reported as
    /// [`FlushOutcome::Failed`].
    pub async fn flush_once(&self) -> FlushOutcome {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!("Skipping the flush operation, the previous one is still in progress");
            self.metrics.record_flush_overlapped();
            return FlushOutcome::Overlapped;
        }
        let _guard = InFlight(&self.in_flight);

        let start = Instant::now();
        let outcome = match self.flush_series().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, endpoint = self.client.endpoint(), "Failed to store time series");
                self.metrics.record_flush_failed();
                FlushOutcome::Failed
            },
        };

        if outcome == FlushOutcome::Empty {
            return outcome;
        }

        let elapsed = start.elapsed();
        self.metrics.record_flush_latency(elapsed);
        if elapsed > self.period {
            // Nothing buffers between cycles, so a slow endpoint loses samples
            warn!(
                elapsed = ?elapsed,
                period = ?self.period,
                "Remote write took longer than the flush period, some samples may be dropped"
            );
            self.metrics.record_flush_overrun();
        } else {
            debug!(elapsed = ?elapsed, "Remote write completed");
        }

        outcome
    }

    async fn flush_series(&self) -> Result<FlushOutcome, FlushError> {
        let series = self.repository.get_series();
        if series.is_empty() {
            debug!("Skipping the flush operation, no time series found");
            self.metrics.record_flush_skipped();
            return Ok(FlushOutcome::Empty);
        }

        debug!(nts = series.len(), "Preparing time series for flushing");

        let flush_time_ms = chrono::Utc::now().timestamp_millis();
        let timeseries: Vec<_> = series
            .iter()
            .flat_map(|s| self.mapper.map(s, flush_time_ms))
            .collect();
        let records = timeseries.len();

        let payload = remote::encode(&WriteRequest { timeseries })?;
        let bytes = payload.len();

        self.client.store(payload).await?;
        self.metrics.record_flush_sent(records as u64, bytes as u64);

        Ok(FlushOutcome::Sent {
            series: series.len(),
            records,
            bytes,
        })
    }

    /// Flush every period until `shutdown` fires or its sender is dropped
    ///
    /// The first flush happens one full period after the call. A flush in
    /// progress when shutdown arrives runs to completion.
    pub async fn run(&self, mut shutdown: mpsc::Receiver<()>) {
        let mut ticker =
            tokio::time::interval_at(tokio::time::Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            period_ms = self.period.as_millis() as u64,
            client = self.client.name(),
            endpoint = self.client.endpoint(),
            "Series flusher started"
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!("Series flusher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    self.flush_once().await;
                }
            }
        }

        info!("Series flusher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::WriteError;
    use crate::tsdb::{InMemoryRepository, TagSet, TimeSeries};
    use crate::types::MetricType;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        payloads: Mutex<Vec<Vec<u8>>>,
        fail: bool,
    }

    #[async_trait]
    impl WriteClient for Recorder {
        async fn store(&self, payload: Vec<u8>) -> Result<(), WriteError> {
            if self.fail {
                return Err(WriteError::Status {
                    status: 500,
                    body: "boom".to_string(),
                });
            }
            self.payloads.lock().push(payload);
            Ok(())
        }

        fn name(&self) -> &str {
            "recorder"
        }

        fn endpoint(&self) -> &str {
            "memory://"
        }
    }

    fn flusher(repo: Arc<InMemoryRepository>, client: Arc<Recorder>) -> (Flusher, Arc<PipelineMetrics>) {
        let metrics = Arc::new(PipelineMetrics::new());
        let flusher = Flusher::new(
            repo,
            WireMapper::default(),
            client,
            Arc::clone(&metrics),
            Duration::from_secs(1),
        );
        (flusher, metrics)
    }

    #[tokio::test]
    async fn test_empty_store_skips_network() {
        let client = Arc::new(Recorder::default());
        let (flusher, metrics) = flusher(Arc::new(InMemoryRepository::new()), Arc::clone(&client));

        assert_eq!(flusher.flush_once().await, FlushOutcome::Empty);
        assert!(client.payloads.lock().is_empty());
        assert_eq!(metrics.snapshot().flushes_skipped, 1);
    }

    #[tokio::test]
    async fn test_sends_decodable_payload() {
        let repo = Arc::new(InMemoryRepository::new());
        let series = Arc::new(TimeSeries::new("vus", TagSet::new(), MetricType::Gauge));
        series.add_point(12.0, 1_000);
        repo.insert_series(series).unwrap();

        let client = Arc::new(Recorder::default());
        let (flusher, metrics) = flusher(repo, Arc::clone(&client));

        let outcome = flusher.flush_once().await;
        assert!(matches!(outcome, FlushOutcome::Sent { series: 1, records: 1, .. }));

        let payloads = client.payloads.lock();
        let request = remote::decode(&payloads[0]).unwrap();
        assert_eq!(request.timeseries[0].metric_name(), Some("k6_vus"));
        assert_eq!(request.timeseries[0].samples[0].value, 12.0);
        assert_eq!(metrics.flushes_sent(), 1);
        assert!(!flusher.is_flushing());
    }

    #[tokio::test]
    async fn test_failure_is_reported_not_raised() {
        let repo = Arc::new(InMemoryRepository::new());
        repo.insert_series(Arc::new(TimeSeries::new("vus", TagSet::new(), MetricType::Gauge)))
            .unwrap();

        let client = Arc::new(Recorder {
            fail: true,
            ..Recorder::default()
        });
        let (flusher, metrics) = flusher(repo, client);

        assert_eq!(flusher.flush_once().await, FlushOutcome::Failed);
        assert_eq!(flusher.flush_once().await, FlushOutcome::Failed);
        assert_eq!(metrics.flushes_failed(), 2);
        assert!(!flusher.is_flushing());
    }
}
