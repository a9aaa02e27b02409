//! Pipeline self-metrics
//!
//! Counters describing what the output has done with the observations it
//! received: how many were aggregated or dropped, how many series exist, and
//! how each flush cycle ended.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Pipeline metrics collector
///
/// Thread-safe; every counter is an atomic updated with relaxed ordering.
/// Owned by one output instance rather than registered globally.
#[derive(Debug)]
pub struct PipelineMetrics {
    // === Ingestion Counters ===
    /// Samples handed to the ingestion path
    samples_received: AtomicU64,
    /// Samples rejected (non-finite values)
    samples_dropped: AtomicU64,
    /// Series created in the store
    series_created: AtomicU64,

    // === Flush Outcomes ===
    /// Flushes that delivered a payload
    flushes_sent: AtomicU64,
    /// Flushes skipped because the store was empty
    flushes_skipped: AtomicU64,
    /// Flushes that failed to encode or deliver
    flushes_failed: AtomicU64,
    /// Flushes skipped because another flush was running
    flushes_overlapped: AtomicU64,
    /// Flushes that took longer than the push interval
    flushes_overrun: AtomicU64,

    // === Payload Counters ===
    /// Remote-write records delivered
    records_sent: AtomicU64,
    /// Compressed bytes delivered
    bytes_sent: AtomicU64,

    // === Latency Tracking ===
    /// Sum of flush latencies in microseconds
    flush_latency_sum_us: AtomicU64,
    /// Number of flush latency samples
    flush_latency_count: AtomicU64,
    /// Slowest flush in microseconds
    flush_latency_max_us: AtomicU64,

    /// When metrics collection started
    start_time: Instant,
}

impl PipelineMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            samples_received: AtomicU64::new(0),
            samples_dropped: AtomicU64::new(0),
            series_created: AtomicU64::new(0),
            flushes_sent: AtomicU64::new(0),
            flushes_skipped: AtomicU64::new(0),
            flushes_failed: AtomicU64::new(0),
            flushes_overlapped: AtomicU64::new(0),
            flushes_overrun: AtomicU64::new(0),
            records_sent: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            flush_latency_sum_us: AtomicU64::new(0),
            flush_latency_count: AtomicU64::new(0),
            flush_latency_max_us: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    // === Recording Methods ===

    /// Record samples received
    #[inline]
    pub fn record_received(&self, count: u64) {
        let _ = self
            .samples_received
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_add(count))
            });
    }

    /// Record samples dropped
    #[inline]
    pub fn record_dropped(&self, count: u64) {
        self.samples_dropped.fetch_add(count, Ordering::Relaxed);
    }

    /// Record series created
    #[inline]
    pub fn record_series_created(&self, count: u64) {
        self.series_created.fetch_add(count, Ordering::Relaxed);
    }

    /// Record a delivered flush
    #[inline]
    pub fn record_flush_sent(&self, records: u64, bytes: u64) {
        self.flushes_sent.fetch_add(1, Ordering::Relaxed);
        let _ = self
            .records_sent
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_add(records))
            });
        let _ = self
            .bytes_sent
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_add(bytes))
            });
    }

    /// Record a flush skipped on an empty store
    #[inline]
    pub fn record_flush_skipped(&self) {
        self.flushes_skipped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed flush
    #[inline]
    pub fn record_flush_failed(&self) {
        self.flushes_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a flush skipped because another one was in flight
    #[inline]
    pub fn record_flush_overlapped(&self) {
        self.flushes_overlapped.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a flush that outlasted the push interval
    #[inline]
    pub fn record_flush_overrun(&self) {
        self.flushes_overrun.fetch_add(1, Ordering::Relaxed);
    }

    /// Record how long a flush took
    #[inline]
    pub fn record_flush_latency(&self, latency: Duration) {
        let latency_us = latency.as_micros() as u64;
        let _ = self.flush_latency_sum_us.fetch_update(
            Ordering::Relaxed,
            Ordering::Relaxed,
            |current| Some(current.saturating_add(latency_us)),
        );
        self.flush_latency_count.fetch_add(1, Ordering::Relaxed);
        self.flush_latency_max_us
            .fetch_max(latency_us, Ordering::Relaxed);
    }

    // === Query Methods ===

    /// Get total samples received
    pub fn samples_received(&self) -> u64 {
        self.samples_received.load(Ordering::Relaxed)
    }

    /// Get total samples dropped
    pub fn samples_dropped(&self) -> u64 {
        self.samples_dropped.load(Ordering::Relaxed)
    }

    /// Get total series created
    pub fn series_created(&self) -> u64 {
        self.series_created.load(Ordering::Relaxed)
    }

    /// Get total delivered flushes
    pub fn flushes_sent(&self) -> u64 {
        self.flushes_sent.load(Ordering::Relaxed)
    }

    /// Get total failed flushes
    pub fn flushes_failed(&self) -> u64 {
        self.flushes_failed.load(Ordering::Relaxed)
    }

    /// Get average flush latency in microseconds
    pub fn avg_flush_latency_us(&self) -> u64 {
        let sum = self.flush_latency_sum_us.load(Ordering::Relaxed);
        let count = self.flush_latency_count.load(Ordering::Relaxed);
        if count > 0 {
            sum / count
        } else {
            0
        }
    }

    /// Get uptime since metrics collection started
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Get a complete metrics snapshot
    pub fn snapshot(&self) -> PipelineSnapshot {
        PipelineSnapshot {
            samples_received: self.samples_received.load(Ordering::Relaxed),
            samples_dropped: self.samples_dropped.load(Ordering::Relaxed),
            series_created: self.series_created.load(Ordering::Relaxed),
            flushes_sent: self.flushes_sent.load(Ordering::Relaxed),
            flushes_skipped: self.flushes_skipped.load(Ordering::Relaxed),
            flushes_failed: self.flushes_failed.load(Ordering::Relaxed),
            flushes_overlapped: self.flushes_overlapped.load(Ordering::Relaxed),
            flushes_overrun: self.flushes_overrun.load(Ordering::Relaxed),
            records_sent: self.records_sent.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            avg_flush_latency_us: self.avg_flush_latency_us(),
            max_flush_latency_us: self.flush_latency_max_us.load(Ordering::Relaxed),
            uptime: self.uptime(),
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of [`PipelineMetrics`]
#[derive(Debug, Clone, Default)]
pub struct PipelineSnapshot {
    /// Samples handed to the ingestion path
    pub samples_received: u64,
    /// Samples rejected
    pub samples_dropped: u64,
    /// Series created
    pub series_created: u64,
    /// Delivered flushes
    pub flushes_sent: u64,
    /// Flushes skipped on an empty store
    pub flushes_skipped: u64,
    /// Failed flushes
    pub flushes_failed: u64,
    /// Flushes skipped while another was running
    pub flushes_overlapped: u64,
    /// Flushes slower than the push interval
    pub flushes_overrun: u64,
    /// Records delivered
    pub records_sent: u64,
    /// Compressed bytes delivered
    pub bytes_sent: u64,
    /// Average flush latency in microseconds
    pub avg_flush_latency_us: u64,
    /// Slowest flush in microseconds
    pub max_flush_latency_us: u64,
    /// Time since metrics collection started
    pub uptime: Duration,
}

impl PipelineSnapshot {
    /// Fraction of received samples that were dropped (0.0 - 1.0)
    pub fn drop_rate(&self) -> f64 {
        if self.samples_received > 0 {
            self.samples_dropped as f64 / self.samples_received as f64
        } else {
            0.0
        }
    }

    /// Fraction of attempted flushes that failed (0.0 - 1.0)
    pub fn flush_failure_rate(&self) -> f64 {
        let attempted = self.flushes_sent + self.flushes_failed;
        if attempted > 0 {
            self.flushes_failed as f64 / attempted as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = PipelineMetrics::new();
        metrics.record_received(10);
        metrics.record_dropped(2);
        metrics.record_series_created(3);
        metrics.record_flush_sent(9, 128);
        metrics.record_flush_failed();

        let snap = metrics.snapshot();
        assert_eq!(snap.samples_received, 10);
        assert_eq!(snap.samples_dropped, 2);
        assert_eq!(snap.series_created, 3);
        assert_eq!(snap.records_sent, 9);
        assert_eq!(snap.bytes_sent, 128);
        assert!((snap.drop_rate() - 0.2).abs() < 1e-12);
        assert!((snap.flush_failure_rate() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_flush_latency() {
        let metrics = PipelineMetrics::new();
        metrics.record_flush_latency(Duration::from_micros(100));
        metrics.record_flush_latency(Duration::from_micros(300));

        let snap = metrics.snapshot();
        assert_eq!(snap.avg_flush_latency_us, 200);
        assert_eq!(snap.max_flush_latency_us, 300);
    }

    #[test]
    fn test_empty_rates() {
        let snap = PipelineMetrics::default().snapshot();
        assert_eq!(snap.drop_rate(), 0.0);
        assert_eq!(snap.flush_failure_rate(), 0.0);
    }
}
