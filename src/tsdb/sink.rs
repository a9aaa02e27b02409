//! Per-series aggregation sinks
//!
//! Every series owns exactly one sink, chosen from the metric kind when the
//! series is created. Sinks guard their own state with a `parking_lot`
//! lock, so observations for different series never contend and a flush
//! reading one sink only blocks writers of that same sink.
//!
//! # Sink Kinds
//!
//! | Kind    | `add(v)`                         | `value()`              |
//! |---------|----------------------------------|------------------------|
//! | Counter | `value += v` when `v >= 0`       | running sum            |
//! | Gauge   | `value = v`                      | last value             |
//! | Rate    | `total += 1`, `trues += (v > 0)` | `trues / total` or `0` |
//! | Trend   | record into t-digest and stats   | p95                    |
//!
//! Non-finite values are ignored by every sink.

use parking_lot::{RwLock, RwLockUpgradableReadGuard};
use tdigest::TDigest;

use crate::types::MetricType;

/// Number of centroids kept by the trend digest
pub const TREND_DIGEST_SIZE: usize = 100;

/// Number of raw values buffered before they are merged into the digest
pub const TREND_PENDING_CAPACITY: usize = 256;

// ============================================================================
// Sink
// ============================================================================

/// Aggregation strategy behind a series
#[derive(Debug)]
pub enum Sink {
    /// Monotonic counter
    Counter(CounterSink),
    /// Last-value gauge
    Gauge(GaugeSink),
    /// Ratio of non-zero observations
    Rate(RateSink),
    /// Value distribution
    Trend(TrendSink),
}

impl Sink {
    /// Create an empty sink for the metric kind
    pub fn for_kind(kind: MetricType) -> Self {
        match kind {
            MetricType::Counter => Sink::Counter(CounterSink::default()),
            MetricType::Gauge => Sink::Gauge(GaugeSink::default()),
            MetricType::Rate => Sink::Rate(RateSink::default()),
            MetricType::Trend => Sink::Trend(TrendSink::default()),
        }
    }

    /// Metric kind this sink aggregates
    pub fn kind(&self) -> MetricType {
        match self {
            Sink::Counter(_) => MetricType::Counter,
            Sink::Gauge(_) => MetricType::Gauge,
            Sink::Rate(_) => MetricType::Rate,
            Sink::Trend(_) => MetricType::Trend,
        }
    }

    /// Record an observation
    pub fn add(&self, value: f64) {
        match self {
            Sink::Counter(s) => s.add(value),
            Sink::Gauge(s) => s.add(value),
            Sink::Rate(s) => s.add(value),
            Sink::Trend(s) => s.add(value),
        }
    }

    /// Current aggregated value
    pub fn value(&self) -> f64 {
        match self {
            Sink::Counter(s) => s.value(),
            Sink::Gauge(s) => s.value(),
            Sink::Rate(s) => s.value(),
            Sink::Trend(s) => s.value(),
        }
    }
}

// ============================================================================
// Counter
// ============================================================================

/// Sum of non-negative increments
#[derive(Debug, Default)]
pub struct CounterSink {
    value: RwLock<f64>,
}

impl CounterSink {
    /// Add an increment; negative and non-finite increments are discarded
    pub fn add(&self, v: f64) {
        if !v.is_finite() || v < 0.0 {
            return;
        }
        *self.value.write() += v;
    }

    /// Running sum
    pub fn value(&self) -> f64 {
        *self.value.read()
    }
}

// ============================================================================
// Gauge
// ============================================================================

/// Last observed value
#[derive(Debug, Default)]
pub struct GaugeSink {
    value: RwLock<f64>,
}

impl GaugeSink {
    /// Replace the value
    pub fn add(&self, v: f64) {
        if !v.is_finite() {
            return;
        }
        *self.value.write() = v;
    }

    /// Last value, `0.0` before the first observation
    pub fn value(&self) -> f64 {
        *self.value.read()
    }
}

// ============================================================================
// Rate
// ============================================================================

#[derive(Debug, Default)]
struct RateState {
    total: u64,
    trues: u64,
}

/// Fraction of observations that were non-zero
#[derive(Debug, Default)]
pub struct RateSink {
    state: RwLock<RateState>,
}

impl RateSink {
    /// Count an observation; `v > 0` counts as true
    pub fn add(&self, v: f64) {
        if !v.is_finite() {
            return;
        }
        let mut state = self.state.write();
        state.total += 1;
        if v > 0.0 {
            state.trues += 1;
        }
    }

    /// `trues / total`, or `0.0` with no observations
    pub fn value(&self) -> f64 {
        let state = self.state.read();
        if state.total == 0 {
            return 0.0;
        }
        state.trues as f64 / state.total as f64
    }
}

// ============================================================================
// Trend
// ============================================================================

/// Consistent summary of a trend
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrendStats {
    /// Number of observations
    pub count: u64,
    /// Sum of observations
    pub sum: f64,
    /// Smallest observation
    pub min: f64,
    /// Largest observation
    pub max: f64,
    /// Arithmetic mean
    pub avg: f64,
    /// Estimated median
    pub med: f64,
    /// Estimated 90th percentile
    pub p90: f64,
    /// Estimated 95th percentile
    pub p95: f64,
}

#[derive(Debug)]
struct TrendState {
    digest: TDigest,
    pending: Vec<f64>,
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
    avg: f64,
}

impl TrendState {
    fn merge_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let batch = std::mem::replace(
            &mut self.pending,
            Vec::with_capacity(TREND_PENDING_CAPACITY),
        );
        self.digest = self.digest.merge_unsorted(batch);
    }

    fn quantile(&self, q: f64) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        // Small digests may interpolate past the observed range
        self.digest
            .estimate_quantile(q.clamp(0.0, 1.0))
            .clamp(self.min, self.max)
    }
}

impl Default for TrendState {
    fn default() -> Self {
        Self {
            digest: TDigest::new_with_size(TREND_DIGEST_SIZE),
            pending: Vec::with_capacity(TREND_PENDING_CAPACITY),
            count: 0,
            sum: 0.0,
            min: 0.0,
            max: 0.0,
            avg: 0.0,
        }
    }
}

/// Distribution of observed values
///
/// Count, sum, min, max and average are exact. Percentiles come from a
/// t-digest; raw values are staged in a bounded pending buffer and merged
/// into the digest in batches, either when the buffer fills or when a
/// percentile is read.
#[derive(Debug, Default)]
pub struct TrendSink {
    state: RwLock<TrendState>,
}

impl TrendSink {
    /// Record an observation
    pub fn add(&self, v: f64) {
        if !v.is_finite() {
            return;
        }
        let mut state = self.state.write();

        if state.count == 0 {
            state.min = v;
            state.max = v;
        } else {
            if v < state.min {
                state.min = v;
            }
            if v > state.max {
                state.max = v;
            }
        }
        state.count += 1;
        state.sum += v;
        state.avg = state.sum / state.count as f64;

        state.pending.push(v);
        if state.pending.len() >= TREND_PENDING_CAPACITY {
            state.merge_pending();
        }
    }

    /// Estimated 95th percentile
    pub fn value(&self) -> f64 {
        self.percentile(0.95)
    }

    /// Number of observations
    pub fn count(&self) -> u64 {
        self.state.read().count
    }

    /// Sum of observations
    pub fn sum(&self) -> f64 {
        self.state.read().sum
    }

    /// Smallest observation
    pub fn min(&self) -> f64 {
        self.state.read().min
    }

    /// Largest observation
    pub fn max(&self) -> f64 {
        self.state.read().max
    }

    /// Arithmetic mean
    pub fn avg(&self) -> f64 {
        self.state.read().avg
    }

    /// Estimated median
    pub fn med(&self) -> f64 {
        self.percentile(0.5)
    }

    /// Estimated quantile for `q` in `[0, 1]`
    pub fn percentile(&self, q: f64) -> f64 {
        let state = self.merged();
        state.quantile(q)
    }

    /// Snapshot every statistic under a single lock acquisition
    pub fn stats(&self) -> TrendStats {
        let state = self.merged();
        TrendStats {
            count: state.count,
            sum: state.sum,
            min: state.min,
            max: state.max,
            avg: state.avg,
            med: state.quantile(0.5),
            p90: state.quantile(0.90),
            p95: state.quantile(0.95),
        }
    }

    /// Read guard over a state whose pending buffer has been merged
    fn merged(&self) -> RwLockUpgradableReadGuard<'_, TrendState> {
        let guard = self.state.upgradable_read();
        if guard.pending.is_empty() {
            return guard;
        }
        let mut write = RwLockUpgradableReadGuard::upgrade(guard);
        write.merge_pending();
        parking_lot::RwLockWriteGuard::downgrade_to_upgradable(write)
    }
}
