//! Core observation types consumed by the output
//!
//! This module defines the data handed over by the load generator:
//!
//! # Key Types
//!
//! - **`MetricType`**: The aggregation kind of a metric (Counter, Gauge, Rate, Trend)
//! - **`Metric`**: A named metric with its kind, shared between samples
//! - **`Sample`**: A single observation (metric, tags, value, timestamp)
//! - **`SampleContainer`**: Anything that yields a slice of samples
//!
//! # Example
//!
//! ```rust
//! use prw_output::types::{Metric, MetricType, Sample, SampleContainer};
//! use std::collections::HashMap;
//!
//! let reqs = Metric::shared("http_reqs", MetricType::Counter);
//! let mut tags = HashMap::new();
//! tags.insert("method".to_string(), "GET".to_string());
//!
//! let sample = Sample::at(reqs, tags, 1.0, 1_700_000_000_000);
//! assert_eq!(sample.samples().len(), 1);
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Aggregation kind of a metric
///
/// Resolved once when a series is created and never re-inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricType {
    /// Monotonic sum of non-negative increments
    Counter,
    /// Last value wins
    Gauge,
    /// Ratio of non-zero observations
    Rate,
    /// Distribution of observed values
    Trend,
}

impl fmt::Display for MetricType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MetricType::Counter => "counter",
            MetricType::Gauge => "gauge",
            MetricType::Rate => "rate",
            MetricType::Trend => "trend",
        };
        f.write_str(name)
    }
}

/// A named metric
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Metric {
    /// Metric name as emitted by the load generator
    pub name: String,
    /// Aggregation kind
    pub kind: MetricType,
}

impl Metric {
    /// Create a metric
    pub fn new(name: impl Into<String>, kind: MetricType) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    /// Create a metric wrapped in an `Arc` for sharing between samples
    pub fn shared(name: impl Into<String>, kind: MetricType) -> Arc<Self> {
        Arc::new(Self::new(name, kind))
    }
}

/// A single observation
#[derive(Debug, Clone)]
pub struct Sample {
    /// Metric the observation belongs to
    pub metric: Arc<Metric>,
    /// Raw tag map (unsorted, may contain empty keys or values)
    pub tags: HashMap<String, String>,
    /// Observed value
    pub value: f64,
    /// Observation time in milliseconds since the Unix epoch
    pub timestamp_ms: i64,
}

impl Sample {
    /// Create a sample stamped with the current wall-clock time
    pub fn new(metric: Arc<Metric>, tags: HashMap<String, String>, value: f64) -> Self {
        Self::at(metric, tags, value, chrono::Utc::now().timestamp_millis())
    }

    /// Create a sample with an explicit timestamp (milliseconds)
    pub fn at(
        metric: Arc<Metric>,
        tags: HashMap<String, String>,
        value: f64,
        timestamp_ms: i64,
    ) -> Self {
        Self {
            metric,
            tags,
            value,
            timestamp_ms,
        }
    }
}

/// A container yielding zero or more samples
///
/// The load generator hands samples over in containers; a container may be
/// a single sample or a group of samples sharing an emission point.
pub trait SampleContainer: Send + Sync {
    /// The samples held by this container
    fn samples(&self) -> &[Sample];
}

impl SampleContainer for Sample {
    fn samples(&self) -> &[Sample] {
        std::slice::from_ref(self)
    }
}

impl SampleContainer for Vec<Sample> {
    fn samples(&self) -> &[Sample] {
        self.as_slice()
    }
}

impl<T: SampleContainer + ?Sized> SampleContainer for Box<T> {
    fn samples(&self) -> &[Sample] {
        (**self).samples()
    }
}

impl<T: SampleContainer + ?Sized> SampleContainer for Arc<T> {
    fn samples(&self) -> &[Sample] {
        (**self).samples()
    }
}
