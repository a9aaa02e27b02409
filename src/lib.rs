//! prw-output - Aggregating Prometheus remote-write output for load-test metrics
//!
//! This library turns a stream of load-test observations into Prometheus
//! remote-write requests:
//! - Deduplication of samples into one series per metric name and tag set
//! - Running aggregates per series (counter, gauge, rate, t-digest trend)
//! - Periodic single-flight flush: protobuf encoding, snappy compression, HTTP delivery
//! - Configuration from JSON/TOML, environment variables and argument strings

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

/// Configuration management with JSON, TOML and environment support
pub mod config;

/// In-memory time-series aggregation store
/// Provides canonical tag sets, identity hashing, per-series sinks and the series repository
pub mod tsdb;

/// Ingestion path from raw samples to sink updates, plus pipeline self-metrics
pub mod ingestion;

/// Prometheus remote-write wire format, mapping and transport
pub mod remote;

/// Periodic single-flight flush of the series store
pub mod flusher;

/// Output lifecycle tying buffer, collector, store and flusher together
pub mod output;

// Re-export main types
pub use config::Config;
pub use error::{Error, Result};
pub use flusher::{FlushOutcome, Flusher};
pub use output::Output;
pub use types::{Metric, MetricType, Sample, SampleContainer};
