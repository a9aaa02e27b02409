//! Prometheus remote-write protobuf messages
//!
//! Hand-written prost definitions for the subset of `prompb` the write path
//! needs:
//!
//! ```protobuf
//! message WriteRequest {
//!   repeated TimeSeries timeseries = 1;
//! }
//!
//! message TimeSeries {
//!   repeated Label labels = 1;
//!   repeated Sample samples = 2;
//! }
//!
//! message Label {
//!   string name = 1;
//!   string value = 2;
//! }
//!
//! message Sample {
//!   double value = 1;
//!   int64 timestamp = 2;
//! }
//! ```

use prost::Message;

/// Batch of series sent in one request
#[derive(Clone, PartialEq, Message)]
pub struct WriteRequest {
    /// Series in the batch
    #[prost(message, repeated, tag = "1")]
    pub timeseries: Vec<TimeSeries>,
}

/// Label set plus samples
#[derive(Clone, PartialEq, Message)]
pub struct TimeSeries {
    /// Labels sorted by name, including `__name__`
    #[prost(message, repeated, tag = "1")]
    pub labels: Vec<Label>,
    /// Samples
    #[prost(message, repeated, tag = "2")]
    pub samples: Vec<Sample>,
}

/// Label name/value pair
#[derive(Clone, PartialEq, Message)]
pub struct Label {
    /// Label name
    #[prost(string, tag = "1")]
    pub name: String,
    /// Label value
    #[prost(string, tag = "2")]
    pub value: String,
}

/// Single sample
#[derive(Clone, PartialEq, Message)]
pub struct Sample {
    /// Sample value
    #[prost(double, tag = "1")]
    pub value: f64,
    /// Timestamp in milliseconds since the Unix epoch
    #[prost(int64, tag = "2")]
    pub timestamp: i64,
}

impl Label {
    /// Create a label
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl TimeSeries {
    /// Value of the `__name__` label, if present
    pub fn metric_name(&self) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.name == super::NAME_LABEL)
            .map(|l| l.value.as_str())
    }
}

impl WriteRequest {
    /// Protobuf-encode the request
    pub fn to_bytes(&self) -> Vec<u8> {
        self.encode_to_vec()
    }
}
