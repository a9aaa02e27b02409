//! Prometheus remote-write wire layer
//!
//! - `proto` - prost message definitions
//! - `mapper` - stored series to labelled records
//! - `client` - transport seam and HTTP implementation
//!
//! Payloads are protobuf-encoded `WriteRequest`s compressed with snappy in
//! the raw block format (not the framed stream format).

pub mod client;
pub mod mapper;
pub mod proto;

pub use client::{HttpWriteClient, RequestSigner, WriteClient};
pub use mapper::WireMapper;
pub use proto::WriteRequest;

use crate::error::{DecodeError, FlushError};

/// Label holding the metric name
pub const NAME_LABEL: &str = "__name__";

/// Prefix prepended to metric names unless configured otherwise
pub const DEFAULT_METRIC_PREFIX: &str = "k6_";

/// Encode and snappy-compress a write request
pub fn encode(request: &WriteRequest) -> Result<Vec<u8>, FlushError> {
    let raw = request.to_bytes();
    let compressed = snap::raw::Encoder::new().compress_vec(&raw)?;
    Ok(compressed)
}

/// Decompress and decode a payload produced by [`encode`]
pub fn decode(payload: &[u8]) -> Result<WriteRequest, DecodeError> {
    use prost::Message;

    let raw = snap::raw::Decoder::new().decompress_vec(payload)?;
    Ok(WriteRequest::decode(raw.as_slice())?)
}
