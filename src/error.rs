//! Error types for the remote-write output

use thiserror::Error;

/// Main error type for the output
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    /// Series store error
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Remote write transport error
    #[error("Write error: {0}")]
    Write(#[from] WriteError),

    /// Flush pipeline error
    #[error("Flush error: {0}")]
    Flush(#[from] FlushError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Lifecycle misuse (double start, stop before start)
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),
}

/// Configuration errors
///
/// Raised while loading, merging or validating the output configuration.
/// All of them are fatal at startup.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config file could not be read
    #[error("Failed to read config file {path}: {source}")]
    Read {
        /// Path of the config file
        path: String,
        /// Underlying IO error
        source: std::io::Error,
    },

    /// JSON document could not be parsed
    #[error("Failed to parse JSON config: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML document could not be parsed
    #[error("Failed to parse TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// An environment variable carried a malformed value
    #[error("Invalid value for {name}: {message}")]
    InvalidEnv {
        /// Environment variable name
        name: String,
        /// Description of the problem
        message: String,
    },

    /// A field failed validation
    #[error("Invalid {field}: {message}")]
    Invalid {
        /// Field name being validated
        field: &'static str,
        /// Description of the problem
        message: String,
    },
}

/// Series store errors
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// A series with the same identity is already stored
    #[error("Series already exists: {0:#x}")]
    AlreadyExists(u64),
}

/// Remote write transport errors
#[derive(Error, Debug)]
pub enum WriteError {
    /// HTTP request could not be built or sent
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Endpoint answered with a non-success status
    #[error("Remote write endpoint returned {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Truncated response body
        body: String,
    },

    /// Request signing failed
    #[error("Request signing failed: {0}")]
    Signing(String),

    /// Client could not be constructed
    #[error("Client setup failed: {0}")]
    Setup(String),
}

/// Flush pipeline errors
///
/// A flush error drops the current batch; the pipeline continues on the
/// next tick.
#[derive(Error, Debug)]
pub enum FlushError {
    /// Snappy block compression failed
    #[error("Compression failed: {0}")]
    Compression(#[from] snap::Error),

    /// Transport failed to store the payload
    #[error("Store failed: {0}")]
    Transport(#[from] WriteError),
}

/// Failure to read back a remote-write payload
#[derive(Error, Debug)]
pub enum DecodeError {
    /// Payload is not a valid snappy block
    #[error("Decompression failed: {0}")]
    Snappy(#[from] snap::Error),

    /// Decompressed bytes are not a valid `WriteRequest`
    #[error("Protobuf decode failed: {0}")]
    Protobuf(#[from] prost::DecodeError),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
