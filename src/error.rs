//! Error types for the MinIO metrics plugin

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that abort a metrics cycle
#[derive(Error, Debug)]
pub enum Error {
    /// Connection, TLS or body read failure
    #[error("HTTP request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Metrics endpoint answered with a non-success status
    #[error("unexpected status code {status} from {url}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    /// Malformed exposition text
    #[error("text format parsing error in line {line}: {msg}")]
    Parse { line: usize, msg: String },

    /// Response body is not valid UTF-8
    #[error("metrics body is not valid UTF-8 near line {line}")]
    Utf8 { line: usize },

    /// Histogram count that is not an unsigned integer
    #[error("failed to convert {key} value {value:?}: {source}")]
    InvalidCount {
        key: String,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    /// A metric the derived values depend on is absent or has the wrong type
    #[error("{key} not found in stat (expected {expected})")]
    MissingMetric { key: String, expected: &'static str },

    /// The fetch task panicked or was cancelled
    #[error("metrics fetch task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Counter cache (de)serialization error
    #[error("counter cache is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}
