//! Transport error types.

use thiserror::Error;

/// Transport operation errors. These surface to the caller unchanged;
/// the read path never retries.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("HTTP {status} {status_text} for {url}")]
    Http {
        status: u16,
        status_text: String,
        url: String,
    },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid range: {0}")]
    InvalidRange(String),

    #[error("range response for {url} too short: got {got} bytes for {offset}+{length}")]
    ShortRange {
        url: String,
        offset: u64,
        length: u64,
        got: u64,
    },

    #[error("operation cancelled")]
    Cancelled,
}

/// Result type for transport operations.
pub type StorageResult<T> = std::result::Result<T, StorageError>;
