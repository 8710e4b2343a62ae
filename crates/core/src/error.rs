//! Error types for format decoding.

use thiserror::Error;

/// Format decoding error. Always fatal to the current operation; callers
/// never retry on these. Note that *absence* (missing node, missing chunk)
/// is not an error anywhere in this crate; only corruption is.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("bad magic bytes, not an icechunk file")]
    Magic,

    #[error("unsupported spec version {found} (latest supported: {latest})")]
    UnsupportedSpecVersion { found: u8, latest: u8 },

    #[error("unknown file type byte: {0}")]
    UnknownFileType(u8),

    #[error("unknown compression byte: {0}")]
    UnknownCompression(u8),

    #[error("expected a {expected} file, found {found}")]
    UnexpectedFileType { expected: &'static str, found: &'static str },

    #[error("truncated envelope: {len} bytes")]
    Truncated { len: usize },

    #[error("zstd decompression failed: {0}")]
    Decompression(std::io::Error),

    #[error("missing flatbuffers file identifier")]
    FileId,

    #[error("invalid base32 symbol: {0:?}")]
    InvalidBase32Symbol(char),

    #[error("invalid object id length: expected {expected} bytes, got {found}")]
    InvalidIdLength { expected: usize, found: usize },

    #[error("invalid ref document: {0}")]
    Ref(String),

    #[error("malformed table data: {0}")]
    Malformed(String),
}

/// Result type alias for decode operations.
pub type Result<T> = std::result::Result<T, FormatError>;
