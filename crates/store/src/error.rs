//! Store error types.

use floe_core::FormatError;
use floe_storage::StorageError;
use thiserror::Error;

/// Errors surfaced by the store facade. Absence (missing node, no
/// covering manifest, missing chunk) is *not* an error; `get` returns
/// `Ok(None)` for those.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("bad zarr key: {0}")]
    BadKey(String),
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
