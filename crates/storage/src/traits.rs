//! Transport trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;

/// Options applied to every fetch: pass-through headers (e.g. auth) and
/// the cancellation token supplied by the caller at open time.
#[derive(Clone, Debug, Default)]
pub struct FetchOptions {
    pub headers: HashMap<String, String>,
    pub cancel: CancellationToken,
}

/// Byte-fetching abstraction the read path depends on.
///
/// Implementations must abort in-flight requests when the options'
/// cancellation token fires and report that as
/// [`StorageError::Cancelled`](crate::StorageError::Cancelled). No retry
/// policy belongs here; errors surface to the caller unchanged.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Fetch a full object. Non-2xx statuses are errors.
    async fn fetch(&self, url: &str, opts: &FetchOptions) -> StorageResult<Bytes>;

    /// Fetch `length` bytes starting at `offset`, via
    /// `Range: bytes={offset}-{offset+length-1}`. Both 200 and 206
    /// responses are accepted; a 200 reply is cut to the requested
    /// window.
    async fn fetch_range(
        &self,
        url: &str,
        offset: u64,
        length: u64,
        opts: &FetchOptions,
    ) -> StorageResult<Bytes>;
}
