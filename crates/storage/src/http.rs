//! HTTP transport backed by reqwest.

use crate::error::{StorageError, StorageResult};
use crate::traits::{FetchOptions, Transport};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// HTTP(S) object fetching over a shared reqwest client.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a transport with a fresh client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    /// Create a transport over a preconfigured client (proxies, TLS,
    /// timeouts are the caller's business).
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    fn request(&self, url: &str, opts: &FetchOptions) -> reqwest::RequestBuilder {
        let mut request = self.client.get(url);
        for (name, value) in &opts.headers {
            request = request.header(name, value);
        }
        request
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

/// Race a future against the cancellation token. An already-cancelled
/// token wins deterministically, before the request is issued.
async fn cancellable<F, T>(cancel: &CancellationToken, future: F) -> StorageResult<T>
where
    F: Future<Output = T>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(StorageError::Cancelled),
        out = future => Ok(out),
    }
}

fn http_error(status: StatusCode, url: &str) -> StorageError {
    StorageError::Http {
        status: status.as_u16(),
        status_text: status.canonical_reason().unwrap_or_default().to_string(),
        url: url.to_string(),
    }
}

fn request_error(url: &str) -> impl FnOnce(reqwest::Error) -> StorageError + '_ {
    move |source| StorageError::Request {
        url: url.to_string(),
        source,
    }
}

#[async_trait]
impl Transport for HttpTransport {
    #[instrument(skip(self, opts), fields(transport = "http"))]
    async fn fetch(&self, url: &str, opts: &FetchOptions) -> StorageResult<Bytes> {
        let response = cancellable(&opts.cancel, self.request(url, opts).send())
            .await?
            .map_err(request_error(url))?;
        let status = response.status();
        if !status.is_success() {
            return Err(http_error(status, url));
        }
        cancellable(&opts.cancel, response.bytes())
            .await?
            .map_err(request_error(url))
    }

    #[instrument(skip(self, opts), fields(transport = "http"))]
    async fn fetch_range(
        &self,
        url: &str,
        offset: u64,
        length: u64,
        opts: &FetchOptions,
    ) -> StorageResult<Bytes> {
        if length == 0 {
            return Ok(Bytes::new());
        }
        let end = offset.checked_add(length).ok_or_else(|| {
            StorageError::InvalidRange(format!("offset {offset} + length {length} overflows"))
        })?;

        // Range header uses an inclusive end
        let request = self
            .request(url, opts)
            .header(reqwest::header::RANGE, format!("bytes={}-{}", offset, end - 1));
        let response = cancellable(&opts.cancel, request.send())
            .await?
            .map_err(request_error(url))?;

        let status = response.status();
        if status != StatusCode::PARTIAL_CONTENT && status != StatusCode::OK {
            return Err(http_error(status, url));
        }

        let body = cancellable(&opts.cancel, response.bytes())
            .await?
            .map_err(request_error(url))?;

        if status == StatusCode::PARTIAL_CONTENT {
            return Ok(body);
        }

        // The server ignored the Range header and replied with the full
        // object; cut out the requested window.
        let got = body.len() as u64;
        if got < end {
            return Err(StorageError::ShortRange {
                url: url.to_string(),
                offset,
                length,
                got,
            });
        }
        Ok(body.slice(offset as usize..end as usize))
    }
}
