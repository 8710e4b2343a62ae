//! Byte transport and URL helpers for floe.
//!
//! This crate provides:
//! - The [`Transport`] trait the read path depends on: full-object fetch
//!   and byte-range fetch, with header pass-through and cancellation
//! - [`HttpTransport`], the reqwest-backed implementation
//! - [`RepoUrls`] for composing snapshot / manifest / chunk / ref URLs
//! - Cloud scheme translation for virtual chunk locations
//!   (`gs://`, `s3://`)

pub mod error;
pub mod http;
pub mod traits;
pub mod urls;

pub use error::{StorageError, StorageResult};
pub use http::HttpTransport;
pub use traits::{FetchOptions, Transport};
pub use urls::{
    DEFAULT_S3_REGION, RepoUrls, translate_gcs_url, translate_s3_url, translate_url,
};
