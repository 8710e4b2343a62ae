//! Zarr-facing store facade over an Icechunk repository.
//!
//! [`Store::open`] resolves a ref to a snapshot and retains it; after
//! that, [`Store::get`] serves Zarr keys: `zarr.json` documents are
//! synthesised from the snapshot, chunk keys go through manifest
//! selection by extent, the manifest LRU cache, and a byte-range fetch.

pub mod cache;
pub mod error;
pub mod key;
mod store;

pub use cache::ManifestCache;
pub use error::{StoreError, StoreResult};
pub use key::Key;
pub use store::{OpenOptions, Store};

/// Decoded manifests kept in memory per store, unless configured.
pub const DEFAULT_MANIFEST_CACHE_CAPACITY: usize = 100;
