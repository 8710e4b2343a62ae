//! Bounded LRU cache for decoded manifests.

use crate::DEFAULT_MANIFEST_CACHE_CAPACITY;
use floe_core::id::ManifestId;
use floe_core::manifest::Manifest;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Most-recently-used cache of decoded manifests, keyed by manifest id.
///
/// A hit moves the entry to the MRU position; inserting over an existing
/// key replaces the value and promotes it; inserting past capacity
/// evicts the least-recently-used entry. Lookups of absent keys do not
/// touch recency. The mutex makes this safe to share across concurrent
/// `get` calls and `resolve` views.
#[derive(Debug)]
pub struct ManifestCache {
    inner: Mutex<LruCache<ManifestId, Arc<Manifest>>>,
}

impl ManifestCache {
    /// Create a cache holding up to `capacity` manifests. A zero
    /// capacity falls back to the default.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .or(NonZeroUsize::new(DEFAULT_MANIFEST_CACHE_CAPACITY))
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            inner: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Look up a manifest, promoting it to most recently used.
    pub fn get(&self, id: &ManifestId) -> Option<Arc<Manifest>> {
        self.lock().get(id).cloned()
    }

    /// Insert a decoded manifest, evicting the LRU entry when full.
    pub fn insert(&self, id: ManifestId, manifest: Arc<Manifest>) {
        self.lock().put(id, manifest);
    }

    /// Number of cached manifests.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, LruCache<ManifestId, Arc<Manifest>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
