//! The store facade: open a repository at a ref, serve Zarr keys.

use crate::cache::ManifestCache;
use crate::error::StoreResult;
use crate::key::{Key, parse_key};
use crate::DEFAULT_MANIFEST_CACHE_CAPACITY;
use bytes::Bytes;
use floe_core::envelope::{self, FileType};
use floe_core::id::{ManifestId, SnapshotId};
use floe_core::manifest::{self, ChunkPayload, Manifest, is_chunk_in_extent};
use floe_core::refs::RefSelector;
use floe_core::snapshot::{self, NodeData, NodeSnapshot, Snapshot};
use floe_core::{FormatError, zarr};
use floe_storage::urls::DEFAULT_S3_REGION;
use floe_storage::{FetchOptions, RepoUrls, Transport, translate_url};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Options for [`Store::open`].
#[derive(Clone, Debug)]
pub struct OpenOptions {
    /// Which snapshot to open: a branch (default `main`), a tag, or an
    /// explicit snapshot id.
    pub reference: RefSelector,
    /// Headers passed through on every request (e.g. auth).
    pub headers: HashMap<String, String>,
    /// Region used when translating `s3://` virtual chunk locations.
    pub s3_region: Option<String>,
    /// Capacity of the decoded-manifest LRU cache.
    pub manifest_cache_capacity: usize,
    /// Cancellation token flowing into every I/O call this store makes.
    pub cancel: CancellationToken,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            reference: RefSelector::default(),
            headers: HashMap::new(),
            s3_region: None,
            manifest_cache_capacity: DEFAULT_MANIFEST_CACHE_CAPACITY,
            cancel: CancellationToken::new(),
        }
    }
}

struct Shared {
    transport: Arc<dyn Transport>,
    urls: RepoUrls,
    snapshot: Arc<Snapshot>,
    manifests: ManifestCache,
    fetch: FetchOptions,
    s3_region: String,
}

/// A read-only Zarr store over one repository snapshot.
///
/// Cheap to clone via [`Store::resolve`]: views share the snapshot, the
/// transport and the manifest cache, and differ only in the base path
/// prepended to every key.
#[derive(Clone)]
pub struct Store {
    shared: Arc<Shared>,
    base_path: String,
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("base_path", &self.base_path)
            .finish_non_exhaustive()
    }
}

impl Store {
    /// Open a repository: resolve the configured ref to a snapshot id,
    /// fetch and decode the snapshot, and retain it for the lifetime of
    /// the store.
    #[instrument(skip(transport, options))]
    pub async fn open(
        root_url: &str,
        transport: Arc<dyn Transport>,
        options: OpenOptions,
    ) -> StoreResult<Self> {
        let urls = RepoUrls::new(root_url);
        let fetch = FetchOptions {
            headers: options.headers,
            cancel: options.cancel,
        };

        let snapshot_id =
            resolve_ref(transport.as_ref(), &urls, &options.reference, &fetch).await?;
        tracing::debug!(snapshot = %snapshot_id, "resolved ref");

        let raw = transport.fetch(&urls.snapshot_url(&snapshot_id), &fetch).await?;
        let file = envelope::decode_file(&raw).await?;
        if file.envelope.file_type != FileType::Snapshot {
            return Err(FormatError::UnexpectedFileType {
                expected: FileType::Snapshot.name(),
                found: file.envelope.file_type.name(),
            }
            .into());
        }
        let snapshot = snapshot::decode_snapshot(&file.payload)?;
        tracing::debug!(nodes = snapshot.nodes().len(), "snapshot decoded");

        Ok(Self {
            shared: Arc::new(Shared {
                transport,
                urls,
                snapshot: Arc::new(snapshot),
                manifests: ManifestCache::new(options.manifest_cache_capacity),
                fetch,
                s3_region: options
                    .s3_region
                    .unwrap_or_else(|| DEFAULT_S3_REGION.to_string()),
            }),
            base_path: String::new(),
        })
    }

    /// Serve a Zarr key. Missing nodes, manifests and chunks return
    /// `Ok(None)`; only corruption and I/O failures are errors.
    pub async fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        match parse_key(&self.full_key(key))? {
            Key::Metadata { path } => self.get_metadata(&path),
            Key::Chunk { path, coords } => self.get_chunk(&path, &coords).await,
        }
    }

    /// A view of the same store rooted at `subpath`. The snapshot, the
    /// transport and the manifest cache are shared; only the base path
    /// differs.
    pub fn resolve(&self, subpath: &str) -> Store {
        let joined = format!("{}/{}", self.base_path, subpath);
        Store {
            shared: self.shared.clone(),
            base_path: canonicalize_base_path(&joined),
        }
    }

    /// First path segments of nodes strictly under `path` (relative to
    /// this view's base path), sorted and deduplicated.
    pub fn list_children(&self, path: &str) -> Vec<String> {
        let prefix = canonicalize_base_path(&self.full_key(path));
        let mut children = BTreeSet::new();
        for node in self.shared.snapshot.nodes() {
            let below = if prefix.is_empty() {
                Some(node.path.as_str())
            } else {
                node.path
                    .strip_prefix(&prefix)
                    .and_then(|rest| rest.strip_prefix('/'))
            };
            if let Some(below) = below
                && let Some(first) = below.split('/').next()
                && !first.is_empty()
            {
                children.insert(first.to_string());
            }
        }
        children.into_iter().collect()
    }

    /// All nodes of the retained snapshot, ascending by path.
    pub fn list_nodes(&self) -> &[NodeSnapshot] {
        self.shared.snapshot.nodes()
    }

    /// The retained snapshot.
    pub fn snapshot(&self) -> Arc<Snapshot> {
        self.shared.snapshot.clone()
    }

    fn full_key(&self, key: &str) -> String {
        if self.base_path.is_empty() {
            key.to_string()
        } else if key.is_empty() {
            self.base_path.clone()
        } else {
            format!("{}/{}", self.base_path, key)
        }
    }

    fn get_metadata(&self, path: &str) -> StoreResult<Option<Bytes>> {
        let Some(node) = self.shared.snapshot.find_node(path) else {
            return Ok(None);
        };
        Ok(Some(zarr::node_document(node)?))
    }

    #[instrument(skip(self))]
    async fn get_chunk(&self, path: &str, coords: &[u32]) -> StoreResult<Option<Bytes>> {
        let Some(node) = self.shared.snapshot.find_node(path) else {
            return Ok(None);
        };
        let NodeData::Array(array) = &node.node_data else {
            return Ok(None);
        };
        let Some(manifest_ref) = array
            .manifests
            .iter()
            .find(|m| is_chunk_in_extent(coords, &m.extents))
        else {
            return Ok(None);
        };

        let manifest = self.manifest(&manifest_ref.id).await?;
        let Some(payload) = manifest.find_chunk(&node.id, coords) else {
            return Ok(None);
        };

        let shared = &self.shared;
        let bytes = match payload {
            ChunkPayload::Inline(data) => data.clone(),
            ChunkPayload::Native(native) => {
                shared
                    .transport
                    .fetch_range(
                        &shared.urls.chunk_url(&native.id),
                        native.offset,
                        native.length,
                        &shared.fetch,
                    )
                    .await?
            }
            ChunkPayload::Virtual(virt) => {
                let url = translate_url(&virt.location, &shared.s3_region);
                shared
                    .transport
                    .fetch_range(&url, virt.offset, virt.length, &shared.fetch)
                    .await?
            }
        };
        Ok(Some(bytes))
    }

    /// Cache-or-fetch a manifest. A manifest enters the cache only after
    /// it decoded successfully, so cancellation leaves no partial state.
    async fn manifest(&self, id: &ManifestId) -> StoreResult<Arc<Manifest>> {
        let shared = &self.shared;
        if let Some(manifest) = shared.manifests.get(id) {
            return Ok(manifest);
        }
        tracing::debug!(manifest = %id, "manifest cache miss");
        let raw = shared
            .transport
            .fetch(&shared.urls.manifest_url(id), &shared.fetch)
            .await?;
        let file = envelope::decode_file(&raw).await?;
        if file.envelope.file_type != FileType::Manifest {
            return Err(FormatError::UnexpectedFileType {
                expected: FileType::Manifest.name(),
                found: file.envelope.file_type.name(),
            }
            .into());
        }
        let manifest = Arc::new(manifest::decode_manifest(&file.payload)?);
        shared.manifests.insert(*id, manifest.clone());
        Ok(manifest)
    }
}

/// Collapse runs of `/` and strip leading/trailing separators.
fn canonicalize_base_path(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

async fn resolve_ref(
    transport: &dyn Transport,
    urls: &RepoUrls,
    selector: &RefSelector,
    fetch: &FetchOptions,
) -> StoreResult<SnapshotId> {
    let url = match selector {
        RefSelector::Snapshot(id) => return Ok(*id),
        RefSelector::Tag(name) => urls.tag_ref_url(name),
        RefSelector::Branch(name) => urls.branch_ref_url(name),
    };
    let raw = transport.fetch(&url, fetch).await?;
    Ok(floe_core::refs::parse_ref_json(&raw)?)
}
