//! Manifest model and decoder.
//!
//! A manifest is a chunk index for one or more arrays: per array node, a
//! map from chunk coordinates to the location of the chunk bytes (inline
//! in the manifest, a range of a native chunk object, or a range of an
//! external "virtual" object).

use crate::error::{FormatError, Result};
use crate::fb::{self, TableRef};
use crate::id::{ChunkId, ManifestId, NodeId, ObjectId12};
use crate::snapshot::Extent;
use bytes::Bytes;
use std::collections::HashMap;

// Root table slots.
const VT_ID: u16 = 4;
const VT_ARRAYS: u16 = 6;

// ArrayManifest slots.
const VT_ARRAY_NODE_ID: u16 = 4;
const VT_ARRAY_REFS: u16 = 6;

// ChunkRef slots.
const VT_REF_COORDS: u16 = 4;
const VT_REF_INLINE: u16 = 6;
const VT_REF_OFFSET: u16 = 8;
const VT_REF_LENGTH: u16 = 10;
const VT_REF_CHUNK_ID: u16 = 12;
const VT_REF_LOCATION: u16 = 14;
const VT_REF_ETAG: u16 = 16;
const VT_REF_LAST_MODIFIED: u16 = 18;

/// A range of a native chunk object (`chunks/{id}` in the same repository).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeChunkRef {
    pub id: ChunkId,
    pub offset: u64,
    pub length: u64,
}

/// A range of an external object, addressed by URL. The validators are
/// preserved from the manifest but unused by the read path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VirtualChunkRef {
    pub location: String,
    pub offset: u64,
    pub length: u64,
    pub etag: Option<String>,
    pub last_modified: Option<u32>,
}

/// Where a chunk's bytes live.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChunkPayload {
    /// The bytes are embedded in the manifest itself.
    Inline(Bytes),
    Native(NativeChunkRef),
    Virtual(VirtualChunkRef),
}

/// A decoded manifest: per node, chunk payloads keyed by their
/// `/`-joined coordinates.
#[derive(Clone, Debug)]
pub struct Manifest {
    pub id: ManifestId,
    chunks: HashMap<NodeId, HashMap<String, ChunkPayload>>,
}

impl Manifest {
    /// Look up the payload for a chunk of `node` at `coords`.
    pub fn find_chunk(&self, node: &NodeId, coords: &[u32]) -> Option<&ChunkPayload> {
        self.chunks.get(node)?.get(&coord_key(coords))
    }

    /// Per-node chunk maps, as decoded.
    pub fn chunks(&self) -> &HashMap<NodeId, HashMap<String, ChunkPayload>> {
        &self.chunks
    }
}

/// Canonical lookup key for chunk coordinates: the decimal coordinates
/// joined by `/`. Rank-0 coordinates key as the empty string.
pub fn coord_key(coords: &[u32]) -> String {
    coords
        .iter()
        .map(u32::to_string)
        .collect::<Vec<_>>()
        .join("/")
}

/// Whether `coords` fall inside `extents`: equal rank, and every
/// coordinate within its dimension's inclusive `[start, end]` range.
pub fn is_chunk_in_extent(coords: &[u32], extents: &[Extent]) -> bool {
    coords.len() == extents.len()
        && coords
            .iter()
            .zip(extents)
            .all(|(c, e)| *c >= e.start && *c <= e.end)
}

/// Decode a manifest from its decompressed FlatBuffers payload.
pub fn decode_manifest(payload: &[u8]) -> Result<Manifest> {
    let root = fb::root_table(payload)?;

    let raw_id = root
        .struct_field(VT_ID, ObjectId12::LEN)?
        .ok_or_else(|| FormatError::Malformed("manifest id missing".to_string()))?;
    let id = ManifestId::try_from(raw_id)?;

    let mut chunks: HashMap<NodeId, HashMap<String, ChunkPayload>> = HashMap::new();
    if let Some(arrays) = root.table_vector_field(VT_ARRAYS)? {
        for index in 0..arrays.len() {
            let array = arrays.get(index)?;
            let raw_node = array
                .struct_field(VT_ARRAY_NODE_ID, NodeId::LEN)?
                .ok_or_else(|| FormatError::Malformed("array manifest node id missing".to_string()))?;
            let node_id = NodeId::try_from(raw_node)?;
            let per_node = chunks.entry(node_id).or_default();

            if let Some(refs) = array.table_vector_field(VT_ARRAY_REFS)? {
                for ref_index in 0..refs.len() {
                    if let Some((key, payload)) = decode_chunk_ref(&refs.get(ref_index)?)? {
                        per_node.insert(key, payload);
                    }
                }
            }
        }
    }

    Ok(Manifest { id, chunks })
}

/// Decode one chunk ref. The storage modes are mutually exclusive by
/// contract; when a malformed writer sets several, the first match of
/// inline, then virtual, then native wins. A ref with none of the three is
/// dropped with a warning rather than failing the whole manifest.
fn decode_chunk_ref(table: &TableRef<'_>) -> Result<Option<(String, ChunkPayload)>> {
    let coords = table.u32_vector_field(VT_REF_COORDS)?.unwrap_or_default();
    let key = coord_key(&coords);

    let offset = table.u64_field(VT_REF_OFFSET, 0)?;
    let length = table.u64_field(VT_REF_LENGTH, 0)?;

    if let Some(data) = table.bytes_vector_field(VT_REF_INLINE)?
        && !data.is_empty()
    {
        return Ok(Some((key, ChunkPayload::Inline(Bytes::copy_from_slice(data)))));
    }

    if let Some(location) = table.string_field(VT_REF_LOCATION)?
        && !location.is_empty()
    {
        let payload = ChunkPayload::Virtual(VirtualChunkRef {
            location: location.to_string(),
            offset,
            length,
            etag: table.string_field(VT_REF_ETAG)?.map(str::to_string),
            last_modified: table.u32_field_opt(VT_REF_LAST_MODIFIED)?,
        });
        return Ok(Some((key, payload)));
    }

    if let Some(raw_id) = table.struct_field(VT_REF_CHUNK_ID, ObjectId12::LEN)? {
        let payload = ChunkPayload::Native(NativeChunkRef {
            id: ChunkId::try_from(raw_id)?,
            offset,
            length,
        });
        return Ok(Some((key, payload)));
    }

    tracing::warn!(coords = %key, "chunk ref carries no payload, dropping");
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{ChunkRefFixture, ManifestFixture};

    const NODE: [u8; 8] = *b"\x0A\0\0\0\0\0\0\0";

    fn manifest_with(refs: Vec<ChunkRefFixture>) -> Manifest {
        let fixture = ManifestFixture {
            id: *b"MMMMMMMMMMMM",
            arrays: vec![(NODE, refs)],
        };
        decode_manifest(&fixture.encode()).unwrap()
    }

    #[test]
    fn test_decode_inline_chunk() {
        let manifest = manifest_with(vec![ChunkRefFixture {
            coords: vec![0, 1],
            inline: Some(b"payload".to_vec()),
            ..ChunkRefFixture::default()
        }]);

        let node = NodeId::new(NODE);
        match manifest.find_chunk(&node, &[0, 1]) {
            Some(ChunkPayload::Inline(data)) => assert_eq!(data.as_ref(), b"payload"),
            other => panic!("unexpected payload: {other:?}"),
        }
        assert!(manifest.find_chunk(&node, &[1, 1]).is_none());
    }

    #[test]
    fn test_decode_native_chunk() {
        let manifest = manifest_with(vec![ChunkRefFixture {
            coords: vec![3],
            chunk_id: Some(*b"CCCCCCCCCCCC"),
            offset: 128,
            length: 64,
            ..ChunkRefFixture::default()
        }]);

        match manifest.find_chunk(&NodeId::new(NODE), &[3]) {
            Some(ChunkPayload::Native(native)) => {
                assert_eq!(native.id.as_bytes(), b"CCCCCCCCCCCC");
                assert_eq!(native.offset, 128);
                assert_eq!(native.length, 64);
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_decode_virtual_chunk_keeps_validators() {
        let manifest = manifest_with(vec![ChunkRefFixture {
            coords: vec![0],
            location: Some("s3://archive/file.nc".to_string()),
            offset: 10,
            length: 20,
            etag: Some("\"abc\"".to_string()),
            last_modified: Some(1_700_000_000),
            ..ChunkRefFixture::default()
        }]);

        match manifest.find_chunk(&NodeId::new(NODE), &[0]) {
            Some(ChunkPayload::Virtual(virt)) => {
                assert_eq!(virt.location, "s3://archive/file.nc");
                assert_eq!(virt.offset, 10);
                assert_eq!(virt.length, 20);
                assert_eq!(virt.etag.as_deref(), Some("\"abc\""));
                assert_eq!(virt.last_modified, Some(1_700_000_000));
            }
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_inline_wins_over_other_modes() {
        let manifest = manifest_with(vec![ChunkRefFixture {
            coords: vec![0],
            inline: Some(b"x".to_vec()),
            location: Some("gs://b/k".to_string()),
            chunk_id: Some(*b"CCCCCCCCCCCC"),
            ..ChunkRefFixture::default()
        }]);

        assert!(matches!(
            manifest.find_chunk(&NodeId::new(NODE), &[0]),
            Some(ChunkPayload::Inline(_))
        ));
    }

    #[test]
    fn test_virtual_wins_over_native() {
        let manifest = manifest_with(vec![ChunkRefFixture {
            coords: vec![0],
            location: Some("gs://b/k".to_string()),
            chunk_id: Some(*b"CCCCCCCCCCCC"),
            ..ChunkRefFixture::default()
        }]);

        assert!(matches!(
            manifest.find_chunk(&NodeId::new(NODE), &[0]),
            Some(ChunkPayload::Virtual(_))
        ));
    }

    #[test]
    fn test_empty_inline_falls_through_and_empty_ref_is_dropped() {
        let manifest = manifest_with(vec![
            // empty inline data does not select the inline mode
            ChunkRefFixture {
                coords: vec![0],
                inline: Some(Vec::new()),
                chunk_id: Some(*b"CCCCCCCCCCCC"),
                ..ChunkRefFixture::default()
            },
            // no storage mode at all: dropped
            ChunkRefFixture {
                coords: vec![1],
                ..ChunkRefFixture::default()
            },
        ]);

        let node = NodeId::new(NODE);
        assert!(matches!(
            manifest.find_chunk(&node, &[0]),
            Some(ChunkPayload::Native(_))
        ));
        assert!(manifest.find_chunk(&node, &[1]).is_none());
    }

    #[test]
    fn test_rank_zero_chunk_keys_as_empty() {
        let manifest = manifest_with(vec![ChunkRefFixture {
            coords: vec![],
            inline: Some(b"scalar".to_vec()),
            ..ChunkRefFixture::default()
        }]);

        match manifest.find_chunk(&NodeId::new(NODE), &[]) {
            Some(ChunkPayload::Inline(data)) => assert_eq!(data.as_ref(), b"scalar"),
            other => panic!("unexpected payload: {other:?}"),
        }
    }

    #[test]
    fn test_coord_key() {
        assert_eq!(coord_key(&[]), "");
        assert_eq!(coord_key(&[7]), "7");
        assert_eq!(coord_key(&[1, 2, 30]), "1/2/30");
    }

    #[test]
    fn test_is_chunk_in_extent() {
        let extents = [Extent { start: 2, end: 4 }, Extent { start: 0, end: 0 }];
        assert!(is_chunk_in_extent(&[2, 0], &extents));
        assert!(is_chunk_in_extent(&[4, 0], &extents));
        assert!(!is_chunk_in_extent(&[1, 0], &extents));
        // inclusive upper bound: 5 is the first coordinate outside
        assert!(!is_chunk_in_extent(&[5, 0], &extents));
        assert!(!is_chunk_in_extent(&[3, 1], &extents));
        // rank mismatch is never covered
        assert!(!is_chunk_in_extent(&[3], &extents));
        assert!(is_chunk_in_extent(&[], &[]));
    }
}
