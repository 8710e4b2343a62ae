//! Snapshot model and decoder.
//!
//! A snapshot is the immutable root of a repository version: a vector of
//! array / group nodes sorted ascending by path, plus commit metadata and
//! the registry of manifest files the version references.

use crate::error::{FormatError, Result};
use crate::fb::{self, TableRef};
use crate::id::{ManifestId, NodeId, ObjectId12, SnapshotId};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use time::OffsetDateTime;

// Root table slots.
const VT_ID: u16 = 4;
const VT_PARENT_ID: u16 = 6;
const VT_NODES: u16 = 8;
const VT_FLUSHED_AT: u16 = 10;
const VT_MESSAGE: u16 = 12;
const VT_METADATA: u16 = 14;
const VT_MANIFEST_FILES: u16 = 16;

// NodeSnapshot slots.
const VT_NODE_ID: u16 = 4;
const VT_NODE_PATH: u16 = 6;
const VT_NODE_USER_DATA: u16 = 8;
const VT_NODE_DATA_TYPE: u16 = 10;
const VT_NODE_DATA: u16 = 12;

// Array sub-table slots.
const VT_ARRAY_SHAPE: u16 = 4;
const VT_ARRAY_DIMENSION_NAMES: u16 = 6;
const VT_ARRAY_MANIFESTS: u16 = 8;

// ManifestRef slots.
const VT_MREF_ID: u16 = 4;
const VT_MREF_EXTENTS: u16 = 6;

// MetadataItem slots.
const VT_META_KEY: u16 = 4;
const VT_META_VALUE: u16 = 6;

// DimensionName slots.
const VT_DIM_NAME: u16 = 4;

const NODE_TYPE_ARRAY: u8 = 1;
const NODE_TYPE_GROUP: u8 = 2;

/// Manifest-file registry entries are 32-byte structs; the id occupies
/// the first 12 bytes, the rest is writer bookkeeping this client skips.
const MANIFEST_FILE_INFO_SIZE: usize = 32;
/// Per-dimension shape struct: `(arrayLength: u64, chunkLength: u64)`.
const DIMENSION_SHAPE_SIZE: usize = 16;
/// Per-dimension manifest extent struct: `(start: u32, end: u32)`.
const EXTENT_SIZE: usize = 8;

/// Inclusive per-dimension chunk-coordinate range covered by a manifest.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Extent {
    pub start: u32,
    pub end: u32,
}

/// Reference from an array node to a manifest, with the coordinate
/// extents the manifest covers (one per dimension).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ManifestRef {
    pub id: ManifestId,
    pub extents: Vec<Extent>,
}

/// Decoded array payload of a node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArrayData {
    /// Array length per dimension.
    pub shape: Vec<u64>,
    /// Chunk length per dimension; parallel to `shape`.
    pub chunk_shape: Vec<u64>,
    /// Per-dimension names; entries may be null.
    pub dimension_names: Option<Vec<Option<String>>>,
    /// Manifests indexing this array's chunks, in writer order.
    pub manifests: Vec<ManifestRef>,
}

/// What a node is: a group, or an array with chunk manifests.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeData {
    Group,
    Array(ArrayData),
}

/// One node of the snapshot hierarchy.
#[derive(Clone, Debug)]
pub struct NodeSnapshot {
    pub id: NodeId,
    /// Canonical repository path: no leading or trailing slash, root is `""`.
    pub path: String,
    /// User attributes parsed from the node's JSON document. Unparseable
    /// or non-object documents decode as an empty map, not an error.
    pub user_attributes: Map<String, Value>,
    pub node_data: NodeData,
}

impl NodeSnapshot {
    /// Whether this node is an array.
    pub fn is_array(&self) -> bool {
        matches!(self.node_data, NodeData::Array(_))
    }
}

/// A fully decoded snapshot.
#[derive(Clone, Debug)]
pub struct Snapshot {
    pub id: SnapshotId,
    pub parent_id: Option<SnapshotId>,
    pub flushed_at: OffsetDateTime,
    pub message: String,
    pub metadata: BTreeMap<String, String>,
    /// Ids from the manifest-file registry.
    pub manifest_files: Vec<ManifestId>,
    nodes: Vec<NodeSnapshot>,
}

impl Snapshot {
    /// All nodes, in file order (ascending by path).
    pub fn nodes(&self) -> &[NodeSnapshot] {
        &self.nodes
    }

    /// Look up a node by path with a binary search over the sorted node
    /// vector. The input path is normalised first.
    pub fn find_node(&self, path: &str) -> Option<&NodeSnapshot> {
        let path = normalize_path(path);
        self.nodes
            .binary_search_by(|node| node.path.as_str().cmp(path.as_str()))
            .ok()
            .map(|index| &self.nodes[index])
    }
}

/// Canonicalise a repository path: strip leading and trailing slashes.
/// The root path is the empty string.
pub fn normalize_path(path: &str) -> String {
    path.trim_matches('/').to_string()
}

/// Decode a snapshot from its decompressed FlatBuffers payload.
pub fn decode_snapshot(payload: &[u8]) -> Result<Snapshot> {
    let root = fb::root_table(payload)?;

    let id = required_id12(&root, VT_ID, "snapshot id")?;
    let parent_id = optional_id12(&root, VT_PARENT_ID)?;

    let flushed_at_ms = root.u64_field(VT_FLUSHED_AT, 0)?;
    let flushed_at =
        OffsetDateTime::from_unix_timestamp_nanos(i128::from(flushed_at_ms) * 1_000_000)
            .map_err(|_| FormatError::Malformed("flushed-at out of range".to_string()))?;

    let message = root.string_field(VT_MESSAGE)?.unwrap_or_default().to_string();

    let mut metadata = BTreeMap::new();
    if let Some(items) = root.table_vector_field(VT_METADATA)? {
        for index in 0..items.len() {
            let item = items.get(index)?;
            let Some(key) = item.string_field(VT_META_KEY)? else {
                continue;
            };
            let value = item.string_field(VT_META_VALUE)?.unwrap_or_default();
            metadata.insert(key.to_string(), value.to_string());
        }
    }

    let mut manifest_files = Vec::new();
    if let Some(infos) = root.struct_vector_field(VT_MANIFEST_FILES, MANIFEST_FILE_INFO_SIZE)? {
        for raw in infos.iter() {
            manifest_files.push(ObjectId12::try_from(&raw[..ObjectId12::LEN])?);
        }
    }

    let mut nodes = Vec::new();
    if let Some(table) = root.table_vector_field(VT_NODES)? {
        nodes.reserve(table.len());
        for index in 0..table.len() {
            nodes.push(decode_node(&table.get(index)?)?);
        }
    }

    Ok(Snapshot {
        id,
        parent_id,
        flushed_at,
        message,
        metadata,
        manifest_files,
        nodes,
    })
}

fn decode_node(table: &TableRef<'_>) -> Result<NodeSnapshot> {
    let raw_id = table
        .struct_field(VT_NODE_ID, NodeId::LEN)?
        .ok_or_else(|| FormatError::Malformed("node id missing".to_string()))?;
    let id = NodeId::try_from(raw_id)?;

    let path = table
        .string_field(VT_NODE_PATH)?
        .ok_or_else(|| FormatError::Malformed("node path missing".to_string()))?;
    let path = normalize_path(path);

    let user_attributes = match table.bytes_vector_field(VT_NODE_USER_DATA)? {
        Some(raw) => parse_user_attributes(raw, &path),
        None => Map::new(),
    };

    let node_data = match table.u8_field(VT_NODE_DATA_TYPE, 0)? {
        NODE_TYPE_GROUP => NodeData::Group,
        NODE_TYPE_ARRAY => {
            let array = table
                .table_field(VT_NODE_DATA)?
                .ok_or_else(|| FormatError::Malformed("array node without data".to_string()))?;
            NodeData::Array(decode_array(&array)?)
        }
        other => {
            return Err(FormatError::Malformed(format!(
                "unknown node data type: {other}"
            )));
        }
    };

    Ok(NodeSnapshot {
        id,
        path,
        user_attributes,
        node_data,
    })
}

fn parse_user_attributes(raw: &[u8], path: &str) -> Map<String, Value> {
    match serde_json::from_slice::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            tracing::debug!(path, "node user data is not a JSON object, ignoring");
            Map::new()
        }
    }
}

fn decode_array(table: &TableRef<'_>) -> Result<ArrayData> {
    let mut shape = Vec::new();
    let mut chunk_shape = Vec::new();
    if let Some(dims) = table.struct_vector_field(VT_ARRAY_SHAPE, DIMENSION_SHAPE_SIZE)? {
        shape.reserve(dims.len());
        chunk_shape.reserve(dims.len());
        for raw in dims.iter() {
            shape.push(u64_at(raw, 0));
            chunk_shape.push(u64_at(raw, 8));
        }
    }

    let dimension_names = match table.table_vector_field(VT_ARRAY_DIMENSION_NAMES)? {
        Some(entries) => {
            let mut names = Vec::with_capacity(entries.len());
            for index in 0..entries.len() {
                let entry = entries.get(index)?;
                names.push(entry.string_field(VT_DIM_NAME)?.map(str::to_string));
            }
            Some(names)
        }
        None => None,
    };

    let mut manifests = Vec::new();
    if let Some(refs) = table.table_vector_field(VT_ARRAY_MANIFESTS)? {
        manifests.reserve(refs.len());
        for index in 0..refs.len() {
            manifests.push(decode_manifest_ref(&refs.get(index)?)?);
        }
    }

    Ok(ArrayData {
        shape,
        chunk_shape,
        dimension_names,
        manifests,
    })
}

fn decode_manifest_ref(table: &TableRef<'_>) -> Result<ManifestRef> {
    let id = required_id12(table, VT_MREF_ID, "manifest ref id")?;
    let mut extents = Vec::new();
    if let Some(raw_extents) = table.struct_vector_field(VT_MREF_EXTENTS, EXTENT_SIZE)? {
        extents.reserve(raw_extents.len());
        for raw in raw_extents.iter() {
            extents.push(Extent {
                start: u32_at(raw, 0),
                end: u32_at(raw, 4),
            });
        }
    }
    Ok(ManifestRef { id, extents })
}

fn required_id12(table: &TableRef<'_>, voffset: u16, what: &str) -> Result<ObjectId12> {
    let raw = table
        .struct_field(voffset, ObjectId12::LEN)?
        .ok_or_else(|| FormatError::Malformed(format!("{what} missing")))?;
    ObjectId12::try_from(raw)
}

fn optional_id12(table: &TableRef<'_>, voffset: u16) -> Result<Option<ObjectId12>> {
    match table.struct_field(voffset, ObjectId12::LEN)? {
        Some(raw) => Ok(Some(ObjectId12::try_from(raw)?)),
        None => Ok(None),
    }
}

fn u32_at(raw: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]])
}

fn u64_at(raw: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&raw[at..at + 8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{
        ArrayFixture, ManifestRefFixture, NodeFixture, NodeKind, SnapshotFixture,
    };
    use time::macros::datetime;

    fn sample_snapshot() -> SnapshotFixture {
        SnapshotFixture {
            id: *b"AAAAAAAAAAAA",
            parent: Some(*b"BBBBBBBBBBBB"),
            flushed_at_ms: 1_700_000_000_000,
            message: "initial commit".to_string(),
            metadata: vec![("author".to_string(), "nora".to_string())],
            manifest_files: vec![*b"MMMMMMMMMMMM"],
            nodes: vec![
                NodeFixture {
                    id: *b"\x01\0\0\0\0\0\0\0",
                    path: "/".to_string(),
                    user_data: Some(r#"{"title":"root"}"#.to_string()),
                    node: NodeKind::Group,
                },
                NodeFixture {
                    id: *b"\x02\0\0\0\0\0\0\0",
                    path: "/temperature".to_string(),
                    user_data: None,
                    node: NodeKind::Array(ArrayFixture {
                        shape: vec![(100, 10), (200, 20)],
                        dimension_names: Some(vec![Some("y".to_string()), None]),
                        manifests: vec![ManifestRefFixture {
                            id: *b"MMMMMMMMMMMM",
                            extents: vec![(0, 9), (0, 9)],
                        }],
                    }),
                },
            ],
        }
    }

    #[test]
    fn test_decode_snapshot_fields() {
        let payload = sample_snapshot().encode();
        let snapshot = decode_snapshot(&payload).unwrap();

        assert_eq!(snapshot.id.as_bytes(), b"AAAAAAAAAAAA");
        assert_eq!(
            snapshot.parent_id.map(|p| *p.as_bytes()),
            Some(*b"BBBBBBBBBBBB")
        );
        assert_eq!(snapshot.flushed_at, datetime!(2023-11-14 22:13:20 UTC));
        assert_eq!(snapshot.message, "initial commit");
        assert_eq!(snapshot.metadata.get("author").map(String::as_str), Some("nora"));
        assert_eq!(snapshot.manifest_files.len(), 1);
        assert_eq!(snapshot.nodes().len(), 2);
    }

    #[test]
    fn test_decode_array_node() {
        let payload = sample_snapshot().encode();
        let snapshot = decode_snapshot(&payload).unwrap();

        let node = snapshot.find_node("temperature").unwrap();
        assert_eq!(node.path, "temperature");
        let NodeData::Array(array) = &node.node_data else {
            panic!("expected an array node");
        };
        assert_eq!(array.shape, vec![100, 200]);
        assert_eq!(array.chunk_shape, vec![10, 20]);
        assert_eq!(
            array.dimension_names,
            Some(vec![Some("y".to_string()), None])
        );
        assert_eq!(array.manifests.len(), 1);
        assert_eq!(
            array.manifests[0].extents,
            vec![Extent { start: 0, end: 9 }, Extent { start: 0, end: 9 }]
        );
    }

    #[test]
    fn test_root_path_normalized_to_empty() {
        let payload = sample_snapshot().encode();
        let snapshot = decode_snapshot(&payload).unwrap();

        let root = snapshot.find_node("").unwrap();
        assert_eq!(root.path, "");
        assert_eq!(
            root.user_attributes.get("title"),
            Some(&serde_json::json!("root"))
        );
        assert!(matches!(root.node_data, NodeData::Group));
    }

    #[test]
    fn test_find_node_normalizes_lookup_path() {
        let payload = sample_snapshot().encode();
        let snapshot = decode_snapshot(&payload).unwrap();

        for key in ["temperature", "/temperature", "temperature/", "/temperature/"] {
            assert!(snapshot.find_node(key).is_some(), "missed {key:?}");
        }
        assert!(snapshot.find_node("missing").is_none());
    }

    #[test]
    fn test_invalid_user_data_yields_empty_attributes() {
        let mut fixture = sample_snapshot();
        fixture.nodes[0].user_data = Some("not json at all".to_string());
        let snapshot = decode_snapshot(&fixture.encode()).unwrap();
        assert!(snapshot.find_node("").unwrap().user_attributes.is_empty());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/"), "");
        assert_eq!(normalize_path(""), "");
        assert_eq!(normalize_path("/a/b/"), "a/b");
        assert_eq!(normalize_path("a/b"), "a/b");
    }

    #[test]
    fn test_rejects_unknown_node_type() {
        let mut fixture = sample_snapshot();
        fixture.nodes[0].node = NodeKind::RawType(9);
        assert!(matches!(
            decode_snapshot(&fixture.encode()),
            Err(FormatError::Malformed(_))
        ));
    }
}
