//! `zarr.json` synthesis from decoded snapshot nodes.
//!
//! The binary node tables carry shape and chunk-shape; the remaining Zarr
//! v3 array fields (data type, fill value, codecs, chunk-key encoding) are
//! lifted from the node's user attributes. Nodes whose attributes already
//! form a Zarr v2/v3 document pass through verbatim.

use crate::error::{FormatError, Result};
use crate::snapshot::{ArrayData, NodeData, NodeSnapshot};
use bytes::Bytes;
use serde_json::{Map, Value, json};

/// Zarr chunk-key separator variants.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ChunkKeyEncoding {
    /// The v3 `default` encoding with `/` separators.
    #[default]
    Slash,
    /// The `v2` encoding with `.` separators.
    Dot,
}

impl ChunkKeyEncoding {
    /// Recover the encoding from user attributes, defaulting to slash.
    fn from_attributes(attrs: &Map<String, Value>) -> Self {
        let Some(encoding) = attrs.get("chunk_key_encoding") else {
            return Self::Slash;
        };
        let separator = encoding
            .get("configuration")
            .and_then(|c| c.get("separator"))
            .and_then(Value::as_str);
        match (encoding.get("name").and_then(Value::as_str), separator) {
            (_, Some(".")) | (Some("v2"), None) => Self::Dot,
            _ => Self::Slash,
        }
    }

    fn to_document(self) -> Value {
        match self {
            Self::Slash => json!({"name": "default", "configuration": {"separator": "/"}}),
            Self::Dot => json!({"name": "v2", "configuration": {"separator": "."}}),
        }
    }
}

/// Synthesise the `zarr.json` document for a node.
pub fn node_document(node: &NodeSnapshot) -> Result<Bytes> {
    match &node.node_data {
        NodeData::Group => group_document(&node.user_attributes),
        NodeData::Array(array) => array_document(array, &node.user_attributes),
    }
}

/// `zarr.json` for a group: a fixed v3 shell around the user attributes.
pub fn group_document(attrs: &Map<String, Value>) -> Result<Bytes> {
    to_bytes(&json!({
        "zarr_format": 3,
        "node_type": "group",
        "attributes": attrs,
    }))
}

/// `zarr.json` for an array. Attributes that already carry `zarr_format`
/// 2 or 3 are emitted verbatim; otherwise a v3 document is assembled from
/// the decoded shape and the attribute-lifted fields.
pub fn array_document(array: &ArrayData, attrs: &Map<String, Value>) -> Result<Bytes> {
    if matches!(
        attrs.get("zarr_format").and_then(Value::as_u64),
        Some(2) | Some(3)
    ) {
        return to_bytes(&Value::Object(attrs.clone()));
    }

    let mut doc = Map::new();
    doc.insert("zarr_format".to_string(), json!(3));
    doc.insert("node_type".to_string(), json!("array"));
    doc.insert("shape".to_string(), json!(array.shape));
    doc.insert(
        "data_type".to_string(),
        attrs.get("data_type").cloned().unwrap_or(Value::Null),
    );
    doc.insert(
        "chunk_grid".to_string(),
        json!({"name": "regular", "configuration": {"chunk_shape": array.chunk_shape}}),
    );
    doc.insert(
        "chunk_key_encoding".to_string(),
        ChunkKeyEncoding::from_attributes(attrs).to_document(),
    );
    doc.insert(
        "fill_value".to_string(),
        attrs.get("fill_value").cloned().unwrap_or(Value::Null),
    );
    doc.insert(
        "codecs".to_string(),
        attrs.get("codecs").cloned().unwrap_or_else(|| json!([])),
    );
    if let Some(names) = &array.dimension_names {
        doc.insert("dimension_names".to_string(), json!(names));
    }
    doc.insert("attributes".to_string(), json!({}));

    to_bytes(&Value::Object(doc))
}

fn to_bytes(doc: &Value) -> Result<Bytes> {
    let raw = serde_json::to_vec(doc)
        .map_err(|e| FormatError::Malformed(format!("zarr.json serialization: {e}")))?;
    Ok(Bytes::from(raw))
}
