//! Refs: named pointers (branches and tags) to snapshots.
//!
//! A ref is stored as a tiny JSON document at a well-known path. The
//! document has exactly one key, `snapshot`, holding the 20-symbol
//! Base32 snapshot id; anything else is a parse error.

use crate::error::{FormatError, Result};
use crate::id::{SnapshotId, is_valid_snapshot_id};
use crate::{DEFAULT_BRANCH, ObjectId12};
use serde_json::Value;

/// Which snapshot to open a repository at.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RefSelector {
    /// An explicit snapshot id.
    Snapshot(SnapshotId),
    /// A tag name, resolved via `refs/tag.{name}/ref.json`.
    Tag(String),
    /// A branch name, resolved via `refs/branch.{name}/ref.json`.
    Branch(String),
}

impl RefSelector {
    /// Parse an explicit snapshot id given as a string, validating its
    /// shape first.
    pub fn from_snapshot_str(s: &str) -> Result<Self> {
        if !is_valid_snapshot_id(s) {
            return Err(FormatError::Ref(format!("not a snapshot id: {s:?}")));
        }
        Ok(Self::Snapshot(ObjectId12::from_base32(s)?))
    }
}

impl Default for RefSelector {
    fn default() -> Self {
        Self::Branch(DEFAULT_BRANCH.to_string())
    }
}

/// Relative path of a branch ref document.
pub fn branch_ref_path(name: &str) -> String {
    format!("refs/branch.{name}/ref.json")
}

/// Relative path of a tag ref document.
pub fn tag_ref_path(name: &str) -> String {
    format!("refs/tag.{name}/ref.json")
}

/// Parse a ref document into the snapshot id it points at.
///
/// The document must be a JSON object with `snapshot` as its only key
/// and a well-formed id as the value.
pub fn parse_ref_json(bytes: &[u8]) -> Result<SnapshotId> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| FormatError::Ref(format!("invalid JSON: {e}")))?;
    let Value::Object(map) = value else {
        return Err(FormatError::Ref("not a JSON object".to_string()));
    };
    if map.len() != 1 {
        return Err(FormatError::Ref(format!(
            "expected exactly one key, found {}",
            map.len()
        )));
    }
    let Some(Value::String(id)) = map.get("snapshot") else {
        return Err(FormatError::Ref("missing string key \"snapshot\"".to_string()));
    };
    if !is_valid_snapshot_id(id) {
        return Err(FormatError::Ref(format!("not a snapshot id: {id:?}")));
    }
    ObjectId12::from_base32(id)
}
