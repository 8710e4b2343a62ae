//! Core format model and decoders for the Icechunk storage format.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Object identifiers and their Crockford Base32 / hex encodings
//! - Envelope framing (magic + version header + zstd) for binary files
//! - Snapshot decoding into a hierarchy of array and group nodes
//! - Manifest decoding into per-array chunk payload maps
//! - Ref documents (branch / tag pointers to snapshots)
//! - Zarr v3 `zarr.json` synthesis from decoded nodes
//!
//! Everything here is pure decoding: the crate never talks to the network
//! and never writes. Fetching bytes is `floe-storage`'s job; serving Zarr
//! keys is `floe-store`'s.

pub mod envelope;
pub mod error;
mod fb;
pub mod id;
pub mod manifest;
pub mod refs;
pub mod snapshot;
pub mod zarr;

#[cfg(any(test, feature = "fixtures"))]
pub mod fixtures;

pub use envelope::{Compression, DecodedFile, Envelope, FileType, decode_file};
pub use error::{FormatError, Result};
pub use id::{
    ChunkId, ManifestId, NodeId, ObjectId12, SnapshotId, crockford_base32_decode,
    crockford_base32_encode, is_valid_snapshot_id,
};
pub use manifest::{
    ChunkPayload, Manifest, NativeChunkRef, VirtualChunkRef, coord_key, is_chunk_in_extent,
};
pub use refs::{RefSelector, branch_ref_path, parse_ref_json, tag_ref_path};
pub use snapshot::{
    ArrayData, Extent, ManifestRef, NodeData, NodeSnapshot, Snapshot, normalize_path,
};

/// Magic bytes at the start of every repository file: `"ICE" 🧊 "CHUNK"`.
pub const FORMAT_MAGIC: [u8; 12] = [
    0x49, 0x43, 0x45, 0xF0, 0x9F, 0xA7, 0x8A, 0x43, 0x48, 0x55, 0x4E, 0x4B,
];

/// Total size of the envelope header preceding the payload.
pub const ENVELOPE_HEADER_LEN: usize = 39;

/// Highest format spec version this client understands.
pub const LATEST_SPEC_VERSION: u8 = 1;

/// FlatBuffers file identifier expected at bytes 4..8 of every payload.
pub const FLATBUFFERS_FILE_ID: &[u8; 4] = b"Ichk";

/// Branch used when the caller does not name a ref.
pub const DEFAULT_BRANCH: &str = "main";
