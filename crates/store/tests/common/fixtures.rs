//! A complete mock repository served over httpmock, assembled from the
//! floe-core fixture builders.
//!
//! Layout:
//! - `""`: root group with a `title` attribute
//! - `measurements`: empty group
//! - `measurements/wind`: array without manifests
//! - `temperature`: 1-d array of 4 chunks, one manifest covering
//!   extent `[(0, 3)]` with an inline, a native and a virtual chunk
//!   (coordinate 3 is inside the extent but absent from the manifest)

use floe_core::fixtures::{
    ArrayFixture, ChunkRefFixture, ManifestFixture, ManifestRefFixture, NodeFixture, NodeKind,
    SnapshotFixture, wrap_envelope, wrap_envelope_zstd,
};
use floe_core::id::ObjectId12;
use httpmock::Method::GET;
use httpmock::{Mock, MockServer};

pub const SNAPSHOT_ID: [u8; 12] = *b"SNAPSNAPSNAP";
pub const MANIFEST_ID: [u8; 12] = *b"MANIMANIMANI";
pub const CHUNK_ID: [u8; 12] = *b"CHNKCHNKCHNK";

pub const NATIVE_CHUNK_BYTES: &[u8] = b"0123456789";
pub const VIRTUAL_CHUNK_BYTES: &[u8] = b"3456";
pub const INLINE_CHUNK_BYTES: &[u8] = b"inline-chunk";

pub fn snapshot_base32() -> String {
    ObjectId12::new(SNAPSHOT_ID).to_base32()
}

/// Mocks registered for one repository, for hit-count assertions.
pub struct RepoMocks<'a> {
    pub root_url: String,
    pub branch_ref: Mock<'a>,
    pub snapshot: Mock<'a>,
    pub manifest: Mock<'a>,
    pub native_chunk: Mock<'a>,
    pub virtual_chunk: Mock<'a>,
}

fn snapshot_fixture() -> SnapshotFixture {
    SnapshotFixture {
        id: SNAPSHOT_ID,
        parent: None,
        flushed_at_ms: 1_700_000_000_000,
        message: "seed data".to_string(),
        metadata: vec![("pipeline".to_string(), "ingest-v2".to_string())],
        manifest_files: vec![MANIFEST_ID],
        nodes: vec![
            NodeFixture {
                id: *b"\x01\0\0\0\0\0\0\0",
                path: "/".to_string(),
                user_data: Some(r#"{"title":"fixture repo"}"#.to_string()),
                node: NodeKind::Group,
            },
            NodeFixture {
                id: *b"\x02\0\0\0\0\0\0\0",
                path: "/measurements".to_string(),
                user_data: None,
                node: NodeKind::Group,
            },
            NodeFixture {
                id: *b"\x03\0\0\0\0\0\0\0",
                path: "/measurements/wind".to_string(),
                user_data: None,
                node: NodeKind::Array(ArrayFixture {
                    shape: vec![(8, 2)],
                    dimension_names: None,
                    manifests: vec![],
                }),
            },
            NodeFixture {
                id: *b"\x04\0\0\0\0\0\0\0",
                path: "/temperature".to_string(),
                user_data: Some(
                    r#"{"data_type":"float32","fill_value":0.0,"codecs":[{"name":"bytes"}]}"#
                        .to_string(),
                ),
                node: NodeKind::Array(ArrayFixture {
                    shape: vec![(4, 1)],
                    dimension_names: Some(vec![Some("t".to_string())]),
                    manifests: vec![ManifestRefFixture {
                        id: MANIFEST_ID,
                        extents: vec![(0, 3)],
                    }],
                }),
            },
        ],
    }
}

fn manifest_fixture(virtual_location: &str) -> ManifestFixture {
    ManifestFixture {
        id: MANIFEST_ID,
        arrays: vec![(
            *b"\x04\0\0\0\0\0\0\0",
            vec![
                ChunkRefFixture {
                    coords: vec![0],
                    inline: Some(INLINE_CHUNK_BYTES.to_vec()),
                    ..ChunkRefFixture::default()
                },
                ChunkRefFixture {
                    coords: vec![1],
                    chunk_id: Some(CHUNK_ID),
                    offset: 10,
                    length: 10,
                    ..ChunkRefFixture::default()
                },
                ChunkRefFixture {
                    coords: vec![2],
                    location: Some(virtual_location.to_string()),
                    offset: 3,
                    length: 4,
                    ..ChunkRefFixture::default()
                },
            ],
        )],
    }
}

/// Build the repository bytes and register all object mocks. The
/// snapshot file is zstd-compressed, the manifest is stored plain, so
/// both envelope paths are exercised end to end.
pub async fn mount_repository(server: &MockServer) -> RepoMocks<'_> {
    let virtual_location = server.url("/external/legacy.nc");
    let snapshot_file = wrap_envelope_zstd(0, &snapshot_fixture().encode()).await;
    let manifest_file = wrap_envelope(1, 0, &manifest_fixture(&virtual_location).encode());

    let snapshot_b32 = snapshot_base32();
    let manifest_b32 = ObjectId12::new(MANIFEST_ID).to_base32();
    let chunk_b32 = ObjectId12::new(CHUNK_ID).to_base32();

    let branch_ref = server.mock(|when, then| {
        when.method(GET).path("/repo/refs/branch.main/ref.json");
        then.status(200)
            .body(format!(r#"{{"snapshot":"{snapshot_b32}"}}"#));
    });
    let snapshot = server.mock(|when, then| {
        when.method(GET).path(format!("/repo/snapshots/{snapshot_b32}"));
        then.status(200).body(snapshot_file);
    });
    let manifest = server.mock(|when, then| {
        when.method(GET).path(format!("/repo/manifests/{manifest_b32}"));
        then.status(200).body(manifest_file);
    });
    let native_chunk = server.mock(|when, then| {
        when.method(GET)
            .path(format!("/repo/chunks/{chunk_b32}"))
            .header("range", "bytes=10-19");
        then.status(206).body(NATIVE_CHUNK_BYTES);
    });
    let virtual_chunk = server.mock(|when, then| {
        when.method(GET)
            .path("/external/legacy.nc")
            .header("range", "bytes=3-6");
        then.status(206).body(VIRTUAL_CHUNK_BYTES);
    });

    RepoMocks {
        root_url: server.url("/repo"),
        branch_ref,
        snapshot,
        manifest,
        native_chunk,
        virtual_chunk,
    }
}
