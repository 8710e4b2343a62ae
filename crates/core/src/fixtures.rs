//! Fixture builders for tests: a minimal FlatBuffers emitter plus
//! snapshot / manifest / envelope encoders.
//!
//! Only compiled for this crate's unit tests and for dependents that
//! enable the `fixtures` feature. The emitter is intentionally naive (no
//! vtable dedup, fixed field order); it exists to produce well-formed
//! buffers for the decoders, not to be a writer.

use crate::snapshot::normalize_path;
use crate::{ENVELOPE_HEADER_LEN, FLATBUFFERS_FILE_ID, FORMAT_MAGIC};
use async_compression::tokio::write::ZstdEncoder;
use tokio::io::AsyncWriteExt;

/// Version string stamped into fixture envelope headers.
pub const FIXTURE_WRITER_VERSION: &str = "ic-1.0.1";

/// Handle to an object registered with the builder.
#[derive(Clone, Copy)]
pub struct ObjId(usize);

/// One field of a table under construction, tagged with its vtable slot.
pub enum Field {
    U8(u16, u8),
    U32(u16, u32),
    U64(u16, u64),
    Struct(u16, Vec<u8>),
    Offset(u16, ObjId),
}

impl Field {
    fn voffset(&self) -> u16 {
        match self {
            Field::U8(v, _)
            | Field::U32(v, _)
            | Field::U64(v, _)
            | Field::Struct(v, _)
            | Field::Offset(v, _) => *v,
        }
    }

    fn size_align(&self) -> (usize, usize) {
        match self {
            Field::U8(..) => (1, 1),
            Field::U32(..) => (4, 4),
            Field::U64(..) => (8, 8),
            Field::Struct(_, bytes) => (bytes.len(), 4),
            Field::Offset(..) => (4, 4),
        }
    }
}

enum Obj {
    Table(Vec<Field>),
    Str(String),
    Bytes(Vec<u8>),
    U32s(Vec<u32>),
    Structs { elem_size: usize, data: Vec<u8> },
    Tables(Vec<ObjId>),
}

/// Forward-emitting FlatBuffers builder. Objects must be registered
/// bottom-up (children before the tables that reference them); `finish`
/// lays them out in reverse registration order so every stored offset
/// points forward, then patches the offsets in.
pub struct Fbb {
    objs: Vec<Obj>,
}

impl Fbb {
    pub fn new() -> Self {
        Self { objs: Vec::new() }
    }

    fn push(&mut self, obj: Obj) -> ObjId {
        self.objs.push(obj);
        ObjId(self.objs.len() - 1)
    }

    pub fn table(&mut self, fields: Vec<Field>) -> ObjId {
        self.push(Obj::Table(fields))
    }

    pub fn string(&mut self, s: &str) -> ObjId {
        self.push(Obj::Str(s.to_string()))
    }

    pub fn byte_vector(&mut self, data: &[u8]) -> ObjId {
        self.push(Obj::Bytes(data.to_vec()))
    }

    pub fn u32_vector(&mut self, values: &[u32]) -> ObjId {
        self.push(Obj::U32s(values.to_vec()))
    }

    /// Vector of fixed-size structs; each element is padded to `elem_size`.
    pub fn struct_vector(&mut self, elem_size: usize, elems: Vec<Vec<u8>>) -> ObjId {
        let mut data = Vec::with_capacity(elems.len() * elem_size);
        for mut elem in elems {
            elem.resize(elem_size, 0);
            data.extend_from_slice(&elem);
        }
        self.push(Obj::Structs { elem_size, data })
    }

    pub fn table_vector(&mut self, ids: &[ObjId]) -> ObjId {
        self.push(Obj::Tables(ids.to_vec()))
    }

    pub fn finish(self, root: ObjId, file_id: &[u8; 4]) -> Vec<u8> {
        let mut out = vec![0u8; 4];
        out.extend_from_slice(file_id);
        let mut positions = vec![0usize; self.objs.len()];
        let mut patches: Vec<(usize, usize)> = Vec::new();

        for index in (0..self.objs.len()).rev() {
            match &self.objs[index] {
                Obj::Table(fields) => {
                    let mut offsets = Vec::with_capacity(fields.len());
                    let mut cursor = 4usize; // the soffset comes first
                    for field in fields {
                        let (size, align) = field.size_align();
                        cursor = round_up(cursor, align);
                        offsets.push(cursor);
                        cursor += size;
                    }
                    let table_size = cursor;
                    let max_voffset = fields.iter().map(Field::voffset).max().unwrap_or(2);
                    let vtable_size = max_voffset as usize + 2;

                    align_to(&mut out, 2);
                    let vtable_pos = out.len();
                    push_u16(&mut out, vtable_size as u16);
                    push_u16(&mut out, table_size as u16);
                    let mut entries = vec![0u16; (vtable_size - 4) / 2];
                    for (field, off) in fields.iter().zip(&offsets) {
                        entries[(field.voffset() as usize - 4) / 2] = *off as u16;
                    }
                    for entry in entries {
                        push_u16(&mut out, entry);
                    }

                    let table_pos = out.len();
                    out.extend_from_slice(&((table_pos - vtable_pos) as i32).to_le_bytes());
                    let mut body = vec![0u8; table_size - 4];
                    for (field, off) in fields.iter().zip(&offsets) {
                        let at = off - 4;
                        match field {
                            Field::U8(_, v) => body[at] = *v,
                            Field::U32(_, v) => body[at..at + 4].copy_from_slice(&v.to_le_bytes()),
                            Field::U64(_, v) => body[at..at + 8].copy_from_slice(&v.to_le_bytes()),
                            Field::Struct(_, bytes) => {
                                body[at..at + bytes.len()].copy_from_slice(bytes)
                            }
                            Field::Offset(_, target) => patches.push((table_pos + off, target.0)),
                        }
                    }
                    out.extend_from_slice(&body);
                    positions[index] = table_pos;
                }
                Obj::Str(s) => {
                    align_to(&mut out, 4);
                    positions[index] = out.len();
                    push_u32(&mut out, s.len() as u32);
                    out.extend_from_slice(s.as_bytes());
                    out.push(0);
                }
                Obj::Bytes(data) => {
                    align_to(&mut out, 4);
                    positions[index] = out.len();
                    push_u32(&mut out, data.len() as u32);
                    out.extend_from_slice(data);
                }
                Obj::U32s(values) => {
                    align_to(&mut out, 4);
                    positions[index] = out.len();
                    push_u32(&mut out, values.len() as u32);
                    for v in values {
                        push_u32(&mut out, *v);
                    }
                }
                Obj::Structs { elem_size, data } => {
                    align_to(&mut out, 4);
                    positions[index] = out.len();
                    push_u32(&mut out, (data.len() / elem_size) as u32);
                    out.extend_from_slice(data);
                }
                Obj::Tables(ids) => {
                    align_to(&mut out, 4);
                    positions[index] = out.len();
                    push_u32(&mut out, ids.len() as u32);
                    for id in ids {
                        patches.push((out.len(), id.0));
                        push_u32(&mut out, 0);
                    }
                }
            }
        }

        out[0..4].copy_from_slice(&(positions[root.0] as u32).to_le_bytes());
        for (at, target) in patches {
            let rel = (positions[target] - at) as u32;
            out[at..at + 4].copy_from_slice(&rel.to_le_bytes());
        }
        out
    }
}

impl Default for Fbb {
    fn default() -> Self {
        Self::new()
    }
}

fn round_up(value: usize, align: usize) -> usize {
    value.div_ceil(align) * align
}

fn align_to(out: &mut Vec<u8>, align: usize) {
    while out.len() % align != 0 {
        out.push(0);
    }
}

fn push_u16(out: &mut Vec<u8>, value: u16) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn push_u32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

// ===== Snapshot fixtures =====

pub struct SnapshotFixture {
    pub id: [u8; 12],
    pub parent: Option<[u8; 12]>,
    pub flushed_at_ms: u64,
    pub message: String,
    pub metadata: Vec<(String, String)>,
    pub manifest_files: Vec<[u8; 12]>,
    pub nodes: Vec<NodeFixture>,
}

pub struct NodeFixture {
    pub id: [u8; 8],
    pub path: String,
    pub user_data: Option<String>,
    pub node: NodeKind,
}

pub enum NodeKind {
    Group,
    Array(ArrayFixture),
    /// Emit an arbitrary node-data-type byte, for decoder error tests.
    RawType(u8),
}

pub struct ArrayFixture {
    /// `(array_length, chunk_length)` per dimension.
    pub shape: Vec<(u64, u64)>,
    pub dimension_names: Option<Vec<Option<String>>>,
    pub manifests: Vec<ManifestRefFixture>,
}

pub struct ManifestRefFixture {
    pub id: [u8; 12],
    /// Inclusive `(start, end)` per dimension.
    pub extents: Vec<(u32, u32)>,
}

impl SnapshotFixture {
    /// Encode as a FlatBuffers payload (root offset + `Ichk` included).
    /// Nodes are sorted ascending by normalised path, as the writer
    /// contract requires.
    pub fn encode(&self) -> Vec<u8> {
        let mut fbb = Fbb::new();

        let mut sorted: Vec<&NodeFixture> = self.nodes.iter().collect();
        sorted.sort_by_key(|n| normalize_path(&n.path));
        let node_ids: Vec<ObjId> = sorted.iter().map(|n| encode_node(&mut fbb, n)).collect();
        let nodes_vec = fbb.table_vector(&node_ids);

        let message = fbb.string(&self.message);

        let meta_ids: Vec<ObjId> = self
            .metadata
            .iter()
            .map(|(key, value)| {
                let key = fbb.string(key);
                let value = fbb.string(value);
                fbb.table(vec![Field::Offset(4, key), Field::Offset(6, value)])
            })
            .collect();
        let meta_vec = fbb.table_vector(&meta_ids);

        let infos = self
            .manifest_files
            .iter()
            .map(|id| id.to_vec())
            .collect::<Vec<_>>();
        let files_vec = fbb.struct_vector(32, infos);

        let mut fields = vec![
            Field::Struct(4, self.id.to_vec()),
            Field::Offset(8, nodes_vec),
            Field::U64(10, self.flushed_at_ms),
            Field::Offset(12, message),
            Field::Offset(14, meta_vec),
            Field::Offset(16, files_vec),
        ];
        if let Some(parent) = self.parent {
            fields.push(Field::Struct(6, parent.to_vec()));
        }
        let root = fbb.table(fields);
        fbb.finish(root, FLATBUFFERS_FILE_ID)
    }
}

fn encode_node(fbb: &mut Fbb, node: &NodeFixture) -> ObjId {
    let path = fbb.string(&node.path);
    let mut fields = vec![Field::Struct(4, node.id.to_vec()), Field::Offset(6, path)];
    if let Some(data) = &node.user_data {
        let data = fbb.byte_vector(data.as_bytes());
        fields.push(Field::Offset(8, data));
    }
    match &node.node {
        NodeKind::Group => fields.push(Field::U8(10, 2)),
        NodeKind::Array(array) => {
            let data = encode_array(fbb, array);
            fields.push(Field::U8(10, 1));
            fields.push(Field::Offset(12, data));
        }
        NodeKind::RawType(byte) => fields.push(Field::U8(10, *byte)),
    }
    fbb.table(fields)
}

fn encode_array(fbb: &mut Fbb, array: &ArrayFixture) -> ObjId {
    let dims = array
        .shape
        .iter()
        .map(|(array_length, chunk_length)| {
            let mut raw = array_length.to_le_bytes().to_vec();
            raw.extend_from_slice(&chunk_length.to_le_bytes());
            raw
        })
        .collect::<Vec<_>>();
    let shape_vec = fbb.struct_vector(16, dims);
    let mut fields = vec![Field::Offset(4, shape_vec)];

    if let Some(names) = &array.dimension_names {
        let ids: Vec<ObjId> = names
            .iter()
            .map(|name| match name {
                Some(name) => {
                    let name = fbb.string(name);
                    fbb.table(vec![Field::Offset(4, name)])
                }
                None => fbb.table(vec![]),
            })
            .collect();
        let names_vec = fbb.table_vector(&ids);
        fields.push(Field::Offset(6, names_vec));
    }

    let mref_ids: Vec<ObjId> = array
        .manifests
        .iter()
        .map(|mref| {
            let extents = mref
                .extents
                .iter()
                .map(|(start, end)| {
                    let mut raw = start.to_le_bytes().to_vec();
                    raw.extend_from_slice(&end.to_le_bytes());
                    raw
                })
                .collect::<Vec<_>>();
            let extents_vec = fbb.struct_vector(8, extents);
            fbb.table(vec![
                Field::Struct(4, mref.id.to_vec()),
                Field::Offset(6, extents_vec),
            ])
        })
        .collect();
    let manifests_vec = fbb.table_vector(&mref_ids);
    fields.push(Field::Offset(8, manifests_vec));

    fbb.table(fields)
}

// ===== Manifest fixtures =====

pub struct ManifestFixture {
    pub id: [u8; 12],
    pub arrays: Vec<([u8; 8], Vec<ChunkRefFixture>)>,
}

#[derive(Clone, Default)]
pub struct ChunkRefFixture {
    pub coords: Vec<u32>,
    pub inline: Option<Vec<u8>>,
    pub offset: u64,
    pub length: u64,
    pub chunk_id: Option<[u8; 12]>,
    pub location: Option<String>,
    pub etag: Option<String>,
    pub last_modified: Option<u32>,
}

impl ManifestFixture {
    /// Encode as a FlatBuffers payload (root offset + `Ichk` included).
    pub fn encode(&self) -> Vec<u8> {
        let mut fbb = Fbb::new();

        let array_ids: Vec<ObjId> = self
            .arrays
            .iter()
            .map(|(node_id, refs)| {
                let ref_ids: Vec<ObjId> =
                    refs.iter().map(|r| encode_chunk_ref(&mut fbb, r)).collect();
                let refs_vec = fbb.table_vector(&ref_ids);
                fbb.table(vec![
                    Field::Struct(4, node_id.to_vec()),
                    Field::Offset(6, refs_vec),
                ])
            })
            .collect();
        let arrays_vec = fbb.table_vector(&array_ids);

        let root = fbb.table(vec![
            Field::Struct(4, self.id.to_vec()),
            Field::Offset(6, arrays_vec),
        ]);
        fbb.finish(root, FLATBUFFERS_FILE_ID)
    }
}

fn encode_chunk_ref(fbb: &mut Fbb, chunk_ref: &ChunkRefFixture) -> ObjId {
    let coords = fbb.u32_vector(&chunk_ref.coords);
    let mut fields = vec![
        Field::Offset(4, coords),
        Field::U64(8, chunk_ref.offset),
        Field::U64(10, chunk_ref.length),
    ];
    if let Some(data) = &chunk_ref.inline {
        let data = fbb.byte_vector(data);
        fields.push(Field::Offset(6, data));
    }
    if let Some(id) = chunk_ref.chunk_id {
        fields.push(Field::Struct(12, id.to_vec()));
    }
    if let Some(location) = &chunk_ref.location {
        let location = fbb.string(location);
        fields.push(Field::Offset(14, location));
    }
    if let Some(etag) = &chunk_ref.etag {
        let etag = fbb.string(etag);
        fields.push(Field::Offset(16, etag));
    }
    if let Some(last_modified) = chunk_ref.last_modified {
        fields.push(Field::U32(18, last_modified));
    }
    fbb.table(fields)
}

// ===== Envelope fixtures =====

/// Wrap a payload in an envelope header without compressing it.
pub fn wrap_envelope(file_type: u8, compression: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(ENVELOPE_HEADER_LEN + payload.len());
    out.extend_from_slice(&FORMAT_MAGIC);
    let mut version = [b' '; 24];
    version[..FIXTURE_WRITER_VERSION.len()].copy_from_slice(FIXTURE_WRITER_VERSION.as_bytes());
    out.extend_from_slice(&version);
    out.push(1); // spec version
    out.push(file_type);
    out.push(compression);
    out.extend_from_slice(payload);
    out
}

/// Wrap a payload in an envelope header, zstd-compressing the body.
pub async fn wrap_envelope_zstd(file_type: u8, payload: &[u8]) -> Vec<u8> {
    let mut encoder = ZstdEncoder::new(Vec::new());
    encoder.write_all(payload).await.expect("in-memory zstd write");
    encoder.shutdown().await.expect("in-memory zstd finish");
    wrap_envelope(file_type, 1, &encoder.into_inner())
}
