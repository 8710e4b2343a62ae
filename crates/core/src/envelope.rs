//! Envelope framing shared by all binary repository files.
//!
//! Every snapshot, manifest, transaction-log and attribute file starts with
//! a fixed 39-byte header: 12 magic bytes, a 24-byte space-padded ASCII
//! version string, one spec-version byte, one file-type byte and one
//! compression byte. The remainder is the (possibly zstd-compressed)
//! FlatBuffers payload, which must carry the `Ichk` file identifier.

use crate::error::{FormatError, Result};
use crate::{ENVELOPE_HEADER_LEN, FLATBUFFERS_FILE_ID, FORMAT_MAGIC, LATEST_SPEC_VERSION};
use async_compression::tokio::bufread::ZstdDecoder;
use bytes::Bytes;
use tokio::io::AsyncReadExt;

/// Kind of repository file, from the envelope's file-type byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileType {
    Snapshot,
    Manifest,
    TransactionLog,
    Attributes,
}

impl FileType {
    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(Self::Snapshot),
            1 => Ok(Self::Manifest),
            2 => Ok(Self::TransactionLog),
            3 => Ok(Self::Attributes),
            other => Err(FormatError::UnknownFileType(other)),
        }
    }

    /// Lowercase name, used in error messages.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Manifest => "manifest",
            Self::TransactionLog => "transaction log",
            Self::Attributes => "attributes",
        }
    }
}

/// Payload compression, from the envelope's compression byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Compression {
    None,
    Zstd,
}

impl Compression {
    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(Self::None),
            1 => Ok(Self::Zstd),
            other => Err(FormatError::UnknownCompression(other)),
        }
    }
}

/// Parsed envelope header.
#[derive(Clone, Debug)]
pub struct Envelope {
    /// Writer version string with the space padding stripped,
    /// e.g. `"ic-0.3.16"`.
    pub version: String,
    /// Format spec version, at most [`LATEST_SPEC_VERSION`].
    pub spec_version: u8,
    pub file_type: FileType,
    pub compression: Compression,
}

impl Envelope {
    /// Parse the fixed 39-byte header. Does not touch the payload.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < ENVELOPE_HEADER_LEN {
            return Err(FormatError::Truncated { len: bytes.len() });
        }
        if bytes[..12] != FORMAT_MAGIC {
            return Err(FormatError::Magic);
        }
        let version = String::from_utf8_lossy(&bytes[12..36])
            .trim_end_matches(' ')
            .to_string();
        let spec_version = bytes[36];
        if spec_version > LATEST_SPEC_VERSION {
            return Err(FormatError::UnsupportedSpecVersion {
                found: spec_version,
                latest: LATEST_SPEC_VERSION,
            });
        }
        let file_type = FileType::from_byte(bytes[37])?;
        let compression = Compression::from_byte(bytes[38])?;
        Ok(Self {
            version,
            spec_version,
            file_type,
            compression,
        })
    }
}

/// A fully unwrapped repository file: header plus decompressed payload.
#[derive(Clone, Debug)]
pub struct DecodedFile {
    pub envelope: Envelope,
    /// Decompressed FlatBuffers buffer (root offset + `Ichk` identifier
    /// included), ready for the snapshot / manifest decoders.
    pub payload: Bytes,
}

/// Unwrap an envelope: validate the header, decompress the payload and
/// check the FlatBuffers file identifier.
pub async fn decode_file(bytes: &[u8]) -> Result<DecodedFile> {
    let envelope = Envelope::parse(bytes)?;
    let body = &bytes[ENVELOPE_HEADER_LEN..];
    let payload = match envelope.compression {
        Compression::None => Bytes::copy_from_slice(body),
        Compression::Zstd => {
            let mut out = Vec::new();
            let mut decoder = ZstdDecoder::new(body);
            decoder
                .read_to_end(&mut out)
                .await
                .map_err(FormatError::Decompression)?;
            Bytes::from(out)
        }
    };
    if payload.len() < 8 || &payload[4..8] != FLATBUFFERS_FILE_ID {
        return Err(FormatError::FileId);
    }
    Ok(DecodedFile { envelope, payload })
}
