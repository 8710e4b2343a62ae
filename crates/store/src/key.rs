//! Zarr key parsing.
//!
//! The store recognises the Zarr v3 key grammar: `zarr.json` documents
//! at any prefix, and chunk keys of the form `{prefix}/c/{i0}/{i1}/…`
//! (with `{prefix}/c` addressing the single chunk of a rank-0 array).
//! Keys that match neither form are treated as metadata lookups, which
//! simply miss.

use crate::error::{StoreError, StoreResult};

/// A parsed Zarr key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Key {
    /// `zarr.json` for the node at `path` (root when empty).
    Metadata { path: String },
    /// Chunk at `coords` of the array node at `path`.
    Chunk { path: String, coords: Vec<u32> },
}

/// Parse a Zarr key. Only malformed chunk coordinates are an error;
/// unrecognised keys fall back to (probably missing) metadata.
pub fn parse_key(key: &str) -> StoreResult<Key> {
    if key == "zarr.json" {
        return Ok(Key::Metadata {
            path: String::new(),
        });
    }
    if let Some(prefix) = key.strip_suffix("/zarr.json") {
        return Ok(Key::Metadata {
            path: prefix.to_string(),
        });
    }

    if key == "c" {
        return Ok(Key::Chunk {
            path: String::new(),
            coords: Vec::new(),
        });
    }
    if let Some(prefix) = key.strip_suffix("/c") {
        return Ok(Key::Chunk {
            path: prefix.to_string(),
            coords: Vec::new(),
        });
    }
    // The coordinate suffix is all-numeric, so the chunk marker next to
    // it is always the last `/c/`; earlier ones are literal path segments.
    if let Some(at) = key.rfind("/c/") {
        return Ok(Key::Chunk {
            path: key[..at].to_string(),
            coords: parse_coords(key, &key[at + 3..])?,
        });
    }
    if let Some(rest) = key.strip_prefix("c/") {
        return Ok(Key::Chunk {
            path: String::new(),
            coords: parse_coords(key, rest)?,
        });
    }

    Ok(Key::Metadata {
        path: key.to_string(),
    })
}

fn parse_coords(key: &str, raw: &str) -> StoreResult<Vec<u32>> {
    raw.split('/')
        .map(|token| {
            token
                .parse::<u32>()
                .map_err(|_| StoreError::BadKey(format!("non-numeric chunk coordinate in {key:?}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(path: &str) -> Key {
        Key::Metadata {
            path: path.to_string(),
        }
    }

    fn chunk(path: &str, coords: &[u32]) -> Key {
        Key::Chunk {
            path: path.to_string(),
            coords: coords.to_vec(),
        }
    }

    #[test]
    fn test_metadata_keys() {
        assert_eq!(parse_key("zarr.json").unwrap(), metadata(""));
        assert_eq!(parse_key("a/zarr.json").unwrap(), metadata("a"));
        assert_eq!(parse_key("a/b/zarr.json").unwrap(), metadata("a/b"));
        // a group may itself be named "c"
        assert_eq!(parse_key("a/c/zarr.json").unwrap(), metadata("a/c"));
    }

    #[test]
    fn test_chunk_keys() {
        assert_eq!(parse_key("a/c/1/2").unwrap(), chunk("a", &[1, 2]));
        assert_eq!(parse_key("a/b/c/0").unwrap(), chunk("a/b", &[0]));
        assert_eq!(parse_key("c/7").unwrap(), chunk("", &[7]));
    }

    #[test]
    fn test_rank_zero_chunk_keys() {
        assert_eq!(parse_key("c").unwrap(), chunk("", &[]));
        assert_eq!(parse_key("a/c").unwrap(), chunk("a", &[]));
    }

    #[test]
    fn test_non_numeric_coordinates_are_bad_keys() {
        assert!(matches!(
            parse_key("a/c/1/x"),
            Err(StoreError::BadKey(_))
        ));
        assert!(matches!(parse_key("c/nope"), Err(StoreError::BadKey(_))));
        assert!(matches!(parse_key("a/c//1"), Err(StoreError::BadKey(_))));
        // coordinates must fit u32
        assert!(parse_key("a/c/4294967296").is_err());
    }

    #[test]
    fn test_unrecognised_keys_fall_back_to_metadata() {
        assert_eq!(parse_key("a/b").unwrap(), metadata("a/b"));
        assert_eq!(parse_key(".zattrs").unwrap(), metadata(".zattrs"));
        assert_eq!(parse_key("").unwrap(), metadata(""));
    }

    #[test]
    fn test_last_chunk_marker_wins() {
        // an array named "c" still addresses its chunks
        assert_eq!(parse_key("c/c/0").unwrap(), chunk("c", &[0]));
        // same through a deeper path containing a "c" segment
        assert_eq!(
            parse_key("data/c/temp/c/0").unwrap(),
            chunk("data/c/temp", &[0])
        );
        assert_eq!(parse_key("a/c/b/c/1/2").unwrap(), chunk("a/c/b", &[1, 2]));
    }
}
