pub mod fixtures;

#[allow(unused_imports)]
pub use fixtures::{
    CHUNK_ID, MANIFEST_ID, RepoMocks, SNAPSHOT_ID, mount_repository, snapshot_base32,
};
