//! Repository URL composition and cloud scheme translation.

use floe_core::id::{ChunkId, ManifestId, SnapshotId};
use floe_core::refs::{branch_ref_path, tag_ref_path};

/// Region used for `s3://` translation when none is configured.
pub const DEFAULT_S3_REGION: &str = "us-east-1";

/// URL builder rooted at a repository base URL. The root is normalised
/// to end with exactly one `/`.
#[derive(Clone, Debug)]
pub struct RepoUrls {
    root: String,
}

impl RepoUrls {
    pub fn new(root: &str) -> Self {
        Self {
            root: format!("{}/", root.trim_end_matches('/')),
        }
    }

    /// The normalised root, trailing slash included.
    pub fn root(&self) -> &str {
        &self.root
    }

    fn join(&self, path: &str) -> String {
        format!("{}{}", self.root, path)
    }

    pub fn snapshot_url(&self, id: &SnapshotId) -> String {
        self.join(&format!("snapshots/{}", id.to_base32()))
    }

    pub fn manifest_url(&self, id: &ManifestId) -> String {
        self.join(&format!("manifests/{}", id.to_base32()))
    }

    pub fn chunk_url(&self, id: &ChunkId) -> String {
        self.join(&format!("chunks/{}", id.to_base32()))
    }

    pub fn branch_ref_url(&self, name: &str) -> String {
        self.join(&branch_ref_path(name))
    }

    pub fn tag_ref_url(&self, name: &str) -> String {
        self.join(&tag_ref_path(name))
    }
}

/// Translate a virtual chunk location to a fetchable HTTPS URL. Cloud
/// schemes are rewritten; `http(s)://` (and anything else) passes
/// through unchanged. Never applied to repository root URLs.
pub fn translate_url(url: &str, s3_region: &str) -> String {
    if url.starts_with("gs://") {
        translate_gcs_url(url)
    } else if url.starts_with("s3://") {
        translate_s3_url(url, s3_region)
    } else {
        url.to_string()
    }
}

/// Rewrites `gs://bucket/key` to `https://storage.googleapis.com/bucket/key`.
pub fn translate_gcs_url(url: &str) -> String {
    match url.strip_prefix("gs://") {
        Some(rest) => format!("https://storage.googleapis.com/{rest}"),
        None => url.to_string(),
    }
}

/// Rewrites `s3://bucket/key` to `https://bucket.s3.{region}.amazonaws.com/key`.
pub fn translate_s3_url(url: &str, region: &str) -> String {
    let Some(rest) = url.strip_prefix("s3://") else {
        return url.to_string();
    };
    let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
    format!("https://{bucket}.s3.{region}.amazonaws.com/{key}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use floe_core::id::ObjectId12;

    #[test]
    fn test_root_normalization() {
        assert_eq!(RepoUrls::new("https://x.test/repo").root(), "https://x.test/repo/");
        assert_eq!(RepoUrls::new("https://x.test/repo/").root(), "https://x.test/repo/");
        assert_eq!(RepoUrls::new("https://x.test/repo///").root(), "https://x.test/repo/");
    }

    #[test]
    fn test_object_urls() {
        let urls = RepoUrls::new("https://x.test/repo");
        let id = ObjectId12::new(*b"AAAAAAAAAAAA");
        let base32 = id.to_base32();
        assert_eq!(
            urls.snapshot_url(&id),
            format!("https://x.test/repo/snapshots/{base32}")
        );
        assert_eq!(
            urls.manifest_url(&id),
            format!("https://x.test/repo/manifests/{base32}")
        );
        assert_eq!(
            urls.chunk_url(&id),
            format!("https://x.test/repo/chunks/{base32}")
        );
    }

    #[test]
    fn test_ref_urls() {
        let urls = RepoUrls::new("https://x.test/repo");
        assert_eq!(
            urls.branch_ref_url("main"),
            "https://x.test/repo/refs/branch.main/ref.json"
        );
        assert_eq!(
            urls.tag_ref_url("v1.0.0"),
            "https://x.test/repo/refs/tag.v1.0.0/ref.json"
        );
    }

    #[test]
    fn test_translate_gcs() {
        assert_eq!(
            translate_gcs_url("gs://bucket/path/to/file"),
            "https://storage.googleapis.com/bucket/path/to/file"
        );
    }

    #[test]
    fn test_translate_s3() {
        assert_eq!(
            translate_s3_url("s3://bucket/file", "eu-west-1"),
            "https://bucket.s3.eu-west-1.amazonaws.com/file"
        );
        assert_eq!(
            translate_s3_url("s3://bucket/a/b.nc", DEFAULT_S3_REGION),
            "https://bucket.s3.us-east-1.amazonaws.com/a/b.nc"
        );
    }

    #[test]
    fn test_translate_dispatch() {
        assert_eq!(
            translate_url("gs://b/k", DEFAULT_S3_REGION),
            "https://storage.googleapis.com/b/k"
        );
        assert_eq!(
            translate_url("s3://b/k", "eu-west-1"),
            "https://b.s3.eu-west-1.amazonaws.com/k"
        );
        assert_eq!(
            translate_url("https://example.com/x", DEFAULT_S3_REGION),
            "https://example.com/x"
        );
        assert_eq!(
            translate_url("http://example.com/x", DEFAULT_S3_REGION),
            "http://example.com/x"
        );
    }
}
