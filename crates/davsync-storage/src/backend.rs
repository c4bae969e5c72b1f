//! Wire-level operations needed for synchronization.

use async_trait::async_trait;
use bytes::Bytes;
use davsync_core::{BlockRange, DavsyncResult, Depth};

/// One `<response>` of a PROPFIND multistatus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavEntry {
    /// Absolute, percent-decoded path below the server address, without a
    /// trailing slash (the server root is `/`).
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    /// Milliseconds since the Unix epoch (0 when absent)
    pub last_modified: i64,
    pub etag: Option<String>,
}

/// The operations davsync issues against a WebDAV server.
///
/// Paths are absolute and unencoded. Implementations map a 404 to
/// `DavsyncError::NotFound` and any other failure status to
/// `DavsyncError::Http`.
#[async_trait]
pub trait DavBackend: Send + Sync {
    /// PROPFIND with the given `Depth`; the first entry describes `path` itself.
    async fn propfind(&self, path: &str, depth: Depth) -> DavsyncResult<Vec<DavEntry>>;

    /// GET the bytes in `range`. Ranges past the end yield fewer (or zero) bytes.
    async fn get_range(&self, path: &str, range: BlockRange) -> DavsyncResult<Bytes>;

    /// PUT `body`, overwriting any existing object.
    async fn put(&self, path: &str, body: Bytes) -> DavsyncResult<()>;

    async fn delete(&self, path: &str) -> DavsyncResult<()>;

    /// MKCOL; succeeds when the collection already exists.
    async fn mkcol(&self, path: &str) -> DavsyncResult<()>;
}

/// Strip the trailing slash from a non-root path.
pub(crate) fn trim_dir(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}
