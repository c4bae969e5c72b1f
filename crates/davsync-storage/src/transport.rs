//! WebDAV transport: base-directory mapping and depth capability
//!
//! All logical paths are relative to `remote_base_dir`. On first use the
//! transport makes sure the base directory exists and, unless the settings
//! already carry a resolved capability, probes whether the server answers
//! `Depth: infinity`. The outcome is cached for the life of the transport
//! and written back through the [`SettingsStore`] so the probe runs once.

use std::sync::Arc;

use bytes::Bytes;
use davsync_core::config::{DavsyncConfig, TransferConfig, WebdavConfig};
use davsync_core::{
    BlockRange, DavsyncError, DavsyncResult, Depth, RemoteItem, TransportCapability,
};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::backend::{trim_dir, DavBackend, DavEntry};
use crate::http::HttpBackend;
use crate::settings::SettingsStore;

/// Result of [`negotiate_capability`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Negotiation {
    pub capability: TransportCapability,
    /// A probe ran, so the outcome is new and worth persisting.
    pub probed: bool,
}

/// Decide how listings walk the tree under `base_root`.
///
/// A resolved `current` capability is returned as is. Otherwise a
/// `Depth: infinity` PROPFIND is tried; if the server refuses it (403 on
/// most hosted servers, but any failure counts) a `Depth: 1` PROPFIND must
/// succeed instead.
pub async fn negotiate_capability(
    backend: &dyn DavBackend,
    base_root: &str,
    current: TransportCapability,
) -> DavsyncResult<Negotiation> {
    if current.is_resolved() {
        return Ok(Negotiation {
            capability: current,
            probed: false,
        });
    }

    let infinity_err = match backend.propfind(base_root, Depth::Infinity).await {
        Ok(_) => {
            info!(base_root, "server supports Depth: infinity");
            return Ok(Negotiation {
                capability: TransportCapability::InfinitySupported,
                probed: true,
            });
        }
        Err(e) => e,
    };
    if infinity_err.is_forbidden() {
        debug!(base_root, "Depth: infinity forbidden, probing Depth: 1");
    } else {
        warn!(base_root, error = %infinity_err, "Depth: infinity probe failed, probing Depth: 1");
    }

    match backend.propfind(base_root, Depth::One).await {
        Ok(_) => {
            info!(base_root, "server limited to Depth: 1, listing walks the tree");
            Ok(Negotiation {
                capability: TransportCapability::DepthOneOnly,
                probed: true,
            })
        }
        Err(e) => Err(DavsyncError::CapabilityNegotiation(format!(
            "Depth: infinity failed ({infinity_err}); Depth: 1 failed ({e})"
        ))),
    }
}

pub struct WebdavTransport {
    backend: Arc<dyn DavBackend>,
    config: WebdavConfig,
    base_dir: String,
    block_size: u64,
    list_batch_size: usize,
    settings: Option<Arc<dyn SettingsStore>>,
    base_ready: OnceCell<()>,
    capability: OnceCell<TransportCapability>,
}

impl std::fmt::Debug for WebdavTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebdavTransport")
            .field("address", &self.config.address)
            .field("base_dir", &self.base_dir)
            .field("capability", &self.capability.get())
            .finish()
    }
}

impl WebdavTransport {
    pub fn new(
        backend: Arc<dyn DavBackend>,
        config: WebdavConfig,
        transfer: &TransferConfig,
    ) -> Self {
        let base_dir = config.remote_base_dir.trim_matches('/').to_string();
        Self {
            backend,
            config,
            base_dir,
            block_size: transfer.block_size.max(1),
            list_batch_size: transfer.list_batch_size.max(1),
            settings: None,
            base_ready: OnceCell::new(),
            capability: OnceCell::new(),
        }
    }

    /// Transport over HTTP for a full davsync config.
    pub fn connect(config: &DavsyncConfig) -> DavsyncResult<Self> {
        let backend = HttpBackend::new(&config.webdav)?;
        Ok(Self::new(
            Arc::new(backend),
            config.webdav.clone(),
            &config.transfer,
        ))
    }

    /// Persist negotiated settings through `store`.
    pub fn with_settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.settings = Some(store);
        self
    }

    pub fn backend(&self) -> &Arc<dyn DavBackend> {
        &self.backend
    }

    pub fn config(&self) -> &WebdavConfig {
        &self.config
    }

    pub fn base_dir(&self) -> &str {
        &self.base_dir
    }

    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    pub fn list_batch_size(&self) -> usize {
        self.list_batch_size
    }

    /// Capability known so far (`Unknown` before [`init`](Self::init)).
    pub fn capability(&self) -> TransportCapability {
        self.capability
            .get()
            .copied()
            .unwrap_or_else(|| self.config.capability())
    }

    /// Ensure the base directory exists and resolve the depth capability.
    ///
    /// Idempotent: later calls return the cached capability without I/O.
    pub async fn init(&self) -> DavsyncResult<TransportCapability> {
        self.base_ready
            .get_or_try_init(|| self.ensure_base_dir())
            .await?;

        let capability = self
            .capability
            .get_or_try_init(|| async {
                let negotiation = negotiate_capability(
                    self.backend.as_ref(),
                    &self.base_root(),
                    self.config.capability(),
                )
                .await?;
                if negotiation.probed {
                    self.persist(negotiation.capability).await;
                }
                Ok::<_, DavsyncError>(negotiation.capability)
            })
            .await?;
        Ok(*capability)
    }

    async fn persist(&self, capability: TransportCapability) {
        let Some(store) = &self.settings else {
            return;
        };
        let updated = self.config.with_capability(capability);
        if let Err(e) = store.save_webdav(&updated).await {
            warn!(error = %e, "could not persist negotiated depth capability");
        }
    }

    async fn ensure_base_dir(&self) -> DavsyncResult<()> {
        if self.base_dir.is_empty() {
            return Ok(());
        }
        self.ensure_collections(&self.base_root()).await
    }

    /// PROPFIND each ancestor of `absolute_dir` and MKCOL the missing ones.
    async fn ensure_collections(&self, absolute_dir: &str) -> DavsyncResult<()> {
        let mut current = String::new();
        for segment in absolute_dir.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            let dir = format!("{current}/");
            match self.backend.propfind(&dir, Depth::Zero).await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    info!(dir = %dir, "creating remote directory");
                    self.backend.mkcol(&dir).await?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Absolute remote path of the base directory, with trailing slash.
    pub fn base_root(&self) -> String {
        if self.base_dir.is_empty() {
            "/".to_string()
        } else {
            format!("/{}/", self.base_dir)
        }
    }

    /// Map a logical path to an absolute remote path.
    ///
    /// `""` and `"/"` name the base directory, relative paths are placed
    /// under it, and absolute paths pass through unchanged.
    pub fn remote_path(&self, logical: &str) -> String {
        if logical.is_empty() || logical == "/" {
            self.base_root()
        } else if logical.starts_with('/') {
            logical.to_string()
        } else {
            format!("{}{logical}", self.base_root())
        }
    }

    /// Inverse of [`remote_path`](Self::remote_path): the key relative to the
    /// base directory. Directory keys end with `/`.
    pub fn normalize_key(&self, remote: &str, is_dir: bool) -> DavsyncResult<String> {
        let root = self.base_root();
        let relative = if remote == trim_dir(&root) || remote == root {
            ""
        } else {
            remote.strip_prefix(root.as_str()).ok_or_else(|| {
                DavsyncError::Transport(format!(
                    "remote path {remote} is outside base directory {root}"
                ))
            })?
        };
        let relative = relative.trim_end_matches('/');
        Ok(if is_dir {
            format!("{relative}/")
        } else {
            relative.to_string()
        })
    }

    pub fn to_remote_item(&self, entry: &DavEntry) -> DavsyncResult<RemoteItem> {
        Ok(RemoteItem {
            key: self.normalize_key(&entry.path, entry.is_dir)?,
            last_modified: entry.last_modified,
            size: entry.size,
            etag: entry.etag.clone(),
        })
    }

    /// PROPFIND `Depth: 0` on a logical path.
    pub async fn stat(&self, logical: &str) -> DavsyncResult<RemoteItem> {
        let remote = self.remote_path(logical);
        let entries = self.backend.propfind(&remote, Depth::Zero).await?;
        let entry = entries
            .into_iter()
            .next()
            .ok_or_else(|| DavsyncError::NotFound(remote.clone()))?;
        self.to_remote_item(&entry)
    }

    pub async fn get_range(&self, logical: &str, range: BlockRange) -> DavsyncResult<Bytes> {
        self.backend
            .get_range(&self.remote_path(logical), range)
            .await
    }

    pub async fn put(&self, logical: &str, body: Bytes) -> DavsyncResult<()> {
        self.backend.put(&self.remote_path(logical), body).await
    }

    pub async fn delete(&self, logical: &str) -> DavsyncResult<()> {
        self.backend.delete(&self.remote_path(logical)).await
    }

    pub async fn mkdir(&self, logical: &str) -> DavsyncResult<()> {
        let mut remote = self.remote_path(logical);
        if !remote.ends_with('/') {
            remote.push('/');
        }
        self.backend.mkcol(&remote).await
    }

    /// Create a logical directory and any missing ancestors.
    pub async fn mkdir_all(&self, logical: &str) -> DavsyncResult<()> {
        self.ensure_collections(&self.remote_path(logical)).await
    }

    /// Every object below the base directory.
    pub async fn list(&self) -> DavsyncResult<Vec<RemoteItem>> {
        crate::listing::list_remote(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryBackend;

    fn transport(base: &str) -> WebdavTransport {
        let config = WebdavConfig {
            remote_base_dir: base.into(),
            ..Default::default()
        };
        WebdavTransport::new(
            Arc::new(MemoryBackend::new()),
            config,
            &TransferConfig::default(),
        )
    }

    #[test]
    fn test_remote_path_mapping() {
        let t = transport("vault");
        assert_eq!(t.remote_path(""), "/vault/");
        assert_eq!(t.remote_path("/"), "/vault/");
        assert_eq!(t.remote_path("notes/a.md"), "/vault/notes/a.md");
        assert_eq!(t.remote_path("/elsewhere/x"), "/elsewhere/x");
    }

    #[test]
    fn test_base_dir_slashes_are_trimmed() {
        let t = transport("/nested/vault/");
        assert_eq!(t.base_dir(), "nested/vault");
        assert_eq!(t.remote_path("a"), "/nested/vault/a");
    }

    #[test]
    fn test_empty_base_dir() {
        let t = transport("");
        assert_eq!(t.remote_path(""), "/");
        assert_eq!(t.remote_path("a"), "/a");
        assert_eq!(t.normalize_key("/a", false).unwrap(), "a");
        assert_eq!(t.normalize_key("/d", true).unwrap(), "d/");
    }

    #[test]
    fn test_normalize_key() {
        let t = transport("vault");
        assert_eq!(t.normalize_key("/vault/notes/a.md", false).unwrap(), "notes/a.md");
        assert_eq!(t.normalize_key("/vault/notes", true).unwrap(), "notes/");
        assert_eq!(t.normalize_key("/vault/notes/", true).unwrap(), "notes/");
        assert_eq!(t.normalize_key("/vault", true).unwrap(), "/");
        assert!(t.normalize_key("/vaultx/a", false).is_err());
        assert!(t.normalize_key("/other/a", false).is_err());
    }

    #[tokio::test]
    async fn test_resolved_capability_skips_probe() {
        let backend = MemoryBackend::new();
        let n = negotiate_capability(&backend, "/", TransportCapability::DepthOneOnly)
            .await
            .unwrap();
        assert_eq!(n.capability, TransportCapability::DepthOneOnly);
        assert!(!n.probed);
        assert!(backend.journal().is_empty());
    }

    #[tokio::test]
    async fn test_negotiation_fails_when_both_probes_fail() {
        let backend = MemoryBackend::new();
        let err = negotiate_capability(&backend, "/missing/", TransportCapability::Unknown)
            .await
            .unwrap_err();
        assert!(matches!(err, DavsyncError::CapabilityNegotiation(_)));
    }
}
