//! Persistence of WebDAV settings learned at runtime
//!
//! The transport writes back the negotiated depth capability so later
//! sessions skip the probe.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use davsync_core::config::{DavsyncConfig, WebdavConfig};
use davsync_core::DavsyncResult;
use tracing::debug;

#[async_trait]
pub trait SettingsStore: Send + Sync {
    async fn load_webdav(&self) -> DavsyncResult<WebdavConfig>;
    async fn save_webdav(&self, webdav: &WebdavConfig) -> DavsyncResult<()>;
}

/// Stores the `[webdav]` table inside the davsync TOML config file,
/// leaving the other sections untouched.
#[derive(Debug, Clone)]
pub struct TomlSettingsStore {
    path: PathBuf,
}

impl TomlSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_config(&self) -> DavsyncResult<DavsyncConfig> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => DavsyncConfig::from_toml_str(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(DavsyncConfig::default()),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl SettingsStore for TomlSettingsStore {
    async fn load_webdav(&self) -> DavsyncResult<WebdavConfig> {
        Ok(self.read_config().await?.webdav)
    }

    async fn save_webdav(&self, webdav: &WebdavConfig) -> DavsyncResult<()> {
        let mut config = self.read_config().await?;
        config.webdav = webdav.clone();

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, config.to_toml_string()?).await?;
        debug!(path = %self.path.display(), depth = ?webdav.depth, "webdav settings saved");
        Ok(())
    }
}

/// Settings held in memory; counts saves for assertions.
#[derive(Debug, Default)]
pub struct MemorySettingsStore {
    webdav: Mutex<WebdavConfig>,
    saves: AtomicUsize,
}

impl MemorySettingsStore {
    pub fn new(webdav: WebdavConfig) -> Self {
        Self {
            webdav: Mutex::new(webdav),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn current(&self) -> WebdavConfig {
        self.webdav
            .lock()
            .map(|w| w.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn load_webdav(&self) -> DavsyncResult<WebdavConfig> {
        Ok(self.current())
    }

    async fn save_webdav(&self, webdav: &WebdavConfig) -> DavsyncResult<()> {
        match self.webdav.lock() {
            Ok(mut guard) => *guard = webdav.clone(),
            Err(poisoned) => *poisoned.into_inner() = webdav.clone(),
        }
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
