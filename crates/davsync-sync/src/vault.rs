//! Host file-system access, rooted at the vault directory
//!
//! Paths are vault-relative with `/` separators, the same keys the transfer
//! engine uses remotely.

use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use davsync_core::{DavsyncError, DavsyncResult};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Direct children of a vault directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VaultListing {
    pub files: Vec<String>,
    pub folders: Vec<String>,
}

#[async_trait]
pub trait LocalVault: Send + Sync {
    async fn list(&self, dir: &str) -> DavsyncResult<VaultListing>;
    async fn read_binary(&self, path: &str) -> DavsyncResult<Vec<u8>>;
    /// Write `data`, replacing any existing file; `mtime` is milliseconds
    /// since the Unix epoch.
    async fn write_binary(&self, path: &str, data: &[u8], mtime: Option<i64>)
        -> DavsyncResult<()>;
    async fn exists(&self, path: &str) -> DavsyncResult<bool>;
    async fn create_dir_all(&self, path: &str) -> DavsyncResult<()>;
}

#[derive(Debug, Clone)]
pub struct FsVault {
    root: PathBuf,
}

impl FsVault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a vault key onto the file system, refusing anything that could
    /// leave the root.
    fn resolve(&self, path: &str) -> DavsyncResult<PathBuf> {
        let mut resolved = self.root.clone();
        for component in Path::new(path.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                    return Err(DavsyncError::InvalidPath(path.to_string()))
                }
            }
        }
        Ok(resolved)
    }

    fn key_for(dir: &str, name: &str) -> String {
        let dir = dir.trim_matches('/');
        if dir.is_empty() {
            name.to_string()
        } else {
            format!("{dir}/{name}")
        }
    }
}

#[async_trait]
impl LocalVault for FsVault {
    async fn list(&self, dir: &str) -> DavsyncResult<VaultListing> {
        let mut listing = VaultListing::default();
        let mut entries = tokio::fs::read_dir(self.resolve(dir)?).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let key = Self::key_for(dir, &name);
            if entry.file_type().await?.is_dir() {
                listing.folders.push(key);
            } else {
                listing.files.push(key);
            }
        }
        listing.files.sort();
        listing.folders.sort();
        Ok(listing)
    }

    async fn read_binary(&self, path: &str) -> DavsyncResult<Vec<u8>> {
        Ok(tokio::fs::read(self.resolve(path)?).await?)
    }

    async fn write_binary(
        &self,
        path: &str,
        data: &[u8],
        mtime: Option<i64>,
    ) -> DavsyncResult<()> {
        let target = self.resolve(path)?;
        let (Some(parent), Some(name)) = (target.parent(), target.file_name()) else {
            return Err(DavsyncError::InvalidPath(path.to_string()));
        };
        tokio::fs::create_dir_all(parent).await?;

        // Write beside the target, then rename over it.
        let tmp = parent.join(format!(".{}.davsync-tmp", name.to_string_lossy()));
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(data).await?;
        file.sync_all().await?;

        if let Some(ms) = mtime.filter(|ms| *ms > 0) {
            let modified = UNIX_EPOCH + Duration::from_millis(ms as u64);
            let std_file = file.into_std().await;
            tokio::task::spawn_blocking(move || std_file.set_modified(modified))
                .await
                .map_err(|e| DavsyncError::Other(e.into()))??;
        } else {
            drop(file);
        }

        tokio::fs::rename(&tmp, &target).await?;
        debug!(path, bytes = data.len(), "vault write");
        Ok(())
    }

    async fn exists(&self, path: &str) -> DavsyncResult<bool> {
        Ok(tokio::fs::try_exists(self.resolve(path)?).await?)
    }

    async fn create_dir_all(&self, path: &str) -> DavsyncResult<()> {
        Ok(tokio::fs::create_dir_all(self.resolve(path)?).await?)
    }
}

/// Milliseconds since the Unix epoch of a file's modification time.
pub fn mtime_millis(modified: SystemTime) -> i64 {
    modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_read_and_list() {
        let tmp = TempDir::new().unwrap();
        let vault = FsVault::new(tmp.path());

        vault.write_binary("notes/a.md", b"alpha", None).await.unwrap();
        vault.write_binary("b.md", b"beta", None).await.unwrap();

        assert_eq!(vault.read_binary("notes/a.md").await.unwrap(), b"alpha");
        assert!(vault.exists("notes").await.unwrap());
        assert!(!vault.exists("nope.md").await.unwrap());

        let root = vault.list("").await.unwrap();
        assert_eq!(root.files, ["b.md"]);
        assert_eq!(root.folders, ["notes"]);

        let notes = vault.list("notes/").await.unwrap();
        assert_eq!(notes.files, ["notes/a.md"]);
        assert!(notes.folders.is_empty());
    }

    #[tokio::test]
    async fn test_write_sets_mtime_and_leaves_no_temp_file() {
        let tmp = TempDir::new().unwrap();
        let vault = FsVault::new(tmp.path());
        let mtime = 1_700_000_000_000i64;

        vault.write_binary("a.md", b"x", Some(mtime)).await.unwrap();

        let meta = std::fs::metadata(tmp.path().join("a.md")).unwrap();
        assert_eq!(mtime_millis(meta.modified().unwrap()), mtime);
        assert_eq!(vault.list("").await.unwrap().files, ["a.md"]);
    }

    #[tokio::test]
    async fn test_overwrite_replaces_content() {
        let tmp = TempDir::new().unwrap();
        let vault = FsVault::new(tmp.path());
        vault.write_binary("a.md", b"first", None).await.unwrap();
        vault.write_binary("a.md", b"second", None).await.unwrap();
        assert_eq!(vault.read_binary("a.md").await.unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_rejects_escaping_paths() {
        let tmp = TempDir::new().unwrap();
        let vault = FsVault::new(tmp.path());
        let err = vault.read_binary("../etc/passwd").await.unwrap_err();
        assert!(matches!(err, DavsyncError::InvalidPath(_)));
        let err = vault
            .write_binary("notes/../../x", b"", None)
            .await
            .unwrap_err();
        assert!(matches!(err, DavsyncError::InvalidPath(_)));
    }
}
