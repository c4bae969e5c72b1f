//! Transfer engine: uploads, ranged downloads, and the pre-upload probe
//!
//!   - `upload_file`: read from the vault, skip if the remote probe says
//!     unchanged, otherwise encrypt (optional) and PUT in one request
//!   - `download_blocks`: ranged GETs of `block_size` each into a buffer
//!     preallocated to the known size
//!   - `download_file`: stat, download, decrypt (optional), write to the vault
//!   - `verify_remote`: stat plus the 32-byte fingerprint probe
//!
//! With encryption on, remote keys are the obscured form of the vault key and
//! sit flat under the base directory; folders become empty placeholder
//! objects whose revealed key ends with `/`.

use bytes::Bytes;
use davsync_core::config::{CryptoConfig, NameEncoding};
use davsync_core::{BlockRange, DavsyncError, DavsyncResult, RemoteItem};
use davsync_crypto::{content_fingerprint, CodecParams, FINGERPRINT_LEN};
use davsync_storage::WebdavTransport;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::vault::LocalVault;

/// Progress callback type (done, total, message)
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;

/// Password and parameters for content and name encryption.
pub struct EncryptionContext {
    pub password: SecretString,
    pub rounds: u32,
    pub name_encoding: NameEncoding,
}

impl std::fmt::Debug for EncryptionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptionContext")
            .field("password", &"[REDACTED]")
            .field("rounds", &self.rounds)
            .field("name_encoding", &self.name_encoding)
            .finish()
    }
}

impl EncryptionContext {
    pub fn new(password: SecretString, rounds: u32, name_encoding: NameEncoding) -> Self {
        Self {
            password,
            rounds,
            name_encoding,
        }
    }

    /// `None` when no password is configured.
    pub fn from_config(crypto: &CryptoConfig) -> Option<Self> {
        crypto.enabled().then(|| {
            Self::new(
                SecretString::from(crypto.password.clone()),
                crypto.kdf_rounds,
                crypto.name_encoding,
            )
        })
    }

    /// Encrypted, printable remote name for a vault key. Randomized: two calls
    /// give different names for the same key.
    pub fn obscure_key(&self, key: &str) -> DavsyncResult<String> {
        davsync_crypto::encrypt_to_text(key, &self.password, self.rounds, self.name_encoding)
    }

    /// Vault key behind an obscured remote key (its last path segment).
    pub fn reveal_key(&self, remote_key: &str) -> DavsyncResult<String> {
        let name = remote_key
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default();
        davsync_crypto::decrypt_from_text(name, &self.password, self.rounds, self.name_encoding)
    }

    fn owned_password(&self) -> SecretString {
        SecretString::from(self.password.expose_secret().to_owned())
    }

    async fn encrypt(&self, plain: Vec<u8>) -> DavsyncResult<Vec<u8>> {
        let password = self.owned_password();
        let params = CodecParams::with_rounds(self.rounds);
        tokio::task::spawn_blocking(move || davsync_crypto::encrypt(&plain, &password, &params))
            .await
            .map_err(|e| DavsyncError::Other(e.into()))?
    }

    async fn decrypt(&self, stream: Vec<u8>) -> DavsyncResult<Vec<u8>> {
        let password = self.owned_password();
        let params = CodecParams::with_rounds(self.rounds);
        tokio::task::spawn_blocking(move || davsync_crypto::decrypt(&stream, &password, &params))
            .await
            .map_err(|e| DavsyncError::Other(e.into()))?
    }
}

/// Result of uploading one vault entry
#[derive(Debug)]
pub struct UploadResult {
    /// Remote state after the upload (or the existing object when skipped)
    pub item: RemoteItem,
    /// Key the object lives under remotely (obscured when encrypting)
    pub remote_key: String,
    /// true if the remote already matched and nothing was sent
    pub skipped: bool,
}

/// Result of downloading one remote entry
#[derive(Debug)]
pub struct DownloadResult {
    pub key: String,
    pub remote_key: String,
    pub bytes: u64,
}

/// Outcome of [`verify_remote`] for an existing remote object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCheck {
    /// Ranged GETs a download of this object takes
    pub block_count: u64,
    /// Remote size in bytes
    pub total: u64,
    /// Vault key the remote object corresponds to
    pub remote_name: String,
    /// Remote metadata at the time of the check
    pub item: RemoteItem,
    /// The fingerprint probe matched; upload can be skipped
    pub is_same: bool,
}

/// Render a byte count as B/KB/MB/GB with two decimals.
pub fn format_size(bytes: u64) -> String {
    const KB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KB {
        format!("{bytes} B")
    } else if b < KB * KB {
        format!("{:.2} KB", b / KB)
    } else if b < KB * KB * KB {
        format!("{:.2} MB", b / (KB * KB))
    } else {
        format!("{:.2} GB", b / (KB * KB * KB))
    }
}

/// Compare the first `FINGERPRINT_LEN` remote bytes against the local
/// content fingerprint.
///
/// This is a heuristic: the remote prefix is raw (possibly encrypted) content
/// while the fingerprint is a digest of the plaintext, so a match only occurs
/// when the stored object starts with that digest.
async fn fingerprint_matches(
    transport: &WebdavTransport,
    remote_key: &str,
    local: &[u8],
) -> DavsyncResult<bool> {
    let head = transport
        .get_range(remote_key, BlockRange::new(0, FINGERPRINT_LEN as u64))
        .await?;
    Ok(head.len() == FINGERPRINT_LEN && head[..] == content_fingerprint(local))
}

/// Stat a remote object, map it back to its vault key, and run the
/// fingerprint probe against the local copy.
///
/// Returns `None` when the remote object does not exist (it needs uploading).
/// Folders and entries missing from the vault are never the same; no range
/// is fetched for them.
pub async fn verify_remote(
    transport: &WebdavTransport,
    vault: &dyn LocalVault,
    ctx: Option<&EncryptionContext>,
    remote_key: &str,
) -> DavsyncResult<Option<RemoteCheck>> {
    let item = match transport.stat(remote_key).await {
        Ok(item) => item,
        Err(e) if e.is_not_found() => {
            debug!(remote_key, "not on remote");
            return Ok(None);
        }
        Err(e) => return Err(e),
    };

    let remote_name = match ctx {
        Some(ctx) => ctx.reveal_key(remote_key)?,
        None => remote_key.to_string(),
    };
    let is_same = if item.is_dir()
        || remote_name.ends_with('/')
        || !vault.exists(&remote_name).await?
    {
        debug!(remote_key, remote_name = %remote_name, "no local file to compare");
        false
    } else {
        let local = vault.read_binary(&remote_name).await?;
        fingerprint_matches(transport, remote_key, &local).await?
    };

    Ok(Some(RemoteCheck {
        block_count: BlockRange::block_count(item.size, transport.block_size()),
        total: item.size,
        remote_name,
        item,
        is_same,
    }))
}

/// Upload one vault entry.
///
/// `key` is the vault key (folders end with `/`). `existing_remote` is the
/// remote key already holding this entry, if the caller knows it from a
/// listing; without it an encrypted upload gets a fresh obscured name.
pub async fn upload_file(
    transport: &WebdavTransport,
    vault: &dyn LocalVault,
    ctx: Option<&EncryptionContext>,
    key: &str,
    existing_remote: Option<&str>,
    progress: Option<&ProgressFn>,
) -> DavsyncResult<UploadResult> {
    let remote_key = match (existing_remote, ctx) {
        (Some(remote), _) => remote.to_string(),
        (None, Some(ctx)) => ctx.obscure_key(key)?,
        (None, None) => key.to_string(),
    };

    if key.ends_with('/') {
        match ctx {
            None => transport.mkdir_all(&remote_key).await?,
            Some(_) => transport.put(&remote_key, Bytes::new()).await?,
        }
        let item = transport.stat(&remote_key).await?;
        info!(key, remote_key = %remote_key, "folder uploaded");
        return Ok(UploadResult {
            item,
            remote_key,
            skipped: false,
        });
    }

    if let Some(check) = verify_remote(transport, vault, ctx, &remote_key).await? {
        if check.is_same {
            debug!(key, remote_key = %remote_key, "skip: remote unchanged");
            return Ok(UploadResult {
                item: check.item,
                remote_key,
                skipped: true,
            });
        }
    }

    let local = vault.read_binary(key).await?;
    let local_len = local.len() as u64;

    let body = match ctx {
        Some(ctx) => ctx.encrypt(local).await?,
        None => local,
    };
    let sent = body.len() as u64;
    let body = Bytes::from(body);

    if let Err(e) = transport.put(&remote_key, body.clone()).await {
        // Unencrypted keys keep their folders; create them on first write.
        let conflict = matches!(e, DavsyncError::Http { status: 409, .. });
        let parent = remote_key.rsplit_once('/').map(|(dir, _)| dir);
        match (conflict, parent) {
            (true, Some(dir)) => {
                debug!(dir, "creating missing remote folders");
                transport.mkdir_all(dir).await?;
                transport.put(&remote_key, body).await?;
            }
            _ => return Err(e),
        }
    }

    if let Some(cb) = progress {
        cb(sent, sent, &format!("uploaded {}", format_size(sent)));
    }

    let item = transport.stat(&remote_key).await?;
    info!(
        key,
        remote_key = %remote_key,
        bytes = local_len,
        sent,
        "uploaded"
    );
    Ok(UploadResult {
        item,
        remote_key,
        skipped: false,
    })
}

/// PUT bytes as-is (no encryption, no probe), e.g. for metadata objects.
pub async fn upload_raw(
    transport: &WebdavTransport,
    key: &str,
    data: impl Into<Bytes>,
) -> DavsyncResult<RemoteItem> {
    transport.put(key, data.into()).await?;
    transport.stat(key).await
}

/// Fetch `size` bytes of a remote object with one ranged GET per block.
///
/// A failed or empty block is logged and skipped so the remaining blocks are
/// still fetched; if any byte is missing at the end the whole download fails
/// with `IncompleteDownload`.
pub async fn download_blocks(
    transport: &WebdavTransport,
    remote_key: &str,
    size: u64,
    progress: Option<&ProgressFn>,
) -> DavsyncResult<Vec<u8>> {
    let ranges = BlockRange::split(size, transport.block_size());
    let total_blocks = ranges.len();
    let len = usize::try_from(size)
        .map_err(|_| DavsyncError::SizeValidation(format!("{size} bytes does not fit in memory")))?;
    let mut buf = vec![0u8; len];
    let mut received = 0u64;

    for (i, range) in ranges.into_iter().enumerate() {
        match transport.get_range(remote_key, range).await {
            Ok(block) if block.is_empty() => {
                warn!(remote_key, block = i, "empty block");
            }
            Ok(block) => {
                let n = block.len().min(range.len() as usize);
                let start = range.start as usize;
                buf[start..start + n].copy_from_slice(&block[..n]);
                received += n as u64;
                if (n as u64) < range.len() {
                    warn!(remote_key, block = i, got = n, want = range.len(), "short block");
                }
            }
            Err(e) => {
                warn!(remote_key, block = i, error = %e, "block download failed");
            }
        }

        if let Some(cb) = progress {
            cb(
                range.end.min(size),
                size,
                &format!("block {}/{total_blocks} ({})", i + 1, format_size(range.end)),
            );
        }
    }

    if received < size {
        return Err(DavsyncError::IncompleteDownload {
            path: transport.remote_path(remote_key),
            expected: size,
            received,
        });
    }
    debug!(remote_key, bytes = size, blocks = total_blocks, "download complete");
    Ok(buf)
}

/// Download a remote entry into the vault, decrypting when `ctx` is set.
///
/// Folders only create the local directory. Files keep the remote
/// modification time.
pub async fn download_file(
    transport: &WebdavTransport,
    vault: &dyn LocalVault,
    ctx: Option<&EncryptionContext>,
    remote_key: &str,
    progress: Option<&ProgressFn>,
) -> DavsyncResult<DownloadResult> {
    let key = match ctx {
        Some(ctx) => ctx.reveal_key(remote_key)?,
        None => remote_key.to_string(),
    };

    if key.ends_with('/') {
        vault.create_dir_all(&key).await?;
        return Ok(DownloadResult {
            key,
            remote_key: remote_key.to_string(),
            bytes: 0,
        });
    }

    let item = transport.stat(remote_key).await?;
    let body = download_blocks(transport, remote_key, item.size, progress).await?;
    let plain = match ctx {
        Some(ctx) => ctx.decrypt(body).await?,
        None => body,
    };

    let mtime = (item.last_modified > 0).then_some(item.last_modified);
    vault.write_binary(&key, &plain, mtime).await?;
    info!(key = %key, remote_key, bytes = plain.len(), "downloaded");

    Ok(DownloadResult {
        key,
        remote_key: remote_key.to_string(),
        bytes: plain.len() as u64,
    })
}

/// Delete a remote entry. The base directory itself is never deleted, and a
/// missing object counts as deleted.
pub async fn delete_remote(transport: &WebdavTransport, remote_key: &str) -> DavsyncResult<()> {
    if remote_key.is_empty() || remote_key == "/" {
        return Ok(());
    }
    match transport.delete(remote_key).await {
        Ok(()) => {
            info!(remote_key, "deleted");
            Ok(())
        }
        Err(e) if e.is_not_found() => {
            debug!(remote_key, "delete: already gone");
            Ok(())
        }
        Err(e) => Err(e),
    }
}
