use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{DavsyncError, DavsyncResult};
use crate::types::TransportCapability;

/// Top-level configuration (loaded from davsync.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DavsyncConfig {
    pub logging: LogConfig,
    pub webdav: WebdavConfig,
    pub crypto: CryptoConfig,
    pub transfer: TransferConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthType {
    #[default]
    Basic,
    Digest,
}

/// Persisted depth preference. `auto_*` values are written back by the
/// transport once it has probed the server; `manual_*` values are user
/// overrides that skip the probe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DepthSetting {
    #[default]
    #[serde(rename = "auto_unknown")]
    AutoUnknown,
    #[serde(rename = "auto_infinity")]
    AutoInfinity,
    #[serde(rename = "auto_1")]
    AutoOne,
    #[serde(rename = "manual_infinity")]
    ManualInfinity,
    #[serde(rename = "manual_1")]
    ManualOne,
}

/// Connection settings for the remote WebDAV store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebdavConfig {
    /// Server URL, e.g. `https://dav.example.com/remote.php/dav/files/me`
    pub address: String,
    pub username: String,
    pub password: String,
    pub auth_type: AuthType,
    pub depth: DepthSetting,
    pub manual_recursive: bool,
    /// Directory under the server root that holds the synced tree
    pub remote_base_dir: String,
    /// Per-request timeout in seconds (default: 300)
    pub timeout_secs: u64,
}

impl Default for WebdavConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            username: String::new(),
            password: String::new(),
            auth_type: AuthType::Basic,
            depth: DepthSetting::AutoUnknown,
            manual_recursive: false,
            remote_base_dir: String::new(),
            timeout_secs: 300,
        }
    }
}

impl std::fmt::Debug for WebdavConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebdavConfig")
            .field("address", &self.address)
            .field("username", &self.username)
            .field("password", &redacted(&self.password))
            .field("auth_type", &self.auth_type)
            .field("depth", &self.depth)
            .field("manual_recursive", &self.manual_recursive)
            .field("remote_base_dir", &self.remote_base_dir)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl WebdavConfig {
    /// Reject settings that cannot possibly reach a server.
    pub fn validate(&self) -> DavsyncResult<()> {
        if !(self.address.starts_with("http://") || self.address.starts_with("https://")) {
            return Err(DavsyncError::Config(format!(
                "the url should start with http(s):// but it does not: {:?}",
                self.address
            )));
        }
        if self
            .remote_base_dir
            .split('/')
            .any(|segment| segment == "..")
        {
            return Err(DavsyncError::Config(format!(
                "remote_base_dir must not contain '..': {:?}",
                self.remote_base_dir
            )));
        }
        Ok(())
    }

    /// Credentials are only sent when both parts are present.
    pub fn has_credentials(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    pub fn capability(&self) -> TransportCapability {
        match self.depth {
            DepthSetting::AutoUnknown => TransportCapability::Unknown,
            DepthSetting::AutoInfinity | DepthSetting::ManualInfinity => {
                TransportCapability::InfinitySupported
            }
            DepthSetting::AutoOne | DepthSetting::ManualOne => TransportCapability::DepthOneOnly,
        }
    }

    /// Settings updated with a capability learned by probing.
    pub fn with_capability(&self, capability: TransportCapability) -> Self {
        let mut updated = self.clone();
        match capability {
            TransportCapability::Unknown => {}
            TransportCapability::InfinitySupported => {
                updated.depth = DepthSetting::AutoInfinity;
                updated.manual_recursive = false;
            }
            TransportCapability::DepthOneOnly => {
                updated.depth = DepthSetting::AutoOne;
                updated.manual_recursive = true;
            }
        }
        updated
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NameEncoding {
    #[default]
    Base64url,
    Base32,
}

/// Client-side encryption settings
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// Encryption password; empty disables encryption
    pub password: String,
    /// PBKDF2 iterations (default: 20000)
    pub kdf_rounds: u32,
    /// Printable alphabet for obscured remote names
    pub name_encoding: NameEncoding,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            password: String::new(),
            kdf_rounds: 20_000,
            name_encoding: NameEncoding::Base64url,
        }
    }
}

impl std::fmt::Debug for CryptoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoConfig")
            .field("password", &redacted(&self.password))
            .field("kdf_rounds", &self.kdf_rounds)
            .field("name_encoding", &self.name_encoding)
            .finish()
    }
}

impl CryptoConfig {
    pub fn enabled(&self) -> bool {
        !self.password.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Ranged GET block size in bytes (default: 10 MiB)
    pub block_size: u64,
    /// Concurrent PROPFINDs per batch when walking the tree manually
    pub list_batch_size: usize,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            block_size: 10 * 1024 * 1024,
            list_batch_size: 10,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl DavsyncConfig {
    pub fn from_toml_str(s: &str) -> DavsyncResult<Self> {
        toml::from_str(s).map_err(|e| DavsyncError::Config(format!("parsing config: {e}")))
    }

    pub fn to_toml_string(&self) -> DavsyncResult<String> {
        toml::to_string(self).map_err(|e| DavsyncError::Config(format!("serializing config: {e}")))
    }

    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> DavsyncResult<Self> {
        if !path.exists() {
            tracing::warn!(
                "config file not found: {}  (using defaults)",
                path.display()
            );
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
            .map_err(|e| DavsyncError::Config(format!("{}: {e}", path.display())))
    }

    pub fn save(&self, path: &Path) -> DavsyncResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }
}

fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() {
        ""
    } else {
        "[REDACTED]"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[logging]
level = "debug"
format = "json"

[webdav]
address = "https://dav.example.com/dav"
username = "alice"
password = "hunter2"
auth_type = "digest"
depth = "auto_1"
manual_recursive = true
remote_base_dir = "vault"

[crypto]
password = "correct horse"
kdf_rounds = 1000
name_encoding = "base32"

[transfer]
block_size = 1048576
list_batch_size = 4
"#;
        let config = DavsyncConfig::from_toml_str(toml_str).unwrap();

        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.webdav.address, "https://dav.example.com/dav");
        assert_eq!(config.webdav.auth_type, AuthType::Digest);
        assert_eq!(config.webdav.depth, DepthSetting::AutoOne);
        assert!(config.webdav.manual_recursive);
        assert_eq!(config.webdav.remote_base_dir, "vault");
        assert!(config.crypto.enabled());
        assert_eq!(config.crypto.kdf_rounds, 1000);
        assert_eq!(config.crypto.name_encoding, NameEncoding::Base32);
        assert_eq!(config.transfer.block_size, 1_048_576);
        assert_eq!(config.transfer.list_batch_size, 4);
    }

    #[test]
    fn test_parse_defaults() {
        let config = DavsyncConfig::from_toml_str("").unwrap();

        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, "text");
        assert_eq!(config.webdav.auth_type, AuthType::Basic);
        assert_eq!(config.webdav.depth, DepthSetting::AutoUnknown);
        assert_eq!(config.webdav.timeout_secs, 300);
        assert!(!config.crypto.enabled());
        assert_eq!(config.crypto.kdf_rounds, 20_000);
        assert_eq!(config.crypto.name_encoding, NameEncoding::Base64url);
        assert_eq!(config.transfer.block_size, 10 * 1024 * 1024);
        assert_eq!(config.transfer.list_batch_size, 10);
    }

    #[test]
    fn test_validate_rejects_bad_address() {
        let cfg = WebdavConfig {
            address: "ftp://example.com".into(),
            ..Default::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, DavsyncError::Config(_)));

        let cfg = WebdavConfig {
            address: "https://example.com".into(),
            remote_base_dir: "a/../b".into(),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = WebdavConfig {
            address: "http://localhost:8080".into(),
            remote_base_dir: "vault".into(),
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_capability_mapping() {
        let mut cfg = WebdavConfig::default();
        assert_eq!(cfg.capability(), TransportCapability::Unknown);

        cfg.depth = DepthSetting::ManualOne;
        assert_eq!(cfg.capability(), TransportCapability::DepthOneOnly);

        cfg.depth = DepthSetting::ManualInfinity;
        assert_eq!(cfg.capability(), TransportCapability::InfinitySupported);

        let learned = WebdavConfig::default().with_capability(TransportCapability::DepthOneOnly);
        assert_eq!(learned.depth, DepthSetting::AutoOne);
        assert!(learned.manual_recursive);

        let learned = learned.with_capability(TransportCapability::InfinitySupported);
        assert_eq!(learned.depth, DepthSetting::AutoInfinity);
        assert!(!learned.manual_recursive);
    }

    #[test]
    fn test_debug_redacts_passwords() {
        let cfg = DavsyncConfig {
            webdav: WebdavConfig {
                password: "hunter2".into(),
                ..Default::default()
            },
            crypto: CryptoConfig {
                password: "correct horse".into(),
                ..Default::default()
            },
            ..Default::default()
        };
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("hunter2"));
        assert!(!dbg.contains("correct horse"));
        assert!(dbg.contains("[REDACTED]"));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("nested/davsync.toml");

        let mut config = DavsyncConfig::default();
        config.webdav.address = "https://dav.example.com".into();
        config.webdav.depth = DepthSetting::AutoInfinity;
        config.save(&path).unwrap();

        let loaded = DavsyncConfig::load(&path).unwrap();
        assert_eq!(loaded.webdav, config.webdav);
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = DavsyncConfig::load(&tmp.path().join("absent.toml")).unwrap();
        assert_eq!(config.webdav.depth, DepthSetting::AutoUnknown);
    }
}
