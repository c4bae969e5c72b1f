//! davsync-sync: moves file contents between a local vault and the WebDAV
//! store, encrypting on the way out and decrypting on the way in when a
//! password is configured.

pub mod engine;
pub mod vault;

pub use engine::{
    delete_remote, download_blocks, download_file, format_size, upload_file, upload_raw,
    verify_remote, DownloadResult, EncryptionContext, ProgressFn, RemoteCheck, UploadResult,
};
pub use vault::{FsVault, LocalVault, VaultListing};
