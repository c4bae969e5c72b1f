//! Content fingerprints used to compare local and remote objects cheaply.

use sha2::{Digest, Sha256};

/// Length of a fingerprint in bytes; also the length of the remote prefix
/// probed before an upload.
pub const FINGERPRINT_LEN: usize = 32;

/// SHA-256 of `data`.
pub fn content_fingerprint(data: &[u8]) -> [u8; FINGERPRINT_LEN] {
    Sha256::digest(data).into()
}
