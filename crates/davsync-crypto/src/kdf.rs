//! Key derivation: PBKDF2-HMAC-SHA256 password → 256-bit key

use davsync_core::{DavsyncError, DavsyncResult};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{KEY_SIZE, SALT_SIZE};

/// Iteration count used when the caller does not pick one.
pub const DEFAULT_ROUNDS: u32 = 20_000;

/// Key material for a single encrypt/decrypt call.
///
/// Zeroized on drop; never persisted.
pub struct DerivedKey {
    bytes: [u8; KEY_SIZE],
}

impl DerivedKey {
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive a 256-bit key from a password and the stream's salt.
///
/// Deterministic: the same (password, salt, rounds) always yields the same key.
pub fn derive_key(
    password: &SecretString,
    salt: &[u8; SALT_SIZE],
    rounds: u32,
) -> DavsyncResult<DerivedKey> {
    let mut bytes = [0u8; KEY_SIZE];
    pbkdf2_sha256(password.expose_secret().as_bytes(), salt, rounds, &mut bytes)?;
    Ok(DerivedKey { bytes })
}

fn pbkdf2_sha256(password: &[u8], salt: &[u8], rounds: u32, out: &mut [u8]) -> DavsyncResult<()> {
    if rounds == 0 {
        return Err(DavsyncError::KeyDerivation(
            "PBKDF2 rounds must be at least 1".into(),
        ));
    }
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, rounds, out);
    Ok(())
}
