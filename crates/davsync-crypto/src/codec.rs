//! Chunked AES-256-GCM stream codec
//!
//! Stream format (binary):
//! ```text
//! [16 bytes: salt][12 bytes: iv][block_0 ciphertext][16 bytes: tag] ... [block_n ciphertext][16 bytes: tag]
//! ```
//!
//! Each block of `block_size` plaintext bytes (the last may be shorter) is a
//! separate AEAD invocation under the same key and the same iv. Readers split
//! the body at `block_size + 16` byte boundaries. Empty input produces a bare
//! header and zero blocks.
//!
//! The single iv per stream is part of the wire format shared with existing
//! remote data and must not be replaced by per-block nonces. Under GCM every
//! block therefore starts from the same counter, so two blocks of one stream
//! share keystream; the fresh salt (and hence fresh key) per stream keeps this
//! confined to blocks of the same object.

use aes_gcm::aead::generic_array::GenericArray;
use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use davsync_core::{DavsyncError, DavsyncResult};
use rand::RngCore;
use secrecy::SecretString;
use tracing::debug;
use zeroize::Zeroize;

use crate::kdf::{derive_key, DEFAULT_ROUNDS};
use crate::{BLOCK_SIZE, HEADER_SIZE, IV_SIZE, SALT_SIZE, TAG_SIZE};

/// Tunables for one encrypt/decrypt call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecParams {
    /// PBKDF2 iteration count (default: 20000)
    pub rounds: u32,
    /// Plaintext bytes per AEAD block (default: 10 MiB). Writers and readers
    /// must agree on this value.
    pub block_size: usize,
}

impl Default for CodecParams {
    fn default() -> Self {
        Self {
            rounds: DEFAULT_ROUNDS,
            block_size: BLOCK_SIZE,
        }
    }
}

impl CodecParams {
    pub fn with_rounds(rounds: u32) -> Self {
        Self {
            rounds,
            ..Self::default()
        }
    }

    fn check(&self) -> DavsyncResult<()> {
        if self.block_size == 0 {
            return Err(DavsyncError::Config("codec block_size must be non-zero".into()));
        }
        Ok(())
    }
}

/// Exact length of the stream `encrypt` produces for `plain_len` bytes.
pub fn encrypted_len(plain_len: usize, block_size: usize) -> usize {
    HEADER_SIZE + plain_len + plain_len.div_ceil(block_size.max(1)) * TAG_SIZE
}

/// Encrypt `plaintext` into a self-describing stream with a fresh salt and iv.
pub fn encrypt(
    plaintext: &[u8],
    password: &SecretString,
    params: &CodecParams,
) -> DavsyncResult<Vec<u8>> {
    let mut salt = [0u8; SALT_SIZE];
    let mut iv = [0u8; IV_SIZE];
    let mut rng = rand::thread_rng();
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut iv);

    encrypt_with_header(plaintext, password, params, &salt, &iv)
}

fn encrypt_with_header(
    plaintext: &[u8],
    password: &SecretString,
    params: &CodecParams,
    salt: &[u8; SALT_SIZE],
    iv: &[u8; IV_SIZE],
) -> DavsyncResult<Vec<u8>> {
    params.check()?;
    let key = derive_key(password, salt, params.rounds)?;
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = Nonce::from_slice(iv);

    let mut out = Vec::with_capacity(encrypted_len(plaintext.len(), params.block_size));
    out.extend_from_slice(salt);
    out.extend_from_slice(iv);

    for (i, block) in plaintext.chunks(params.block_size).enumerate() {
        let start = out.len();
        out.extend_from_slice(block);
        let tag = cipher
            .encrypt_in_place_detached(nonce, b"", &mut out[start..])
            .map_err(|e| DavsyncError::Integrity(format!("block {i} encryption failed: {e}")))?;
        out.extend_from_slice(&tag);
    }

    debug!(
        plain = plaintext.len(),
        encrypted = out.len(),
        blocks = plaintext.len().div_ceil(params.block_size),
        "encrypted stream"
    );
    Ok(out)
}

/// Decrypt a stream produced by [`encrypt`].
///
/// Any block failing authentication aborts the call; no partial plaintext is
/// returned.
pub fn decrypt(
    stream: &[u8],
    password: &SecretString,
    params: &CodecParams,
) -> DavsyncResult<Vec<u8>> {
    params.check()?;
    if stream.len() < HEADER_SIZE {
        return Err(DavsyncError::Integrity(format!(
            "stream too short: {} bytes (minimum {HEADER_SIZE})",
            stream.len()
        )));
    }

    let (salt, rest) = stream.split_at(SALT_SIZE);
    let (iv, body) = rest.split_at(IV_SIZE);
    let salt: &[u8; SALT_SIZE] = salt
        .try_into()
        .map_err(|_| DavsyncError::Integrity("malformed salt".into()))?;

    let key = derive_key(password, salt, params.rounds)?;
    let cipher = Aes256Gcm::new(key.as_bytes().into());
    let nonce = Nonce::from_slice(iv);

    let mut out = Vec::with_capacity(body.len());
    for (i, chunk) in body.chunks(params.block_size + TAG_SIZE).enumerate() {
        if chunk.len() < TAG_SIZE {
            out.zeroize();
            return Err(DavsyncError::Integrity(format!(
                "block {i} truncated: {} bytes",
                chunk.len()
            )));
        }
        let (ciphertext, tag) = chunk.split_at(chunk.len() - TAG_SIZE);
        let start = out.len();
        out.extend_from_slice(ciphertext);
        if cipher
            .decrypt_in_place_detached(nonce, b"", &mut out[start..], GenericArray::from_slice(tag))
            .is_err()
        {
            out.zeroize();
            return Err(DavsyncError::Integrity(format!(
                "block {i} failed authentication: wrong password or corrupted data"
            )));
        }
    }

    Ok(out)
}
