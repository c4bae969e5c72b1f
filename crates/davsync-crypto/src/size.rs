//! Plaintext ↔ ciphertext size estimates
//!
//! These formulas predate the chunked codec and are kept bit-for-bit because
//! progress reporting and stored history rows are computed with them. They
//! model the ciphertext as plaintext rounded up to the next 16-byte boundary
//! plus 16 bytes of overhead, so the inverse can only recover a 16-value
//! bracket.

use davsync_core::{DavsyncError, DavsyncResult, SizeRange};

/// Estimated encrypted size for `n` plaintext bytes: `(⌊n/16⌋ + 1) * 16 + 16`.
pub fn plain_to_cipher_size(n: i64) -> DavsyncResult<u64> {
    if n < 0 {
        return Err(DavsyncError::SizeValidation(format!(
            "plain_to_cipher_size: {n} is not a valid size"
        )));
    }
    (n as u64 / 16)
        .checked_add(1)
        .and_then(|blocks| blocks.checked_mul(16))
        .and_then(|padded| padded.checked_add(16))
        .ok_or_else(|| {
            DavsyncError::SizeValidation(format!("plain_to_cipher_size: {n} overflows"))
        })
}

/// Plaintext size bracket for an encrypted size `n`.
///
/// `n` must be at least 32 and a multiple of 16.
pub fn cipher_to_plain_size(n: i64) -> DavsyncResult<SizeRange> {
    if n < 32 {
        return Err(DavsyncError::SizeValidation(format!(
            "cipher_to_plain_size: {n} is not a valid size"
        )));
    }
    if n % 16 != 0 {
        return Err(DavsyncError::NotBlockAligned(n));
    }
    let min_size = ((n as u64 - 16) / 16 - 1) * 16;
    Ok(SizeRange {
        min_size,
        max_size: min_size + 15,
    })
}
