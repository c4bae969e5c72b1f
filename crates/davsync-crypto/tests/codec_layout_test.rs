//! Integration tests for the encrypted stream layout with the production
//! block size: multi-block payloads, size accounting, and tamper detection.

use davsync_core::DavsyncError;
use davsync_crypto::{
    decrypt, encrypt, encrypted_len, CodecParams, BLOCK_SIZE, HEADER_SIZE, TAG_SIZE,
};
use secrecy::SecretString;

fn password() -> SecretString {
    SecretString::from("multi-block-password")
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len as u64)
        .map(|i| (i.wrapping_mul(2_654_435_761) >> 7) as u8)
        .collect()
}

#[test]
fn multi_block_roundtrip_with_default_block_size() {
    let params = CodecParams::with_rounds(100);
    let original = pattern(BLOCK_SIZE + 12_345);

    let encrypted = encrypt(&original, &password(), &params).expect("encrypt");

    let num_blocks = 2;
    assert_eq!(
        encrypted.len(),
        HEADER_SIZE + num_blocks * TAG_SIZE + original.len()
    );
    assert_eq!(encrypted.len(), encrypted_len(original.len(), BLOCK_SIZE));

    let decrypted = decrypt(&encrypted, &password(), &params).expect("decrypt");
    assert_eq!(decrypted.len(), original.len());
    assert_eq!(decrypted, original, "multi-block round-trip must be exact");
}

#[test]
fn tampering_second_block_is_detected() {
    let params = CodecParams::with_rounds(100);
    let original = pattern(BLOCK_SIZE + 100);
    let mut encrypted = encrypt(&original, &password(), &params).unwrap();

    let second_block_start = HEADER_SIZE + BLOCK_SIZE + TAG_SIZE;
    encrypted[second_block_start + 50] ^= 0x80;

    let result = decrypt(&encrypted, &password(), &params);
    assert!(
        matches!(result, Err(DavsyncError::Integrity(_))),
        "tampered second block must fail authentication"
    );
}

#[test]
fn tampering_tag_is_detected() {
    let params = CodecParams::with_rounds(100);
    let mut encrypted = encrypt(b"tag check", &password(), &params).unwrap();
    let last = encrypted.len() - 1;
    encrypted[last] ^= 0x01;

    assert!(decrypt(&encrypted, &password(), &params).is_err());
}
