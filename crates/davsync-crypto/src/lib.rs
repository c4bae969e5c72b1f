//! davsync-crypto: client-side encryption for davsync
//!
//! Every encrypted object is self-describing:
//! ```text
//! salt (16) || iv (12) || block_0 || block_1 || ... || block_n
//!   key     = PBKDF2-HMAC-SHA256(password, salt, rounds)   (256-bit)
//!   block_i = AES-256-GCM(key, iv, plaintext[i*B .. (i+1)*B]) || tag (16)
//! ```
//! with `B` = 10 MiB. Remote names are the same stream rendered in an
//! unpadded printable alphabet (base64url or base32).

pub mod codec;
pub mod fingerprint;
pub mod kdf;
pub mod size;
pub mod text;

pub use codec::{decrypt, encrypt, encrypted_len, CodecParams};
pub use davsync_core::config::NameEncoding;
pub use fingerprint::{content_fingerprint, FINGERPRINT_LEN};
pub use kdf::{derive_key, DerivedKey, DEFAULT_ROUNDS};
pub use size::{cipher_to_plain_size, plain_to_cipher_size};
pub use text::{decrypt_from_text, encrypt_to_text};

/// Size of a derived key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of the per-stream PBKDF2 salt
pub const SALT_SIZE: usize = 16;

/// Size of an AES-GCM nonce (96-bit)
pub const IV_SIZE: usize = 12;

/// Size of a GCM authentication tag
pub const TAG_SIZE: usize = 16;

/// `salt || iv` prefix carried by every stream
pub const HEADER_SIZE: usize = SALT_SIZE + IV_SIZE;

/// Plaintext bytes per AEAD invocation
pub const BLOCK_SIZE: usize = 10 * 1024 * 1024;
