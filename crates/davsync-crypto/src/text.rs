//! Printable encodings of encrypted streams
//!
//! Remote object names are the encrypted stream of the local path rendered in
//! an unpadded, URL- and filesystem-safe alphabet. Decoding is loose so that
//! names survive servers that re-case or re-pad them.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use data_encoding::BASE32_NOPAD;
use davsync_core::config::NameEncoding;
use davsync_core::{DavsyncError, DavsyncResult};
use secrecy::SecretString;

use crate::codec::{self, CodecParams};

/// Render bytes in `encoding` without padding.
pub fn encode(bytes: &[u8], encoding: NameEncoding) -> String {
    match encoding {
        NameEncoding::Base64url => URL_SAFE_NO_PAD.encode(bytes),
        NameEncoding::Base32 => BASE32_NOPAD.encode(bytes),
    }
}

/// Parse `text` in `encoding`, tolerating padding, whitespace, and alphabet
/// variants.
///
/// base32 is case-insensitive and reads `0`, `1`, `8` as `O`, `L`, `B`;
/// base64url also accepts the standard `+` and `/` characters.
pub fn decode_loose(text: &str, encoding: NameEncoding) -> DavsyncResult<Vec<u8>> {
    let cleaned = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '=');

    match encoding {
        NameEncoding::Base64url => {
            let normalized: String = cleaned
                .map(|c| match c {
                    '+' => '-',
                    '/' => '_',
                    other => other,
                })
                .collect();
            URL_SAFE_NO_PAD
                .decode(normalized.as_bytes())
                .map_err(|e| DavsyncError::Encoding(format!("invalid base64url: {e}")))
        }
        NameEncoding::Base32 => {
            let normalized: String = cleaned
                .map(|c| match c.to_ascii_uppercase() {
                    '0' => 'O',
                    '1' => 'L',
                    '8' => 'B',
                    other => other,
                })
                .collect();
            BASE32_NOPAD
                .decode(normalized.as_bytes())
                .map_err(|e| DavsyncError::Encoding(format!("invalid base32: {e}")))
        }
    }
}

/// Encrypt a UTF-8 string and render the stream as printable text.
pub fn encrypt_to_text(
    text: &str,
    password: &SecretString,
    rounds: u32,
    encoding: NameEncoding,
) -> DavsyncResult<String> {
    let stream = codec::encrypt(text.as_bytes(), password, &CodecParams::with_rounds(rounds))?;
    Ok(encode(&stream, encoding))
}

/// Inverse of [`encrypt_to_text`].
pub fn decrypt_from_text(
    encoded: &str,
    password: &SecretString,
    rounds: u32,
    encoding: NameEncoding,
) -> DavsyncResult<String> {
    let stream = decode_loose(encoded, encoding)?;
    let plain = codec::decrypt(&stream, password, &CodecParams::with_rounds(rounds))?;
    String::from_utf8(plain)
        .map_err(|e| DavsyncError::Encoding(format!("decrypted text is not UTF-8: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ROUNDS: u32 = 10;

    fn password() -> SecretString {
        SecretString::from("hey")
    }

    #[test]
    fn test_encrypt_changes_text() {
        let k = "dkjdhkfhdkjgsdklxxd";
        let enc = encrypt_to_text(k, &password(), ROUNDS, NameEncoding::Base32).unwrap();
        assert_ne!(enc, k);
    }

    #[test]
    fn test_roundtrip_both_alphabets() {
        for encoding in [NameEncoding::Base64url, NameEncoding::Base32] {
            let name = "notes/2026/Tagebuch – März.md";
            let enc = encrypt_to_text(name, &password(), ROUNDS, encoding).unwrap();
            let dec = decrypt_from_text(&enc, &password(), ROUNDS, encoding).unwrap();
            assert_eq!(dec, name);
        }
    }

    #[test]
    fn test_output_is_unpadded_and_path_safe() {
        let b64 = encrypt_to_text("a", &password(), ROUNDS, NameEncoding::Base64url).unwrap();
        assert!(b64
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));

        let b32 = encrypt_to_text("a", &password(), ROUNDS, NameEncoding::Base32).unwrap();
        assert!(b32
            .chars()
            .all(|c| c.is_ascii_uppercase() || ('2'..='7').contains(&c)));
    }

    #[test]
    fn test_base32_loose_decoding() {
        let bytes = b"loose decoding";
        let canonical = encode(bytes, NameEncoding::Base32);

        let lower = canonical.to_ascii_lowercase();
        assert_eq!(decode_loose(&lower, NameEncoding::Base32).unwrap(), bytes);

        let padded = format!("{canonical}====");
        assert_eq!(decode_loose(&padded, NameEncoding::Base32).unwrap(), bytes);

        let confusable = canonical.replace('O', "0").replace('L', "1").replace('B', "8");
        assert_eq!(decode_loose(&confusable, NameEncoding::Base32).unwrap(), bytes);
    }

    #[test]
    fn test_base64url_loose_decoding() {
        let bytes = [0xfbu8, 0xff, 0xfe, 0x00, 0x10];
        let canonical = encode(&bytes, NameEncoding::Base64url);
        assert!(canonical.contains('-') || canonical.contains('_'));

        let standard = canonical.replace('-', "+").replace('_', "/");
        assert_eq!(decode_loose(&standard, NameEncoding::Base64url).unwrap(), bytes);

        let padded = format!("{canonical}=");
        assert_eq!(decode_loose(&padded, NameEncoding::Base64url).unwrap(), bytes);
    }

    #[test]
    fn test_invalid_text_rejected() {
        assert!(matches!(
            decode_loose("!!!", NameEncoding::Base64url),
            Err(DavsyncError::Encoding(_))
        ));
        assert!(matches!(
            decrypt_from_text("AAAA", &password(), ROUNDS, NameEncoding::Base32),
            Err(DavsyncError::Integrity(_))
        ));
    }

    #[test]
    fn test_wrong_password_rejected() {
        let enc = encrypt_to_text("secret.txt", &password(), ROUNDS, NameEncoding::Base64url)
            .unwrap();
        let result = decrypt_from_text(
            &enc,
            &SecretString::from("other"),
            ROUNDS,
            NameEncoding::Base64url,
        );
        assert!(matches!(result, Err(DavsyncError::Integrity(_))));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn roundtrip_any_string(s in ".{0,64}", base32 in any::<bool>()) {
            let encoding = if base32 { NameEncoding::Base32 } else { NameEncoding::Base64url };
            let enc = encrypt_to_text(&s, &password(), ROUNDS, encoding).unwrap();
            let dec = decrypt_from_text(&enc, &password(), ROUNDS, encoding).unwrap();
            prop_assert_eq!(dec, s);
        }
    }
}
