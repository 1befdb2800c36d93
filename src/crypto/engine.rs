//! Sealing for secret token-history columns.
//!
//! A sealed value is base64 of a fresh 12-byte nonce followed by the
//! AES-256-GCM ciphertext and tag. Every seal draws a new nonce, so the same
//! token never produces the same column value twice.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use rand::RngCore;

use crate::error::StoreError;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

fn crypto_err(context: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::Crypto(format!("{context}: {e}"))
}

/// Seals `access_token`, `refresh_token` and `raw_response` before they are written.
pub struct TokenCipher {
    cipher: Aes256Gcm,
}

impl TokenCipher {
    /// `key_b64` is the `TOKEN_ENCRYPTION_KEY` value: 32 random bytes, base64.
    pub fn new(key_b64: &str) -> Result<Self, StoreError> {
        let key = B64
            .decode(key_b64.trim())
            .map_err(|e| crypto_err("token encryption key is not base64", e))?;

        if key.len() != KEY_LEN {
            return Err(StoreError::Crypto(format!(
                "token encryption key decodes to {} bytes, need {KEY_LEN}",
                key.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| crypto_err("token encryption key rejected", e))?;

        Ok(Self { cipher })
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, StoreError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| crypto_err("sealing token field failed", e))?;

        let mut column = Vec::with_capacity(NONCE_LEN + sealed.len());
        column.extend_from_slice(&nonce);
        column.extend_from_slice(&sealed);
        Ok(B64.encode(column))
    }

    /// Fails on plaintext rows, rows sealed under another key, and tampered rows.
    pub fn decrypt(&self, column: &str) -> Result<String, StoreError> {
        let bytes = B64
            .decode(column)
            .map_err(|e| crypto_err("stored token field is not sealed", e))?;

        if bytes.len() <= NONCE_LEN {
            return Err(StoreError::Crypto(
                "stored token field is shorter than a sealed value".into(),
            ));
        }

        let (nonce, sealed) = bytes.split_at(NONCE_LEN);
        let opened = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|e| crypto_err("opening token field failed", e))?;

        String::from_utf8(opened).map_err(|e| crypto_err("opened token field is not UTF-8", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> TokenCipher {
        TokenCipher::new(&B64.encode([0x42u8; KEY_LEN])).unwrap()
    }

    #[test]
    fn test_sealed_field_opens_to_original() {
        let cipher = test_cipher();
        let raw = r#"{"access_token":"it's \"quoted\""}"#;
        let sealed = cipher.encrypt(raw).unwrap();
        assert_ne!(sealed, raw);
        assert_eq!(cipher.decrypt(&sealed).unwrap(), raw);
    }

    #[test]
    fn test_each_seal_uses_fresh_nonce() {
        let cipher = test_cipher();
        assert_ne!(
            cipher.encrypt("refresh-1").unwrap(),
            cipher.encrypt("refresh-1").unwrap()
        );
    }

    #[test]
    fn test_empty_refresh_token_still_seals() {
        let cipher = test_cipher();
        let sealed = cipher.encrypt("").unwrap();
        assert_eq!(cipher.decrypt(&sealed).unwrap(), "");
    }

    #[test]
    fn test_rejects_short_key() {
        let key = B64.encode([0u8; 16]);
        assert!(matches!(TokenCipher::new(&key), Err(StoreError::Crypto(_))));
    }

    #[test]
    fn test_foreign_or_plaintext_rows_do_not_open() {
        let sealed = test_cipher().encrypt("secret").unwrap();
        let other = TokenCipher::new(&B64.encode([0x07u8; KEY_LEN])).unwrap();
        assert!(other.decrypt(&sealed).is_err());
        assert!(other.decrypt("AAAA").is_err());
        assert!(other.decrypt("plain access token").is_err());
    }
}
