// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! AEAD_AES_256_GCM envelope used by the gateway.
//!
//! The gateway encrypts downloaded platform certificates and notification
//! resources with the merchant's APIv3 key. The ciphertext is base64 of
//! `ciphertext || tag` where the tag is the trailing 16 bytes.
//!
//! One implementation serves both call sites.

use base64ct::{Base64, Encoding};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use serde::{Deserialize, Serialize};

use crate::error::CryptoError;

/// AES-GCM authentication tag length.
pub const TAG_LEN: usize = 16;

/// Required APIv3 key length.
pub const API_V3_KEY_LEN: usize = 32;

/// The merchant's 32-byte APIv3 symmetric key.
///
/// `Debug` is redacted; the bytes never leave this module except into the
/// cipher.
#[derive(Clone)]
pub struct ApiV3Key([u8; API_V3_KEY_LEN]);

impl ApiV3Key {
    pub fn new(bytes: &[u8]) -> Result<Self, CryptoError> {
        let key: [u8; API_V3_KEY_LEN] = bytes
            .try_into()
            .map_err(|_| CryptoError::InvalidKeyLength(bytes.len()))?;
        Ok(Self(key))
    }

    fn cipher(&self) -> Result<LessSafeKey, CryptoError> {
        let unbound = UnboundKey::new(&AES_256_GCM, &self.0)
            .map_err(|_| CryptoError::InvalidKeyLength(self.0.len()))?;
        Ok(LessSafeKey::new(unbound))
    }
}

impl std::fmt::Debug for ApiV3Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiV3Key(<redacted>)")
    }
}

/// The gateway's encrypted envelope, as found in certificate listings
/// (`encrypt_certificate`) and notifications (`resource`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedResource {
    #[serde(default)]
    pub algorithm: Option<String>,
    pub ciphertext: String,
    pub nonce: String,
    pub associated_data: String,
    #[serde(default)]
    pub original_type: Option<String>,
}

impl EncryptedResource {
    pub fn decrypt(&self, key: &ApiV3Key) -> Result<Vec<u8>, CryptoError> {
        decrypt(&self.ciphertext, &self.nonce, &self.associated_data, key)
    }

    pub fn decrypt_to_string(&self, key: &ApiV3Key) -> Result<String, CryptoError> {
        decrypt_to_string(&self.ciphertext, &self.nonce, &self.associated_data, key)
    }
}

fn nonce_from(nonce: &str) -> Result<Nonce, CryptoError> {
    let bytes = nonce.as_bytes();
    if bytes.len() != NONCE_LEN {
        return Err(CryptoError::InvalidNonceLength(bytes.len()));
    }
    Nonce::try_assume_unique_for_key(bytes).map_err(|_| CryptoError::InvalidNonceLength(bytes.len()))
}

/// Decrypt a gateway envelope.
///
/// Rejects anything shorter than a bare tag before the cipher is touched.
/// On tag mismatch no plaintext is returned.
pub fn decrypt(
    ciphertext_b64: &str,
    nonce: &str,
    associated_data: &str,
    key: &ApiV3Key,
) -> Result<Vec<u8>, CryptoError> {
    let mut in_out =
        Base64::decode_vec(ciphertext_b64.trim()).map_err(|_| CryptoError::InvalidBase64)?;
    if in_out.len() < TAG_LEN {
        return Err(CryptoError::CiphertextTooShort(in_out.len()));
    }

    let nonce = nonce_from(nonce)?;
    let cipher = key.cipher()?;

    // ring expects the tag appended to the ciphertext, which is exactly the
    // gateway layout; `open_in_place` splits off the last TAG_LEN bytes.
    let plaintext_len = cipher
        .open_in_place(nonce, Aad::from(associated_data.as_bytes()), &mut in_out)
        .map_err(|_| CryptoError::Decrypt)?
        .len();
    in_out.truncate(plaintext_len);
    Ok(in_out)
}

/// Decrypt and require UTF-8 plaintext.
pub fn decrypt_to_string(
    ciphertext_b64: &str,
    nonce: &str,
    associated_data: &str,
    key: &ApiV3Key,
) -> Result<String, CryptoError> {
    let plaintext = decrypt(ciphertext_b64, nonce, associated_data, key)?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::Decrypt)
}

/// Produce a gateway-style envelope. Used by test doubles of the gateway.
pub fn encrypt(
    plaintext: &[u8],
    nonce: &str,
    associated_data: &str,
    key: &ApiV3Key,
) -> Result<String, CryptoError> {
    let nonce = nonce_from(nonce)?;
    let cipher = key.cipher()?;

    let mut in_out = plaintext.to_vec();
    cipher
        .seal_in_place_append_tag(nonce, Aad::from(associated_data.as_bytes()), &mut in_out)
        .map_err(|_| CryptoError::Encrypt)?;
    Ok(Base64::encode_string(&in_out))
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";
    const NONCE: &str = "4c0a1e7fd3b2";

    fn key() -> ApiV3Key {
        ApiV3Key::new(KEY).unwrap()
    }

    #[test]
    fn key_must_be_32_bytes() {
        assert!(matches!(
            ApiV3Key::new(b"short"),
            Err(CryptoError::InvalidKeyLength(5))
        ));
    }

    #[test]
    fn debug_does_not_print_key() {
        assert_eq!(format!("{:?}", key()), "ApiV3Key(<redacted>)");
    }

    #[test]
    fn round_trip_including_empty_plaintext() {
        for plaintext in [&b""[..], b"x", b"{\"trade_state\":\"SUCCESS\"}"] {
            let sealed = encrypt(plaintext, NONCE, "transaction", &key()).unwrap();
            let opened = decrypt(&sealed, NONCE, "transaction", &key()).unwrap();
            assert_eq!(opened, plaintext);
        }
    }

    #[test]
    fn tampered_tag_is_rejected() {
        let sealed = encrypt(b"payload", NONCE, "aad", &key()).unwrap();
        let mut raw = Base64::decode_vec(&sealed).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0x01;
        let tampered = Base64::encode_string(&raw);

        assert!(matches!(
            decrypt(&tampered, NONCE, "aad", &key()),
            Err(CryptoError::Decrypt)
        ));
    }

    #[test]
    fn wrong_associated_data_is_rejected() {
        let sealed = encrypt(b"payload", NONCE, "certificate", &key()).unwrap();
        assert!(matches!(
            decrypt(&sealed, NONCE, "transaction", &key()),
            Err(CryptoError::Decrypt)
        ));
    }

    #[test]
    fn short_ciphertext_is_malformed() {
        let short = Base64::encode_string(&[0u8; 15]);
        assert!(matches!(
            decrypt(&short, NONCE, "", &key()),
            Err(CryptoError::CiphertextTooShort(15))
        ));
    }

    #[test]
    fn nonce_must_be_12_bytes() {
        let sealed = encrypt(b"payload", NONCE, "", &key()).unwrap();
        assert!(matches!(
            decrypt(&sealed, "abc", "", &key()),
            Err(CryptoError::InvalidNonceLength(3))
        ));
    }

    #[test]
    fn invalid_base64_is_rejected() {
        assert!(matches!(
            decrypt("not base64 !!", NONCE, "", &key()),
            Err(CryptoError::InvalidBase64)
        ));
    }

    #[test]
    fn envelope_deserializes_and_decrypts() {
        let sealed = encrypt(b"-----BEGIN CERTIFICATE-----", NONCE, "certificate", &key()).unwrap();
        let json = format!(
            r#"{{"algorithm":"AEAD_AES_256_GCM","nonce":"{NONCE}","associated_data":"certificate","ciphertext":"{sealed}"}}"#
        );
        let resource: EncryptedResource = serde_json::from_str(&json).unwrap();
        assert_eq!(resource.algorithm.as_deref(), Some("AEAD_AES_256_GCM"));
        assert_eq!(
            resource.decrypt_to_string(&key()).unwrap(),
            "-----BEGIN CERTIFICATE-----"
        );
    }

    #[test]
    fn decrypts_ciphertext_produced_elsewhere() {
        let ciphertext = include_str!("../../tests/fixtures/notify_ciphertext.txt");
        let plaintext = decrypt_to_string(ciphertext, NONCE, "transaction", &key()).unwrap();
        assert_eq!(
            plaintext,
            r#"{"out_trade_no":"1217752501201407033233368018","trade_state":"SUCCESS"}"#
        );
    }
}
