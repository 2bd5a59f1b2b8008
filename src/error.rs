// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Error taxonomy for the WeChat Pay client.
//!
//! Every failure reaches the caller as a typed error. The only condition the
//! crate recovers from internally is the bounded platform certificate refresh
//! performed during response verification.

use serde_json::Value;

/// Result alias used throughout the crate.
pub type WechatPayResult<T> = Result<T, WechatPayError>;

/// Top-level error returned by every public operation.
#[derive(Debug, thiserror::Error)]
pub enum WechatPayError {
    /// Missing or malformed credential inputs. Raised at construction.
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Trust(#[from] TrustError),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Network or timeout failure reported by the HTTP collaborator.
    #[error("transport error: {0}")]
    Transport(String),

    #[error(transparent)]
    Vendor(#[from] VendorError),

    /// Payload does not have the expected shape (e.g. notification without
    /// `resource.ciphertext`). Not a trust failure.
    #[error("malformed payload: {0}")]
    Format(String),
}

impl WechatPayError {
    /// Stable machine-readable code for logs and caller matching.
    pub fn error_code(&self) -> &'static str {
        match self {
            WechatPayError::Config(_) => "config_error",
            WechatPayError::Trust(e) => e.error_code(),
            WechatPayError::Crypto(e) => e.error_code(),
            WechatPayError::Transport(_) => "transport_error",
            WechatPayError::Vendor(_) => "vendor_error",
            WechatPayError::Format(_) => "format_error",
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        WechatPayError::Config(message.into())
    }

    pub(crate) fn format(message: impl Into<String>) -> Self {
        WechatPayError::Format(message.into())
    }
}

/// Failures to establish or apply trust in gateway-issued material.
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    #[error("response carries no Wechatpay-Signature header")]
    MissingSignature,

    /// The gateway signed with a public key ID we are not configured for.
    /// Public key rotation requires re-configuration, never silent recovery.
    #[error("platform public key ID mismatch: presented {presented}, trusted {trusted:?}")]
    PublicKeyIdMismatch {
        presented: String,
        trusted: Option<String>,
    },

    #[error("platform trust serial mismatch: presented {presented:?}, trusted {trusted:?}")]
    SerialMismatch {
        presented: Option<String>,
        trusted: Option<String>,
    },

    #[error("platform signature verification failed")]
    InvalidSignature,

    #[error("no platform trust material is loaded")]
    NotEstablished,

    #[error("certificate listing contained no usable entry")]
    NoCertificate,

    #[error("invalid platform certificate: {0}")]
    InvalidCertificate(String),

    #[error("invalid platform public key: {0}")]
    InvalidPublicKey(String),

    #[error("failed to persist platform certificate: {0}")]
    Persist(String),

    #[error("certificate download failed: {0}")]
    Download(String),
}

impl TrustError {
    pub fn error_code(&self) -> &'static str {
        match self {
            TrustError::MissingSignature => "missing_signature",
            TrustError::PublicKeyIdMismatch { .. } => "public_key_id_mismatch",
            TrustError::SerialMismatch { .. } => "serial_mismatch",
            TrustError::InvalidSignature => "invalid_signature",
            TrustError::NotEstablished => "trust_not_established",
            TrustError::NoCertificate => "no_certificate",
            TrustError::InvalidCertificate(_) => "invalid_certificate",
            TrustError::InvalidPublicKey(_) => "invalid_public_key",
            TrustError::Persist(_) => "certificate_persist_failed",
            TrustError::Download(_) => "certificate_download_failed",
        }
    }
}

/// Failures of the cryptographic primitives. Never carries partial plaintext.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("AEAD key must be 32 bytes, got {0}")]
    InvalidKeyLength(usize),

    #[error("AEAD nonce must be 12 bytes, got {0}")]
    InvalidNonceLength(usize),

    #[error("ciphertext is not valid base64")]
    InvalidBase64,

    #[error("ciphertext too short: {0} bytes, need at least 16")]
    CiphertextTooShort(usize),

    /// Authentication tag mismatch or otherwise undecryptable input.
    #[error("AEAD decryption failed")]
    Decrypt,

    #[error("AEAD encryption failed")]
    Encrypt,

    #[error("RSA signing failed")]
    Signing,

    #[error("RSA-OAEP encryption failed: {0}")]
    RsaEncrypt(String),

    /// Wrong key, corrupted ciphertext or bad padding. Detail is withheld.
    #[error("RSA-OAEP decryption failed")]
    RsaDecrypt,

    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),

    #[error("random number generation failed")]
    Random,
}

impl CryptoError {
    pub fn error_code(&self) -> &'static str {
        match self {
            CryptoError::InvalidKeyLength(_) => "invalid_key_length",
            CryptoError::InvalidNonceLength(_) => "invalid_nonce_length",
            CryptoError::InvalidBase64 => "invalid_base64",
            CryptoError::CiphertextTooShort(_) => "ciphertext_too_short",
            CryptoError::Decrypt => "decrypt_failed",
            CryptoError::Encrypt => "encrypt_failed",
            CryptoError::Signing => "signing_failed",
            CryptoError::RsaEncrypt(_) => "rsa_encrypt_failed",
            CryptoError::RsaDecrypt => "rsa_decrypt_failed",
            CryptoError::InvalidPrivateKey(_) => "invalid_private_key",
            CryptoError::Random => "random_failed",
        }
    }
}

/// Non-2xx reply from the gateway.
///
/// The gateway answers errors with `{"code": "...", "message": "...",
/// "detail": {"issue": "..."}}`; the parsed body is kept for inspection.
#[derive(Debug, Clone)]
pub struct VendorError {
    /// HTTP status of the gateway reply.
    pub status: u16,
    /// Gateway error code, e.g. `PARAM_ERROR`.
    pub code: Option<String>,
    /// Human-readable gateway message.
    pub message: Option<String>,
    /// `detail.issue`, when the gateway names the offending field.
    pub issue: Option<String>,
    /// Parsed body, or `null` if it was not JSON.
    pub body: Value,
}

impl VendorError {
    /// Build from an HTTP status and the raw response body.
    pub fn from_response(status: u16, raw_body: &str) -> Self {
        let body: Value = serde_json::from_str(raw_body).unwrap_or(Value::Null);
        let field = |pointer: &str| {
            body.pointer(pointer).map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
        };

        let code = field("/code");
        let message = field("/message");
        let issue = field("/detail/issue");

        Self {
            status,
            code,
            message,
            issue,
            body,
        }
    }
}

impl std::fmt::Display for VendorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if !self.body.is_object() {
            return write!(
                f,
                "gateway returned unparseable body (http_code={})",
                self.status
            );
        }

        write!(
            f,
            "[{}]{}",
            self.code.as_deref().unwrap_or("UNKNOWN"),
            self.message.as_deref().unwrap_or("unknown error")
        )?;
        if let Some(issue) = &self.issue {
            write!(f, "({issue})")?;
        }
        Ok(())
    }
}

impl std::error::Error for VendorError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vendor_error_formats_code_message_and_issue() {
        let err = VendorError::from_response(
            400,
            r#"{"code":"PARAM_ERROR","message":"bad out_trade_no","detail":{"issue":"too long"}}"#,
        );
        assert_eq!(err.status, 400);
        assert_eq!(err.code.as_deref(), Some("PARAM_ERROR"));
        assert_eq!(err.to_string(), "[PARAM_ERROR]bad out_trade_no(too long)");
    }

    #[test]
    fn vendor_error_without_json_body_mentions_status() {
        let err = VendorError::from_response(502, "<html>bad gateway</html>");
        assert_eq!(err.body, Value::Null);
        assert!(err.to_string().contains("http_code=502"));
    }

    #[test]
    fn vendor_error_with_partial_body_uses_placeholders() {
        let err = VendorError::from_response(500, r#"{"message":"system busy"}"#);
        assert_eq!(err.to_string(), "[UNKNOWN]system busy");
    }

    #[test]
    fn error_codes_are_forwarded_from_inner_errors() {
        let err: WechatPayError = TrustError::InvalidSignature.into();
        assert_eq!(err.error_code(), "invalid_signature");

        let err: WechatPayError = CryptoError::CiphertextTooShort(3).into();
        assert_eq!(err.error_code(), "ciphertext_too_short");

        assert_eq!(WechatPayError::format("x").error_code(), "format_error");
    }
}
