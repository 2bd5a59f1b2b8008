// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Outbound request signing (`WECHATPAY2-SHA256-RSA2048`).
//!
//! The canonical message is
//!
//! ```text
//! METHOD\n
//! /path?query\n
//! timestamp\n
//! nonce\n
//! body\n
//! ```
//!
//! signed with RSA-SHA256 by the merchant API private key. The header names the
//! merchant certificate serial, never the platform's.

use std::fmt;
use std::sync::Arc;

use reqwest::Method;
use ring::rand::{SecureRandom, SystemRandom};
use tracing::debug;
use url::Url;

use super::keystore::MerchantCredential;
use crate::error::{CryptoError, WechatPayError};

/// Authorization scheme identifier.
pub const AUTH_SCHEME: &str = "WECHATPAY2-SHA256-RSA2048";

/// Default nonce length.
pub const NONCE_LEN: usize = 32;

const NONCE_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Random lowercase alphanumeric string of `len` characters.
pub fn generate_nonce(len: usize) -> Result<String, CryptoError> {
    // Rejection sampling keeps the distribution uniform over 36 symbols.
    let limit = (u8::MAX as usize / NONCE_CHARSET.len()) * NONCE_CHARSET.len();
    let rng = SystemRandom::new();
    let mut nonce = String::with_capacity(len);
    let mut buf = [0u8; 64];

    while nonce.len() < len {
        rng.fill(&mut buf).map_err(|_| CryptoError::Random)?;
        for byte in buf {
            if (byte as usize) < limit {
                nonce.push(NONCE_CHARSET[byte as usize % NONCE_CHARSET.len()] as char);
                if nonce.len() == len {
                    break;
                }
            }
        }
    }
    Ok(nonce)
}

/// Current Unix time in seconds.
pub fn unix_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

/// `path` plus `?query` of a URL, as signed by the gateway.
///
/// Accepts absolute URLs or gateway-relative paths.
pub fn canonical_path(url: &str) -> Result<String, WechatPayError> {
    let parsed = match Url::parse(url) {
        Ok(parsed) => parsed,
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            let base = Url::parse("https://gateway.invalid")
                .map_err(|e| WechatPayError::format(e.to_string()))?;
            base.join(url)
                .map_err(|e| WechatPayError::format(format!("invalid request path {url}: {e}")))?
        }
        Err(e) => return Err(WechatPayError::format(format!("invalid request URL {url}: {e}"))),
    };

    Ok(match parsed.query() {
        Some(query) => format!("{}?{}", parsed.path(), query),
        None => parsed.path().to_string(),
    })
}

/// The signed credential carried in the `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationHeader {
    pub merchant_id: String,
    pub nonce: String,
    pub timestamp: i64,
    pub serial_no: String,
    pub signature: String,
}

impl fmt::Display for AuthorizationHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            r#"{AUTH_SCHEME} mchid="{}",nonce_str="{}",timestamp="{}",serial_no="{}",signature="{}""#,
            self.merchant_id, self.nonce, self.timestamp, self.serial_no, self.signature
        )
    }
}

/// A request after signing. Computed per call, never stored.
#[derive(Debug, Clone)]
pub struct SignedRequest {
    pub method: Method,
    pub path: String,
    pub body: String,
    pub authorization: AuthorizationHeader,
}

impl SignedRequest {
    /// Full `Authorization` header value.
    pub fn authorization_value(&self) -> String {
        self.authorization.to_string()
    }
}

/// Builds request credentials from the merchant private key.
#[derive(Debug, Clone)]
pub struct Signer {
    credential: Arc<MerchantCredential>,
    nonce_len: usize,
}

impl Signer {
    pub fn new(credential: Arc<MerchantCredential>) -> Self {
        Self {
            credential,
            nonce_len: NONCE_LEN,
        }
    }

    pub fn with_nonce_len(mut self, nonce_len: usize) -> Self {
        self.nonce_len = nonce_len;
        self
    }

    pub fn credential(&self) -> &MerchantCredential {
        &self.credential
    }

    /// Sign with fresh nonce and current time.
    pub fn sign(&self, method: &Method, url: &str, body: &str) -> Result<SignedRequest, WechatPayError> {
        let nonce = generate_nonce(self.nonce_len)?;
        self.sign_at(method, url, body, unix_timestamp(), &nonce)
    }

    /// Sign with caller-provided timestamp and nonce.
    pub fn sign_at(
        &self,
        method: &Method,
        url: &str,
        body: &str,
        timestamp: i64,
        nonce: &str,
    ) -> Result<SignedRequest, WechatPayError> {
        let path = canonical_path(url)?;
        let timestamp_text = timestamp.to_string();
        let signature = self.sign_fields(&[method.as_str(), &path, &timestamp_text, nonce, body])?;

        debug!(method = %method, path = %path, "Signed gateway request");

        Ok(SignedRequest {
            method: method.clone(),
            path,
            body: body.to_string(),
            authorization: AuthorizationHeader {
                merchant_id: self.credential.merchant_id.clone(),
                nonce: nonce.to_string(),
                timestamp,
                serial_no: self.credential.certificate_serial.clone(),
                signature,
            },
        })
    }

    /// Sign `fields` joined by `\n` with a trailing `\n`. Also used for
    /// client-side payment parameters.
    pub fn sign_fields(&self, fields: &[&str]) -> Result<String, CryptoError> {
        let message = canonical_message(fields);
        self.credential.signing_key.sign_base64(message.as_bytes())
    }
}

/// Join fields with `\n`, terminating the last one as well.
pub fn canonical_message(fields: &[&str]) -> String {
    let mut message = String::new();
    for field in fields {
        message.push_str(field);
        message.push('\n');
    }
    message
}
