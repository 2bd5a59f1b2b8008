// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Inbound response and notification verification.
//!
//! The gateway signs `timestamp\nnonce\nbody\n` with the platform key named by
//! `Wechatpay-Serial`. When that serial is not the trusted one, the verifier
//! reloads local state and may download fresh certificates, at most once per
//! call. A serial that still differs afterwards is rejected.

use std::sync::Arc;

use reqwest::header::HeaderMap;
use tracing::{debug, warn};

use super::certificates::CertificateManager;
use super::keystore::{is_public_key_id, require_trust, KeyStore, TrustState};
use crate::crypto::PlatformPublicKey;
use crate::error::{TrustError, WechatPayResult};

pub const SIGNATURE_HEADER: &str = "Wechatpay-Signature";
pub const NONCE_HEADER: &str = "Wechatpay-Nonce";
pub const TIMESTAMP_HEADER: &str = "Wechatpay-Timestamp";
pub const SERIAL_HEADER: &str = "Wechatpay-Serial";

/// Signature headers extracted from an inbound response or notification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifiedHeaders {
    pub signature: Option<String>,
    pub nonce: String,
    pub timestamp: String,
    pub serial: Option<String>,
}

impl VerifiedHeaders {
    /// Extract from a parsed header map. Lookups are case-insensitive.
    pub fn from_header_map(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
        };
        Self {
            signature: get(SIGNATURE_HEADER),
            nonce: get(NONCE_HEADER).unwrap_or_default(),
            timestamp: get(TIMESTAMP_HEADER).unwrap_or_default(),
            serial: get(SERIAL_HEADER),
        }
    }

    /// Extract from a raw `Name: value` header block. Names are matched
    /// exactly, including case.
    pub fn parse_raw(block: &str) -> Self {
        let mut headers = Self::default();
        for line in block.lines() {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim().to_string();
            match name {
                SIGNATURE_HEADER => headers.signature = Some(value),
                NONCE_HEADER => headers.nonce = value,
                TIMESTAMP_HEADER => headers.timestamp = value,
                SERIAL_HEADER => headers.serial = Some(value),
                _ => {}
            }
        }
        headers
    }
}

/// Whether a serial mismatch may trigger a certificate download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Ordinary API responses: one download is allowed per call.
    AllowDownload,
    /// Notifications: local reload only.
    LocalOnly,
}

/// Check a gateway signature over `timestamp\nnonce\nbody\n`.
pub fn verify_signature(
    public_key: &PlatformPublicKey,
    headers: &VerifiedHeaders,
    signature: &str,
    body: &str,
) -> Result<(), TrustError> {
    let message = format!("{}\n{}\n{}\n", headers.timestamp, headers.nonce, body);
    public_key.verify_base64(message.as_bytes(), signature)
}

#[derive(Debug)]
pub struct ResponseVerifier {
    key_store: Arc<KeyStore>,
    certificates: Arc<CertificateManager>,
    trust_on_first_use: bool,
}

impl ResponseVerifier {
    pub fn new(
        key_store: Arc<KeyStore>,
        certificates: Arc<CertificateManager>,
        trust_on_first_use: bool,
    ) -> Self {
        Self {
            key_store,
            certificates,
            trust_on_first_use,
        }
    }

    /// Verify one inbound message.
    ///
    /// Only transitions the trust state through the key store; never mutates
    /// it directly.
    pub async fn verify(
        &self,
        headers: &VerifiedHeaders,
        body: &str,
        policy: RefreshPolicy,
    ) -> WechatPayResult<()> {
        let mut state = self.key_store.snapshot().await;

        // Notifications always need an established key.
        if state.is_unloaded()
            && self.trust_on_first_use
            && policy == RefreshPolicy::AllowDownload
        {
            warn!("Accepting unverified gateway message: platform trust not yet established");
            return Ok(());
        }

        let signature = headers
            .signature
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(TrustError::MissingSignature)?;

        let presented = headers.serial.as_deref();
        if !state.matches(presented) {
            state = self.reconcile(state, presented, policy).await?;
        }

        let trust = require_trust(&state)?;
        verify_signature(trust.public_key(), headers, signature, body)?;

        debug!(serial = %trust.serial(), "Gateway signature verified");
        Ok(())
    }

    /// Bring the trust state in line with the presented serial, or fail.
    async fn reconcile(
        &self,
        state: Arc<TrustState>,
        presented: Option<&str>,
        policy: RefreshPolicy,
    ) -> WechatPayResult<Arc<TrustState>> {
        let trusted = state.serial().map(str::to_string);

        if let Some(serial) = presented.filter(|s| is_public_key_id(s)) {
            return Err(TrustError::PublicKeyIdMismatch {
                presented: serial.to_string(),
                trusted,
            }
            .into());
        }

        warn!(
            presented = presented.unwrap_or("<none>"),
            trusted = trusted.as_deref().unwrap_or("<none>"),
            "Platform serial mismatch"
        );

        let mut state = state;
        if state.is_public_key() {
            state = self.key_store.reload_local_certificate().await;
        }

        let mut download_attempted = false;
        while !state.matches(presented) {
            if download_attempted || policy == RefreshPolicy::LocalOnly {
                return Err(TrustError::SerialMismatch {
                    presented: presented.map(str::to_string),
                    trusted: state.serial().map(str::to_string),
                }
                .into());
            }
            download_attempted = true;
            state = self.certificates.refresh_for(presented).await?;
        }
        Ok(state)
    }
}
