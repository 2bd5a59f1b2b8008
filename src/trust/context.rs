// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! The trust façade handed to calling operations.

use std::sync::Arc;

use reqwest::header::HeaderMap;
use reqwest::{Client, Method};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{info, warn};

use super::certificates::CertificateManager;
use super::keystore::{require_trust, KeyStore};
use super::signer::{canonical_path, SignedRequest, Signer};
use super::verifier::{RefreshPolicy, ResponseVerifier, VerifiedHeaders};
use crate::config::{ClientConfig, CERTIFICATES_PATH, GLOBAL_CERTIFICATES_PATH};
use crate::crypto::EncryptedResource;
use crate::error::{TrustError, WechatPayError, WechatPayResult};
use crate::notify::Notification;

/// True for the certificate listing endpoints, which are exempt from response
/// verification.
pub fn is_certificate_listing(method: &Method, path: &str) -> bool {
    if *method != Method::GET {
        return false;
    }
    let Ok(path) = canonical_path(path) else {
        return false;
    };
    let path = path.split('?').next().unwrap_or_default();
    path == CERTIFICATES_PATH || path == GLOBAL_CERTIFICATES_PATH
}

#[derive(Debug)]
pub struct TrustContext {
    key_store: Arc<KeyStore>,
    signer: Signer,
    certificates: Arc<CertificateManager>,
    verifier: ResponseVerifier,
}

impl TrustContext {
    /// Validate `config`, load local credentials and, if no platform trust
    /// could be loaded locally, download it.
    ///
    /// A failed bootstrap download is fatal unless trust-on-first-use is
    /// enabled.
    pub async fn bootstrap(config: &ClientConfig, http: Client) -> WechatPayResult<Self> {
        config.validate()?;

        let key_store = Arc::new(KeyStore::load(config).await?);
        let signer = Signer::new(key_store.credential().clone());
        let certificates = Arc::new(CertificateManager::new(
            key_store.clone(),
            signer.clone(),
            http,
            config.endpoint(config.certificates_path()),
        ));
        let verifier = ResponseVerifier::new(
            key_store.clone(),
            certificates.clone(),
            config.trust_on_first_use,
        );

        let context = Self {
            key_store,
            signer,
            certificates,
            verifier,
        };

        if context.key_store.snapshot().await.is_unloaded() {
            info!(
                url = %context.certificates.listing_url(),
                "No local platform trust, bootstrapping from gateway"
            );
            if let Err(e) = context.certificates.download_and_rotate().await {
                if !config.trust_on_first_use {
                    return Err(bootstrap_failure(e).into());
                }
                warn!(
                    error = %e,
                    "Platform certificate bootstrap failed, continuing with trust-on-first-use"
                );
            }
        }

        Ok(context)
    }

    pub fn key_store(&self) -> &Arc<KeyStore> {
        &self.key_store
    }

    pub fn signer(&self) -> &Signer {
        &self.signer
    }

    pub fn certificates(&self) -> &CertificateManager {
        &self.certificates
    }

    /// Serial of the currently trusted platform key.
    pub async fn platform_serial(&self) -> Option<String> {
        self.key_store.platform_serial().await
    }

    /// Sign an outbound request with the merchant key.
    pub fn sign_request(&self, method: &Method, url: &str, body: &str) -> WechatPayResult<SignedRequest> {
        self.signer.sign(method, url, body)
    }

    /// Verify a gateway response and decode its JSON body. An empty body
    /// decodes to `null`.
    pub async fn verify_and_unwrap(
        &self,
        method: &Method,
        path: &str,
        headers: &HeaderMap,
        body: &str,
    ) -> WechatPayResult<Value> {
        if !is_certificate_listing(method, path) {
            let headers = VerifiedHeaders::from_header_map(headers);
            self.verifier
                .verify(&headers, body, RefreshPolicy::AllowDownload)
                .await?;
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(body)
            .map_err(|e| WechatPayError::format(format!("response body is not JSON: {e}")))
    }

    /// Verify a webhook against the currently trusted key and decrypt its
    /// resource. Never downloads certificates.
    pub async fn verify_and_decrypt_notification(
        &self,
        headers: &VerifiedHeaders,
        body: &str,
    ) -> WechatPayResult<Value> {
        let plaintext = self.verified_notification_plaintext(headers, body).await?;
        serde_json::from_str(&plaintext)
            .map_err(|e| WechatPayError::format(format!("notification plaintext is not JSON: {e}")))
    }

    /// Same as [`verify_and_decrypt_notification`](Self::verify_and_decrypt_notification)
    /// but deserializes into a caller type.
    pub async fn decrypt_notification_as<T: DeserializeOwned>(
        &self,
        headers: &VerifiedHeaders,
        body: &str,
    ) -> WechatPayResult<T> {
        let plaintext = self.verified_notification_plaintext(headers, body).await?;
        serde_json::from_str(&plaintext)
            .map_err(|e| WechatPayError::format(format!("unexpected notification resource: {e}")))
    }

    /// Encrypt a sensitive request field to the current platform key. Returns
    /// the serial the field was encrypted for, to be sent as
    /// `Wechatpay-Serial`, along with the base64 ciphertext.
    pub async fn encrypt_sensitive(&self, plaintext: &str) -> WechatPayResult<(String, String)> {
        let state = self.key_store.snapshot().await;
        let trust = require_trust(&state)?;
        let ciphertext = trust.public_key().encrypt_oaep_base64(plaintext.as_bytes())?;
        Ok((trust.serial().to_string(), ciphertext))
    }

    /// Decrypt a sensitive response field encrypted to the merchant key.
    pub fn decrypt_sensitive(&self, ciphertext_b64: &str) -> WechatPayResult<String> {
        let plaintext = self
            .signer
            .credential()
            .signing_key
            .decrypt_oaep_base64(ciphertext_b64)?;
        String::from_utf8(plaintext)
            .map_err(|_| WechatPayError::format("decrypted field is not UTF-8"))
    }

    /// Decrypt an envelope with the merchant APIv3 key.
    pub fn decrypt_resource(&self, resource: &EncryptedResource) -> WechatPayResult<String> {
        Ok(resource.decrypt_to_string(&self.signer.credential().api_v3_key)?)
    }

    async fn verified_notification_plaintext(
        &self,
        headers: &VerifiedHeaders,
        body: &str,
    ) -> WechatPayResult<String> {
        if body.trim().is_empty() {
            return Err(WechatPayError::format("notification body is empty"));
        }
        self.verifier
            .verify(headers, body, RefreshPolicy::LocalOnly)
            .await?;

        let notification = Notification::parse(body)?;
        info!(
            id = notification.id.as_deref().unwrap_or("-"),
            event_type = notification.event_type.as_deref().unwrap_or("-"),
            "Notification verified"
        );
        self.decrypt_resource(&notification.resource)
    }
}

fn bootstrap_failure(error: WechatPayError) -> TrustError {
    match error {
        WechatPayError::Trust(e) => e,
        other => TrustError::Download(other.to_string()),
    }
}
