// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Platform certificate download and rotation.
//!
//! The certificate listing endpoint is the one gateway response that is not
//! signature-checked: there is no prior key to check it with. Its payload is
//! still authenticated by the AEAD envelope under the merchant APIv3 key.
//!
//! Rotation is all-or-nothing: decrypt, parse, persist, then swap. Any failure
//! leaves the previous trust in place.

use std::io;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset};
use reqwest::{Client, Method};
use serde::Deserialize;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::keystore::{warn_if_outside_validity, KeyStore, PlatformTrust, TrustState};
use super::signer::{generate_nonce, Signer};
use crate::crypto::{EncryptedResource, PlatformCertificate};
use crate::error::{TrustError, WechatPayResult};
use crate::transport::{send_signed, OutboundBody};

#[derive(Debug, Deserialize)]
struct CertificateListing {
    #[serde(default)]
    data: Vec<CertificateEntry>,
}

/// One entry of the certificate listing.
#[derive(Debug, Clone, Deserialize)]
pub struct CertificateEntry {
    #[serde(default)]
    pub serial_no: Option<String>,
    pub effective_time: String,
    #[serde(default)]
    pub expire_time: Option<String>,
    pub encrypt_certificate: EncryptedResource,
}

impl CertificateEntry {
    fn effective_at(&self) -> Option<DateTime<FixedOffset>> {
        DateTime::parse_from_rfc3339(&self.effective_time).ok()
    }
}

/// Pick the entry with the latest `effective_time`. On ties the later entry
/// in the list wins. Entries with unparseable times are ignored.
pub fn select_latest(entries: &[CertificateEntry]) -> Option<&CertificateEntry> {
    let mut best: Option<(DateTime<FixedOffset>, &CertificateEntry)> = None;
    for entry in entries {
        let Some(effective) = entry.effective_at() else {
            warn!(
                effective_time = %entry.effective_time,
                "Skipping certificate entry with unparseable effective_time"
            );
            continue;
        };
        match best {
            Some((current, _)) if effective < current => {}
            _ => best = Some((effective, entry)),
        }
    }
    best.map(|(_, entry)| entry)
}

/// Write `data` to `path` via a sibling temp file and rename, so readers
/// never observe a truncated file. Temp names are unique per writer.
pub async fn persist_atomically(path: &Path, data: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "platform_cert".to_string());
    let suffix = generate_nonce(8).map_err(|e| io::Error::other(e.to_string()))?;
    let temp_path = path.with_file_name(format!(
        ".{file_name}.{}.{suffix}.tmp",
        std::process::id()
    ));

    let written = async {
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(data).await?;
        file.sync_all().await?;
        fs::rename(&temp_path, path).await
    }
    .await;

    if written.is_err() {
        let _ = fs::remove_file(&temp_path).await;
    }
    written
}

/// Downloads, decrypts, persists and installs platform certificates.
#[derive(Debug)]
pub struct CertificateManager {
    /// Store the rotated trust is installed into.
    key_store: Arc<KeyStore>,
    /// Signs the listing request with the merchant key.
    signer: Signer,
    http: Client,
    /// Absolute URL of the certificate listing endpoint.
    listing_url: String,
    /// Held for the whole download so concurrent refreshes coalesce.
    download_lock: Mutex<()>,
}

impl CertificateManager {
    pub fn new(key_store: Arc<KeyStore>, signer: Signer, http: Client, listing_url: impl Into<String>) -> Self {
        Self {
            key_store,
            signer,
            http,
            listing_url: listing_url.into(),
            download_lock: Mutex::new(()),
        }
    }

    pub fn listing_url(&self) -> &str {
        &self.listing_url
    }

    /// Unconditionally download and rotate.
    pub async fn download_and_rotate(&self) -> WechatPayResult<Arc<TrustState>> {
        let _guard = self.download_lock.lock().await;
        self.download_and_rotate_locked().await
    }

    /// Download and rotate unless a concurrent task already installed trust
    /// for `wanted` while this one waited.
    pub async fn refresh_for(&self, wanted: Option<&str>) -> WechatPayResult<Arc<TrustState>> {
        let _guard = self.download_lock.lock().await;
        let current = self.key_store.snapshot().await;
        if current.matches(wanted) {
            return Ok(current);
        }
        self.download_and_rotate_locked().await
    }

    async fn download_and_rotate_locked(&self) -> WechatPayResult<Arc<TrustState>> {
        info!(url = %self.listing_url, "Downloading platform certificates");

        let response = send_signed(
            &self.http,
            &self.signer,
            Method::GET,
            &self.listing_url,
            OutboundBody::Empty,
            None,
        )
        .await?
        .error_for_status()?;

        let listing: CertificateListing = serde_json::from_slice(&response.body)
            .map_err(|e| TrustError::Download(format!("invalid certificate listing: {e}")))?;

        let entry = select_latest(&listing.data).ok_or(TrustError::NoCertificate)?;

        let pem = entry
            .encrypt_certificate
            .decrypt_to_string(&self.signer.credential().api_v3_key)
            .map_err(|e| TrustError::InvalidCertificate(format!("cannot decrypt certificate: {e}")))?;
        let certificate = PlatformCertificate::from_pem(&pem)?;

        if let Some(listed) = entry.serial_no.as_deref() {
            if listed != certificate.serial() {
                warn!(
                    listed = %listed,
                    parsed = %certificate.serial(),
                    "Certificate listing serial differs from certificate; using the certificate"
                );
            }
        }
        warn_if_outside_validity(&certificate);

        let path = self.key_store.platform_certificate_path();
        persist_atomically(path, certificate.pem().as_bytes())
            .await
            .map_err(|e| TrustError::Persist(format!("{}: {e}", path.display())))?;

        let state = self
            .key_store
            .install(PlatformTrust::from_certificate(&certificate))
            .await;

        info!(
            serial = %certificate.serial(),
            effective_time = %entry.effective_time,
            path = %path.display(),
            "Platform certificate rotated"
        );
        Ok(state)
    }
}
