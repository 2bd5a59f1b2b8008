// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Merchant credential and platform trust state.
//!
//! ## Trust State Machine
//!
//! ```text
//!             configure (public key + serial)
//! Unloaded ─────────────────────────────────▶ TrustedViaPublicKey
//!    │                                               │
//!    │ loadLocal / downloadAndRotate                 │ loadLocal (serial mismatch)
//!    ▼                                               ▼
//! TrustedViaCertificate ◀──────────────── downloadAndRotate
//! ```
//!
//! The state is replaced wholesale on every transition. Readers take an
//! `Arc` snapshot, so a serial is never observed together with another
//! serial's key.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::crypto::{ApiV3Key, MerchantSigningKey, PlatformCertificate, PlatformPublicKey};
use crate::error::{TrustError, WechatPayError};

/// Serial prefix the gateway uses for platform public key IDs (as opposed to
/// certificate serials).
pub const PUBLIC_KEY_ID_PREFIX: &str = "PUB_KEY_ID_";

/// Returns true if `serial` names a platform public key rather than a
/// certificate.
pub fn is_public_key_id(serial: &str) -> bool {
    serial.starts_with(PUBLIC_KEY_ID_PREFIX)
}

/// The merchant's own identity. Immutable after construction.
#[derive(Debug)]
pub struct MerchantCredential {
    pub app_id: String,
    pub merchant_id: String,
    pub certificate_serial: String,
    pub(crate) api_v3_key: ApiV3Key,
    pub(crate) signing_key: MerchantSigningKey,
}

impl MerchantCredential {
    /// Read and parse the merchant private key named by `config`.
    pub async fn load(config: &ClientConfig) -> Result<Self, WechatPayError> {
        let path = &config.merchant_private_key_path;
        let pem = fs::read(path).await.map_err(|e| {
            WechatPayError::config(format!(
                "cannot read merchant private key {}: {e}",
                path.display()
            ))
        })?;
        let signing_key = MerchantSigningKey::from_pem(&pem).map_err(|e| {
            WechatPayError::config(format!("merchant private key {}: {e}", path.display()))
        })?;
        let api_v3_key = ApiV3Key::new(config.api_v3_key.as_bytes())
            .map_err(|e| WechatPayError::config(e.to_string()))?;

        Ok(Self {
            app_id: config.app_id.clone(),
            merchant_id: config.merchant_id.clone(),
            certificate_serial: config.merchant_certificate_serial.clone(),
            api_v3_key,
            signing_key,
        })
    }
}

/// Where the active platform key came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustSource {
    ExplicitPublicKey,
    Certificate,
}

/// A platform key together with the serial that names it.
///
/// Only constructible from a key and its serial together.
#[derive(Debug, Clone)]
pub struct PlatformTrust {
    serial: String,
    public_key: PlatformPublicKey,
    source: TrustSource,
}

impl PlatformTrust {
    pub fn from_public_key(serial: impl Into<String>, public_key: PlatformPublicKey) -> Self {
        Self {
            serial: serial.into(),
            public_key,
            source: TrustSource::ExplicitPublicKey,
        }
    }

    pub fn from_certificate(certificate: &PlatformCertificate) -> Self {
        Self {
            serial: certificate.serial().to_string(),
            public_key: certificate.public_key().clone(),
            source: TrustSource::Certificate,
        }
    }

    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn public_key(&self) -> &PlatformPublicKey {
        &self.public_key
    }

    pub fn source(&self) -> TrustSource {
        self.source
    }
}

#[derive(Debug, Clone)]
pub enum TrustState {
    Unloaded,
    TrustedViaPublicKey(PlatformTrust),
    TrustedViaCertificate(PlatformTrust),
}

impl TrustState {
    fn from_trust(trust: PlatformTrust) -> Self {
        match trust.source() {
            TrustSource::ExplicitPublicKey => TrustState::TrustedViaPublicKey(trust),
            TrustSource::Certificate => TrustState::TrustedViaCertificate(trust),
        }
    }

    pub fn trust(&self) -> Option<&PlatformTrust> {
        match self {
            TrustState::Unloaded => None,
            TrustState::TrustedViaPublicKey(trust) | TrustState::TrustedViaCertificate(trust) => {
                Some(trust)
            }
        }
    }

    pub fn serial(&self) -> Option<&str> {
        self.trust().map(PlatformTrust::serial)
    }

    pub fn is_unloaded(&self) -> bool {
        matches!(self, TrustState::Unloaded)
    }

    pub fn is_public_key(&self) -> bool {
        matches!(self, TrustState::TrustedViaPublicKey(_))
    }

    /// True if `serial` names the currently trusted key.
    pub fn matches(&self, serial: Option<&str>) -> bool {
        match (self.serial(), serial) {
            (Some(trusted), Some(presented)) => trusted == presented,
            _ => false,
        }
    }
}

/// Owns the merchant credential and the active platform trust.
#[derive(Debug)]
pub struct KeyStore {
    credential: Arc<MerchantCredential>,
    trust: RwLock<Arc<TrustState>>,
    platform_certificate_path: PathBuf,
}

impl KeyStore {
    /// Load the merchant credential and the best local trust source.
    ///
    /// Local sources are tried in order: explicitly configured public key,
    /// cached certificate file. If neither yields trust the store starts
    /// `Unloaded` and the caller is expected to download.
    pub async fn load(config: &ClientConfig) -> Result<Self, WechatPayError> {
        let credential = MerchantCredential::load(config).await?;

        let trust = match explicit_public_key(config).await {
            Some(trust) => Some(trust),
            None => load_certificate_file(&config.platform_certificate_path).await,
        };
        let state = trust
            .map(TrustState::from_trust)
            .unwrap_or(TrustState::Unloaded);

        if let Some(trust) = state.trust() {
            info!(
                serial = %trust.serial(),
                source = ?trust.source(),
                "Platform trust loaded from local source"
            );
        }

        Ok(Self::from_parts(
            credential,
            state,
            config.platform_certificate_path.clone(),
        ))
    }

    pub(crate) fn from_parts(
        credential: MerchantCredential,
        state: TrustState,
        platform_certificate_path: PathBuf,
    ) -> Self {
        Self {
            credential: Arc::new(credential),
            trust: RwLock::new(Arc::new(state)),
            platform_certificate_path,
        }
    }

    pub fn credential(&self) -> &Arc<MerchantCredential> {
        &self.credential
    }

    pub fn platform_certificate_path(&self) -> &Path {
        &self.platform_certificate_path
    }

    /// Current trust state. The snapshot stays internally consistent even if a
    /// rotation happens while it is held.
    pub async fn snapshot(&self) -> Arc<TrustState> {
        self.trust.read().await.clone()
    }

    /// Serial of the active platform key, if any.
    pub async fn platform_serial(&self) -> Option<String> {
        self.snapshot().await.serial().map(str::to_string)
    }

    /// Replace the active trust in a single swap.
    pub async fn install(&self, trust: PlatformTrust) -> Arc<TrustState> {
        let next = Arc::new(TrustState::from_trust(trust));
        let mut guard = self.trust.write().await;
        *guard = next.clone();
        next
    }

    /// Re-read the cached certificate file, replacing the active trust if it
    /// parses. Returns the resulting state either way.
    pub async fn reload_local_certificate(&self) -> Arc<TrustState> {
        match load_certificate_file(&self.platform_certificate_path).await {
            Some(trust) => {
                info!(serial = %trust.serial(), "Platform certificate reloaded from disk");
                self.install(trust).await
            }
            None => self.snapshot().await,
        }
    }
}

async fn explicit_public_key(config: &ClientConfig) -> Option<PlatformTrust> {
    let path = config.platform_public_key_path.as_ref()?;
    let serial = config
        .platform_certificate_serial
        .as_deref()
        .filter(|s| !s.trim().is_empty())?;

    let pem = match fs::read(path).await {
        Ok(pem) => pem,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Platform public key unreadable, falling back");
            return None;
        }
    };
    match PlatformPublicKey::from_pem(&pem) {
        Ok(public_key) => Some(PlatformTrust::from_public_key(serial, public_key)),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Platform public key invalid, falling back");
            None
        }
    }
}

/// Load a cached platform certificate. Missing or invalid files yield `None`.
pub(crate) async fn load_certificate_file(path: &Path) -> Option<PlatformTrust> {
    let pem = match fs::read_to_string(path).await {
        Ok(pem) => pem,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Platform certificate unreadable, falling back");
            return None;
        }
    };

    match PlatformCertificate::from_pem(&pem) {
        Ok(certificate) => {
            warn_if_outside_validity(&certificate);
            Some(PlatformTrust::from_certificate(&certificate))
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Platform certificate invalid, falling back");
            None
        }
    }
}

pub(crate) fn warn_if_outside_validity(certificate: &PlatformCertificate) {
    if !certificate.is_currently_valid() {
        warn!(
            serial = %certificate.serial(),
            "Platform certificate is outside its validity period"
        );
    }
}

/// Convenience for callers that need a hard failure when no source works.
pub(crate) fn require_trust(state: &TrustState) -> Result<&PlatformTrust, TrustError> {
    state.trust().ok_or(TrustError::NotEstablished)
}
