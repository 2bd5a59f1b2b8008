// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Client Configuration
//!
//! Merchant credentials and gateway settings. Built programmatically or loaded
//! from the environment, then validated once before any key is read.
//!
//! ## Environment Variables
//!
//! | Variable | Description | Default |
//! |----------|-------------|---------|
//! | `WECHATPAY_APPID` | Application ID | Required |
//! | `WECHATPAY_MCHID` | Merchant ID | Required |
//! | `WECHATPAY_APIV3_KEY` | APIv3 symmetric key (32 bytes) | Required |
//! | `WECHATPAY_MERCHANT_PRIVATE_KEY_PATH` | Merchant API private key (PEM) | Required |
//! | `WECHATPAY_MERCHANT_CERT_SERIAL` | Merchant API certificate serial | Required |
//! | `WECHATPAY_PLATFORM_PUBLIC_KEY_PATH` | Platform public key (PEM) | Optional |
//! | `WECHATPAY_PLATFORM_CERT_PATH` | Platform certificate cache file | Required |
//! | `WECHATPAY_PLATFORM_SERIAL` | Platform public key ID / certificate serial | Optional |
//! | `WECHATPAY_GLOBAL` | Use the international certificate endpoint | `false` |
//! | `WECHATPAY_GATEWAY` | Gateway base URL | `https://api.mch.weixin.qq.com` |
//! | `WECHATPAY_TIMEOUT_SECS` | Per-call HTTP timeout | `10` |
//! | `WECHATPAY_TRUST_ON_FIRST_USE` | Accept responses before trust is loaded | `false` |

use std::path::PathBuf;
use std::time::Duration;

use crate::crypto::aead::API_V3_KEY_LEN;
use crate::error::WechatPayError;

pub const APPID_ENV: &str = "WECHATPAY_APPID";
pub const MCHID_ENV: &str = "WECHATPAY_MCHID";
pub const APIV3_KEY_ENV: &str = "WECHATPAY_APIV3_KEY";
pub const MERCHANT_PRIVATE_KEY_PATH_ENV: &str = "WECHATPAY_MERCHANT_PRIVATE_KEY_PATH";
pub const MERCHANT_CERT_SERIAL_ENV: &str = "WECHATPAY_MERCHANT_CERT_SERIAL";
pub const PLATFORM_PUBLIC_KEY_PATH_ENV: &str = "WECHATPAY_PLATFORM_PUBLIC_KEY_PATH";
pub const PLATFORM_CERT_PATH_ENV: &str = "WECHATPAY_PLATFORM_CERT_PATH";
pub const PLATFORM_SERIAL_ENV: &str = "WECHATPAY_PLATFORM_SERIAL";
pub const GLOBAL_ENV: &str = "WECHATPAY_GLOBAL";
pub const GATEWAY_ENV: &str = "WECHATPAY_GATEWAY";
pub const TIMEOUT_SECS_ENV: &str = "WECHATPAY_TIMEOUT_SECS";
pub const TRUST_ON_FIRST_USE_ENV: &str = "WECHATPAY_TRUST_ON_FIRST_USE";

/// Production gateway.
pub const DEFAULT_GATEWAY: &str = "https://api.mch.weixin.qq.com";

/// Default per-call timeout enforced by the HTTP client.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Certificate listing endpoint for domestic merchants.
pub const CERTIFICATES_PATH: &str = "/v3/certificates";

/// Certificate listing endpoint for international merchants.
pub const GLOBAL_CERTIFICATES_PATH: &str = "/v3/global/certificates";

#[derive(Clone)]
pub struct ClientConfig {
    /// Application ID used in payment parameters.
    pub app_id: String,
    /// Merchant ID, sent as `mchid` in every `Authorization` header.
    pub merchant_id: String,
    /// APIv3 symmetric key (exactly 32 bytes).
    pub api_v3_key: String,
    /// PEM file holding the merchant API private key.
    pub merchant_private_key_path: PathBuf,
    /// Serial of the merchant API certificate, sent as `serial_no`.
    pub merchant_certificate_serial: String,
    /// Optional PEM platform public key, used instead of a certificate.
    pub platform_public_key_path: Option<PathBuf>,
    /// Where the downloaded platform certificate is cached.
    pub platform_certificate_path: PathBuf,
    /// Serial (or `PUB_KEY_ID_...`) naming the explicit platform public key.
    pub platform_certificate_serial: Option<String>,
    /// International merchants use the global certificate endpoint.
    pub is_global_merchant: bool,
    /// Gateway origin, e.g. `https://api.mch.weixin.qq.com`.
    pub gateway_base_url: String,
    /// Per-request timeout enforced by the HTTP client.
    pub timeout: Duration,
    /// Accept gateway responses while no platform trust is loaded.
    /// Off unless explicitly enabled.
    pub trust_on_first_use: bool,
}

impl ClientConfig {
    pub fn new(
        app_id: impl Into<String>,
        merchant_id: impl Into<String>,
        api_v3_key: impl Into<String>,
        merchant_private_key_path: impl Into<PathBuf>,
        merchant_certificate_serial: impl Into<String>,
        platform_certificate_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            merchant_id: merchant_id.into(),
            api_v3_key: api_v3_key.into(),
            merchant_private_key_path: merchant_private_key_path.into(),
            merchant_certificate_serial: merchant_certificate_serial.into(),
            platform_public_key_path: None,
            platform_certificate_path: platform_certificate_path.into(),
            platform_certificate_serial: None,
            is_global_merchant: false,
            gateway_base_url: DEFAULT_GATEWAY.to_string(),
            timeout: DEFAULT_TIMEOUT,
            trust_on_first_use: false,
        }
    }

    /// Pin the platform public key (and its `PUB_KEY_ID_...` serial).
    pub fn with_platform_public_key(
        mut self,
        path: impl Into<PathBuf>,
        serial: impl Into<String>,
    ) -> Self {
        self.platform_public_key_path = Some(path.into());
        self.platform_certificate_serial = Some(serial.into());
        self
    }

    pub fn with_platform_serial(mut self, serial: impl Into<String>) -> Self {
        self.platform_certificate_serial = Some(serial.into());
        self
    }

    pub fn with_global_merchant(mut self, is_global: bool) -> Self {
        self.is_global_merchant = is_global;
        self
    }

    pub fn with_gateway(mut self, base_url: impl Into<String>) -> Self {
        self.gateway_base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_trust_on_first_use(mut self, enabled: bool) -> Self {
        self.trust_on_first_use = enabled;
        self
    }

    /// Load from `WECHATPAY_*` environment variables. The result is
    /// validated when a trust context is bootstrapped from it.
    pub fn from_env() -> Result<Self, WechatPayError> {
        let mut config = Self::new(
            env_required(APPID_ENV)?,
            env_required(MCHID_ENV)?,
            env_required(APIV3_KEY_ENV)?,
            env_required(MERCHANT_PRIVATE_KEY_PATH_ENV)?,
            env_required(MERCHANT_CERT_SERIAL_ENV)?,
            env_required(PLATFORM_CERT_PATH_ENV)?,
        );

        config.platform_public_key_path = env_optional(PLATFORM_PUBLIC_KEY_PATH_ENV).map(PathBuf::from);
        config.platform_certificate_serial = env_optional(PLATFORM_SERIAL_ENV);
        config.is_global_merchant = env_flag(GLOBAL_ENV);
        config.gateway_base_url = env_or_default(GATEWAY_ENV, DEFAULT_GATEWAY);
        config.trust_on_first_use = env_flag(TRUST_ON_FIRST_USE_ENV);
        if let Some(secs) = env_optional(TIMEOUT_SECS_ENV) {
            let secs: u64 = secs.parse().map_err(|_| {
                WechatPayError::config(format!("{TIMEOUT_SECS_ENV} must be an integer: {secs}"))
            })?;
            config.timeout = Duration::from_secs(secs);
        }

        Ok(config)
    }

    /// Reject empty required values and a wrong-length APIv3 key.
    pub fn validate(&self) -> Result<(), WechatPayError> {
        let required = [
            ("app_id", self.app_id.as_str()),
            ("merchant_id", self.merchant_id.as_str()),
            ("api_v3_key", self.api_v3_key.as_str()),
            (
                "merchant_certificate_serial",
                self.merchant_certificate_serial.as_str(),
            ),
            ("gateway_base_url", self.gateway_base_url.as_str()),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(WechatPayError::config(format!("{name} must not be empty")));
            }
        }

        if self.api_v3_key.len() != API_V3_KEY_LEN {
            return Err(WechatPayError::config(format!(
                "api_v3_key must be {API_V3_KEY_LEN} bytes, got {}",
                self.api_v3_key.len()
            )));
        }
        if self.merchant_private_key_path.as_os_str().is_empty() {
            return Err(WechatPayError::config("merchant_private_key_path must not be empty"));
        }
        if self.platform_certificate_path.as_os_str().is_empty() {
            return Err(WechatPayError::config("platform_certificate_path must not be empty"));
        }
        url::Url::parse(&self.gateway_base_url).map_err(|e| {
            WechatPayError::config(format!("invalid gateway_base_url {}: {e}", self.gateway_base_url))
        })?;

        Ok(())
    }

    /// Endpoint path used to download platform certificates.
    pub fn certificates_path(&self) -> &'static str {
        if self.is_global_merchant {
            GLOBAL_CERTIFICATES_PATH
        } else {
            CERTIFICATES_PATH
        }
    }

    /// Absolute URL for a gateway path.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.gateway_base_url.trim_end_matches('/'), path)
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("app_id", &self.app_id)
            .field("merchant_id", &self.merchant_id)
            .field("api_v3_key", &"<redacted>")
            .field("merchant_private_key_path", &self.merchant_private_key_path)
            .field("merchant_certificate_serial", &self.merchant_certificate_serial)
            .field("platform_public_key_path", &self.platform_public_key_path)
            .field("platform_certificate_path", &self.platform_certificate_path)
            .field("platform_certificate_serial", &self.platform_certificate_serial)
            .field("is_global_merchant", &self.is_global_merchant)
            .field("gateway_base_url", &self.gateway_base_url)
            .field("timeout", &self.timeout)
            .field("trust_on_first_use", &self.trust_on_first_use)
            .finish()
    }
}

fn env_required(name: &str) -> Result<String, WechatPayError> {
    env_optional(name).ok_or_else(|| WechatPayError::config(format!("{name} is not set")))
}

fn env_optional(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    env_optional(name).unwrap_or_else(|| default.to_string())
}

fn env_flag(name: &str) -> bool {
    env_optional(name)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}
