// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! WeChat Pay APIv3 client core.
//!
//! Signs outbound merchant requests, verifies gateway responses and webhooks
//! against the platform's key, rotates platform certificates when the gateway
//! starts signing with a new one, and decrypts AEAD-protected payloads.
//!
//! ## Modules
//!
//! - `client` - `WechatPayClient`: execute, download, upload, notifications
//! - `config` - merchant credentials and gateway settings
//! - `crypto` - RSA, X.509 and AES-256-GCM primitives
//! - `error` - error taxonomy
//! - `logging` - tracing subscriber setup
//! - `notify` - webhook envelope and reply
//! - `payment_params` - signed JSAPI / APP payment parameters
//! - `transport` - signed HTTP send
//! - `trust` - key store, signer, verifier, certificate rotation

pub mod client;
pub mod config;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod notify;
pub mod payment_params;
pub mod transport;
pub mod trust;

pub use client::WechatPayClient;
pub use config::ClientConfig;
pub use error::{CryptoError, TrustError, VendorError, WechatPayError, WechatPayResult};
pub use notify::{Notification, NotifyReply};
pub use trust::{TrustContext, VerifiedHeaders};
