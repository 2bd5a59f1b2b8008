// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Trust Layer
//!
//! Everything between the merchant's keys and the gateway's signatures.
//!
//! - `keystore` - merchant credential and the active platform trust
//! - `signer` - outbound `Authorization` headers
//! - `verifier` - inbound signature checks with bounded certificate refresh
//! - `certificates` - platform certificate download and rotation
//! - `context` - the façade used by [`crate::client::WechatPayClient`]
//!
//! ## Verification Flow
//!
//! ```text
//! response ──▶ serial matches? ──yes──▶ RSA-SHA256 verify ──▶ Ok
//!                   │ no
//!                   ▼
//!          PUB_KEY_ID_ serial? ──yes──▶ TrustError
//!                   │ no
//!                   ▼
//!     reload local certificate, download once ──▶ recheck or TrustError
//! ```

pub mod certificates;
pub mod context;
pub mod keystore;
pub mod signer;
pub mod verifier;

pub use certificates::CertificateManager;
pub use context::TrustContext;
pub use keystore::{KeyStore, MerchantCredential, PlatformTrust, TrustSource, TrustState};
pub use signer::{AuthorizationHeader, SignedRequest, Signer};
pub use verifier::{RefreshPolicy, ResponseVerifier, VerifiedHeaders};
