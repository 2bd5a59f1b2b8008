// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Cryptographic Primitives
//!
//! - `aead` - AEAD_AES_256_GCM envelopes (certificate downloads, notifications)
//! - `rsa` - RSA-SHA256 signing (merchant) and verification (platform), RSA-OAEP
//!   for sensitive fields
//! - `certificate` - X.509 platform certificate parsing
//!
//! All operations are synchronous and CPU-bound. Key bytes never leave the
//! types defined here.

pub mod aead;
pub mod certificate;
pub mod rsa;

pub use aead::{ApiV3Key, EncryptedResource};
pub use certificate::PlatformCertificate;
pub use self::rsa::{MerchantSigningKey, PlatformPublicKey};
