// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! RSA-SHA256 (PKCS#1 v1.5) signing and verification, plus RSA-OAEP for
//! sensitive request and response fields.
//!
//! The merchant signs outbound requests with its API private key; the gateway
//! signs responses and notifications with the platform key. Sensitive fields
//! are encrypted to the platform key and returned encrypted to the merchant
//! key, both with OAEP over SHA-1.

use ::rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use ::rsa::pkcs8::DecodePrivateKey;
use ::rsa::rand_core::OsRng;
use ::rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use base64ct::{Base64, Encoding};
use ring::{
    rand::SystemRandom,
    signature::{RsaKeyPair, UnparsedPublicKey, RSA_PKCS1_2048_8192_SHA256, RSA_PKCS1_SHA256},
};
use sha1::Sha1;
use x509_parser::{oid_registry::OID_PKCS1_RSAENCRYPTION, prelude::FromDer, x509::SubjectPublicKeyInfo};

use crate::error::{CryptoError, TrustError};

/// Merchant API private key.
pub struct MerchantSigningKey {
    key_pair: RsaKeyPair,
    oaep_key: RsaPrivateKey,
    rng: SystemRandom,
}

impl MerchantSigningKey {
    /// Parse a PEM private key in PKCS#8 (`PRIVATE KEY`) or PKCS#1
    /// (`RSA PRIVATE KEY`) form.
    pub fn from_pem(pem_bytes: &[u8]) -> Result<Self, CryptoError> {
        let pem = pem::parse(pem_bytes)
            .map_err(|e| CryptoError::InvalidPrivateKey(format!("invalid PEM: {e}")))?;

        let invalid = |e: &dyn std::fmt::Display| CryptoError::InvalidPrivateKey(e.to_string());
        let (key_pair, oaep_key) = match pem.tag() {
            "PRIVATE KEY" => (
                RsaKeyPair::from_pkcs8(pem.contents()).map_err(|e| invalid(&e))?,
                RsaPrivateKey::from_pkcs8_der(pem.contents()).map_err(|e| invalid(&e))?,
            ),
            "RSA PRIVATE KEY" => (
                RsaKeyPair::from_der(pem.contents()).map_err(|e| invalid(&e))?,
                RsaPrivateKey::from_pkcs1_der(pem.contents()).map_err(|e| invalid(&e))?,
            ),
            other => {
                return Err(CryptoError::InvalidPrivateKey(format!(
                    "unsupported PEM block: {other}"
                )))
            }
        };

        Ok(Self {
            key_pair,
            oaep_key,
            rng: SystemRandom::new(),
        })
    }

    /// Sign `message` and return the base64 signature.
    pub fn sign_base64(&self, message: &[u8]) -> Result<String, CryptoError> {
        let mut signature = vec![0u8; self.key_pair.public().modulus_len()];
        self.key_pair
            .sign(&RSA_PKCS1_SHA256, &self.rng, message, &mut signature)
            .map_err(|_| CryptoError::Signing)?;
        Ok(Base64::encode_string(&signature))
    }

    /// Decrypt a base64 RSA-OAEP (SHA-1) ciphertext addressed to the merchant.
    pub fn decrypt_oaep_base64(&self, ciphertext_b64: &str) -> Result<Vec<u8>, CryptoError> {
        let ciphertext =
            Base64::decode_vec(ciphertext_b64.trim()).map_err(|_| CryptoError::InvalidBase64)?;
        self.oaep_key
            .decrypt(Oaep::new::<Sha1>(), &ciphertext)
            .map_err(|_| CryptoError::RsaDecrypt)
    }

    /// PKCS#1 `RSAPublicKey` DER of the matching public key.
    pub fn public_key(&self) -> PlatformPublicKey {
        PlatformPublicKey {
            pkcs1_der: self.key_pair.public().as_ref().to_vec(),
        }
    }
}

impl std::fmt::Debug for MerchantSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MerchantSigningKey")
            .field("modulus_len", &self.key_pair.public().modulus_len())
            .finish_non_exhaustive()
    }
}

/// Gateway RSA public key, held as PKCS#1 `RSAPublicKey` DER.
#[derive(Clone, PartialEq, Eq)]
pub struct PlatformPublicKey {
    pkcs1_der: Vec<u8>,
}

impl PlatformPublicKey {
    /// Parse a PEM public key in SPKI (`PUBLIC KEY`) or PKCS#1
    /// (`RSA PUBLIC KEY`) form.
    pub fn from_pem(pem_bytes: &[u8]) -> Result<Self, TrustError> {
        let pem = pem::parse(pem_bytes)
            .map_err(|e| TrustError::InvalidPublicKey(format!("invalid PEM: {e}")))?;

        match pem.tag() {
            "PUBLIC KEY" => {
                let (_, spki) = SubjectPublicKeyInfo::from_der(pem.contents())
                    .map_err(|e| TrustError::InvalidPublicKey(e.to_string()))?;
                Self::from_spki(&spki)
            }
            "RSA PUBLIC KEY" => Ok(Self::from_pkcs1_der(pem.contents().to_vec())),
            other => Err(TrustError::InvalidPublicKey(format!(
                "unsupported PEM block: {other}"
            ))),
        }
    }

    pub(crate) fn from_spki(spki: &SubjectPublicKeyInfo<'_>) -> Result<Self, TrustError> {
        if spki.algorithm.algorithm != OID_PKCS1_RSAENCRYPTION {
            return Err(TrustError::InvalidPublicKey(format!(
                "expected an RSA key, got algorithm {}",
                spki.algorithm.algorithm
            )));
        }
        Ok(Self::from_pkcs1_der(spki.subject_public_key.data.to_vec()))
    }

    pub(crate) fn from_pkcs1_der(pkcs1_der: Vec<u8>) -> Self {
        Self { pkcs1_der }
    }

    /// Check a base64 RSA-SHA256 signature over `message`.
    pub fn verify_base64(&self, message: &[u8], signature_b64: &str) -> Result<(), TrustError> {
        let signature =
            Base64::decode_vec(signature_b64.trim()).map_err(|_| TrustError::InvalidSignature)?;
        UnparsedPublicKey::new(&RSA_PKCS1_2048_8192_SHA256, &self.pkcs1_der)
            .verify(message, &signature)
            .map_err(|_| TrustError::InvalidSignature)
    }

    /// Encrypt a sensitive field with RSA-OAEP (SHA-1) and return base64.
    pub fn encrypt_oaep_base64(&self, plaintext: &[u8]) -> Result<String, CryptoError> {
        let key = RsaPublicKey::from_pkcs1_der(&self.pkcs1_der)
            .map_err(|e| CryptoError::RsaEncrypt(e.to_string()))?;
        let ciphertext = key
            .encrypt(&mut OsRng, Oaep::new::<Sha1>(), plaintext)
            .map_err(|e| CryptoError::RsaEncrypt(e.to_string()))?;
        Ok(Base64::encode_string(&ciphertext))
    }
}

impl std::fmt::Debug for PlatformPublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformPublicKey")
            .field("der_len", &self.pkcs1_der.len())
            .finish()
    }
}
