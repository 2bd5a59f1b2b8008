// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Platform certificate parsing.

use x509_parser::{certificate::X509Certificate, prelude::FromDer};

use super::rsa::PlatformPublicKey;
use crate::error::TrustError;

/// A parsed platform certificate.
#[derive(Debug, Clone)]
pub struct PlatformCertificate {
    serial: String,
    public_key: PlatformPublicKey,
    pem: String,
    currently_valid: bool,
}

impl PlatformCertificate {
    /// Parse a PEM-armored X.509 certificate carrying an RSA key.
    pub fn from_pem(pem_text: &str) -> Result<Self, TrustError> {
        let pem = pem::parse(pem_text.as_bytes())
            .map_err(|e| TrustError::InvalidCertificate(format!("invalid PEM: {e}")))?;
        if pem.tag() != "CERTIFICATE" {
            return Err(TrustError::InvalidCertificate(format!(
                "unexpected PEM block: {}",
                pem.tag()
            )));
        }

        let (_, cert) = X509Certificate::from_der(pem.contents())
            .map_err(|e| TrustError::InvalidCertificate(e.to_string()))?;

        let public_key = PlatformPublicKey::from_spki(cert.public_key())?;

        Ok(Self {
            serial: serial_hex(cert.raw_serial()),
            public_key,
            pem: pem_text.to_string(),
            currently_valid: cert.validity().is_valid(),
        })
    }

    /// Uppercase hex serial, the form the gateway puts in `Wechatpay-Serial`.
    pub fn serial(&self) -> &str {
        &self.serial
    }

    pub fn public_key(&self) -> &PlatformPublicKey {
        &self.public_key
    }

    /// The certificate exactly as received, for persistence.
    pub fn pem(&self) -> &str {
        &self.pem
    }

    pub fn is_currently_valid(&self) -> bool {
        self.currently_valid
    }
}

/// Uppercase hex with leading zero bytes dropped (DER pads positive serials).
fn serial_hex(raw: &[u8]) -> String {
    let significant = match raw.iter().position(|b| *b != 0) {
        Some(start) => &raw[start..],
        None => return "00".to_string(),
    };
    significant.iter().map(|b| format!("{b:02X}")).collect()
}
