// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Shared fixtures for the mock-gateway integration tests.

#![allow(dead_code)]

use std::fs;

use base64::{engine::general_purpose::STANDARD, Engine};
use ring::rand::SystemRandom;
use ring::signature::{RsaKeyPair, RSA_PKCS1_SHA256};
use serde_json::json;
use tempfile::TempDir;
use wechatpay_rust_client::crypto::aead::{self, ApiV3Key};
use wechatpay_rust_client::ClientConfig;
use wiremock::ResponseTemplate;

pub const MERCHANT_KEY: &str = include_str!("../fixtures/merchant_key.pem");
pub const PLATFORM_KEY_A: &str = include_str!("../fixtures/platform_key_a.pem");
pub const PLATFORM_KEY_B: &str = include_str!("../fixtures/platform_key_b.pem");
pub const CERT_A: &str = include_str!("../fixtures/platform_cert_a.pem");
pub const CERT_B: &str = include_str!("../fixtures/platform_cert_b.pem");
pub const PUBLIC_KEY_A: &str = include_str!("../fixtures/platform_public_key_a.pem");

pub const SERIAL_A: &str = "5157F09EFDC096DE15EBE81A47057A7232F1B8E1";
pub const SERIAL_B: &str = "7132D72A03E93CDDF8C03BBD1F37EEDF204386A2";
pub const SERIAL_UNKNOWN: &str = "3C4E1B2A9D8F7E6D5C4B3A291807F6E5D4C3B2A1";

pub const API_V3_KEY: &str = "0123456789abcdef0123456789abcdef";
pub const MERCHANT_ID: &str = "1230000109";
pub const MERCHANT_SERIAL: &str = "3775B6A45ACD588826D15E583A95F5DD";
pub const APP_ID: &str = "wxd678efh567hg6787";

pub const TIMESTAMP: &str = "1700000000";
pub const NONCE: &str = "abc";

/// Merchant config rooted in a fresh temp dir, pointed at `gateway`.
pub fn config_for(gateway: &str) -> (TempDir, ClientConfig) {
    let dir = tempfile::tempdir().expect("temp dir");
    let key_path = dir.path().join("apiclient_key.pem");
    fs::write(&key_path, MERCHANT_KEY).expect("write merchant key");

    let config = ClientConfig::new(
        APP_ID,
        MERCHANT_ID,
        API_V3_KEY,
        key_path,
        MERCHANT_SERIAL,
        dir.path().join("platform_cert.pem"),
    )
    .with_gateway(gateway);
    (dir, config)
}

/// Same as [`config_for`] with `cert_pem` already cached on disk.
pub fn config_with_cached_cert(gateway: &str, cert_pem: &str) -> (TempDir, ClientConfig) {
    let (dir, config) = config_for(gateway);
    fs::write(&config.platform_certificate_path, cert_pem).expect("write platform cert");
    (dir, config)
}

/// RSA-SHA256 over `timestamp\nnonce\nbody\n`, as the gateway signs.
pub fn gateway_signature(platform_key_pem: &str, body: &str) -> String {
    let der = pem::parse(platform_key_pem).expect("platform key pem");
    let key = RsaKeyPair::from_pkcs8(der.contents()).expect("platform key");
    let message = format!("{TIMESTAMP}\n{NONCE}\n{body}\n");
    let mut signature = vec![0u8; key.public().modulus_len()];
    key.sign(&RSA_PKCS1_SHA256, &SystemRandom::new(), message.as_bytes(), &mut signature)
        .expect("sign");
    STANDARD.encode(signature)
}

/// Signed gateway reply with the four `Wechatpay-*` headers.
pub fn signed_response(status: u16, platform_key_pem: &str, serial: &str, body: &str) -> ResponseTemplate {
    ResponseTemplate::new(status)
        .insert_header("Wechatpay-Serial", serial)
        .insert_header("Wechatpay-Nonce", NONCE)
        .insert_header("Wechatpay-Timestamp", TIMESTAMP)
        .insert_header("Wechatpay-Signature", gateway_signature(platform_key_pem, body).as_str())
        .set_body_raw(body.as_bytes().to_vec(), "application/json")
}

pub fn api_v3_key() -> ApiV3Key {
    ApiV3Key::new(API_V3_KEY.as_bytes()).expect("api v3 key")
}

/// Certificate listing body with each `(pem, effective_time)` encrypted under
/// the merchant APIv3 key.
pub fn certificate_listing(entries: &[(&str, &str)]) -> String {
    let data: Vec<_> = entries
        .iter()
        .map(|(pem, effective_time)| {
            let nonce = "61f9c719728a";
            let ciphertext = aead::encrypt(pem.as_bytes(), nonce, "certificate", &api_v3_key())
                .expect("encrypt certificate");
            json!({
                "effective_time": effective_time,
                "expire_time": "2120-01-01T00:00:00+08:00",
                "encrypt_certificate": {
                    "algorithm": "AEAD_AES_256_GCM",
                    "nonce": nonce,
                    "associated_data": "certificate",
                    "ciphertext": ciphertext,
                },
            })
        })
        .collect();
    json!({ "data": data }).to_string()
}

/// Notification body whose resource encrypts `plaintext`.
pub fn notification_body(plaintext: &str) -> String {
    let nonce = "fdasflkja484";
    let ciphertext = aead::encrypt(plaintext.as_bytes(), nonce, "transaction", &api_v3_key())
        .expect("encrypt resource");
    json!({
        "id": "EV-2018022511223320873",
        "create_time": "2015-05-20T13:29:35+08:00",
        "event_type": "TRANSACTION.SUCCESS",
        "resource_type": "encrypt-resource",
        "summary": "payment succeeded",
        "resource": {
            "algorithm": "AEAD_AES_256_GCM",
            "ciphertext": ciphertext,
            "nonce": nonce,
            "associated_data": "transaction",
            "original_type": "transaction",
        },
    })
    .to_string()
}

/// Header map as an HTTP framework would hand over a webhook.
pub fn notification_headers(platform_key_pem: &str, serial: &str, body: &str) -> reqwest::header::HeaderMap {
    let mut headers = reqwest::header::HeaderMap::new();
    headers.insert("wechatpay-serial", serial.parse().expect("serial header"));
    headers.insert("wechatpay-nonce", NONCE.parse().expect("nonce header"));
    headers.insert("wechatpay-timestamp", TIMESTAMP.parse().expect("timestamp header"));
    headers.insert(
        "wechatpay-signature",
        gateway_signature(platform_key_pem, body).parse().expect("signature header"),
    );
    headers
}
