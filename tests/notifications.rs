// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Webhook verification and resource decryption.

mod common;

use base64::{engine::general_purpose::STANDARD, Engine};
use common::*;
use serde::Deserialize;
use serde_json::json;
use wechatpay_rust_client::{
    CryptoError, NotifyReply, TrustError, VerifiedHeaders, WechatPayClient, WechatPayError,
};
use wiremock::matchers::path;
use wiremock::{Mock, MockServer, ResponseTemplate};

const PLAINTEXT: &str = r#"{"out_trade_no":"1217752501201407033233368018","trade_state":"SUCCESS"}"#;

/// Client trusting certificate A with a listing mock that must never be hit.
async fn client(server: &MockServer) -> (tempfile::TempDir, WechatPayClient) {
    Mock::given(path("/v3/certificates"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{}"))
        .expect(0)
        .mount(server)
        .await;
    let (dir, config) = config_with_cached_cert(&server.uri(), CERT_A);
    (dir, WechatPayClient::new(config).await.unwrap())
}

#[tokio::test]
async fn verified_notification_decrypts_to_json() {
    let server = MockServer::start().await;
    let (_dir, client) = client(&server).await;

    let body = notification_body(PLAINTEXT);
    let headers = notification_headers(PLATFORM_KEY_A, SERIAL_A, &body);

    let value = client.decrypt_notification(&headers, &body).await.unwrap();
    assert_eq!(value["trade_state"], "SUCCESS");
    assert_eq!(value["out_trade_no"], "1217752501201407033233368018");
}

#[tokio::test]
async fn notification_decrypts_into_caller_type() {
    #[derive(Debug, Deserialize)]
    struct Transaction {
        out_trade_no: String,
        trade_state: String,
    }

    let server = MockServer::start().await;
    let (_dir, client) = client(&server).await;

    let body = notification_body(PLAINTEXT);
    let raw = format!(
        "Wechatpay-Serial: {SERIAL_A}\r\nWechatpay-Nonce: {NONCE}\r\nWechatpay-Timestamp: {TIMESTAMP}\r\nWechatpay-Signature: {}\r\n",
        gateway_signature(PLATFORM_KEY_A, &body)
    );
    let headers = VerifiedHeaders::parse_raw(&raw);

    let transaction: Transaction = client
        .trust()
        .decrypt_notification_as(&headers, &body)
        .await
        .unwrap();
    assert_eq!(transaction.trade_state, "SUCCESS");
    assert_eq!(transaction.out_trade_no, "1217752501201407033233368018");
}

#[tokio::test]
async fn unknown_serial_fails_closed_without_download() {
    let server = MockServer::start().await;
    let (_dir, client) = client(&server).await;

    let body = notification_body(PLAINTEXT);
    let headers = notification_headers(PLATFORM_KEY_B, SERIAL_B, &body);

    let err = client.decrypt_notification(&headers, &body).await.unwrap_err();
    assert!(
        matches!(err, WechatPayError::Trust(TrustError::SerialMismatch { .. })),
        "{err:?}"
    );
}

#[tokio::test]
async fn short_ciphertext_is_a_crypto_error() {
    let server = MockServer::start().await;
    let (_dir, client) = client(&server).await;

    let body = json!({
        "id": "EV-1",
        "resource": {
            "algorithm": "AEAD_AES_256_GCM",
            "ciphertext": STANDARD.encode([7u8; 15]),
            "nonce": "fdasflkja484",
            "associated_data": "transaction",
        },
    })
    .to_string();
    let headers = notification_headers(PLATFORM_KEY_A, SERIAL_A, &body);

    let err = client.decrypt_notification(&headers, &body).await.unwrap_err();
    assert!(
        matches!(err, WechatPayError::Crypto(CryptoError::CiphertextTooShort(15))),
        "{err:?}"
    );
}

#[tokio::test]
async fn missing_resource_field_is_a_format_error() {
    let server = MockServer::start().await;
    let (_dir, client) = client(&server).await;

    let body = json!({
        "id": "EV-1",
        "resource": {"ciphertext": "AAAA", "associated_data": "transaction"},
    })
    .to_string();
    let headers = notification_headers(PLATFORM_KEY_A, SERIAL_A, &body);

    let err = client.decrypt_notification(&headers, &body).await.unwrap_err();
    assert!(matches!(err, WechatPayError::Format(_)), "{err:?}");
}

#[tokio::test]
async fn empty_body_is_a_format_error() {
    let server = MockServer::start().await;
    let (_dir, client) = client(&server).await;

    let headers = notification_headers(PLATFORM_KEY_A, SERIAL_A, "");
    let err = client.decrypt_notification(&headers, "").await.unwrap_err();
    assert!(matches!(err, WechatPayError::Format(_)), "{err:?}");
}

#[tokio::test]
async fn tampered_notification_body_is_rejected() {
    let server = MockServer::start().await;
    let (_dir, client) = client(&server).await;

    let body = notification_body(PLAINTEXT);
    let headers = notification_headers(PLATFORM_KEY_A, SERIAL_A, &body);
    let tampered = body.replace("TRANSACTION.SUCCESS", "TRANSACTION.REFUND");

    let err = client.decrypt_notification(&headers, &tampered).await.unwrap_err();
    assert!(matches!(err, WechatPayError::Trust(TrustError::InvalidSignature)), "{err:?}");
}

#[tokio::test]
async fn notify_produces_gateway_replies() {
    let server = MockServer::start().await;
    let (_dir, client) = client(&server).await;

    let body = notification_body(PLAINTEXT);
    let headers = notification_headers(PLATFORM_KEY_A, SERIAL_A, &body);

    let mut seen = None;
    let reply = client
        .notify(&headers, &body, |plaintext| {
            seen = Some(plaintext);
            Ok(())
        })
        .await;
    assert_eq!(reply, NotifyReply::success());
    assert_eq!(seen.unwrap()["trade_state"], "SUCCESS");

    let bad_headers = notification_headers(PLATFORM_KEY_B, SERIAL_A, &body);
    let reply = client.notify(&bad_headers, &body, |_| Ok(())).await;
    assert_eq!(reply.http_status().as_u16(), 499);
    assert_eq!(reply.code, "FAIL");

    let reply = client
        .notify(&headers, &body, |_| Err(WechatPayError::Format("order unknown".into())))
        .await;
    assert!(!reply.is_success());
}

#[tokio::test]
async fn trust_on_first_use_does_not_cover_notifications() {
    let server = MockServer::start().await;
    Mock::given(path("/v3/certificates"))
        .respond_with(ResponseTemplate::new(503))
        .expect(1)
        .mount(&server)
        .await;
    let (_dir, config) = config_for(&server.uri());
    let client = WechatPayClient::new(config.with_trust_on_first_use(true)).await.unwrap();
    assert_eq!(client.trust().platform_serial().await, None);

    let body = notification_body(PLAINTEXT);
    let mut unsigned = reqwest::header::HeaderMap::new();
    unsigned.insert("wechatpay-serial", "FORGED".parse().unwrap());
    let err = client.decrypt_notification(&unsigned, &body).await.unwrap_err();
    assert!(matches!(err, WechatPayError::Trust(TrustError::MissingSignature)), "{err:?}");

    let signed = notification_headers(PLATFORM_KEY_A, SERIAL_A, &body);
    let err = client.decrypt_notification(&signed, &body).await.unwrap_err();
    assert!(
        matches!(err, WechatPayError::Trust(TrustError::SerialMismatch { trusted: None, .. })),
        "{err:?}"
    );
}
