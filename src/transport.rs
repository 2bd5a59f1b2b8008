// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Minimal HTTP plumbing: attach signed headers, send, collect the raw reply.
//!
//! Timeouts are enforced by the `reqwest` client; there are no retries here.

use std::time::Duration;

use reqwest::{
    header::{HeaderMap, ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    multipart::Form,
    Client, Method, StatusCode,
};

use crate::error::{VendorError, WechatPayError};
use crate::trust::Signer;

/// Request header naming the platform serial the body was encrypted for.
pub const PLATFORM_SERIAL_HEADER: &str = "Wechatpay-Serial";

fn user_agent() -> String {
    format!(
        "wechatpay-rust-client/{} ({}/{})",
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
}

/// Build the shared HTTP client with the configured per-call timeout.
pub fn build_http_client(timeout: Duration) -> Result<Client, WechatPayError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(user_agent())
        .build()
        .map_err(|e| WechatPayError::Transport(format!("failed to build HTTP client: {e}")))
}

pub(crate) enum OutboundBody {
    Empty,
    Json(String),
    /// Multipart upload; the signature covers `meta` only.
    Multipart { meta: String, form: Form },
}

impl OutboundBody {
    fn signed_text(&self) -> &str {
        match self {
            OutboundBody::Empty => "",
            OutboundBody::Json(body) => body,
            OutboundBody::Multipart { meta, .. } => meta,
        }
    }
}

/// Raw gateway reply, before any verification.
#[derive(Debug)]
pub struct RawResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl RawResponse {
    pub fn body_text(&self) -> Result<&str, WechatPayError> {
        std::str::from_utf8(&self.body)
            .map_err(|e| WechatPayError::format(format!("response body is not UTF-8: {e}")))
    }

    /// Non-2xx replies become a `VendorError`.
    pub fn error_for_status(self) -> Result<Self, WechatPayError> {
        if self.status.is_success() {
            return Ok(self);
        }
        let body = String::from_utf8_lossy(&self.body);
        Err(VendorError::from_response(self.status.as_u16(), &body).into())
    }
}

/// Sign and send one request.
pub(crate) async fn send_signed(
    http: &Client,
    signer: &Signer,
    method: Method,
    url: &str,
    body: OutboundBody,
    platform_serial: Option<&str>,
) -> Result<RawResponse, WechatPayError> {
    let signed = signer.sign(&method, url, body.signed_text())?;

    let mut request = http
        .request(method.clone(), url)
        .header(ACCEPT, "application/json")
        .header(AUTHORIZATION, signed.authorization_value());

    if let Some(serial) = platform_serial {
        request = request.header(PLATFORM_SERIAL_HEADER, serial);
    }

    request = match body {
        OutboundBody::Empty => request,
        OutboundBody::Json(body) => request.header(CONTENT_TYPE, "application/json").body(body),
        OutboundBody::Multipart { form, .. } => request.multipart(form),
    };

    let response = request
        .send()
        .await
        .map_err(|e| WechatPayError::Transport(format!("{method} {} failed: {e}", signed.path)))?;

    let status = response.status();
    let headers = response.headers().clone();
    let body = response
        .bytes()
        .await
        .map_err(|e| WechatPayError::Transport(format!("{method} {} body read failed: {e}", signed.path)))?
        .to_vec();

    Ok(RawResponse {
        status,
        headers,
        body,
    })
}
