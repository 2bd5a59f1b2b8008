// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! WeChat Pay APIv3 client.
//!
//! Thin layer over [`TrustContext`]: build the URL and body, sign, send, then
//! verify and decode. Business endpoints (orders, refunds, ...) are plain
//! calls to [`WechatPayClient::execute`].

use std::path::Path;

use reqwest::{header::HeaderMap, multipart, Client, Method};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::config::ClientConfig;
use crate::error::{TrustError, WechatPayError, WechatPayResult};
use crate::notify::NotifyReply;
use crate::payment_params::{AppParameters, JsapiParameters};
use crate::transport::{build_http_client, send_signed, OutboundBody};
use crate::trust::{TrustContext, VerifiedHeaders};

#[derive(Debug)]
pub struct WechatPayClient {
    config: ClientConfig,
    http: Client,
    trust: TrustContext,
}

impl WechatPayClient {
    /// Load credentials and establish platform trust. `config` is validated
    /// by [`TrustContext::bootstrap`].
    pub async fn new(config: ClientConfig) -> WechatPayResult<Self> {
        let http = build_http_client(config.timeout)?;
        let trust = TrustContext::bootstrap(&config, http.clone()).await?;

        info!(
            merchant_id = %config.merchant_id,
            gateway = %config.gateway_base_url,
            "WeChat Pay client ready"
        );
        Ok(Self {
            config,
            http,
            trust,
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn trust(&self) -> &TrustContext {
        &self.trust
    }

    /// Call a gateway endpoint.
    ///
    /// For GET and DELETE `params` becomes the query string; otherwise it is
    /// the JSON body. With `with_platform_serial` the request names the
    /// trusted platform serial, as endpoints carrying encrypted fields require.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        params: Option<&Value>,
        with_platform_serial: bool,
    ) -> WechatPayResult<Value> {
        let (url, body) = if method == Method::GET || method == Method::DELETE {
            let url = self.url_for(path);
            match params {
                Some(params) => (append_query(&url, params)?, OutboundBody::Empty),
                None => (url, OutboundBody::Empty),
            }
        } else {
            let body = match params {
                Some(params) => OutboundBody::Json(serde_json::to_string(params).map_err(|e| {
                    WechatPayError::format(format!("cannot encode request body: {e}"))
                })?),
                None => OutboundBody::Empty,
            };
            (self.url_for(path), body)
        };

        let platform_serial = if with_platform_serial {
            Some(
                self.trust
                    .platform_serial()
                    .await
                    .ok_or(TrustError::NotEstablished)?,
            )
        } else {
            None
        };

        let response = send_signed(
            &self.http,
            self.trust.signer(),
            method.clone(),
            &url,
            body,
            platform_serial.as_deref(),
        )
        .await?
        .error_for_status()?;

        self.trust
            .verify_and_unwrap(&method, &url, &response.headers, response.body_text()?)
            .await
    }

    /// Signed GET of a binary resource such as a bill file. The body is
    /// returned verbatim; the gateway does not sign downloads.
    pub async fn download(&self, download_url: &str) -> WechatPayResult<Vec<u8>> {
        let response = send_signed(
            &self.http,
            self.trust.signer(),
            Method::GET,
            download_url,
            OutboundBody::Empty,
            None,
        )
        .await?
        .error_for_status()?;
        Ok(response.body)
    }

    /// Multipart media upload. The signature covers the `meta` part.
    pub async fn upload(&self, path: &str, file_path: &Path, file_name: &str) -> WechatPayResult<Value> {
        let data = tokio::fs::read(file_path).await.map_err(|e| {
            WechatPayError::format(format!("cannot read upload file {}: {e}", file_path.display()))
        })?;

        let meta = json!({
            "filename": file_name,
            "sha256": sha256_hex(&data),
        })
        .to_string();

        let file_part = multipart::Part::bytes(data)
            .file_name(file_name.to_string())
            .mime_str(mime_for(file_name))
            .map_err(|e| WechatPayError::format(format!("invalid upload content type: {e}")))?;
        let meta_part = multipart::Part::text(meta.clone())
            .mime_str("application/json")
            .map_err(|e| WechatPayError::format(format!("invalid upload content type: {e}")))?;
        let form = multipart::Form::new()
            .part("meta", meta_part)
            .part("file", file_part);

        let url = self.url_for(path);
        let response = send_signed(
            &self.http,
            self.trust.signer(),
            Method::POST,
            &url,
            OutboundBody::Multipart { meta, form },
            None,
        )
        .await?
        .error_for_status()?;

        self.trust
            .verify_and_unwrap(&Method::POST, &url, &response.headers, response.body_text()?)
            .await
    }

    pub fn jsapi_parameters(&self, prepay_id: &str) -> WechatPayResult<JsapiParameters> {
        JsapiParameters::build(self.trust.signer(), &self.config.app_id, prepay_id)
    }

    pub fn app_parameters(&self, prepay_id: &str) -> WechatPayResult<AppParameters> {
        AppParameters::build(self.trust.signer(), &self.config.app_id, prepay_id)
    }

    /// Encrypt a sensitive field (name, phone, ID number) to the trusted
    /// platform key. Send it with `execute(.., with_platform_serial = true)`.
    pub async fn encrypt_sensitive(&self, plaintext: &str) -> WechatPayResult<String> {
        let (_, ciphertext) = self.trust.encrypt_sensitive(plaintext).await?;
        Ok(ciphertext)
    }

    /// Decrypt a sensitive field the gateway returned encrypted to the
    /// merchant key.
    pub fn decrypt_sensitive(&self, ciphertext_b64: &str) -> WechatPayResult<String> {
        self.trust.decrypt_sensitive(ciphertext_b64)
    }

    /// Verify and decrypt a webhook delivered with `headers` and raw `body`.
    pub async fn decrypt_notification(&self, headers: &HeaderMap, body: &str) -> WechatPayResult<Value> {
        let headers = VerifiedHeaders::from_header_map(headers);
        self.trust.verify_and_decrypt_notification(&headers, body).await
    }

    /// Handle a webhook end to end: decrypt, hand the plaintext to `handler`,
    /// and produce the reply owed to the gateway.
    pub async fn notify<F>(&self, headers: &HeaderMap, body: &str, handler: F) -> NotifyReply
    where
        F: FnOnce(Value) -> WechatPayResult<()>,
    {
        let result = match self.decrypt_notification(headers, body).await {
            Ok(plaintext) => handler(plaintext),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            tracing::warn!(error = %e, code = e.error_code(), "Notification rejected");
        }
        NotifyReply::from_result(&result)
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            self.config.endpoint(path)
        }
    }
}

/// Encode a flat JSON object as a query string appended to `url`.
fn append_query(url: &str, params: &Value) -> WechatPayResult<String> {
    let object = params
        .as_object()
        .ok_or_else(|| WechatPayError::format("query parameters must be a JSON object"))?;

    let mut query = url::form_urlencoded::Serializer::new(String::new());
    for (key, value) in object {
        match value {
            Value::Null => {}
            Value::String(s) => {
                query.append_pair(key, s);
            }
            other => {
                query.append_pair(key, &other.to_string());
            }
        }
    }
    let query = query.finish();

    if query.is_empty() {
        return Ok(url.to_string());
    }
    let separator = if url.contains('?') { '&' } else { '?' };
    Ok(format!("{url}{separator}{query}"))
}

fn sha256_hex(data: &[u8]) -> String {
    Sha256::digest(data)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn mime_for(file_name: &str) -> &'static str {
    let extension = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "bmp" => "image/bmp",
        "gif" => "image/gif",
        "mp4" => "video/mp4",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_encodes_scalars_and_skips_nulls() {
        let params = json!({"mchid": "1230000109", "limit": 10, "offset": null, "desc": "a b&c"});
        let url = append_query("https://api.mch.weixin.qq.com/v3/bill", &params).unwrap();
        assert_eq!(
            url,
            "https://api.mch.weixin.qq.com/v3/bill?desc=a+b%26c&limit=10&mchid=1230000109"
        );
        assert_eq!(
            append_query("/v3/x?a=1", &json!({"b": true})).unwrap(),
            "/v3/x?a=1&b=true"
        );
        assert_eq!(append_query("/v3/x", &json!({})).unwrap(), "/v3/x");
        assert!(matches!(
            append_query("/v3/x", &json!([1])),
            Err(WechatPayError::Format(_))
        ));
    }

    #[test]
    fn sha256_is_lowercase_hex() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn mime_follows_extension() {
        assert_eq!(mime_for("photo.JPG"), "image/jpeg");
        assert_eq!(mime_for("clip.mp4"), "video/mp4");
        assert_eq!(mime_for("noext"), "application/octet-stream");
    }
}
