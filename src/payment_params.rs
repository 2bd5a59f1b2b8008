// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Client-side payment parameters signed with the merchant key.
//!
//! After a prepay order is created the front end (JSAPI, mini program or
//! native app) needs a signed parameter set to invoke the payment sheet.

use serde::{Deserialize, Serialize};

use crate::error::{WechatPayError, WechatPayResult};
use crate::trust::signer::{generate_nonce, unix_timestamp, NONCE_LEN};
use crate::trust::Signer;

/// JSAPI and mini program `requestPayment` parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsapiParameters {
    pub app_id: String,
    pub time_stamp: String,
    pub nonce_str: String,
    pub package: String,
    pub sign_type: String,
    pub pay_sign: String,
}

/// APP SDK `PayReq` parameters. Field names are all lowercase on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppParameters {
    pub appid: String,
    pub partnerid: String,
    pub prepayid: String,
    pub package: String,
    pub noncestr: String,
    pub timestamp: String,
    pub sign: String,
}

fn require_prepay_id(prepay_id: &str) -> WechatPayResult<&str> {
    let prepay_id = prepay_id.trim();
    if prepay_id.is_empty() {
        return Err(WechatPayError::format("prepay_id must not be empty"));
    }
    Ok(prepay_id)
}

impl JsapiParameters {
    pub fn build(signer: &Signer, app_id: &str, prepay_id: &str) -> WechatPayResult<Self> {
        let nonce = generate_nonce(NONCE_LEN)?;
        Self::build_at(signer, app_id, prepay_id, unix_timestamp(), &nonce)
    }

    pub fn build_at(
        signer: &Signer,
        app_id: &str,
        prepay_id: &str,
        timestamp: i64,
        nonce: &str,
    ) -> WechatPayResult<Self> {
        let package = format!("prepay_id={}", require_prepay_id(prepay_id)?);
        let time_stamp = timestamp.to_string();
        let pay_sign = signer.sign_fields(&[app_id, &time_stamp, nonce, &package])?;

        Ok(Self {
            app_id: app_id.to_string(),
            time_stamp,
            nonce_str: nonce.to_string(),
            package,
            sign_type: "RSA".to_string(),
            pay_sign,
        })
    }
}

impl AppParameters {
    pub fn build(signer: &Signer, app_id: &str, prepay_id: &str) -> WechatPayResult<Self> {
        let nonce = generate_nonce(NONCE_LEN)?;
        Self::build_at(signer, app_id, prepay_id, unix_timestamp(), &nonce)
    }

    pub fn build_at(
        signer: &Signer,
        app_id: &str,
        prepay_id: &str,
        timestamp: i64,
        nonce: &str,
    ) -> WechatPayResult<Self> {
        let prepay_id = require_prepay_id(prepay_id)?;
        let timestamp = timestamp.to_string();
        let sign = signer.sign_fields(&[app_id, &timestamp, nonce, prepay_id])?;

        Ok(Self {
            appid: app_id.to_string(),
            partnerid: signer.credential().merchant_id.clone(),
            prepayid: prepay_id.to_string(),
            package: "Sign=WXPay".to_string(),
            noncestr: nonce.to_string(),
            timestamp,
            sign,
        })
    }
}
