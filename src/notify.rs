// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Inbound notification envelope and the reply owed to the gateway.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::crypto::EncryptedResource;
use crate::error::WechatPayError;

/// Webhook body as delivered by the gateway. Only `resource` is required.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub create_time: Option<String>,
    #[serde(default)]
    pub event_type: Option<String>,
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    pub resource: EncryptedResource,
}

impl Notification {
    pub fn parse(body: &str) -> Result<Self, WechatPayError> {
        if body.trim().is_empty() {
            return Err(WechatPayError::format("notification body is empty"));
        }
        serde_json::from_str(body)
            .map_err(|e| WechatPayError::format(format!("invalid notification envelope: {e}")))
    }
}

/// Reply body for a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotifyReply {
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl NotifyReply {
    /// Status the gateway expects for a rejected notification, prompting
    /// redelivery.
    pub const FAIL_STATUS: u16 = 499;

    pub fn success() -> Self {
        Self {
            code: "SUCCESS",
            message: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            code: "FAIL",
            message: Some(message.into()),
        }
    }

    pub fn from_result<T>(result: &Result<T, WechatPayError>) -> Self {
        match result {
            Ok(_) => Self::success(),
            Err(e) => Self::fail(format!("{}: {e}", e.error_code())),
        }
    }

    pub fn is_success(&self) -> bool {
        self.code == "SUCCESS"
    }

    pub fn http_status(&self) -> StatusCode {
        if self.is_success() {
            StatusCode::OK
        } else {
            StatusCode::from_u16(Self::FAIL_STATUS).unwrap_or(StatusCode::BAD_REQUEST)
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| format!(r#"{{"code":"{}"}}"#, self.code))
    }
}
