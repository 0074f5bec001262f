// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes surfaced by the HTTP command ingress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GatewayError {
    Unauthorized,
    BadRequest,
    DeviceOffline,
    Timeout,
    Internal,
}

impl GatewayError {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "UNAUTHORIZED",
            Self::BadRequest => "BAD_REQUEST",
            Self::DeviceOffline => "DEVICE_OFFLINE",
            Self::Timeout => "SEND_TIMEOUT",
            Self::Internal => "INTERNAL",
        }
    }

    /// Build the `{status, error}` envelope the command endpoint emits.
    ///
    /// `status` is always `1` on failure — the source encodes every failure
    /// this way and reserves `0` for the success path, which returns peer
    /// bytes verbatim rather than this envelope.
    pub fn to_command_response(&self, message: impl Into<String>) -> CommandResponse {
        CommandResponse { status: 1, error: message.into() }
    }

    /// Render as a `200 OK` JSON body, matching the source (which never sets
    /// a non-2xx HTTP status — failures are communicated in the body).
    pub fn to_http_response(&self, message: impl Into<String>) -> (StatusCode, Json<CommandResponse>) {
        (StatusCode::OK, Json(self.to_command_response(message)))
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response envelope for the HTTP command endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub status: i32,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub error: String,
}
