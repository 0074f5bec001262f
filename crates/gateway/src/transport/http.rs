// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP handlers for the comet gateway's command ingress.
//!
//! `POST /router/command` is the production endpoint: it enforces `rid`
//! (device id) and `uid`, runs the authorization hook, and forwards the
//! request body verbatim as the `Cmd` field of a JSON command envelope.
//! `GET /command` is a diagnostic variant that skips the JSON envelope and
//! the authz hook entirely. Both share the deadline handling in
//! [`crate::session::await_reply`], so neither leaks a pending slot on
//! timeout.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::authz::AuthzPolicy;
use crate::error::GatewayError;
use crate::message::{CommandEnvelope, MsgType};
use crate::session::{await_reply, AwaitError};
use crate::state::GatewayState;

#[derive(Debug, Deserialize)]
pub struct CommandQuery {
    /// Device id. Named `rid` to match the source's form field.
    #[serde(default)]
    pub rid: String,
    #[serde(default)]
    pub uid: String,
}

#[derive(Debug, Deserialize)]
pub struct DiagnosticQuery {
    #[serde(default)]
    pub devid: String,
    #[serde(default)]
    pub cmd: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub session_count: usize,
}

/// `POST /router/command` — the production device-command endpoint.
pub async fn command(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<CommandQuery>,
    body: Bytes,
) -> impl IntoResponse {
    if query.rid.is_empty() || query.uid.is_empty() {
        return GatewayError::BadRequest
            .to_http_response("rid and uid are required")
            .into_response();
    }

    if !state.authz.check(&query.uid, &query.rid) {
        return GatewayError::Unauthorized.to_http_response("not authorized").into_response();
    }

    let Some(session) = state.registry.get(&query.rid).await else {
        return GatewayError::DeviceOffline
            .to_http_response(format!("device ({}) offline", query.rid))
            .into_response();
    };

    let envelope = CommandEnvelope {
        uid: query.uid.clone(),
        cmd: String::from_utf8_lossy(&body).into_owned(),
    };
    let payload = match serde_json::to_vec(&envelope) {
        Ok(payload) => payload,
        Err(e) => {
            return GatewayError::Internal
                .to_http_response(format!("failed to encode command: {e}"))
                .into_response()
        }
    };

    let (reply_tx, reply_rx) = oneshot::channel();
    let seq = session.send_message(MsgType::Request, payload, Some(reply_tx)).await;

    match await_reply(&session, seq, reply_rx, state.request_timeout).await {
        Ok(msg) => (StatusCode::OK, msg.data.to_vec()).into_response(),
        Err(AwaitError::Timeout) => {
            GatewayError::Timeout.to_http_response("recv response timeout").into_response()
        }
        Err(AwaitError::SessionClosed) => {
            GatewayError::Internal.to_http_response("session closed").into_response()
        }
    }
}

/// `GET /command?devid=&cmd=` — diagnostic variant with no authz hook and
/// no JSON envelope; the reply is returned as plain text.
pub async fn command_diagnostic(
    State(state): State<Arc<GatewayState>>,
    Query(query): Query<DiagnosticQuery>,
) -> impl IntoResponse {
    if query.devid.is_empty() {
        return GatewayError::BadRequest.to_http_response("devid is required").into_response();
    }

    let Some(session) = state.registry.get(&query.devid).await else {
        return GatewayError::DeviceOffline
            .to_http_response(format!("device ({}) offline", query.devid))
            .into_response();
    };

    let (reply_tx, reply_rx) = oneshot::channel();
    let seq = session.send_message(MsgType::Request, query.cmd.into_bytes(), Some(reply_tx)).await;

    match await_reply(&session, seq, reply_rx, state.request_timeout).await {
        Ok(msg) => (StatusCode::OK, msg.data.to_vec()).into_response(),
        Err(AwaitError::Timeout) => {
            GatewayError::Timeout.to_http_response("recv response timeout").into_response()
        }
        Err(AwaitError::SessionClosed) => {
            GatewayError::Internal.to_http_response("session closed").into_response()
        }
    }
}

/// `GET /status` — plain-text live session count.
pub async fn status(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    format!("total register device: {}", state.registry.size().await)
}

/// `GET /health` — liveness probe (ambient-stack addition).
pub async fn health(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "running".to_owned(),
        session_count: state.registry.size().await,
    })
}
