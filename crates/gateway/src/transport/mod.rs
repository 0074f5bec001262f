// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP ingress for the comet gateway: the command endpoint and a couple
//! of diagnostic routes.

pub mod http;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::state::GatewayState;

/// Build the axum `Router` with all gateway HTTP routes.
pub fn build_router(state: Arc<GatewayState>) -> Router {
    Router::new()
        .route("/router/command", post(http::command))
        .route("/command", get(http::command_diagnostic))
        .route("/status", get(http::status))
        .route("/health", get(http::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
