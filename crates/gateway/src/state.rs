// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared state handed to every axum handler.

use std::sync::Arc;
use std::time::Duration;

use crate::authz::AuthzPolicy;
use crate::directory::Directory;
use crate::registry::SessionRegistry;

/// Everything an ingress handler needs: the session registry it looks
/// devices up in, the directory store, the configured authz predicate, and
/// the per-request reply deadline.
///
/// `registry` is `Arc`-wrapped (rather than owned outright) because the
/// AMQP RPC ingress runs its consume loop on its own task and needs a
/// reference-counted handle to the same registry the HTTP router holds.
pub struct GatewayState {
    pub registry: Arc<SessionRegistry>,
    pub directory: Box<dyn Directory>,
    pub authz: Box<dyn AuthzPolicy>,
    pub request_timeout: Duration,
    /// This node's name, as recorded in the device directory
    /// (`db_comet_<server_name>`). Used by the startup/heartbeat tasks, not
    /// by the ingress handlers.
    pub server_name: String,
}

impl GatewayState {
    pub fn new(
        registry: Arc<SessionRegistry>,
        directory: Box<dyn Directory>,
        authz: Box<dyn AuthzPolicy>,
        request_timeout: Duration,
        server_name: impl Into<String>,
    ) -> Self {
        Self { registry, directory, authz, request_timeout, server_name: server_name.into() }
    }
}
