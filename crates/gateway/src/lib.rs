// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Comet gateway: control-plane for a mobile push / remote-command
//! gateway. Ties an external caller's one-shot HTTP or AMQP request to an
//! in-flight message on a specific device's comet session, with timeouts,
//! sequence tracking, and a cluster-wide device-location directory.
//!
//! The client-to-comet TCP transport itself is out of scope for this
//! crate — sessions are modeled through [`session::Session`] and
//! [`message::OutboundSink`], and this binary exposes only the two ingress
//! adapters (HTTP and AMQP RPC) that dispatch through them.

pub mod authz;
pub mod config;
pub mod directory;
pub mod error;
pub mod message;
pub mod mq;
pub mod registry;
pub mod session;
pub mod state;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::config::GatewayConfig;
use crate::directory::redis::RedisDirectory;
use crate::directory::Directory;
use crate::registry::SessionRegistry;
use crate::state::GatewayState;
use crate::transport::build_router;

/// Interval between directory-roster TTL refreshes, keeping this node's
/// device roster alive so a silently-dead node's devices still age out.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// TTL applied to this node's roster on each heartbeat refresh.
const HEARTBEAT_TTL_SECS: u64 = 90;

/// Run the gateway until shutdown: bind the HTTP ingress, start the AMQP
/// RPC ingress (if configured), and begin the directory heartbeat.
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    let addr = format!("{}:{}", config.http.host, config.http.port);
    let shutdown = CancellationToken::new();

    let directory = RedisDirectory::new(&config.redis)?;
    directory.init_devices(&config.server_name).await?;

    let state = Arc::new(GatewayState::new(
        Arc::new(SessionRegistry::new()),
        Box::new(directory),
        authz::from_name(&config.authz_policy),
        config.request_timeout(),
        config.server_name.clone(),
    ));

    spawn_heartbeat(Arc::clone(&state), shutdown.clone());

    // Connect and declare the AMQP topology synchronously, the same way
    // `TcpListener::bind` below is awaited before the gateway considers
    // itself up: a bad `--amqp-uri` or broker outage at boot must abort
    // startup (exit 1), not leave the gateway silently running HTTP-only.
    if let Some(ingress) = mq::rpc::connect(&config.amqp).await? {
        spawn_amqp_ingress(ingress, Arc::clone(&state), shutdown.clone());
    }

    tracing::info!(%addr, server_name = %config.server_name, "comet gateway listening");
    let router = build_router(Arc::clone(&state));
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, router).with_graceful_shutdown(shutdown.cancelled_owned()).await?;

    Ok(())
}

/// Drive an already-connected AMQP RPC consumer loop on its own task
/// against the same session registry the HTTP router uses. The connect and
/// declare phase has already run (and already had the chance to abort
/// startup via `?` in [`run`]) by the time this is called; a broker that
/// drops mid-run is logged and not retried here — operators restart the
/// node, matching the listener-bind fatality model for the other ingress.
fn spawn_amqp_ingress(ingress: mq::rpc::RpcIngress, state: Arc<GatewayState>, cancel: CancellationToken) {
    tokio::spawn(async move {
        if let Err(e) = mq::rpc::serve(ingress, Arc::clone(&state.registry), state.request_timeout, cancel).await {
            tracing::error!(err = %e, "amqp rpc ingress terminated");
        }
    });
}

/// Periodically refresh this node's directory roster TTL so the device
/// directory does not treat a live node as dead.
fn spawn_heartbeat(state: Arc<GatewayState>, cancel: CancellationToken) {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(HEARTBEAT_INTERVAL) => {
                    if let Err(e) = state.directory.refresh_devices(&state.server_name, HEARTBEAT_TTL_SECS).await {
                        tracing::warn!(err = %e, "failed to refresh directory roster TTL");
                    }
                }
            }
        }
    });
}
