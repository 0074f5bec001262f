// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Integration tests for the comet gateway's HTTP ingress.
//!
//! Uses `axum_test::TestServer` — no real TCP needed — and an in-memory
//! [`MemoryDirectory`] fake so the suite never touches a live Redis
//! instance.

use std::sync::Arc;
use std::time::Duration;

use axum_test::TestServer;
use bytes::Bytes;

use cometgw::authz::{AllowAll, DenyAll};
use cometgw::directory::memory::MemoryDirectory;
use cometgw::message::{Message, MsgType};
use cometgw::registry::SessionRegistry;
use cometgw::session::Session;
use cometgw::state::GatewayState;
use cometgw::transport::build_router;

fn test_state(authz: Box<dyn cometgw::authz::AuthzPolicy>, timeout: Duration) -> Arc<GatewayState> {
    Arc::new(GatewayState::new(
        Arc::new(SessionRegistry::new()),
        Box::new(MemoryDirectory::new()),
        authz,
        timeout,
        "comet-test",
    ))
}

fn test_server(state: Arc<GatewayState>) -> TestServer {
    let router = build_router(state);
    TestServer::new(router).expect("failed to create test server")
}

/// Spawn a task that stands in for the session's I/O reader: it waits for
/// the first outbound frame and immediately delivers `reply` as a
/// `RESPONSE` carrying the same sequence.
fn spawn_mock_peer(session: Arc<Session>, mut rx: tokio::sync::mpsc::Receiver<cometgw::message::Frame>, reply: Bytes, delay: Duration) {
    tokio::spawn(async move {
        if let Some(frame) = rx.recv().await {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            session.deliver_response(Message::new(MsgType::Response, frame.seq, reply)).await;
        }
    });
}

#[tokio::test]
async fn http_happy_path_returns_peer_bytes() -> anyhow::Result<()> {
    let state = test_state(Box::new(AllowAll), Duration::from_secs(10));
    let (session, rx) = Session::new("abc");
    state.registry.put("abc", Arc::clone(&session)).await;
    spawn_mock_peer(session, rx, Bytes::from_static(b"pong"), Duration::from_millis(50));

    let server = test_server(state);
    let resp = server.post("/router/command?rid=abc&uid=u1").text("ping").await;
    resp.assert_status_ok();
    assert_eq!(resp.text(), "pong");
    Ok(())
}

#[tokio::test]
async fn http_offline_device_returns_status_one() -> anyhow::Result<()> {
    let state = test_state(Box::new(AllowAll), Duration::from_secs(10));
    let server = test_server(state);

    let resp = server.post("/router/command?rid=xyz&uid=u1").text("").await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], 1);
    assert_eq!(body["error"], "device (xyz) offline");
    Ok(())
}

#[tokio::test]
async fn http_timeout_releases_pending_slot() -> anyhow::Result<()> {
    let state = test_state(Box::new(AllowAll), Duration::from_millis(50));
    let (session, mut rx) = Session::new("abc");
    state.registry.put("abc", Arc::clone(&session)).await;
    // Mock peer receives the frame but never replies.
    tokio::spawn(async move {
        let _ = rx.recv().await;
    });

    let server = test_server(Arc::clone(&state));
    let resp = server.post("/router/command?rid=abc&uid=u1").text("ping").await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], 1);
    assert_eq!(body["error"], "recv response timeout");

    assert_eq!(session.pending_len().await, 0, "timed-out slot must not leak");
    Ok(())
}

#[tokio::test]
async fn http_missing_rid_or_uid_is_bad_request() -> anyhow::Result<()> {
    let state = test_state(Box::new(AllowAll), Duration::from_secs(10));
    let server = test_server(state);

    let resp = server.post("/router/command?uid=u1").text("").await;
    resp.assert_status_ok();
    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], 1);
    assert_eq!(body["error"], "rid and uid are required");
    Ok(())
}

#[tokio::test]
async fn http_deny_all_authz_rejects_every_request() -> anyhow::Result<()> {
    let state = test_state(Box::new(DenyAll), Duration::from_secs(10));
    let (session, _rx) = Session::new("abc");
    state.registry.put("abc", session).await;

    let server = test_server(state);
    let resp = server.post("/router/command?rid=abc&uid=u1").text("").await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], 1);
    assert_eq!(body["error"], "not authorized");
    Ok(())
}

#[tokio::test]
async fn diagnostic_command_roundtrips_plain_text() -> anyhow::Result<()> {
    let state = test_state(Box::new(AllowAll), Duration::from_secs(10));
    let (session, rx) = Session::new("abc");
    state.registry.put("abc", Arc::clone(&session)).await;
    spawn_mock_peer(session, rx, Bytes::from_static(b"pong"), Duration::ZERO);

    let server = test_server(state);
    let resp = server.get("/command?devid=abc&cmd=ping").await;
    resp.assert_status_ok();
    assert_eq!(resp.text(), "pong");
    Ok(())
}

#[tokio::test]
async fn status_reports_registered_device_count() -> anyhow::Result<()> {
    let state = test_state(Box::new(AllowAll), Duration::from_secs(10));
    let (s1, _rx1) = Session::new("dev-1");
    let (s2, _rx2) = Session::new("dev-2");
    state.registry.put("dev-1", s1).await;
    state.registry.put("dev-2", s2).await;

    let server = test_server(state);
    let resp = server.get("/status").await;
    resp.assert_status_ok();
    assert_eq!(resp.text(), "total register device: 2");
    Ok(())
}

#[tokio::test]
async fn health_reports_session_count() -> anyhow::Result<()> {
    let state = test_state(Box::new(AllowAll), Duration::from_secs(10));
    let (session, _rx) = Session::new("abc");
    state.registry.put("abc", session).await;

    let server = test_server(state);
    let resp = server.get("/health").await;
    resp.assert_status_ok();

    let body: serde_json::Value = resp.json();
    assert_eq!(body["status"], "running");
    assert_eq!(body["session_count"], 1);
    Ok(())
}
