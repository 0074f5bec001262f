// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::message::MsgType;
use std::time::Duration;
use tokio::sync::oneshot;

#[tokio::test]
async fn send_message_assigns_increasing_sequences() {
    let (session, mut rx) = Session::new("dev-1");

    let seq1 = session.send_message(MsgType::Request, Bytes::from_static(b"a"), None).await;
    let seq2 = session.send_message(MsgType::Request, Bytes::from_static(b"b"), None).await;
    assert!(seq2 > seq1);

    let frame1 = rx.recv().await.expect("frame1");
    let frame2 = rx.recv().await.expect("frame2");
    assert_eq!(frame1.seq, seq1);
    assert_eq!(frame2.seq, seq2);
}

#[tokio::test]
async fn deliver_response_resolves_pending_reply() {
    let (session, mut rx) = Session::new("dev-1");
    let (reply_tx, reply_rx) = oneshot::channel();

    let seq = session.send_message(MsgType::Request, Bytes::from_static(b"ping"), Some(reply_tx)).await;
    let _ = rx.recv().await.expect("frame");
    assert_eq!(session.pending_len().await, 1);

    session.deliver_response(Message::new(MsgType::Response, seq, Bytes::from_static(b"pong"))).await;

    let msg = reply_rx.await.expect("reply delivered");
    assert_eq!(msg.seq, seq);
    assert_eq!(&msg.data[..], b"pong");
    assert_eq!(session.pending_len().await, 0);
}

#[tokio::test]
async fn unmatched_response_is_dropped_silently() {
    let (session, _rx) = Session::new("dev-1");
    // No send_message call registered seq 42 — deliver_response must not panic.
    session.deliver_response(Message::new(MsgType::Response, 42, Bytes::new())).await;
    assert_eq!(session.pending_len().await, 0);
}

#[tokio::test]
async fn msg_timeout_is_idempotent() {
    let (session, _rx) = Session::new("dev-1");
    let (reply_tx, _reply_rx) = oneshot::channel();
    let seq = session.send_message(MsgType::Request, Bytes::new(), Some(reply_tx)).await;

    session.msg_timeout(seq).await;
    assert_eq!(session.pending_len().await, 0);
    session.msg_timeout(seq).await; // second call is a no-op, not an error
    assert_eq!(session.pending_len().await, 0);
}

#[tokio::test]
async fn response_after_timeout_is_dropped_not_double_delivered() {
    let (session, _rx) = Session::new("dev-1");
    let (reply_tx, reply_rx) = oneshot::channel();
    let seq = session.send_message(MsgType::Request, Bytes::new(), Some(reply_tx)).await;

    session.msg_timeout(seq).await;
    // Late RESPONSE for the now-cancelled slot must not resurrect it.
    session.deliver_response(Message::new(MsgType::Response, seq, Bytes::from_static(b"late"))).await;

    drop(session);
    assert!(reply_rx.await.is_err());
}

#[tokio::test]
async fn close_drains_pending_with_closed_signal() {
    let (session, _rx) = Session::new("dev-1");
    let (reply_tx, reply_rx) = oneshot::channel();
    let _seq = session.send_message(MsgType::Request, Bytes::new(), Some(reply_tx)).await;

    session.close().await;

    assert!(session.is_closed());
    assert_eq!(session.pending_len().await, 0);
    assert!(reply_rx.await.is_err(), "caller should observe a closed reply channel");
}

#[tokio::test]
async fn close_removes_session_opened_into_a_registry() {
    let registry = Arc::new(SessionRegistry::new());
    let (session, _rx) = Session::open("dev-1", &registry).await;
    assert_eq!(registry.size().await, 1);

    session.close().await;

    assert_eq!(registry.size().await, 0, "close() must remove its own registry entry");
    assert!(registry.get("dev-1").await.is_none());
}

#[tokio::test]
async fn close_on_a_registry_less_session_is_a_no_op_beyond_draining() {
    // Session::new attaches no registry; close() must not panic trying to
    // deregister, it simply has nothing to remove.
    let (session, _rx) = Session::new("dev-1");
    session.close().await;
    assert!(session.is_closed());
}

#[tokio::test]
async fn await_reply_delivers_matching_response() {
    let (session, mut rx) = Session::new("dev-1");
    let (reply_tx, reply_rx) = oneshot::channel();
    let seq = session.send_message(MsgType::Request, Bytes::new(), Some(reply_tx)).await;
    let _ = rx.recv().await;

    session.deliver_response(Message::new(MsgType::Response, seq, Bytes::from_static(b"ok"))).await;

    let result = await_reply(&session, seq, reply_rx, Duration::from_secs(5)).await;
    assert!(matches!(result, Ok(msg) if &msg.data[..] == b"ok"));
}

#[tokio::test]
async fn await_reply_times_out_and_releases_slot() {
    let (session, mut rx) = Session::new("dev-1");
    let (reply_tx, reply_rx) = oneshot::channel();
    let seq = session.send_message(MsgType::Request, Bytes::new(), Some(reply_tx)).await;
    let _ = rx.recv().await;

    let result = await_reply(&session, seq, reply_rx, Duration::from_millis(20)).await;
    assert!(matches!(result, Err(AwaitError::Timeout)));
    assert_eq!(session.pending_len().await, 0);
}
