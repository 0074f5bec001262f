// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire-level message types shared by the session multiplexer and both
//! ingress adapters.
//!
//! The client-to-comet transport itself is out of scope for this crate —
//! [`Message`] models the framed unit that a real transport would
//! serialize/deserialize, and [`OutboundSink`] is the seam a concrete
//! transport implementation plugs into.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Frame type tag. `Heartbeat` and `Auth` are session-management frames the
/// multiplexer never waits on; only `Request`/`RouterCommand` go out with a
/// reply slot, and only `Response` is ever delivered into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MsgType {
    Request,
    Response,
    RouterCommand,
    Heartbeat,
    Auth,
}

/// A framed unit on the client↔comet wire: `{Type, Seq, Data}`.
///
/// `seq` is `0` for unsolicited frames; otherwise it is the sequence
/// assigned by [`crate::session::Session::send_message`] at send time.
#[derive(Debug, Clone)]
pub struct Message {
    pub msg_type: MsgType,
    pub seq: u32,
    pub data: Bytes,
}

impl Message {
    pub fn new(msg_type: MsgType, seq: u32, data: impl Into<Bytes>) -> Self {
        Self { msg_type, seq, data: data.into() }
    }
}

/// Outbound frame queued for the session's single writer task.
#[derive(Debug, Clone)]
pub struct Frame {
    pub msg_type: MsgType,
    pub seq: u32,
    pub data: Bytes,
}

/// The write half of a session's transport.
///
/// A real implementation serializes `Frame` onto the client TCP socket; this
/// crate only depends on the trait, which lets the multiplexer and ingress
/// adapters be exercised in tests against an in-memory sink.
#[async_trait]
pub trait OutboundSink: Send + Sync {
    async fn send(&self, frame: Frame) -> std::io::Result<()>;
}

/// Command envelope carried as the payload of an HTTP-originated `REQUEST`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub uid: String,
    pub cmd: String,
}

/// Request envelope delivered on the AMQP control queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcRequest {
    #[serde(rename = "DeviceId")]
    pub device_id: String,
    #[serde(rename = "Cmd")]
    pub cmd: String,
}

/// Status codes carried in the AMQP reply envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize_repr, Deserialize_repr)]
#[repr(i32)]
pub enum RpcStatus {
    Ok = 0,
    NoDevice = 1,
    SendTimeout = 2,
    Internal = 3,
}

/// Reply envelope published back to the caller's `ReplyTo` queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcReply {
    #[serde(rename = "Status")]
    pub status: RpcStatus,
    #[serde(rename = "Result", skip_serializing_if = "String::is_empty", default)]
    pub result: String,
}

impl RpcReply {
    pub fn status(status: RpcStatus) -> Self {
        Self { status, result: String::new() }
    }

    pub fn ok(result: impl Into<String>) -> Self {
        Self { status: RpcStatus::Ok, result: result.into() }
    }
}
