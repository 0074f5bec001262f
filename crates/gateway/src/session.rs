// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The request multiplexer: one [`Session`] per live device connection.
//!
//! A single writer owns the physical socket, so outbound frames are queued
//! on a bounded channel (`outbound_tx`) and drained by whatever I/O driver
//! owns the session's lifetime. Callers never block on socket I/O — they
//! register a one-shot reply channel in `pending` and wait on it with their
//! own deadline via [`await_reply`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::message::{Frame, Message, MsgType};
use crate::registry::SessionRegistry;

/// Bookkeeping for one outstanding request awaiting a matching `RESPONSE`.
struct PendingSlot {
    reply_tx: oneshot::Sender<Message>,
    #[allow(dead_code)] // kept for slot introspection; not read today
    op_type: MsgType,
}

/// One live device↔comet conversation and its multiplexer state.
///
/// `dev_id` is the cluster-unique device identifier this session speaks for.
/// `next_seq` hands out strictly increasing sequence numbers; rollover
/// within a session's lifetime is not expected.
pub struct Session {
    pub dev_id: String,
    next_seq: AtomicU32,
    outbound_tx: mpsc::Sender<Frame>,
    pending: Mutex<HashMap<u32, PendingSlot>>,
    cancel: CancellationToken,
    /// The registry this session was [`Session::open`]ed into, if any. Held
    /// weakly so the session never keeps its own registry alive; used by
    /// [`Session::close`] to remove itself, per §4.C's "then removes itself
    /// from the registry" contract. `None` for sessions built via
    /// [`Session::new`]/[`Session::with_capacity`] without a registry (the
    /// unit-test constructors).
    registry: Option<Weak<SessionRegistry>>,
}

/// Default bound on the session's outbound frame channel.
const OUTBOUND_CAPACITY: usize = 64;

impl Session {
    /// Create a new session and the receiving half of its outbound channel,
    /// without attaching it to a registry.
    ///
    /// The caller is the session's I/O driver: it owns `rx` (draining frames
    /// to the physical socket) and is responsible for feeding inbound
    /// `RESPONSE` frames into [`Session::deliver_response`]. Prefer
    /// [`Session::open`] for sessions that live in a [`SessionRegistry`] —
    /// `close()` on a session built here has no registry entry to remove.
    pub fn new(dev_id: impl Into<String>) -> (Arc<Session>, mpsc::Receiver<Frame>) {
        Self::with_capacity(dev_id, OUTBOUND_CAPACITY)
    }

    pub fn with_capacity(dev_id: impl Into<String>, capacity: usize) -> (Arc<Session>, mpsc::Receiver<Frame>) {
        let (outbound_tx, rx) = mpsc::channel(capacity);
        let session = Arc::new(Session {
            dev_id: dev_id.into(),
            next_seq: AtomicU32::new(1),
            outbound_tx,
            pending: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
            registry: None,
        });
        (session, rx)
    }

    /// Create a new session, register it in `registry` under `dev_id`, and
    /// return it — the "handshake completes" moment of §3/§4.B. The session
    /// remembers `registry` (weakly) so a later [`Session::close`] can
    /// remove its own entry without the caller threading a registry handle
    /// through every close call site.
    pub async fn open(
        dev_id: impl Into<String>,
        registry: &Arc<SessionRegistry>,
    ) -> (Arc<Session>, mpsc::Receiver<Frame>) {
        Self::open_with_capacity(dev_id, registry, OUTBOUND_CAPACITY).await
    }

    pub async fn open_with_capacity(
        dev_id: impl Into<String>,
        registry: &Arc<SessionRegistry>,
        capacity: usize,
    ) -> (Arc<Session>, mpsc::Receiver<Frame>) {
        let dev_id = dev_id.into();
        let (outbound_tx, rx) = mpsc::channel(capacity);
        let session = Arc::new(Session {
            dev_id: dev_id.clone(),
            next_seq: AtomicU32::new(1),
            outbound_tx,
            pending: Mutex::new(HashMap::new()),
            cancel: CancellationToken::new(),
            registry: Some(Arc::downgrade(registry)),
        });
        registry.put(dev_id, Arc::clone(&session)).await;
        (session, rx)
    }

    /// Allocate a sequence, enqueue the frame, and (if `reply_tx` is given)
    /// register a pending slot. Returns the assigned sequence so the caller
    /// can later call [`Session::msg_timeout`].
    ///
    /// Suspends only on the bounded outbound channel, never on socket I/O.
    pub async fn send_message(
        &self,
        msg_type: MsgType,
        data: impl Into<Bytes>,
        reply_tx: Option<oneshot::Sender<Message>>,
    ) -> u32 {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        if let Some(reply_tx) = reply_tx {
            self.pending.lock().await.insert(seq, PendingSlot { reply_tx, op_type: msg_type });
        }

        let frame = Frame { msg_type, seq, data: data.into() };
        if self.outbound_tx.send(frame).await.is_err() {
            tracing::debug!(
                dev_id = %self.dev_id, seq,
                "outbound channel closed, frame dropped"
            );
        }
        seq
    }

    /// Release a pending slot without delivering. Idempotent — a second
    /// call (or a call after `deliver_response` already removed the slot)
    /// is a no-op.
    pub async fn msg_timeout(&self, seq: u32) {
        self.pending.lock().await.remove(&seq);
    }

    /// Route an inbound `RESPONSE` frame to its waiting caller, if any.
    ///
    /// The send is non-blocking: if the caller already gave up (its receiver
    /// was dropped after a timeout raced `deliver_response`), the value is
    /// simply discarded. Unmatched responses — no registered slot — are
    /// logged and dropped; they never panic the reader.
    pub async fn deliver_response(&self, msg: Message) {
        let slot = self.pending.lock().await.remove(&msg.seq);
        match slot {
            Some(slot) => {
                let _ = slot.reply_tx.send(msg);
            }
            None => {
                tracing::warn!(
                    dev_id = %self.dev_id, seq = msg.seq,
                    "unmatched RESPONSE frame, dropping"
                );
            }
        }
    }

    /// Stop accepting new work, drain every pending slot, and remove this
    /// session's own entry from the registry it was [`Session::open`]ed
    /// into (a no-op for sessions built via [`Session::new`] with no
    /// registry attached).
    ///
    /// Dropping each `reply_tx` closes the paired receiver; a caller blocked
    /// in [`await_reply`] observes this as a "session closed" error rather
    /// than hanging forever.
    pub async fn close(&self) {
        self.cancel.cancel();
        {
            let mut pending = self.pending.lock().await;
            for (_, slot) in pending.drain() {
                drop(slot.reply_tx);
            }
        }
        if let Some(registry) = self.registry.as_ref().and_then(Weak::upgrade) {
            registry.remove(&self.dev_id).await;
        }
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    #[cfg(test)]
    pub(crate) async fn pending_len(&self) -> usize {
        self.pending.lock().await.len()
    }
}

/// Why [`await_reply`] did not receive a matching `RESPONSE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwaitError {
    /// The deadline elapsed first; the pending slot has been released.
    Timeout,
    /// The session tore down (or the slot was otherwise cancelled) before a
    /// reply arrived.
    SessionClosed,
}

/// Wait for `reply_rx` up to `deadline`, releasing the pending slot on
/// timeout so it never leaks.
///
/// This is the shared helper both ingress adapters use — the original HTTP
/// ingress forgot the `msg_timeout` call on its timeout path; this crate
/// makes that impossible by centralizing it here.
pub async fn await_reply(
    session: &Session,
    seq: u32,
    reply_rx: oneshot::Receiver<Message>,
    deadline: Duration,
) -> Result<Message, AwaitError> {
    match tokio::time::timeout(deadline, reply_rx).await {
        Ok(Ok(msg)) => Ok(msg),
        Ok(Err(_)) => Err(AwaitError::SessionClosed),
        Err(_) => {
            session.msg_timeout(seq).await;
            Err(AwaitError::Timeout)
        }
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
