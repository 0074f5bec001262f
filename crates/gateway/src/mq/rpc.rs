// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The AMQP RPC consumer loop.
//!
//! Mirrors the source's `RpcServer`: a durable direct exchange, an
//! exclusive auto-delete server-named queue bound to it, manual ack, and a
//! reply published to the default exchange using the delivery's `reply_to`
//! and `correlation_id`. Unlike the source's HTTP path, the timeout branch
//! here and there both go through [`crate::session::await_reply`], so a
//! timed-out slot is always released.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, ExchangeDeclareOptions,
    QueueBindOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind};
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::config::AmqpConfig;
use crate::message::{MsgType, RpcReply, RpcRequest, RpcStatus};
use crate::registry::SessionRegistry;
use crate::session::{await_reply, AwaitError};

/// A broker connection that has completed its declare/bind phase and is
/// ready to consume deliveries.
pub struct RpcIngress {
    channel: Channel,
    consumer: Consumer,
}

/// Connect to the broker and declare the exchange/queue/binding, but do not
/// yet consume deliveries. Returns `Ok(None)` when no `uri` is configured —
/// AMQP is optional, unlike the HTTP front door.
///
/// A connect or declare failure here is surfaced to the caller rather than
/// logged and swallowed: `SPEC_FULL.md` §7 lists a startup-time AMQP
/// connect/declare failure as fatal, the same as a listener bind failure, so
/// this must run to completion (and be awaited with `?`) before the gateway
/// considers itself up.
pub async fn connect(config: &AmqpConfig) -> anyhow::Result<Option<RpcIngress>> {
    let Some(uri) = config.uri.as_deref() else {
        tracing::info!("amqp rpc ingress disabled, no broker uri configured");
        return Ok(None);
    };

    let conn = Connection::connect(uri, ConnectionProperties::default()).await?;
    let channel = conn.create_channel().await?;

    channel
        .exchange_declare(
            &config.exchange,
            ExchangeKind::Direct,
            ExchangeDeclareOptions { durable: true, ..Default::default() },
            FieldTable::default(),
        )
        .await?;

    let queue = channel
        .queue_declare(
            "",
            QueueDeclareOptions { exclusive: true, auto_delete: true, ..Default::default() },
            FieldTable::default(),
        )
        .await?;
    let queue_name = queue.name().as_str().to_owned();

    channel
        .queue_bind(
            &queue_name,
            &config.exchange,
            &config.binding_key,
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await?;

    let consumer = channel
        .basic_consume(&queue_name, "cometgw-rpc", BasicConsumeOptions::default(), FieldTable::default())
        .await?;

    tracing::info!(
        exchange = %config.exchange,
        queue = %queue_name,
        binding_key = %config.binding_key,
        "amqp rpc ingress listening"
    );

    Ok(Some(RpcIngress { channel, consumer }))
}

/// Drive the RPC consumer loop until `cancel` fires or the broker connection
/// drops. Call only on an [`RpcIngress`] returned by a successful [`connect`]
/// — the connect/declare phase is already done by this point, so a failure
/// here (an already-live broker connection dropping mid-run) is logged by
/// the caller and not retried; operators restart the node.
pub async fn serve(
    ingress: RpcIngress,
    registry: Arc<SessionRegistry>,
    request_timeout: Duration,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let RpcIngress { channel, mut consumer } = ingress;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("amqp rpc ingress shutting down");
                return Ok(());
            }
            next = consumer.next() => {
                let Some(delivery) = next else {
                    return Err(anyhow::anyhow!("amqp consumer stream closed"));
                };
                let delivery = delivery?;
                let channel = channel.clone();
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    handle_delivery(&channel, delivery, &registry, request_timeout).await;
                });
            }
        }
    }
}

async fn handle_delivery(
    channel: &Channel,
    delivery: lapin::message::Delivery,
    registry: &SessionRegistry,
    request_timeout: Duration,
) {
    let reply_to = delivery.properties.reply_to().clone();
    let correlation_id = delivery.properties.correlation_id().clone();

    // Ack immediately: the payload is small and the actual work is tracked
    // by the reply-not-sent state, not by the delivery. A crash after this
    // point loses the request; the caller owns its own retry through
    // `correlation_id` (at-most-once delivery).
    if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
        tracing::warn!(err = %e, "failed to ack rpc delivery");
    }

    let req = match serde_json::from_slice::<RpcRequest>(&delivery.data) {
        Ok(req) => req,
        Err(e) => {
            tracing::warn!(err = %e, "malformed rpc request, skipping");
            return;
        }
    };
    let reply = process_request(registry, req, request_timeout).await;

    let Some(reply_to) = reply_to else {
        tracing::warn!("rpc request had no reply_to, dropping reply");
        return;
    };

    let body = match serde_json::to_vec(&reply) {
        Ok(body) => body,
        Err(e) => {
            tracing::error!(err = %e, "failed to encode rpc reply");
            return;
        }
    };

    let mut props = BasicProperties::default().with_content_type("text/plain".into()).with_delivery_mode(1);
    if let Some(correlation_id) = correlation_id {
        props = props.with_correlation_id(correlation_id);
    }

    if let Err(e) = channel
        .basic_publish("", reply_to.as_str(), BasicPublishOptions::default(), &body, props)
        .await
    {
        tracing::error!(err = %e, "failed to publish rpc reply");
    }
}

async fn process_request(registry: &SessionRegistry, req: RpcRequest, request_timeout: Duration) -> RpcReply {
    let Some(session) = registry.get(&req.device_id).await else {
        return RpcReply::status(RpcStatus::NoDevice);
    };

    let (reply_tx, reply_rx) = oneshot::channel();
    let seq = session
        .send_message(MsgType::RouterCommand, Bytes::from(req.cmd.into_bytes()), Some(reply_tx))
        .await;

    match await_reply(&session, seq, reply_rx, request_timeout).await {
        Ok(msg) => RpcReply::ok(String::from_utf8_lossy(&msg.data).into_owned()),
        Err(AwaitError::Timeout) => RpcReply::status(RpcStatus::SendTimeout),
        Err(AwaitError::SessionClosed) => RpcReply::status(RpcStatus::Internal),
    }
}
