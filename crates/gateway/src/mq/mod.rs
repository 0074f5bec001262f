// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! AMQP-based RPC ingress: a second front door onto the same session
//! multiplexer the HTTP ingress drives, for callers that speak AMQP RPC
//! instead of HTTP.

pub mod rpc;
