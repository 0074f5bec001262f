// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process-local table of live sessions, keyed by device id.
//!
//! The registry only owns the lookup entry, not the session's lifetime: a
//! session is inserted once its handshake completes and removed by its own
//! teardown path after [`crate::session::Session::close`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::session::Session;

/// Concurrent `DevId -> Session` map. All operations are O(1) expected and
/// safe under concurrent readers and writers.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self { sessions: RwLock::new(HashMap::new()) }
    }

    pub async fn put(&self, dev_id: impl Into<String>, session: Arc<Session>) {
        self.sessions.write().await.insert(dev_id.into(), session);
    }

    pub async fn get(&self, dev_id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(dev_id).cloned()
    }

    pub async fn remove(&self, dev_id: &str) -> Option<Arc<Session>> {
        self.sessions.write().await.remove(dev_id)
    }

    pub async fn size(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn check(&self, dev_id: &str) -> bool {
        self.sessions.read().await.contains_key(dev_id)
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
