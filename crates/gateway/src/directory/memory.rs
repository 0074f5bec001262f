// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process [`Directory`] fake backed by a single mutex-guarded map.
//!
//! Used by the HTTP/AMQP ingress test suites so they can exercise routing
//! and offline-message behavior without a live Redis instance.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{Directory, RawMessage};

#[derive(Default)]
struct State {
    comets: HashMap<String, Vec<String>>,
    offline: HashMap<String, Vec<RawMessage>>,
    raw_msgs: HashMap<(String, i64), RawMessage>,
    hashes: HashMap<String, HashMap<String, Vec<u8>>>,
    strings: HashMap<String, Vec<u8>>,
    sets: HashMap<String, Vec<String>>,
}

/// In-memory stand-in for a Redis-backed directory. Not cluster-aware: each
/// process has its own state, which is exactly what makes it suitable for
/// tests.
#[derive(Default)]
pub struct MemoryDirectory {
    state: Mutex<State>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an offline message for a given app, as a test fixture would.
    pub async fn push_offline(&self, app_id: &str, msg: RawMessage) {
        let mut state = self.state.lock().await;
        state.offline.entry(app_id.to_owned()).or_default().push(msg);
    }
}

#[async_trait]
impl Directory for MemoryDirectory {
    async fn get_offline_msgs(
        &self,
        app_id: &str,
        _reg_id: &str,
        since_msg_id: i64,
    ) -> anyhow::Result<Vec<RawMessage>> {
        let state = self.state.lock().await;
        let mut msgs: Vec<RawMessage> = state
            .offline
            .get(app_id)
            .map(|all| all.iter().filter(|m| m.msg_id > since_msg_id).cloned().collect())
            .unwrap_or_default();
        msgs.sort_by_key(|m| m.msg_id);
        Ok(msgs)
    }

    async fn get_raw_msg(&self, app_id: &str, msg_id: i64) -> anyhow::Result<Option<RawMessage>> {
        let state = self.state.lock().await;
        Ok(state.raw_msgs.get(&(app_id.to_owned(), msg_id)).cloned())
    }

    async fn add_device(&self, server_name: &str, dev_id: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        let roster = state.comets.entry(server_name.to_owned()).or_default();
        if !roster.iter().any(|d| d == dev_id) {
            roster.push(dev_id.to_owned());
        }
        Ok(())
    }

    async fn remove_device(&self, server_name: &str, dev_id: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        if let Some(roster) = state.comets.get_mut(server_name) {
            roster.retain(|d| d != dev_id);
        }
        Ok(())
    }

    async fn check_device(&self, dev_id: &str) -> anyhow::Result<Option<String>> {
        let state = self.state.lock().await;
        for (server, roster) in &state.comets {
            if roster.iter().any(|d| d == dev_id) {
                return Ok(Some(server.clone()));
            }
        }
        Ok(None)
    }

    async fn refresh_devices(&self, _server_name: &str, _timeout_secs: u64) -> anyhow::Result<()> {
        Ok(())
    }

    async fn init_devices(&self, server_name: &str) -> anyhow::Result<()> {
        let mut state = self.state.lock().await;
        state.comets.remove(server_name);
        Ok(())
    }

    async fn hash_get_all(&self, db: &str) -> anyhow::Result<Vec<String>> {
        let state = self.state.lock().await;
        let mut out = Vec::new();
        if let Some(fields) = state.hashes.get(db) {
            for (k, v) in fields {
                out.push(k.clone());
                out.push(String::from_utf8_lossy(v).into_owned());
            }
        }
        Ok(out)
    }

    async fn hash_get(&self, db: &str, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let state = self.state.lock().await;
        Ok(state.hashes.get(db).and_then(|h| h.get(key)).cloned())
    }

    async fn hash_set(&self, db: &str, key: &str, val: &[u8]) -> anyhow::Result<i64> {
        let mut state = self.state.lock().await;
        let hash = state.hashes.entry(db.to_owned()).or_default();
        let is_new = hash.insert(key.to_owned(), val.to_vec()).is_none();
        Ok(is_new as i64)
    }

    async fn hash_exists(&self, db: &str, key: &str) -> anyhow::Result<bool> {
        let state = self.state.lock().await;
        Ok(state.hashes.get(db).is_some_and(|h| h.contains_key(key)))
    }

    async fn hash_set_not_exist(&self, db: &str, key: &str, val: &[u8]) -> anyhow::Result<bool> {
        let mut state = self.state.lock().await;
        let hash = state.hashes.entry(db.to_owned()).or_default();
        if hash.contains_key(key) {
            Ok(false)
        } else {
            hash.insert(key.to_owned(), val.to_vec());
            Ok(true)
        }
    }

    async fn hash_del(&self, db: &str, key: &str) -> anyhow::Result<i64> {
        let mut state = self.state.lock().await;
        let removed = state.hashes.get_mut(db).and_then(|h| h.remove(key)).is_some();
        Ok(removed as i64)
    }

    async fn hash_incr_by(&self, db: &str, key: &str, val: i64) -> anyhow::Result<i64> {
        let mut state = self.state.lock().await;
        let hash = state.hashes.entry(db.to_owned()).or_default();
        let current: i64 = hash
            .get(key)
            .map(|v| String::from_utf8_lossy(v).parse().unwrap_or(0))
            .unwrap_or(0);
        let next = current + val;
        hash.insert(key.to_owned(), next.to_string().into_bytes());
        Ok(next)
    }

    async fn set_not_exist(&self, key: &str, val: &[u8]) -> anyhow::Result<bool> {
        let mut state = self.state.lock().await;
        if state.strings.contains_key(key) {
            Ok(false)
        } else {
            state.strings.insert(key.to_owned(), val.to_vec());
            Ok(true)
        }
    }

    async fn incr_by(&self, key: &str, val: i64) -> anyhow::Result<i64> {
        let mut state = self.state.lock().await;
        let current: i64 = state
            .strings
            .get(key)
            .map(|v| String::from_utf8_lossy(v).parse().unwrap_or(0))
            .unwrap_or(0);
        let next = current + val;
        state.strings.insert(key.to_owned(), next.to_string().into_bytes());
        Ok(next)
    }

    async fn set_add(&self, key: &str, val: &str) -> anyhow::Result<i64> {
        let mut state = self.state.lock().await;
        let set = state.sets.entry(key.to_owned()).or_default();
        if set.iter().any(|m| m == val) {
            Ok(0)
        } else {
            set.push(val.to_owned());
            Ok(1)
        }
    }

    async fn set_del(&self, key: &str, val: &str) -> anyhow::Result<i64> {
        let mut state = self.state.lock().await;
        if let Some(set) = state.sets.get_mut(key) {
            let before = set.len();
            set.retain(|m| m != val);
            return Ok((before - set.len()) as i64);
        }
        Ok(0)
    }

    async fn set_is_member(&self, key: &str, val: &str) -> anyhow::Result<bool> {
        let state = self.state.lock().await;
        Ok(state.sets.get(key).is_some_and(|s| s.iter().any(|m| m == val)))
    }

    async fn set_members(&self, key: &str) -> anyhow::Result<Vec<String>> {
        let state = self.state.lock().await;
        Ok(state.sets.get(key).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_then_check_device_reports_owning_server() {
        let dir = MemoryDirectory::new();
        dir.add_device("comet-1", "dev-1").await.expect("add");
        assert_eq!(dir.check_device("dev-1").await.expect("check"), Some("comet-1".to_owned()));
        assert_eq!(dir.check_device("dev-2").await.expect("check"), None);
    }

    #[tokio::test]
    async fn remove_device_clears_ownership() {
        let dir = MemoryDirectory::new();
        dir.add_device("comet-1", "dev-1").await.expect("add");
        dir.remove_device("comet-1", "dev-1").await.expect("remove");
        assert_eq!(dir.check_device("dev-1").await.expect("check"), None);
    }

    #[tokio::test]
    async fn offline_msgs_filtered_by_since_id_and_sorted() {
        let dir = MemoryDirectory::new();
        dir.push_offline("app1", RawMessage { msg_id: 3, ..Default::default() }).await;
        dir.push_offline("app1", RawMessage { msg_id: 1, ..Default::default() }).await;
        dir.push_offline("app1", RawMessage { msg_id: 2, ..Default::default() }).await;

        let msgs = dir.get_offline_msgs("app1", "", 1).await.expect("offline msgs");
        let ids: Vec<i64> = msgs.iter().map(|m| m.msg_id).collect();
        assert_eq!(ids, vec![2, 3]);
    }

    #[tokio::test]
    async fn hash_set_not_exist_only_succeeds_once() {
        let dir = MemoryDirectory::new();
        assert!(dir.hash_set_not_exist("db", "k", b"v1").await.expect("first"));
        assert!(!dir.hash_set_not_exist("db", "k", b"v2").await.expect("second"));
        assert_eq!(dir.hash_get("db", "k").await.expect("get"), Some(b"v1".to_vec()));
    }
}
