// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Cluster-wide device-location directory and offline-message store.
//!
//! This is the one piece of the gateway that must survive a process
//! restart and be visible to every comet node, so it is expressed as an
//! async trait ([`Directory`]) over a pluggable backend rather than
//! in-process state. [`redis`] is the canonical backend; [`memory`] is an
//! in-process fake used by tests and by the HTTP-ingress integration suite.

pub mod memory;
pub mod redis;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Hash key holding one comet node's device roster: `db_comet_<serverName>`.
pub fn comet_key(server_name: &str) -> String {
    format!("db_comet_{server_name}")
}

/// Hash key holding one app's pending offline messages: `db_offline_msg_<appId>`.
pub fn offline_msg_key(app_id: &str) -> String {
    format!("db_offline_msg_{app_id}")
}

/// Hash key holding one app's durable message log: `db_msg_<appId>`.
pub fn msg_key(app_id: &str) -> String {
    format!("db_msg_{app_id}")
}

/// A stored push message, versioned by `msg_id`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    #[serde(rename = "appsec", skip_serializing_if = "String::is_empty", default)]
    pub app_sec: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub token: String,
    pub msg_id: i64,
    pub app_id: String,
    pub pkg: String,
    pub ctime: i64,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub platform: String,
    pub msg_type: i32,
    pub push_type: i32,
    pub push_params: PushParams,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub content: String,
    #[serde(default)]
    pub notification: Notification,
    #[serde(default)]
    pub options: MessageOptions,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PushParams {
    #[serde(rename = "regid", skip_serializing_if = "Vec::is_empty", default)]
    pub reg_id: Vec<String>,
    #[serde(rename = "userid", skip_serializing_if = "Vec::is_empty", default)]
    pub user_id: Vec<String>,
    #[serde(rename = "devid", skip_serializing_if = "Vec::is_empty", default)]
    pub dev_id: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub topic: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub r#type: i32,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub sound_uri: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub action: Option<i32>,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub intent_uri: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub web_uri: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MessageOptions {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ttl: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tts: Option<i64>,
}

/// Storage contract the gateway needs from the directory/offline-message
/// backend. All operations are idempotent where the backend permits it.
#[async_trait]
pub trait Directory: Send + Sync {
    async fn get_offline_msgs(
        &self,
        app_id: &str,
        reg_id: &str,
        since_msg_id: i64,
    ) -> anyhow::Result<Vec<RawMessage>>;

    async fn get_raw_msg(&self, app_id: &str, msg_id: i64) -> anyhow::Result<Option<RawMessage>>;

    async fn add_device(&self, server_name: &str, dev_id: &str) -> anyhow::Result<()>;

    async fn remove_device(&self, server_name: &str, dev_id: &str) -> anyhow::Result<()>;

    /// Returns the server currently owning `dev_id`, or `None` if absent.
    /// Implementations scan all per-server rosters; if a device is wrongly
    /// present in more than one (a lifecycle bug elsewhere), the first match
    /// wins.
    async fn check_device(&self, dev_id: &str) -> anyhow::Result<Option<String>>;

    async fn refresh_devices(&self, server_name: &str, timeout_secs: u64) -> anyhow::Result<()>;

    async fn init_devices(&self, server_name: &str) -> anyhow::Result<()>;

    async fn hash_get_all(&self, db: &str) -> anyhow::Result<Vec<String>>;
    async fn hash_get(&self, db: &str, key: &str) -> anyhow::Result<Option<Vec<u8>>>;
    async fn hash_set(&self, db: &str, key: &str, val: &[u8]) -> anyhow::Result<i64>;
    async fn hash_exists(&self, db: &str, key: &str) -> anyhow::Result<bool>;
    async fn hash_set_not_exist(&self, db: &str, key: &str, val: &[u8]) -> anyhow::Result<bool>;
    async fn hash_del(&self, db: &str, key: &str) -> anyhow::Result<i64>;
    async fn hash_incr_by(&self, db: &str, key: &str, val: i64) -> anyhow::Result<i64>;

    async fn set_not_exist(&self, key: &str, val: &[u8]) -> anyhow::Result<bool>;
    async fn incr_by(&self, key: &str, val: i64) -> anyhow::Result<i64>;

    async fn set_add(&self, key: &str, val: &str) -> anyhow::Result<i64>;
    async fn set_del(&self, key: &str, val: &str) -> anyhow::Result<i64>;
    async fn set_is_member(&self, key: &str, val: &str) -> anyhow::Result<bool>;
    async fn set_members(&self, key: &str) -> anyhow::Result<Vec<String>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_message_json_round_trips() {
        let msg = RawMessage {
            app_sec: "sec".into(),
            token: String::new(),
            msg_id: 42,
            app_id: "app1".into(),
            pkg: "com.example.app".into(),
            ctime: 1_700_000_000,
            platform: "android".into(),
            msg_type: 1,
            push_type: 2,
            push_params: PushParams {
                reg_id: vec!["r1".into()],
                user_id: vec![],
                dev_id: vec!["d1".into()],
                topic: String::new(),
            },
            content: "hello".into(),
            notification: Notification {
                title: "Hi".into(),
                desc: "there".into(),
                r#type: 1,
                ..Default::default()
            },
            options: MessageOptions { ttl: Some(3600), tts: None },
        };

        let encoded = serde_json::to_string(&msg).expect("encode");
        let decoded: RawMessage = serde_json::from_str(&encoded).expect("decode");
        assert_eq!(msg, decoded);
    }

    #[test]
    fn key_schema_matches_spec() {
        assert_eq!(comet_key("comet-1"), "db_comet_comet-1");
        assert_eq!(offline_msg_key("app1"), "db_offline_msg_app1");
        assert_eq!(msg_key("app1"), "db_msg_app1");
    }
}
