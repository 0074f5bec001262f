// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pooled Redis-backed implementation of [`Directory`].
//!
//! Mirrors the source's connection pool: a bounded set of connections,
//! retried (bounded, one second apart) on borrow, `PING`-tested before
//! reuse, with idle connections past a configurable age discarded rather
//! than returned to service. Retry only covers acquiring a connection — an
//! error from an already-borrowed connection is surfaced to the caller
//! without retrying the command.

use std::collections::VecDeque;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use tokio::sync::Mutex;

use super::{msg_key, offline_msg_key, Directory, RawMessage};
use crate::config::RedisConfig;

struct PooledConn {
    conn: MultiplexedConnection,
    last_used: Instant,
}

pub struct RedisDirectory {
    client: redis::Client,
    pool: Mutex<VecDeque<PooledConn>>,
    pool_size: usize,
    retry: u32,
    idle_timeout: Duration,
}

impl RedisDirectory {
    pub fn new(config: &RedisConfig) -> anyhow::Result<Self> {
        let url = if config.pass.is_empty() {
            format!("redis://{}/", config.addr)
        } else {
            format!("redis://:{}@{}/", config.pass, config.addr)
        };
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            pool: Mutex::new(VecDeque::new()),
            pool_size: config.pool_size,
            retry: config.retry,
            idle_timeout: config.idle_timeout(),
        })
    }

    async fn dial(&self) -> anyhow::Result<MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Borrow a connection, retrying connection *acquisition* (not command
    /// errors) up to `retry` times, sleeping one second between attempts.
    async fn acquire(&self) -> anyhow::Result<MultiplexedConnection> {
        let mut attempts_left = self.retry.max(1);
        loop {
            if let Some(conn) = self.try_pool().await {
                return Ok(conn);
            }
            match self.dial().await {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    attempts_left -= 1;
                    if attempts_left == 0 {
                        return Err(anyhow::anyhow!("failed to find a useful redis conn: {e}"));
                    }
                    tracing::info!(err = %e, "failed to get conn from pool, retrying");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    }

    /// Pop pooled connections until one survives an idle-timeout check and a
    /// `PING` test-on-borrow, or the pool is empty.
    async fn try_pool(&self) -> Option<MultiplexedConnection> {
        let mut pool = self.pool.lock().await;
        while let Some(pooled) = pool.pop_front() {
            if pooled.last_used.elapsed() > self.idle_timeout {
                continue;
            }
            let mut conn = pooled.conn;
            if redis::cmd("PING").query_async::<String>(&mut conn).await.is_ok() {
                return Some(conn);
            }
        }
        None
    }

    async fn release(&self, conn: MultiplexedConnection) {
        let mut pool = self.pool.lock().await;
        if pool.len() < self.pool_size {
            pool.push_back(PooledConn { conn, last_used: Instant::now() });
        }
    }
}

fn now_unix() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

/// Parse a `"<msgId>_<expireUnix>"` hash field.
fn parse_offline_field(field: &str) -> Option<(i64, i64)> {
    let (idx, expire) = field.split_once('_')?;
    Some((idx.parse().ok()?, expire.parse().ok()?))
}

/// Pick and order the offline-message hash fields to `HMGET`.
///
/// Keeps fields with `idx > since_msg_id` and `expire > now`, sorted
/// ascending by `idx`. Malformed fields are skipped rather than failing the
/// whole listing.
pub(crate) fn select_offline_fields(fields: &[String], since_msg_id: i64, now: i64) -> Vec<String> {
    let mut matched: Vec<(i64, &String)> = fields
        .iter()
        .filter_map(|field| {
            let (idx, expire) = match parse_offline_field(field) {
                Some(parsed) => parsed,
                None => {
                    tracing::warn!(field, "invalid offline-msg hash field, skipping");
                    return None;
                }
            };
            if idx > since_msg_id && expire > now {
                Some((idx, field))
            } else {
                None
            }
        })
        .collect();
    matched.sort_by_key(|(idx, _)| *idx);
    matched.into_iter().map(|(_, field)| field.clone()).collect()
}

#[async_trait]
impl Directory for RedisDirectory {
    async fn get_offline_msgs(
        &self,
        app_id: &str,
        reg_id: &str,
        since_msg_id: i64,
    ) -> anyhow::Result<Vec<RawMessage>> {
        let _ = reg_id; // reserved for future per-registration filtering
        let key = offline_msg_key(app_id);
        let mut conn = self.acquire().await?;
        let fields: Vec<String> = conn.hkeys(&key).await?;
        let selected = select_offline_fields(&fields, since_msg_id, now_unix());
        if selected.is_empty() {
            self.release(conn).await;
            return Ok(Vec::new());
        }

        let raw: Vec<Option<String>> = conn.hget(&key, &selected).await?;
        self.release(conn).await;

        let mut msgs = Vec::with_capacity(raw.len());
        for value in raw.into_iter().flatten() {
            match serde_json::from_str::<RawMessage>(&value) {
                Ok(msg) => msgs.push(msg),
                Err(e) => tracing::warn!(err = %e, "failed to decode offline raw msg, skipping"),
            }
        }
        Ok(msgs)
    }

    async fn get_raw_msg(&self, app_id: &str, msg_id: i64) -> anyhow::Result<Option<RawMessage>> {
        let key = msg_key(app_id);
        let mut conn = self.acquire().await?;
        let raw: Option<String> = conn.hget(&key, msg_id).await?;
        self.release(conn).await;
        match raw {
            Some(value) => Ok(Some(serde_json::from_str(&value)?)),
            None => Ok(None),
        }
    }

    async fn add_device(&self, server_name: &str, dev_id: &str) -> anyhow::Result<()> {
        let key = super::comet_key(server_name);
        let mut conn = self.acquire().await?;
        let _: i64 = conn.hset(&key, dev_id, "").await?;
        self.release(conn).await;
        Ok(())
    }

    async fn remove_device(&self, server_name: &str, dev_id: &str) -> anyhow::Result<()> {
        let key = super::comet_key(server_name);
        let mut conn = self.acquire().await?;
        let _: i64 = conn.hdel(&key, dev_id).await?;
        self.release(conn).await;
        Ok(())
    }

    async fn check_device(&self, dev_id: &str) -> anyhow::Result<Option<String>> {
        let mut conn = self.acquire().await?;
        let keys: Vec<String> = conn.keys("db_comet_*").await?;
        for key in keys {
            let exists: bool = conn.hexists(&key, dev_id).await?;
            if exists {
                self.release(conn).await;
                return Ok(key.strip_prefix("db_comet_").map(str::to_owned));
            }
        }
        self.release(conn).await;
        Ok(None)
    }

    async fn refresh_devices(&self, server_name: &str, timeout_secs: u64) -> anyhow::Result<()> {
        let key = super::comet_key(server_name);
        let mut conn = self.acquire().await?;
        let _: bool = conn.expire(&key, timeout_secs as i64).await?;
        self.release(conn).await;
        Ok(())
    }

    async fn init_devices(&self, server_name: &str) -> anyhow::Result<()> {
        let key = super::comet_key(server_name);
        let mut conn = self.acquire().await?;
        let _: i64 = conn.del(&key).await?;
        self.release(conn).await;
        Ok(())
    }

    async fn hash_get_all(&self, db: &str) -> anyhow::Result<Vec<String>> {
        let mut conn = self.acquire().await?;
        let out = conn.hgetall(db).await?;
        self.release(conn).await;
        Ok(out)
    }

    async fn hash_get(&self, db: &str, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let mut conn = self.acquire().await?;
        let out: Option<Vec<u8>> = conn.hget(db, key).await?;
        self.release(conn).await;
        Ok(out)
    }

    async fn hash_set(&self, db: &str, key: &str, val: &[u8]) -> anyhow::Result<i64> {
        let mut conn = self.acquire().await?;
        let out: i64 = conn.hset(db, key, val).await?;
        self.release(conn).await;
        Ok(out)
    }

    async fn hash_exists(&self, db: &str, key: &str) -> anyhow::Result<bool> {
        let mut conn = self.acquire().await?;
        let out: bool = conn.hexists(db, key).await?;
        self.release(conn).await;
        Ok(out)
    }

    async fn hash_set_not_exist(&self, db: &str, key: &str, val: &[u8]) -> anyhow::Result<bool> {
        let mut conn = self.acquire().await?;
        let out: bool = conn.hset_nx(db, key, val).await?;
        self.release(conn).await;
        Ok(out)
    }

    async fn hash_del(&self, db: &str, key: &str) -> anyhow::Result<i64> {
        let mut conn = self.acquire().await?;
        let out: i64 = conn.hdel(db, key).await?;
        self.release(conn).await;
        Ok(out)
    }

    async fn hash_incr_by(&self, db: &str, key: &str, val: i64) -> anyhow::Result<i64> {
        let mut conn = self.acquire().await?;
        let out: i64 = conn.hincr(db, key, val).await?;
        self.release(conn).await;
        Ok(out)
    }

    async fn set_not_exist(&self, key: &str, val: &[u8]) -> anyhow::Result<bool> {
        let mut conn = self.acquire().await?;
        let out: bool = conn.set_nx(key, val).await?;
        self.release(conn).await;
        Ok(out)
    }

    async fn incr_by(&self, key: &str, val: i64) -> anyhow::Result<i64> {
        let mut conn = self.acquire().await?;
        let out: i64 = conn.incr(key, val).await?;
        self.release(conn).await;
        Ok(out)
    }

    async fn set_add(&self, key: &str, val: &str) -> anyhow::Result<i64> {
        let mut conn = self.acquire().await?;
        let out: i64 = conn.sadd(key, val).await?;
        self.release(conn).await;
        Ok(out)
    }

    async fn set_del(&self, key: &str, val: &str) -> anyhow::Result<i64> {
        let mut conn = self.acquire().await?;
        let out: i64 = conn.srem(key, val).await?;
        self.release(conn).await;
        Ok(out)
    }

    async fn set_is_member(&self, key: &str, val: &str) -> anyhow::Result<bool> {
        let mut conn = self.acquire().await?;
        let out: bool = conn.sismember(key, val).await?;
        self.release(conn).await;
        Ok(out)
    }

    async fn set_members(&self, key: &str) -> anyhow::Result<Vec<String>> {
        let mut conn = self.acquire().await?;
        let out: Vec<String> = conn.smembers(key).await?;
        self.release(conn).await;
        Ok(out)
    }
}
