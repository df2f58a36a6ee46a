//! Redis-backed cache store.
//!
//! One multiplexed connection is opened lazily and shared by all callers. Connection
//! failures surface as [`StoreError::Unavailable`] and drop the connection so the next
//! call reconnects. Bounded logs use `RPUSH` + `LTRIM` inside `MULTI`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::store::{CacheStore, StoreError, StoreInfo};

const BACKEND: &str = "redis";
const SCAN_BATCH: u64 = 500;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

pub struct RedisStore {
    client: Client,
    conn: Mutex<Option<MultiplexedConnection>>,
    db: i64,
    supports_patterns: bool,
}

impl RedisStore {
    /// Parse `url` without connecting; the first command opens the connection.
    pub fn open(url: &str) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(StoreError::protocol)?;
        let db = client.get_connection_info().redis.db;
        Ok(Self {
            client,
            conn: Mutex::new(None),
            db,
            supports_patterns: true,
        })
    }

    /// Refuse `SCAN`, for deployments where key enumeration is disallowed.
    pub fn without_pattern_support(mut self) -> Self {
        self.supports_patterns = false;
        self
    }

    async fn connection(&self) -> Result<MultiplexedConnection, StoreError> {
        let mut slot = self.conn.lock().await;
        if let Some(conn) = slot.as_ref() {
            return Ok(conn.clone());
        }

        let conn = tokio::time::timeout(
            CONNECT_TIMEOUT,
            self.client.get_multiplexed_async_connection(),
        )
        .await
        .map_err(|_| StoreError::Unavailable("connect timed out".to_string()))?
        .map_err(StoreError::unavailable)?;

        debug!(backend = BACKEND, db = self.db, "Redis connection established");
        *slot = Some(conn.clone());
        Ok(conn)
    }

    async fn map_error(&self, op: &'static str, err: RedisError) -> StoreError {
        if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
            warn!(op, error = %err, "Redis connection lost; reconnecting on next call");
            *self.conn.lock().await = None;
            StoreError::unavailable(err)
        } else {
            StoreError::protocol(err)
        }
    }
}

#[async_trait]
impl CacheStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let mut conn = self.connection().await?;
        let value: Option<Vec<u8>> = match conn.get(key).await {
            Ok(value) => value,
            Err(err) => return Err(self.map_error("get", err).await),
        };
        Ok(value.map(Bytes::from))
    }

    // Redis has no read that skips keyspace statistics.
    async fn peek(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        self.get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let result: Result<(), RedisError> = match ttl {
            // EX 0 is rejected by the server.
            Some(ttl) => conn.set_ex(key, value.as_ref(), ttl.as_secs().max(1)).await,
            None => conn.set(key, value.as_ref()).await,
        };
        match result {
            Ok(()) => Ok(()),
            Err(err) => Err(self.map_error("set", err).await),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.connection().await?;
        let removed: i64 = match conn.del(key).await {
            Ok(removed) => removed,
            Err(err) => return Err(self.map_error("delete", err).await),
        };
        Ok(removed > 0)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connection().await?;
        let removed: i64 = match conn.del(keys).await {
            Ok(removed) => removed,
            Err(err) => return Err(self.map_error("delete_many", err).await),
        };
        Ok(removed.max(0) as u64)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.connection().await?;
        let mut cursor: u64 = 0;
        let mut matched = Vec::new();

        loop {
            let page: Result<(u64, Vec<String>), RedisError> = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(SCAN_BATCH)
                .query_async(&mut conn)
                .await;
            let (next, batch) = match page {
                Ok(page) => page,
                Err(err) => return Err(self.map_error("keys", err).await),
            };

            matched.extend(batch);
            if next == 0 {
                break;
            }
            cursor = next;
        }

        // SCAN may return a key more than once.
        matched.sort();
        matched.dedup();
        Ok(matched)
    }

    fn supports_patterns(&self) -> bool {
        self.supports_patterns
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let mut conn = self.connection().await?;
        let remaining: i64 = match conn.ttl(key).await {
            Ok(remaining) => remaining,
            Err(err) => return Err(self.map_error("ttl", err).await),
        };
        // -1: no expiry, -2: missing key.
        Ok((remaining >= 0).then_some(remaining as u64))
    }

    async fn incr_counter(&self, name: &str) -> Result<i64, StoreError> {
        let mut conn = self.connection().await?;
        match conn.incr(name, 1_i64).await {
            Ok(value) => Ok(value),
            Err(err) => Err(self.map_error("incr_counter", err).await),
        }
    }

    async fn push_bounded(
        &self,
        key: &str,
        value: Bytes,
        capacity: usize,
    ) -> Result<(), StoreError> {
        if capacity == 0 {
            return self.delete(key).await.map(|_| ());
        }

        let mut conn = self.connection().await?;
        let keep = isize::try_from(capacity).unwrap_or(isize::MAX);
        let reply: Result<(), RedisError> = redis::pipe()
            .atomic()
            .rpush(key, value.as_ref())
            .ignore()
            .ltrim(key, -keep, -1)
            .ignore()
            .query_async(&mut conn)
            .await;
        match reply {
            Ok(()) => Ok(()),
            Err(err) => Err(self.map_error("push_bounded", err).await),
        }
    }

    async fn list(&self, key: &str) -> Result<Vec<Bytes>, StoreError> {
        let mut conn = self.connection().await?;
        let items: Vec<Vec<u8>> = match conn.lrange(key, 0, -1).await {
            Ok(items) => items,
            Err(err) => return Err(self.map_error("list", err).await),
        };
        Ok(items.into_iter().map(Bytes::from).collect())
    }

    async fn info(&self) -> Result<StoreInfo, StoreError> {
        let mut conn = self.connection().await?;
        let raw: Result<String, RedisError> = redis::cmd("INFO").query_async(&mut conn).await;
        match raw {
            Ok(raw) => Ok(parse_info(&raw, self.db)),
            Err(err) => Err(self.map_error("info", err).await),
        }
    }

    async fn reset_stats(&self) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        let reply: Result<(), RedisError> = redis::cmd("CONFIG")
            .arg("RESETSTAT")
            .query_async(&mut conn)
            .await;
        match reply {
            Ok(()) => Ok(()),
            Err(err) => Err(self.map_error("reset_stats", err).await),
        }
    }
}

/// Extract the fields we report from an `INFO` reply.
fn parse_info(raw: &str, db: i64) -> StoreInfo {
    let keyspace_field = format!("db{db}");
    let mut info = StoreInfo {
        backend: BACKEND.to_string(),
        ..StoreInfo::default()
    };

    for line in raw.lines() {
        let Some((field, value)) = line.trim().split_once(':') else {
            continue;
        };
        let number = || value.trim().parse::<u64>().unwrap_or(0);
        match field {
            "redis_version" => info.version = Some(value.trim().to_string()),
            "uptime_in_seconds" => info.uptime_seconds = number(),
            "connected_clients" => info.connected_clients = number(),
            "used_memory" => info.memory_bytes = number(),
            "used_memory_peak" => info.memory_peak_bytes = number(),
            "keyspace_hits" => info.hits = number(),
            "keyspace_misses" => info.misses = number(),
            "evicted_keys" => info.evicted_keys = number(),
            "expired_keys" => info.expired_keys = number(),
            field if field == keyspace_field => {
                // db0:keys=12,expires=3,avg_ttl=0
                info.keys_count = value
                    .split(',')
                    .find_map(|pair| pair.strip_prefix("keys="))
                    .and_then(|count| count.parse().ok())
                    .unwrap_or(0);
            }
            _ => {}
        }
    }

    info
}
