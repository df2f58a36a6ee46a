//! Cache storage contract.
//!
//! The store owns every entry and is authoritative for expiry. Single-key operations
//! must be atomic; nothing here promises atomicity across keys.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("cache store unavailable: {0}")]
    Unavailable(String),
    #[error("cache store protocol error: {0}")]
    Protocol(String),
    #[error("cache store does not support {0}")]
    Unsupported(&'static str),
}

impl StoreError {
    pub fn unavailable(err: impl std::fmt::Display) -> Self {
        Self::Unavailable(err.to_string())
    }

    pub fn protocol(err: impl std::fmt::Display) -> Self {
        Self::Protocol(err.to_string())
    }
}

/// Raw server statistics, as reported by `INFO` or its in-process equivalent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreInfo {
    pub backend: String,
    pub version: Option<String>,
    pub hits: u64,
    pub misses: u64,
    pub memory_bytes: u64,
    pub memory_peak_bytes: u64,
    pub uptime_seconds: u64,
    pub connected_clients: u64,
    pub keys_count: u64,
    pub evicted_keys: u64,
    pub expired_keys: u64,
}

#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a value; counts towards the hit/miss statistics.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Read bookkeeping values (counters, logs, metadata) without counting a keyspace
    /// hit or miss where the backend allows it. Redis counts every read.
    async fn peek(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Store `value` under `key`. `ttl` of `None` keeps the entry until deleted.
    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), StoreError>;

    /// Returns whether the key existed.
    async fn delete(&self, key: &str) -> Result<bool, StoreError>;

    /// Returns how many of `keys` existed.
    async fn delete_many(&self, keys: &[String]) -> Result<u64, StoreError>;

    /// Enumerate keys matching a glob pattern (`*`, `?`).
    ///
    /// Only meaningful when [`CacheStore::supports_patterns`] is true; otherwise
    /// implementations return [`StoreError::Unsupported`].
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    fn supports_patterns(&self) -> bool;

    /// Remaining lifetime; `None` when the key is absent or never expires.
    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError>;

    /// Atomically increment an integer counter, creating it at zero.
    async fn incr_counter(&self, name: &str) -> Result<i64, StoreError>;

    /// Atomically append `value` to the list at `key`, keeping only the newest
    /// `capacity` items.
    async fn push_bounded(&self, key: &str, value: Bytes, capacity: usize)
    -> Result<(), StoreError>;

    /// Items of the list at `key`, oldest first; empty when absent. Stats-neutral like
    /// [`CacheStore::peek`].
    async fn list(&self, key: &str) -> Result<Vec<Bytes>, StoreError>;

    async fn info(&self) -> Result<StoreInfo, StoreError>;

    /// Reset the raw hit/miss statistics.
    async fn reset_stats(&self) -> Result<(), StoreError>;
}
