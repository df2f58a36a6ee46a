//! In-process cache store.
//!
//! LRU-bounded map with lazy TTL expiry and Redis-style keyspace statistics. Used in
//! development, in tests, and as a fallback when no Redis server is configured.

use std::collections::VecDeque;
use std::num::NonZeroUsize;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;

use super::lock::{rw_read, rw_write};
use super::store::{CacheStore, StoreError, StoreInfo};

const SOURCE: &str = "cache::memory";
const BACKEND: &str = "memory";
const DEFAULT_MAX_ENTRIES: usize = 10_000;

type Entries = LruCache<String, StoredEntry>;

enum StoredValue {
    Bytes(Bytes),
    List(VecDeque<Bytes>),
}

impl StoredValue {
    fn len(&self) -> usize {
        match self {
            Self::Bytes(value) => value.len(),
            Self::List(items) => items.iter().map(Bytes::len).sum(),
        }
    }
}

struct StoredEntry {
    value: StoredValue,
    expires_at: Option<Instant>,
}

impl StoredEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|deadline| now >= deadline)
    }

    fn footprint(&self, key: &str) -> u64 {
        (key.len() + self.value.len()) as u64
    }
}

fn wrong_type(key: &str) -> StoreError {
    StoreError::Protocol(format!("value at `{key}` has the wrong type"))
}

#[derive(Default)]
struct KeyspaceStats {
    hits: AtomicU64,
    misses: AtomicU64,
    evicted: AtomicU64,
    expired: AtomicU64,
    used_bytes: AtomicU64,
    peak_bytes: AtomicU64,
}

pub struct MemoryStore {
    entries: RwLock<Entries>,
    stats: KeyspaceStats,
    supports_patterns: bool,
    started_at: Instant,
}

impl MemoryStore {
    pub fn new(max_entries: NonZeroUsize) -> Self {
        Self {
            entries: RwLock::new(LruCache::new(max_entries)),
            stats: KeyspaceStats::default(),
            supports_patterns: true,
            started_at: Instant::now(),
        }
    }

    /// Disable key enumeration, mimicking backends without `KEYS`/`SCAN`.
    pub fn without_pattern_support(mut self) -> Self {
        self.supports_patterns = false;
        self
    }

    /// Insert under an already-held write guard so read-modify-write callers stay atomic.
    fn insert(&self, entries: &mut Entries, key: &str, entry: StoredEntry) {
        let added = entry.footprint(key);
        if let Some((displaced, old)) = entries.push(key.to_string(), entry) {
            self.release(&displaced, &old);
            if displaced != key {
                self.stats.evicted.fetch_add(1, Ordering::Relaxed);
            }
        }

        let used = self.stats.used_bytes.fetch_add(added, Ordering::Relaxed) + added;
        self.stats.peak_bytes.fetch_max(used, Ordering::Relaxed);
    }

    fn remove(&self, entries: &mut Entries, key: &str) -> Option<StoredEntry> {
        let entry = entries.pop(key)?;
        self.release(key, &entry);
        Some(entry)
    }

    fn release(&self, key: &str, entry: &StoredEntry) {
        let freed = entry.footprint(key);
        let _ = self
            .stats
            .used_bytes
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |used| {
                Some(used.saturating_sub(freed))
            });
    }

    /// Take the live entry at `key` out of the map, dropping it if expired.
    fn take_live(&self, entries: &mut Entries, key: &str, now: Instant) -> Option<StoredEntry> {
        let entry = self.remove(entries, key)?;
        if entry.is_expired(now) {
            self.stats.expired.fetch_add(1, Ordering::Relaxed);
            return None;
        }
        Some(entry)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_MAX_ENTRIES).unwrap_or(NonZeroUsize::MIN))
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "get");

        let probe = entries.get(key).map(|entry| {
            let value = match &entry.value {
                StoredValue::Bytes(value) => Some(value.clone()),
                StoredValue::List(_) => None,
            };
            (entry.is_expired(now), value)
        });
        let value = match probe {
            Some((true, _)) => {
                self.remove(&mut entries, key);
                self.stats.expired.fetch_add(1, Ordering::Relaxed);
                None
            }
            Some((false, Some(value))) => Some(value),
            Some((false, None)) => return Err(wrong_type(key)),
            None => None,
        };

        let counter = if value.is_some() {
            &self.stats.hits
        } else {
            &self.stats.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);

        Ok(value)
    }

    async fn peek(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let now = Instant::now();
        let entries = rw_read(&self.entries, SOURCE, "peek");
        match entries.peek(key) {
            Some(entry) if entry.is_expired(now) => Ok(None),
            Some(StoredEntry {
                value: StoredValue::Bytes(value),
                ..
            }) => Ok(Some(value.clone())),
            Some(_) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Option<Duration>) -> Result<(), StoreError> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        let mut entries = rw_write(&self.entries, SOURCE, "set");
        self.insert(
            &mut entries,
            key,
            StoredEntry {
                value: StoredValue::Bytes(value),
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "delete");
        let removed = self.remove(&mut entries, key);
        Ok(removed.is_some_and(|entry| !entry.is_expired(now)))
    }

    async fn delete_many(&self, keys: &[String]) -> Result<u64, StoreError> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "delete_many");
        let removed = keys
            .iter()
            .filter_map(|key| self.remove(&mut entries, key))
            .filter(|entry| !entry.is_expired(now))
            .count();
        Ok(removed as u64)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        if !self.supports_patterns {
            return Err(StoreError::Unsupported("pattern key enumeration"));
        }

        let now = Instant::now();
        let entries = rw_read(&self.entries, SOURCE, "keys");
        let mut matched: Vec<String> = entries
            .iter()
            .filter(|(key, entry)| !entry.is_expired(now) && glob_match(pattern, key))
            .map(|(key, _)| key.clone())
            .collect();
        matched.sort();
        Ok(matched)
    }

    fn supports_patterns(&self) -> bool {
        self.supports_patterns
    }

    async fn ttl(&self, key: &str) -> Result<Option<u64>, StoreError> {
        let now = Instant::now();
        let entries = rw_read(&self.entries, SOURCE, "ttl");
        let remaining = entries
            .peek(key)
            .filter(|entry| !entry.is_expired(now))
            .and_then(|entry| entry.expires_at)
            .map(|deadline| {
                let millis = deadline.saturating_duration_since(now).as_millis();
                ((millis + 500) / 1000) as u64
            });
        Ok(remaining)
    }

    async fn incr_counter(&self, name: &str) -> Result<i64, StoreError> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "incr_counter");

        let (current, expires_at) = match entries.peek(name) {
            Some(entry) if !entry.is_expired(now) => {
                let StoredValue::Bytes(value) = &entry.value else {
                    return Err(wrong_type(name));
                };
                let text = std::str::from_utf8(value).map_err(StoreError::protocol)?;
                let current = text.trim().parse::<i64>().map_err(|_| {
                    StoreError::Protocol(format!("value at `{name}` is not an integer"))
                })?;
                (current, entry.expires_at)
            }
            _ => (0, None),
        };

        let next = current
            .checked_add(1)
            .ok_or_else(|| StoreError::Protocol(format!("counter `{name}` overflowed")))?;
        self.insert(
            &mut entries,
            name,
            StoredEntry {
                value: StoredValue::Bytes(Bytes::from(next.to_string())),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn push_bounded(
        &self,
        key: &str,
        value: Bytes,
        capacity: usize,
    ) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = rw_write(&self.entries, SOURCE, "push_bounded");

        if matches!(
            entries.peek(key),
            Some(entry) if !entry.is_expired(now) && matches!(entry.value, StoredValue::Bytes(_))
        ) {
            return Err(wrong_type(key));
        }

        let (mut items, expires_at) = match self.take_live(&mut entries, key, now) {
            Some(StoredEntry {
                value: StoredValue::List(items),
                expires_at,
            }) => (items, expires_at),
            _ => (VecDeque::new(), None),
        };
        items.push_back(value);
        while items.len() > capacity {
            items.pop_front();
        }
        if items.is_empty() {
            return Ok(());
        }

        self.insert(
            &mut entries,
            key,
            StoredEntry {
                value: StoredValue::List(items),
                expires_at,
            },
        );
        Ok(())
    }

    async fn list(&self, key: &str) -> Result<Vec<Bytes>, StoreError> {
        let now = Instant::now();
        let entries = rw_read(&self.entries, SOURCE, "list");
        match entries.peek(key) {
            Some(entry) if entry.is_expired(now) => Ok(Vec::new()),
            Some(StoredEntry {
                value: StoredValue::List(items),
                ..
            }) => Ok(items.iter().cloned().collect()),
            Some(_) => Err(wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn info(&self) -> Result<StoreInfo, StoreError> {
        let now = Instant::now();
        let entries = rw_read(&self.entries, SOURCE, "info");
        let live = entries.iter().filter(|(_, entry)| !entry.is_expired(now));
        let keys_count = live.count() as u64;
        let memory_bytes = self.stats.used_bytes.load(Ordering::Relaxed);

        Ok(StoreInfo {
            backend: BACKEND.to_string(),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
            hits: self.stats.hits.load(Ordering::Relaxed),
            misses: self.stats.misses.load(Ordering::Relaxed),
            memory_bytes,
            memory_peak_bytes: self
                .stats
                .peak_bytes
                .load(Ordering::Relaxed)
                .max(memory_bytes),
            uptime_seconds: self.started_at.elapsed().as_secs(),
            connected_clients: 1,
            keys_count,
            evicted_keys: self.stats.evicted.load(Ordering::Relaxed),
            expired_keys: self.stats.expired.load(Ordering::Relaxed),
        })
    }

    async fn reset_stats(&self) -> Result<(), StoreError> {
        self.stats.hits.store(0, Ordering::Relaxed);
        self.stats.misses.store(0, Ordering::Relaxed);
        self.stats.evicted.store(0, Ordering::Relaxed);
        self.stats.expired.store(0, Ordering::Relaxed);
        Ok(())
    }
}

/// Glob matching with `*` (any run) and `?` (any single character).
pub(crate) fn glob_match(pattern: &str, text: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    let (mut p, mut t) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while t < text.len() {
        match pattern.get(p) {
            Some('*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == '?' || c == text[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((star, matched)) => {
                    p = star + 1;
                    t = matched + 1;
                    backtrack = Some((star, matched + 1));
                }
                None => return false,
            },
        }
    }

    pattern[p..].iter().all(|&c| c == '*')
}
