//! Read-through cache for listing queries.
//!
//! Every query shape follows the same protocol: probe the store, return the cached
//! payload on a hit, otherwise materialize the result from the repository, store it with
//! the shape's TTL and write a best-effort metadata sidecar.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use metrics::{counter, histogram};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{debug, instrument, warn};

use crate::application::repos::{PropertiesRepo, RepoError};
use crate::domain::entities::{PropertyId, PropertyRecord};

use super::error::CacheError;
use super::keys::{self, QueryShape};
use super::store::{CacheStore, StoreError};

const METRIC_HIT: &str = "casale_cache_hit_total";
const METRIC_MISS: &str = "casale_cache_miss_total";
const METRIC_DEGRADED: &str = "casale_cache_degraded_total";
const METRIC_FETCH_MS: &str = "casale_cache_fetch_ms";

/// Where a returned payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchSource {
    Cache,
    Database,
    /// The store was unreachable; the repository was queried and nothing was cached.
    DirectFallback,
}

impl FetchSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            FetchSource::Cache => "cache",
            FetchSource::Database => "database",
            FetchSource::DirectFallback => "direct_fallback",
        }
    }
}

/// Result of a read-through call.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
    pub value: T,
    /// Serialized form of `value`, exactly as held by the store.
    pub payload: Bytes,
    pub source: FetchSource,
}

/// Sidecar stored under `<key>_meta`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    #[serde(with = "time::serde::rfc3339")]
    pub cached_at: OffsetDateTime,
    pub row_count: usize,
    pub fetch_time_seconds: f64,
    pub source: FetchSource,
}

/// Number of listings in a cached result.
pub trait RowCount {
    fn row_count(&self) -> usize;
}

impl<T> RowCount for Vec<T> {
    fn row_count(&self) -> usize {
        self.len()
    }
}

impl RowCount for PropertyRecord {
    fn row_count(&self) -> usize {
        1
    }
}

enum Probe {
    Hit(Bytes),
    Miss,
    Unavailable(StoreError),
}

pub struct ReadThroughCache {
    store: Arc<dyn CacheStore>,
    repo: Arc<dyn PropertiesRepo>,
    fetch_timeout: Option<Duration>,
}

impl ReadThroughCache {
    pub fn new(
        store: Arc<dyn CacheStore>,
        repo: Arc<dyn PropertiesRepo>,
        fetch_timeout: Option<Duration>,
    ) -> Self {
        Self {
            store,
            repo,
            fetch_timeout,
        }
    }

    pub async fn all(&self) -> Result<Fetched<Vec<PropertyRecord>>, CacheError> {
        let repo = Arc::clone(&self.repo);
        self.read_through(QueryShape::All, keys::all_key(), || async move {
            repo.fetch_all().await
        })
        .await
    }

    /// Available listings only, newest first.
    pub async fn list_view(&self) -> Result<Fetched<Vec<PropertyRecord>>, CacheError> {
        let repo = Arc::clone(&self.repo);
        self.read_through(QueryShape::ListView, keys::list_key(), || async move {
            repo.fetch_available().await
        })
        .await
    }

    pub async fn by_location(
        &self,
        location: &str,
    ) -> Result<Fetched<Vec<PropertyRecord>>, CacheError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(CacheError::invalid_input("location must not be empty"));
        }

        let repo = Arc::clone(&self.repo);
        let filter = location.to_string();
        self.read_through(
            QueryShape::Location,
            keys::location_key(location),
            || async move { repo.fetch_by_location(&filter).await },
        )
        .await
    }

    pub async fn by_price_range(
        &self,
        min_price: f64,
        max_price: f64,
    ) -> Result<Fetched<Vec<PropertyRecord>>, CacheError> {
        validate_price_range(min_price, max_price)?;

        let repo = Arc::clone(&self.repo);
        self.read_through(
            QueryShape::PriceRange,
            keys::price_range_key(min_price, max_price),
            || async move { repo.fetch_by_price_range(min_price, max_price).await },
        )
        .await
    }

    /// Missing listings are reported as `RepoError::NotFound` and never cached.
    pub async fn by_id(&self, id: PropertyId) -> Result<Fetched<PropertyRecord>, CacheError> {
        let repo = Arc::clone(&self.repo);
        self.read_through(QueryShape::Detail, keys::entity_key(id), || async move {
            repo.fetch_by_id(id).await?.ok_or(RepoError::NotFound)
        })
        .await
    }

    #[instrument(skip(self, fetch), fields(shape = %shape))]
    async fn read_through<T, F, Fut>(
        &self,
        shape: QueryShape,
        key: String,
        fetch: F,
    ) -> Result<Fetched<T>, CacheError>
    where
        T: Serialize + DeserializeOwned + RowCount + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T, RepoError>> + Send,
    {
        match self.probe(&key).await {
            Probe::Hit(payload) => match serde_json::from_slice::<T>(&payload) {
                Ok(value) => {
                    counter!(METRIC_HIT, "shape" => shape.as_str()).increment(1);
                    debug!(cache_key = %key, "Cache hit");
                    return Ok(Fetched {
                        value,
                        payload,
                        source: FetchSource::Cache,
                    });
                }
                Err(err) => {
                    warn!(cache_key = %key, error = %err, "Cached payload unreadable; refetching");
                }
            },
            Probe::Miss => {}
            Probe::Unavailable(err) => {
                counter!(METRIC_DEGRADED, "op" => "get").increment(1);
                warn!(
                    cache_key = %key,
                    error = %err,
                    "Cache store unavailable; reading from repository directly"
                );
                let (value, _) = self.fetch_timed(shape, fetch).await?;
                let payload = encode(&value)?;
                return Ok(Fetched {
                    value,
                    payload,
                    source: FetchSource::DirectFallback,
                });
            }
        }

        counter!(METRIC_MISS, "shape" => shape.as_str()).increment(1);
        let (value, elapsed) = self.fetch_timed(shape, fetch).await?;
        let payload = encode(&value)?;
        let ttl = Duration::from_secs(shape.ttl_seconds());

        // A single SET: the entry is either fully written or absent.
        if let Err(err) = self.store.set(&key, payload.clone(), Some(ttl)).await {
            counter!(METRIC_DEGRADED, "op" => "set").increment(1);
            warn!(cache_key = %key, error = %err, "Cache write failed; returning fetched data");
            return Ok(Fetched {
                value,
                payload,
                source: FetchSource::Database,
            });
        }

        let metadata = CacheMetadata {
            cached_at: OffsetDateTime::now_utc(),
            row_count: value.row_count(),
            fetch_time_seconds: elapsed.as_secs_f64(),
            source: FetchSource::Database,
        };
        self.write_metadata(&key, &metadata, ttl).await;

        debug!(
            cache_key = %key,
            rows = metadata.row_count,
            ttl_seconds = ttl.as_secs(),
            "Cache populated"
        );

        Ok(Fetched {
            value,
            payload,
            source: FetchSource::Database,
        })
    }

    async fn probe(&self, key: &str) -> Probe {
        match self.store.get(key).await {
            Ok(Some(payload)) => Probe::Hit(payload),
            Ok(None) => Probe::Miss,
            Err(err) => Probe::Unavailable(err),
        }
    }

    async fn fetch_timed<T, F, Fut>(
        &self,
        shape: QueryShape,
        fetch: F,
    ) -> Result<(T, Duration), CacheError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, RepoError>>,
    {
        let started = Instant::now();
        let result = match self.fetch_timeout {
            Some(limit) => tokio::time::timeout(limit, fetch())
                .await
                .unwrap_or(Err(RepoError::Timeout)),
            None => fetch().await,
        };
        let elapsed = started.elapsed();
        histogram!(METRIC_FETCH_MS, "shape" => shape.as_str())
            .record(elapsed.as_secs_f64() * 1000.0);

        Ok((result?, elapsed))
    }

    async fn write_metadata(&self, key: &str, metadata: &CacheMetadata, ttl: Duration) {
        let meta_key = keys::meta_key(key);
        let encoded = match serde_json::to_vec(metadata) {
            Ok(encoded) => Bytes::from(encoded),
            Err(err) => {
                warn!(cache_key = %meta_key, error = %err, "Metadata could not be encoded");
                return;
            }
        };
        if let Err(err) = self.store.set(&meta_key, encoded, Some(ttl)).await {
            warn!(cache_key = %meta_key, error = %err, "Metadata write failed");
        }
    }
}

pub fn validate_price_range(min_price: f64, max_price: f64) -> Result<(), CacheError> {
    if !min_price.is_finite() || !max_price.is_finite() {
        return Err(CacheError::invalid_input("price bounds must be finite numbers"));
    }
    if min_price > max_price {
        return Err(CacheError::invalid_input(format!(
            "min_price {min_price} exceeds max_price {max_price}"
        )));
    }
    Ok(())
}

fn encode<T: Serialize>(value: &T) -> Result<Bytes, CacheError> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|err| CacheError::Serialization(err.to_string()))
}
