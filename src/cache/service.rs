//! Caller-facing facade over the cache components.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::application::repos::PropertiesRepo;
use crate::domain::entities::{PropertyId, PropertyRecord};

use super::analysis::{self, AnalysisReport};
use super::config::CacheConfig;
use super::error::CacheError;
use super::events::{CommitListener, CommittedMutation, InvalidationEvent};
use super::invalidation::{InvalidationController, InvalidationStats};
use super::keys::{self, CLEAR_ALL_PATTERNS};
use super::metrics::{CacheMetrics, MetricsCollector, ResetReport, TrendReport};
use super::read_through::{CacheMetadata, Fetched, ReadThroughCache};
use super::store::CacheStore;
use super::warmer::{CacheWarmer, WarmReport};

/// State of one cached entry. Read with `TTL` and peeks, so the memory store's hit
/// ratio is unaffected; Redis still counts the metadata read.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryStats {
    pub cached: bool,
    pub ttl: Option<u64>,
    pub metadata: Option<CacheMetadata>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub all_properties: EntryStats,
    pub list_view: EntryStats,
}

pub struct PropertyCache {
    store: Arc<dyn CacheStore>,
    reads: Arc<ReadThroughCache>,
    invalidation: InvalidationController,
    metrics: MetricsCollector,
    warmer: CacheWarmer,
}

impl PropertyCache {
    pub fn new(
        store: Arc<dyn CacheStore>,
        repo: Arc<dyn PropertiesRepo>,
        config: &CacheConfig,
    ) -> Self {
        let reads = Arc::new(ReadThroughCache::new(
            Arc::clone(&store),
            repo,
            config.fetch_timeout,
        ));
        Self {
            invalidation: InvalidationController::new(
                Arc::clone(&store),
                config.invalidation_log_capacity,
            ),
            metrics: MetricsCollector::new(Arc::clone(&store), config.metrics_history_capacity),
            warmer: CacheWarmer::new(
                Arc::clone(&reads),
                config.warm_locations.clone(),
                config.warm_price_ranges.clone(),
            ),
            reads,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn CacheStore> {
        &self.store
    }

    pub async fn get_all_cached(&self) -> Result<Fetched<Vec<PropertyRecord>>, CacheError> {
        self.reads.all().await
    }

    pub async fn get_list_cached(&self) -> Result<Fetched<Vec<PropertyRecord>>, CacheError> {
        self.reads.list_view().await
    }

    pub async fn get_by_location_cached(
        &self,
        location: &str,
    ) -> Result<Fetched<Vec<PropertyRecord>>, CacheError> {
        self.reads.by_location(location).await
    }

    pub async fn get_by_price_range_cached(
        &self,
        min_price: f64,
        max_price: f64,
    ) -> Result<Fetched<Vec<PropertyRecord>>, CacheError> {
        self.reads.by_price_range(min_price, max_price).await
    }

    pub async fn get_by_id_cached(
        &self,
        id: PropertyId,
    ) -> Result<Fetched<PropertyRecord>, CacheError> {
        self.reads.by_id(id).await
    }

    pub async fn on_entity_committed(&self, mutation: &CommittedMutation) -> InvalidationEvent {
        self.invalidation.invalidate(mutation).await
    }

    pub async fn invalidation_stats(&self) -> Result<InvalidationStats, CacheError> {
        self.invalidation.stats().await
    }

    pub async fn collect_metrics(&self) -> CacheMetrics {
        self.metrics.collect().await
    }

    pub async fn metrics_trend(&self) -> TrendReport {
        self.metrics.trend().await
    }

    pub async fn reset_metrics(&self) -> ResetReport {
        self.metrics.reset().await
    }

    pub async fn analysis(&self) -> AnalysisReport {
        analysis::analyze(&self.metrics, self.store.as_ref()).await
    }

    pub async fn warm(&self) -> Result<WarmReport, CacheError> {
        self.warmer.warm().await
    }

    pub async fn cache_stats(&self) -> Result<CacheStats, CacheError> {
        Ok(CacheStats {
            all_properties: self.entry_stats(&keys::all_key()).await?,
            list_view: self.entry_stats(&keys::list_key()).await?,
        })
    }

    async fn entry_stats(&self, key: &str) -> Result<EntryStats, CacheError> {
        let ttl = self.store.ttl(key).await?;
        if ttl.is_none() {
            return Ok(EntryStats {
                cached: false,
                ttl: None,
                metadata: None,
            });
        }

        let metadata = self
            .store
            .peek(&keys::meta_key(key))
            .await?
            .and_then(|raw| serde_json::from_slice(&raw).ok());
        Ok(EntryStats {
            cached: true,
            ttl,
            metadata,
        })
    }

    /// Delete every key matching `pattern`; returns how many were removed.
    pub async fn clear_pattern(&self, pattern: &str) -> Result<u64, CacheError> {
        if pattern.trim().is_empty() {
            return Err(CacheError::invalid_input("pattern must not be empty"));
        }
        if !self.store.supports_patterns() {
            return Err(CacheError::PatternSweepUnsupported);
        }

        let matched = self.store.keys(pattern).await?;
        let removed = self.store.delete_many(&matched).await?;
        info!(pattern, removed, "Cleared cache keys matching pattern");
        Ok(removed)
    }

    /// Remove all listing entries. Exact aggregate keys go first so they are cleared
    /// even when the store cannot sweep patterns.
    pub async fn clear_all(&self) -> Result<u64, CacheError> {
        let all = keys::all_key();
        let exact = [keys::meta_key(&all), all];
        let mut removed = self.store.delete_many(&exact).await?;

        if !self.store.supports_patterns() {
            warn!(removed, "Manual clear limited to exact keys");
            return Err(CacheError::PatternSweepUnsupported);
        }

        for pattern in CLEAR_ALL_PATTERNS {
            removed += self.clear_pattern(pattern).await?;
        }
        info!(removed, "Property cache cleared");
        Ok(removed)
    }
}

#[async_trait]
impl CommitListener for PropertyCache {
    async fn on_committed(&self, mutation: CommittedMutation) {
        self.on_entity_committed(&mutation).await;
    }
}
