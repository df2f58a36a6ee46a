use std::sync::Arc;
use std::time::Instant;

use futures::future::try_join_all;
use metrics::histogram;
use serde::Serialize;
use tracing::info;

use super::error::CacheError;
use super::keys;
use super::read_through::{FetchSource, ReadThroughCache};

const METRIC_WARM_MS: &str = "casale_cache_warm_ms";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WarmReport {
    /// Keys touched, in load order.
    pub keys: Vec<String>,
    pub already_cached: usize,
    pub loaded: usize,
    /// Loads served while the store was unreachable; nothing was cached for these.
    pub uncached: usize,
}

impl WarmReport {
    fn record(&mut self, key: String, source: FetchSource) {
        match source {
            FetchSource::Cache => self.already_cached += 1,
            FetchSource::Database => self.loaded += 1,
            FetchSource::DirectFallback => self.uncached += 1,
        }
        self.keys.push(key);
    }
}

/// Pre-loads the aggregate listing plus the configured hot locations and price ranges.
pub struct CacheWarmer {
    reads: Arc<ReadThroughCache>,
    locations: Vec<String>,
    price_ranges: Vec<(f64, f64)>,
}

impl CacheWarmer {
    pub fn new(
        reads: Arc<ReadThroughCache>,
        locations: Vec<String>,
        price_ranges: Vec<(f64, f64)>,
    ) -> Self {
        Self {
            reads,
            locations,
            price_ranges,
        }
    }

    /// Fails with the first repository error; entries loaded before it stay cached.
    pub async fn warm(&self) -> Result<WarmReport, CacheError> {
        let started = Instant::now();
        info!(
            locations = self.locations.len(),
            price_ranges = self.price_ranges.len(),
            "Warming property cache"
        );

        let mut report = WarmReport::default();

        let all = self.reads.all().await?;
        report.record(keys::all_key(), all.source);

        // Locations and ranges load concurrently; results keep configuration order.
        let by_location = try_join_all(
            self.locations
                .iter()
                .map(|location| self.reads.by_location(location)),
        )
        .await?;
        for (location, fetched) in self.locations.iter().zip(by_location) {
            report.record(keys::location_key(location), fetched.source);
        }

        let by_price = try_join_all(
            self.price_ranges
                .iter()
                .map(|&(min_price, max_price)| self.reads.by_price_range(min_price, max_price)),
        )
        .await?;
        for (&(min_price, max_price), fetched) in self.price_ranges.iter().zip(by_price) {
            report.record(keys::price_range_key(min_price, max_price), fetched.source);
        }

        histogram!(METRIC_WARM_MS).record(started.elapsed().as_secs_f64() * 1000.0);
        info!(
            loaded = report.loaded,
            already_cached = report.already_cached,
            uncached = report.uncached,
            "Cache warm-up completed"
        );
        Ok(report)
    }
}
