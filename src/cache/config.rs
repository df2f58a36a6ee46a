//! Cache configuration.
//!
//! Runtime knobs of [`PropertyCache`](super::PropertyCache). TTLs are per query shape and
//! deliberately absent here.

use std::time::Duration;

use super::metrics::DEFAULT_HISTORY_CAPACITY;

const DEFAULT_INVALIDATION_LOG_CAPACITY: usize = 100;
const DEFAULT_WARM_LOCATIONS: [&str; 5] = ["New York", "Los Angeles", "Chicago", "Miami", "Seattle"];
const DEFAULT_WARM_PRICE_RANGES: [(f64, f64); 3] = [
    (0.0, 500_000.0),
    (500_000.0, 1_000_000.0),
    (1_000_000.0, 5_000_000.0),
];

#[derive(Debug, Clone, PartialEq)]
pub struct CacheConfig {
    /// Upper bound on a single repository fetch; `None` waits indefinitely.
    pub fetch_timeout: Option<Duration>,
    /// Samples kept for trend analysis.
    pub metrics_history_capacity: usize,
    /// Invalidation events kept in the rolling log; `0` disables the log.
    pub invalidation_log_capacity: usize,
    /// Locations pre-loaded by a warm-up.
    pub warm_locations: Vec<String>,
    /// Price ranges pre-loaded by a warm-up.
    pub warm_price_ranges: Vec<(f64, f64)>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: None,
            metrics_history_capacity: DEFAULT_HISTORY_CAPACITY,
            invalidation_log_capacity: DEFAULT_INVALIDATION_LOG_CAPACITY,
            warm_locations: DEFAULT_WARM_LOCATIONS.map(String::from).to_vec(),
            warm_price_ranges: DEFAULT_WARM_PRICE_RANGES.to_vec(),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            fetch_timeout: settings.fetch_timeout,
            metrics_history_capacity: settings.metrics_history_capacity.get(),
            invalidation_log_capacity: settings.invalidation_log_capacity,
            warm_locations: settings.warm_locations.clone(),
            warm_price_ranges: settings.warm_price_ranges.clone(),
        }
    }
}
