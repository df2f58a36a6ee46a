//! Casale cache system
//!
//! Read-through caching for property listings on top of a pluggable [`CacheStore`]:
//!
//! - **Reads**: each query shape has one canonical key and a fixed TTL
//!   ([`keys`]); misses are materialized from the repository and stored whole.
//! - **Invalidation**: writes register [`PendingMutation`]s on [`CommitHooks`];
//!   after commit the [`InvalidationController`] clears aggregate keys and sweeps
//!   the range, location and detail entries.
//! - **Metrics**: hit ratio, grade and trend derived from the store's own counters.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! backend = "redis"
//! redis_url = "redis://127.0.0.1:6379/1"
//! fetch_timeout_ms = 5000
//! metrics_history_capacity = 1440
//! ```

mod analysis;
mod config;
mod error;
mod events;
mod invalidation;
pub mod keys;
mod lock;
mod memory;
mod metrics;
mod read_through;
mod redis_store;
mod service;
mod store;
mod warmer;

pub use analysis::{AnalysisReport, AnalysisSummary, CacheAnalysis, PropertyCacheInfo};
pub use config::CacheConfig;
pub use error::CacheError;
pub use events::{
    CommitHooks, CommitListener, CommittedMutation, InvalidationEvent, MutationAction,
    MutationState, PendingMutation, SweepOutcome,
};
pub use invalidation::{
    CurrentCacheState, INVALIDATION_COUNTER_KEY, INVALIDATION_LOG_KEY, InvalidationController,
    InvalidationStats, LAST_INVALIDATION_KEY,
};
pub use keys::QueryShape;
pub use memory::MemoryStore;
pub use self::metrics::{
    CacheMetrics, DEFAULT_HISTORY_CAPACITY, Grade, METRICS_HISTORY_KEY, MetricsCollector,
    MetricsHistory, MetricsSample, PerformanceEvaluation, ReportStatus, ResetReport, TrendLabel,
    TrendReport, TrendStatus, evaluate, hit_ratio, trend,
};
pub use read_through::{CacheMetadata, FetchSource, Fetched, ReadThroughCache, RowCount};
pub use redis_store::RedisStore;
pub use service::{CacheStats, EntryStats, PropertyCache};
pub use store::{CacheStore, StoreError, StoreInfo};
pub use warmer::{CacheWarmer, WarmReport};
