//! Commit-driven invalidation.
//!
//! Runs only for [`CommittedMutation`]s. Every listing change clears the aggregate keys
//! and sweeps all range, location and detail entries, then records exactly one
//! [`InvalidationEvent`] in the store.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use metrics::{counter, histogram};
use serde::Serialize;
use tracing::{info, instrument, warn};

use super::error::CacheError;
use super::events::{CommittedMutation, InvalidationEvent, MutationState, SweepOutcome};
use super::keys::{self, INVALIDATION_PATTERNS};
use super::store::CacheStore;

pub const INVALIDATION_COUNTER_KEY: &str = "cache_invalidation_count";
pub const LAST_INVALIDATION_KEY: &str = "last_cache_invalidation";
pub const INVALIDATION_LOG_KEY: &str = "cache_invalidation_log";

const LAST_INVALIDATION_TTL: Duration = Duration::from_secs(3600);

const METRIC_INVALIDATION: &str = "casale_cache_invalidation_total";
const METRIC_INVALIDATED_KEYS: &str = "casale_cache_invalidated_keys_total";
const METRIC_INVALIDATION_MS: &str = "casale_cache_invalidation_ms";
const METRIC_DEGRADED: &str = "casale_cache_degraded_total";

/// Snapshot of the main aggregate entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentCacheState {
    pub all_properties_cached: bool,
    pub all_properties_ttl: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvalidationStats {
    pub total_invalidations: u64,
    pub last_invalidation: Option<InvalidationEvent>,
    pub current_cache_state: CurrentCacheState,
    /// Most recent events, oldest first.
    pub recent: Vec<InvalidationEvent>,
}

pub struct InvalidationController {
    store: Arc<dyn CacheStore>,
    log_capacity: usize,
}

impl InvalidationController {
    pub fn new(store: Arc<dyn CacheStore>, log_capacity: usize) -> Self {
        Self {
            store,
            log_capacity,
        }
    }

    /// Keys removed before the pattern sweep. The list view key is not matched by
    /// any sweep pattern, so it is named here.
    pub fn exact_keys() -> [String; 4] {
        let all = keys::all_key();
        let list = keys::list_key();
        let all_meta = keys::meta_key(&all);
        let list_meta = keys::meta_key(&list);
        [all, all_meta, list, list_meta]
    }

    #[instrument(
        skip(self, mutation),
        fields(entity_id = mutation.entity_id(), action = %mutation.action())
    )]
    pub async fn invalidate(&self, mutation: &CommittedMutation) -> InvalidationEvent {
        let started = Instant::now();
        let mut deleted_keys = Vec::new();

        for key in Self::exact_keys() {
            match self.store.delete(&key).await {
                Ok(true) => deleted_keys.push(key),
                Ok(false) => {}
                Err(err) => {
                    counter!(METRIC_DEGRADED, "op" => "delete").increment(1);
                    warn!(cache_key = %key, error = %err, "Exact-key invalidation failed");
                }
            }
        }

        let sweep = if self.store.supports_patterns() {
            self.sweep(&mut deleted_keys).await
        } else {
            counter!(METRIC_DEGRADED, "op" => "sweep").increment(1);
            warn!("Cache store cannot enumerate keys; invalidated exact keys only");
            SweepOutcome::Unsupported
        };

        let event = InvalidationEvent::new(mutation, deleted_keys, sweep);
        self.record(&event).await;

        counter!(METRIC_INVALIDATION, "action" => mutation.action().as_str()).increment(1);
        counter!(METRIC_INVALIDATED_KEYS).increment(event.deleted_keys.len() as u64);
        histogram!(METRIC_INVALIDATION_MS).record(started.elapsed().as_secs_f64() * 1000.0);

        info!(
            entity_label = %event.entity_label,
            deleted = event.deleted_keys.len(),
            sweep = ?event.sweep,
            state = ?MutationState::Invalidated,
            "Cache invalidated"
        );

        event
    }

    async fn sweep(&self, deleted_keys: &mut Vec<String>) -> SweepOutcome {
        for pattern in INVALIDATION_PATTERNS {
            let matched: Vec<String> = match self.store.keys(pattern).await {
                Ok(found) => found
                    .into_iter()
                    .filter(|key| !deleted_keys.contains(key))
                    .collect(),
                Err(err) => {
                    counter!(METRIC_DEGRADED, "op" => "sweep").increment(1);
                    warn!(pattern, error = %err, "Pattern sweep aborted");
                    return SweepOutcome::Failed;
                }
            };
            if matched.is_empty() {
                continue;
            }

            match self.store.delete_many(&matched).await {
                Ok(removed) => {
                    info!(pattern, removed, "Deleted keys matching pattern");
                    deleted_keys.extend(matched);
                }
                Err(err) => {
                    counter!(METRIC_DEGRADED, "op" => "sweep").increment(1);
                    warn!(pattern, error = %err, "Pattern sweep aborted");
                    return SweepOutcome::Failed;
                }
            }
        }
        SweepOutcome::Complete
    }

    /// Counter, last event and rolling log. Each write is atomic on its own key; a
    /// failure in one does not skip the others.
    async fn record(&self, event: &InvalidationEvent) {
        if let Err(err) = self.store.incr_counter(INVALIDATION_COUNTER_KEY).await {
            warn!(error = %err, "Invalidation counter not incremented");
        }

        let encoded = match serde_json::to_vec(event) {
            Ok(encoded) => Bytes::from(encoded),
            Err(err) => {
                warn!(error = %err, "Invalidation event could not be encoded");
                return;
            }
        };

        if let Err(err) = self
            .store
            .set(
                LAST_INVALIDATION_KEY,
                encoded.clone(),
                Some(LAST_INVALIDATION_TTL),
            )
            .await
        {
            warn!(error = %err, "Last invalidation not stored");
        }

        if self.log_capacity == 0 {
            return;
        }
        if let Err(err) = self
            .store
            .push_bounded(INVALIDATION_LOG_KEY, encoded, self.log_capacity)
            .await
        {
            warn!(error = %err, "Invalidation log not updated");
        }
    }

    async fn load_log(&self) -> Result<Vec<InvalidationEvent>, CacheError> {
        let raw = self.store.list(INVALIDATION_LOG_KEY).await?;
        Ok(raw
            .iter()
            .filter_map(|item| match serde_json::from_slice(item) {
                Ok(event) => Some(event),
                Err(err) => {
                    warn!(error = %err, "Skipping unreadable invalidation log entry");
                    None
                }
            })
            .collect())
    }

    pub async fn stats(&self) -> Result<InvalidationStats, CacheError> {
        let total_invalidations = match self.store.peek(INVALIDATION_COUNTER_KEY).await? {
            Some(raw) => std::str::from_utf8(&raw)
                .ok()
                .and_then(|text| text.trim().parse::<u64>().ok())
                .unwrap_or(0),
            None => 0,
        };

        let last_invalidation = self
            .store
            .peek(LAST_INVALIDATION_KEY)
            .await?
            .and_then(|raw| serde_json::from_slice(&raw).ok());

        // TTL and peeks keep inspection out of the hit ratio.
        let all_properties_ttl = self.store.ttl(&keys::all_key()).await?;

        Ok(InvalidationStats {
            total_invalidations,
            last_invalidation,
            current_cache_state: CurrentCacheState {
                all_properties_cached: all_properties_ttl.is_some(),
                all_properties_ttl,
            },
            recent: self.load_log().await?,
        })
    }
}
