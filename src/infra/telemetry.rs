use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "casale_cache_hit_total",
            Unit::Count,
            "Read-through lookups served from the cache store, by query shape."
        );
        describe_counter!(
            "casale_cache_miss_total",
            Unit::Count,
            "Read-through lookups materialized from the repository, by query shape."
        );
        describe_counter!(
            "casale_cache_degraded_total",
            Unit::Count,
            "Cache store operations that failed and were degraded around, by operation."
        );
        describe_histogram!(
            "casale_cache_fetch_ms",
            Unit::Milliseconds,
            "Repository fetch latency on cache misses in milliseconds."
        );
        describe_counter!(
            "casale_cache_invalidation_total",
            Unit::Count,
            "Committed mutations that triggered invalidation, by action."
        );
        describe_counter!(
            "casale_cache_invalidated_keys_total",
            Unit::Count,
            "Cache keys removed by invalidation."
        );
        describe_histogram!(
            "casale_cache_invalidation_ms",
            Unit::Milliseconds,
            "Invalidation latency in milliseconds."
        );
        describe_gauge!(
            "casale_cache_hit_ratio",
            "Hit ratio reported by the cache store at the last collection."
        );
        describe_histogram!(
            "casale_cache_warm_ms",
            Unit::Milliseconds,
            "Cache warm-up latency in milliseconds."
        );
    });
}
