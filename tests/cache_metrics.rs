mod common;

use std::collections::HashSet;
use std::sync::Arc;

use metrics_util::debugging::DebuggingRecorder;

use casale::application::repos::UpdatePropertyParams;

use common::{FlakyStore, Harness, memory_store, sample_records};

#[tokio::test]
async fn cache_paths_emit_expected_metric_keys() {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    recorder
        .install()
        .expect("debug metrics recorder should install in this test process");

    // Miss, hit, fetch latency and warm-up
    let harness = Harness::new(memory_store(), sample_records());
    harness.cache.get_all_cached().await.expect("miss");
    harness.cache.get_all_cached().await.expect("hit");
    harness.cache.warm().await.expect("warm");

    // Commit-driven invalidation
    harness
        .properties
        .update(UpdatePropertyParams {
            id: 1,
            title: Some("Metrics listing".to_string()),
            ..UpdatePropertyParams::default()
        })
        .await
        .expect("update");

    // Hit ratio gauge
    assert!(harness.cache.collect_metrics().await.is_success());

    // Degraded reads
    let flaky = Arc::new(FlakyStore::new());
    flaky.fail_reads(true);
    let degraded = Harness::new(flaky, sample_records());
    degraded.cache.get_all_cached().await.expect("fallback");

    let names: HashSet<String> = snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(composite_key, _, _, _)| composite_key.key().name().to_string())
        .collect();

    let expected = [
        "casale_cache_hit_total",
        "casale_cache_miss_total",
        "casale_cache_degraded_total",
        "casale_cache_fetch_ms",
        "casale_cache_invalidation_total",
        "casale_cache_invalidated_keys_total",
        "casale_cache_invalidation_ms",
        "casale_cache_hit_ratio",
        "casale_cache_warm_ms",
    ];

    for metric in expected {
        assert!(names.contains(metric), "missing metric: {metric}");
    }
}
