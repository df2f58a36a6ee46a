mod common;

use std::sync::Arc;

use casale::cache::{AnalysisReport, FetchSource, Grade, ReportStatus, TrendStatus};

use common::{FlakyStore, Harness, memory_store, sample_records};

#[tokio::test]
async fn collection_reports_store_hit_ratio() {
    let harness = Harness::new(memory_store(), sample_records());
    harness.cache.get_all_cached().await.expect("miss");
    harness.cache.get_all_cached().await.expect("hit");

    let metrics = harness.cache.collect_metrics().await;
    assert!(metrics.is_success());
    assert_eq!(metrics.hits, 1);
    assert_eq!(metrics.misses, 1);
    assert_eq!(metrics.total_operations, 2);
    assert_eq!(metrics.hit_ratio, 0.5);
    assert_eq!(metrics.hit_percentage, 50.0);
    assert_eq!(metrics.keys_count, 2);
    assert_eq!(metrics.cache_backend, "memory");

    let performance = metrics.performance.expect("performance evaluation");
    assert_eq!(performance.grade, Grade::Poor);
    assert_eq!(performance.recommendations.len(), 4);
}

#[tokio::test]
async fn empty_store_reports_zero_ratio() {
    let harness = Harness::new(memory_store(), sample_records());

    let metrics = harness.cache.collect_metrics().await;
    assert!(metrics.is_success());
    assert_eq!(metrics.total_operations, 0);
    assert_eq!(metrics.hit_ratio, 0.0);
}

#[tokio::test]
async fn trend_needs_two_samples() {
    let harness = Harness::new(memory_store(), sample_records());

    assert_eq!(harness.cache.metrics_trend().await.status, TrendStatus::NoData);

    harness.cache.collect_metrics().await;
    let single = harness.cache.metrics_trend().await;
    assert_eq!(single.status, TrendStatus::InsufficientData);
    assert_eq!(single.data_points, 1);

    harness.cache.collect_metrics().await;
    let trend = harness.cache.metrics_trend().await;
    assert_eq!(trend.status, TrendStatus::Success);
    assert_eq!(trend.data_points, 2);
    assert!(trend.trend_value.is_some());
    assert_eq!(trend.time_period.as_deref(), Some("2 minutes"));
}

#[tokio::test]
async fn reset_clears_statistics_and_history() {
    let harness = Harness::new(memory_store(), sample_records());
    harness.cache.get_all_cached().await.expect("miss");
    harness.cache.get_all_cached().await.expect("hit");
    harness.cache.collect_metrics().await;

    let report = harness.cache.reset_metrics().await;
    assert_eq!(report.status, ReportStatus::Success);
    assert!(report.timestamp.is_some());

    assert_eq!(harness.cache.metrics_trend().await.status, TrendStatus::NoData);
    let metrics = harness.cache.collect_metrics().await;
    assert_eq!(metrics.hits, 0);

    let cached = harness.cache.get_all_cached().await.expect("still cached");
    assert_eq!(cached.source, FetchSource::Cache);
}

#[tokio::test]
async fn unreachable_store_yields_error_reports() {
    let store = Arc::new(FlakyStore::new());
    store.fail_reads(true);
    store.fail_writes(true);
    let harness = Harness::new(store, sample_records());

    let metrics = harness.cache.collect_metrics().await;
    assert_eq!(metrics.status, ReportStatus::Error);
    assert!(metrics.message.contains("unavailable"));
    assert!(metrics.performance.is_none());

    assert_eq!(harness.cache.metrics_trend().await.status, TrendStatus::Error);
    assert_eq!(harness.cache.reset_metrics().await.status, ReportStatus::Error);
    assert!(matches!(
        harness.cache.analysis().await,
        AnalysisReport::Unavailable(_)
    ));
}

#[tokio::test]
async fn analysis_inspects_cached_listing_keys() {
    let harness = Harness::new(memory_store(), sample_records());
    harness.cache.get_all_cached().await.expect("all");
    harness.cache.get_by_id_cached(1).await.expect("detail");

    let AnalysisReport::Complete(analysis) = harness.cache.analysis().await else {
        panic!("analysis should complete");
    };
    let info = &analysis.property_cache_info;
    assert!(info.main_cache_exists);
    assert!(info.error.is_none());
    assert!(info.cache_keys.iter().any(|key| key == "property_1"));
    assert_eq!(info.cached_count, info.total_keys_found);
    assert_eq!(analysis.summary.performance_grade, "Poor");
    assert!(!analysis.recommendations.is_empty());
}

#[tokio::test]
async fn empty_cache_analysis_suggests_warming() {
    let harness = Harness::new(memory_store(), sample_records());

    let AnalysisReport::Complete(analysis) = harness.cache.analysis().await else {
        panic!("analysis should complete");
    };
    assert_eq!(analysis.property_cache_info.cached_count, 0);
    assert!(
        analysis
            .recommendations
            .iter()
            .any(|line| line.contains("cache warming"))
    );
}

#[tokio::test]
async fn warm_loads_configured_shapes_once() {
    let harness = Harness::new(memory_store(), sample_records());

    let first = harness.cache.warm().await.expect("warm");
    assert_eq!(first.keys.len(), 9);
    assert_eq!(first.keys[0], "all_properties");
    assert_eq!(first.loaded, 9);
    assert_eq!(first.already_cached, 0);

    let second = harness.cache.warm().await.expect("warm again");
    assert_eq!(second.already_cached, 9);
    assert_eq!(harness.repo.calls(), 9);
}
