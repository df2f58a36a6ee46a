//! Combined metrics, trend and key-space report for operators.

use serde::Serialize;
use time::OffsetDateTime;
use tracing::warn;

use super::keys::{self, INSPECTION_PATTERNS};
use super::metrics::{CacheMetrics, MetricsCollector, TrendReport, TrendStatus};
use super::store::CacheStore;

const SAMPLE_KEYS: usize = 10;
const LOW_HIT_RATE: f64 = 70.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PropertyCacheInfo {
    pub cached_count: usize,
    pub main_cache_exists: bool,
    /// First few matching keys, in pattern order.
    pub cache_keys: Vec<String>,
    pub total_keys_found: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisSummary {
    pub hit_rate: f64,
    pub performance_grade: String,
    pub total_keys: u64,
    pub memory_usage: String,
    pub trend: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheAnalysis {
    pub summary: AnalysisSummary,
    pub metrics: CacheMetrics,
    pub trend_analysis: TrendReport,
    pub property_cache_info: PropertyCacheInfo,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub recommendations: Vec<String>,
}

/// A failed metrics collection is returned as-is.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AnalysisReport {
    Complete(Box<CacheAnalysis>),
    Unavailable(CacheMetrics),
}

pub async fn analyze(collector: &MetricsCollector, store: &dyn CacheStore) -> AnalysisReport {
    let metrics = collector.collect().await;
    if !metrics.is_success() {
        return AnalysisReport::Unavailable(metrics);
    }

    let trend_analysis = collector.trend().await;
    let property_cache_info = inspect_keys(store).await;

    let performance_grade = metrics
        .performance
        .as_ref()
        .map_or_else(|| "Unknown".to_string(), |p| p.grade.to_string());
    let trend = match trend_analysis.status {
        TrendStatus::Success => trend_analysis.message.clone(),
        _ => "Unknown".to_string(),
    };

    let mut recommendations = metrics
        .performance
        .as_ref()
        .map(|p| p.recommendations.clone())
        .unwrap_or_default();
    if property_cache_info.error.is_none() {
        if property_cache_info.cached_count == 0 {
            recommendations.push(
                "No properties are currently cached. Consider implementing cache warming."
                    .to_string(),
            );
        } else if metrics.hit_percentage < LOW_HIT_RATE {
            recommendations.push(format!(
                "Only {} properties are cached. Consider caching more properties or \
                 implementing smarter caching strategies.",
                property_cache_info.cached_count
            ));
        }
    }

    AnalysisReport::Complete(Box::new(CacheAnalysis {
        summary: AnalysisSummary {
            hit_rate: metrics.hit_percentage,
            performance_grade,
            total_keys: metrics.keys_count,
            memory_usage: metrics.memory_usage.clone(),
            trend,
        },
        metrics,
        trend_analysis,
        property_cache_info,
        timestamp: OffsetDateTime::now_utc(),
        recommendations,
    }))
}

async fn inspect_keys(store: &dyn CacheStore) -> PropertyCacheInfo {
    let mut info = PropertyCacheInfo {
        cached_count: 0,
        main_cache_exists: false,
        cache_keys: Vec::new(),
        total_keys_found: 0,
        error: None,
    };

    if !store.supports_patterns() {
        info.error = Some("cache store cannot enumerate keys by pattern".to_string());
        info.main_cache_exists = matches!(store.ttl(&keys::all_key()).await, Ok(Some(_)));
        return info;
    }

    let mut found = Vec::new();
    for pattern in INSPECTION_PATTERNS {
        match store.keys(pattern).await {
            Ok(matched) => found.extend(matched),
            Err(err) => {
                warn!(pattern, error = %err, "Key inspection failed");
                info.error = Some(err.to_string());
            }
        }
    }

    let main_key = keys::all_key();
    info.main_cache_exists = found.contains(&main_key);
    info.cached_count = found.len();
    info.total_keys_found = found.len();
    found.truncate(SAMPLE_KEYS);
    info.cache_keys = found;
    info
}
