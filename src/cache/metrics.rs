//! Hit-ratio collection, grading and trends.
//!
//! Raw counters come from the store's own statistics. Each collection appends a
//! [`MetricsSample`] to a bounded history kept in the store under
//! [`METRICS_HISTORY_KEY`]; the history only feeds trend reports.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use metrics::gauge;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{error, info, warn};

use crate::util::bytes::format_bytes;
use crate::util::duration::format_seconds;

use super::error::CacheError;
use super::store::{CacheStore, StoreInfo};

pub const METRICS_HISTORY_KEY: &str = "cache_metrics_history";
pub const DEFAULT_HISTORY_CAPACITY: usize = 1440;

const TREND_WINDOW: usize = 10;
const MEMORY_WARNING_BYTES: u64 = 100 * 1024 * 1024;
const METRIC_HIT_RATIO: &str = "casale_cache_hit_ratio";

/// `hits / (hits + misses)`, or `0` before any lookup.
pub fn hit_ratio(hits: u64, misses: u64) -> f64 {
    let total = hits.saturating_add(misses);
    if total == 0 {
        return 0.0;
    }
    hits as f64 / total as f64
}

fn round_to(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSample {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub hit_percentage: f64,
    pub hits: u64,
    pub misses: u64,
    pub keys_count: u64,
    pub connected_clients: u64,
}

/// Bounded FIFO of samples; the oldest is evicted first.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsHistory {
    samples: VecDeque<MetricsSample>,
    capacity: usize,
}

impl MetricsHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    pub fn from_samples(samples: Vec<MetricsSample>, capacity: usize) -> Self {
        let mut history = Self::new(capacity);
        for sample in samples {
            history.push(sample);
        }
        history
    }

    pub fn push(&mut self, sample: MetricsSample) {
        while self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> impl Iterator<Item = &MetricsSample> {
        self.samples.iter()
    }

    /// Hit percentages of the last `n` samples, oldest first.
    fn recent_percentages(&self, n: usize) -> Vec<f64> {
        let skip = self.samples.len().saturating_sub(n);
        self.samples()
            .skip(skip)
            .map(|sample| sample.hit_percentage)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Grade {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl Grade {
    pub fn from_hit_percentage(hit_percentage: f64) -> Self {
        if hit_percentage >= 90.0 {
            Grade::Excellent
        } else if hit_percentage >= 80.0 {
            Grade::Good
        } else if hit_percentage >= 70.0 {
            Grade::Fair
        } else {
            Grade::Poor
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Grade::Excellent => "Excellent",
            Grade::Good => "Good",
            Grade::Fair => "Fair",
            Grade::Poor => "Poor",
        }
    }
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceEvaluation {
    pub grade: Grade,
    pub message: String,
    pub recommendations: Vec<String>,
}

pub fn evaluate(hit_percentage: f64, memory_bytes: u64) -> PerformanceEvaluation {
    let grade = Grade::from_hit_percentage(hit_percentage);
    let (message, recommendations): (&str, Vec<&str>) = match grade {
        Grade::Excellent => ("Cache is performing optimally", Vec::new()),
        Grade::Good if hit_percentage < 85.0 => (
            "Cache performance is good",
            vec!["Consider increasing cache timeout for frequently accessed data"],
        ),
        Grade::Good => ("Cache performance is good", Vec::new()),
        Grade::Fair => (
            "Cache performance is acceptable but could be improved",
            vec![
                "Review cache keys and expiration times",
                "Consider implementing cache warming for hot data",
                "Monitor cache patterns for optimization opportunities",
            ],
        ),
        Grade::Poor => (
            "Cache performance needs improvement",
            vec![
                "Investigate why cache misses are high",
                "Review cache invalidation strategies",
                "Consider increasing cache size or implementing multi-level caching",
                "Profile application to identify hot data patterns",
            ],
        ),
    };

    let mut recommendations: Vec<String> =
        recommendations.into_iter().map(String::from).collect();
    if memory_bytes > MEMORY_WARNING_BYTES {
        recommendations.push(format!(
            "Cache using {}. Consider memory optimization.",
            format_bytes(memory_bytes)
        ));
    }

    PerformanceEvaluation {
        grade,
        message: message.to_string(),
        recommendations,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Success,
    Error,
}

/// Result of one collection. Store failures produce `status: error` instead of an `Err`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetrics {
    pub status: ReportStatus,
    pub message: String,
    pub hits: u64,
    pub misses: u64,
    pub hit_ratio: f64,
    pub hit_percentage: f64,
    pub total_operations: u64,
    pub keys_count: u64,
    pub memory_usage: String,
    pub memory_peak: String,
    pub memory_bytes: u64,
    pub uptime: String,
    pub connected_clients: u64,
    pub cache_backend: String,
    pub version: Option<String>,
    pub evicted_keys: u64,
    pub expired_keys: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<PerformanceEvaluation>,
}

impl CacheMetrics {
    pub fn from_info(info: &StoreInfo, timestamp: OffsetDateTime) -> Self {
        let ratio = hit_ratio(info.hits, info.misses);
        let hit_percentage = round_to(ratio * 100.0, 2);
        Self {
            status: ReportStatus::Success,
            message: String::new(),
            hits: info.hits,
            misses: info.misses,
            hit_ratio: round_to(ratio, 4),
            hit_percentage,
            total_operations: info.hits.saturating_add(info.misses),
            keys_count: info.keys_count,
            memory_usage: format_bytes(info.memory_bytes),
            memory_peak: format_bytes(info.memory_peak_bytes),
            memory_bytes: info.memory_bytes,
            uptime: format_seconds(info.uptime_seconds),
            connected_clients: info.connected_clients,
            cache_backend: info.backend.clone(),
            version: info.version.clone(),
            evicted_keys: info.evicted_keys,
            expired_keys: info.expired_keys,
            timestamp,
            performance: Some(evaluate(hit_percentage, info.memory_bytes)),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ReportStatus::Error,
            message: message.into(),
            hits: 0,
            misses: 0,
            hit_ratio: 0.0,
            hit_percentage: 0.0,
            total_operations: 0,
            keys_count: 0,
            memory_usage: "N/A".to_string(),
            memory_peak: "N/A".to_string(),
            memory_bytes: 0,
            uptime: "N/A".to_string(),
            connected_clients: 0,
            cache_backend: "unknown".to_string(),
            version: None,
            evicted_keys: 0,
            expired_keys: 0,
            timestamp: OffsetDateTime::now_utc(),
            performance: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ReportStatus::Success
    }

    fn sample(&self) -> MetricsSample {
        MetricsSample {
            timestamp: self.timestamp,
            hit_percentage: self.hit_percentage,
            hits: self.hits,
            misses: self.misses,
            keys_count: self.keys_count,
            connected_clients: self.connected_clients,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendLabel {
    ImprovingSignificantly,
    Improving,
    Stable,
    Declining,
    DecliningSignificantly,
    Unknown,
}

impl TrendLabel {
    pub fn classify(delta: f64) -> Self {
        if delta > 5.0 {
            TrendLabel::ImprovingSignificantly
        } else if delta > 1.0 {
            TrendLabel::Improving
        } else if delta < -5.0 {
            TrendLabel::DecliningSignificantly
        } else if delta < -1.0 {
            TrendLabel::Declining
        } else {
            TrendLabel::Stable
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendStatus {
    Success,
    InsufficientData,
    NoData,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub status: TrendStatus,
    pub trend: TrendLabel,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_hit_rate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_hit_rate: Option<f64>,
    pub data_points: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_period: Option<String>,
}

impl TrendReport {
    fn error(message: impl Into<String>) -> Self {
        Self {
            status: TrendStatus::Error,
            trend: TrendLabel::Unknown,
            message: message.into(),
            trend_value: None,
            current_hit_rate: None,
            average_hit_rate: None,
            data_points: 0,
            time_period: None,
        }
    }
}

/// Compare the first and last of the most recent ten samples.
pub fn trend(history: &MetricsHistory) -> TrendReport {
    let window = history.recent_percentages(TREND_WINDOW);
    let data_points = history.len();

    let (Some(&first), Some(&last)) = (window.first(), window.last()) else {
        return TrendReport {
            status: TrendStatus::NoData,
            trend: TrendLabel::Unknown,
            message: "No historical data available".to_string(),
            trend_value: None,
            current_hit_rate: None,
            average_hit_rate: None,
            data_points,
            time_period: None,
        };
    };
    let average = window.iter().sum::<f64>() / window.len() as f64;

    if window.len() < 2 {
        return TrendReport {
            status: TrendStatus::InsufficientData,
            trend: TrendLabel::Unknown,
            message: "Not enough data for trend analysis".to_string(),
            trend_value: None,
            current_hit_rate: Some(last),
            average_hit_rate: Some(average),
            data_points,
            time_period: None,
        };
    }

    let delta = last - first;
    let trend = TrendLabel::classify(delta);
    let message = match trend {
        TrendLabel::ImprovingSignificantly | TrendLabel::Improving => {
            format!("Hit rate improved by {delta:.1}%")
        }
        TrendLabel::DecliningSignificantly | TrendLabel::Declining => {
            format!("Hit rate declined by {:.1}%", delta.abs())
        }
        TrendLabel::Stable | TrendLabel::Unknown => "Hit rate is stable".to_string(),
    };

    TrendReport {
        status: TrendStatus::Success,
        trend,
        message,
        trend_value: Some(delta),
        current_hit_rate: Some(last),
        average_hit_rate: Some(average),
        data_points,
        time_period: Some(format!("{data_points} minutes")),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetReport {
    pub status: ReportStatus,
    pub message: String,
    #[serde(
        with = "time::serde::rfc3339::option",
        skip_serializing_if = "Option::is_none",
        default
    )]
    pub timestamp: Option<OffsetDateTime>,
}

pub struct MetricsCollector {
    store: Arc<dyn CacheStore>,
    history_capacity: usize,
}

impl MetricsCollector {
    pub fn new(store: Arc<dyn CacheStore>, history_capacity: usize) -> Self {
        Self {
            store,
            history_capacity,
        }
    }

    /// Read store statistics, grade them and append a history sample.
    pub async fn collect(&self) -> CacheMetrics {
        let info = match self.store.info().await {
            Ok(info) => info,
            Err(err) => {
                let metrics = CacheMetrics::error(format!("Cache store unavailable: {err}"));
                error!(error = %err, "Cache metrics unavailable");
                return metrics;
            }
        };

        let metrics = CacheMetrics::from_info(&info, OffsetDateTime::now_utc());
        gauge!(METRIC_HIT_RATIO).set(metrics.hit_ratio);
        info!(
            hits = metrics.hits,
            misses = metrics.misses,
            hit_percentage = metrics.hit_percentage,
            keys = metrics.keys_count,
            memory = %metrics.memory_usage,
            "Cache metrics collected"
        );

        if let Err(err) = self.append_sample(metrics.sample()).await {
            warn!(error = %err, "Metrics history not updated");
        }

        metrics
    }

    pub async fn history(&self) -> Result<MetricsHistory, CacheError> {
        let raw = self.store.list(METRICS_HISTORY_KEY).await?;
        let samples = raw
            .iter()
            .filter_map(|item| match serde_json::from_slice(item) {
                Ok(sample) => Some(sample),
                Err(err) => {
                    warn!(error = %err, "Skipping unreadable metrics sample");
                    None
                }
            })
            .collect();
        Ok(MetricsHistory::from_samples(samples, self.history_capacity))
    }

    pub async fn trend(&self) -> TrendReport {
        match self.history().await {
            Ok(history) => trend(&history),
            Err(err) => {
                error!(error = %err, "Metrics trend unavailable");
                TrendReport::error(err.to_string())
            }
        }
    }

    /// Clear the store's hit/miss statistics and the sample history.
    pub async fn reset(&self) -> ResetReport {
        let outcome = async {
            self.store.reset_stats().await?;
            self.store.delete(METRICS_HISTORY_KEY).await?;
            Ok::<_, CacheError>(())
        }
        .await;

        match outcome {
            Ok(()) => {
                info!("Cache metrics reset");
                ResetReport {
                    status: ReportStatus::Success,
                    message: "Cache metrics reset successfully".to_string(),
                    timestamp: Some(OffsetDateTime::now_utc()),
                }
            }
            Err(err) => {
                error!(error = %err, "Cache metrics reset failed");
                ResetReport {
                    status: ReportStatus::Error,
                    message: err.to_string(),
                    timestamp: None,
                }
            }
        }
    }

    async fn append_sample(&self, sample: MetricsSample) -> Result<(), CacheError> {
        let encoded =
            serde_json::to_vec(&sample).map_err(|err| CacheError::Serialization(err.to_string()))?;
        self.store
            .push_bounded(
                METRICS_HISTORY_KEY,
                Bytes::from(encoded),
                self.history_capacity.max(1),
            )
            .await?;
        Ok(())
    }
}
