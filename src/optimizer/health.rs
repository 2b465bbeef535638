//! Health Scoring
//!
//! Scores the latest snapshot of a cache and raises alerts for the breached
//! conditions.

use serde::Serialize;
use tracing::debug;

use super::analysis::{self, PerformanceAnalysis};
use super::tuning::CacheOptimizer;
use crate::domain::models::{CacheAlert, CacheMetricsSnapshot};
use crate::error::{Error, Result};

/// Health band derived from the score
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Critical,
    Poor,
    Fair,
    Good,
    Excellent,
}

impl HealthStatus {
    pub fn from_score(score: u32) -> Self {
        match score {
            90.. => HealthStatus::Excellent,
            75..=89 => HealthStatus::Good,
            50..=74 => HealthStatus::Fair,
            25..=49 => HealthStatus::Poor,
            _ => HealthStatus::Critical,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub cache_name: String,
    /// 0 - 100
    pub score: u32,
    pub status: HealthStatus,
    pub issues: Vec<String>,
    /// Alerts raised or updated by this check
    pub alerts: Vec<CacheAlert>,
    pub snapshot: CacheMetricsSnapshot,
}

/// Score a snapshot: 100 minus a fixed penalty per breached condition
pub fn health_score(snapshot: &CacheMetricsSnapshot) -> (u32, Vec<String>) {
    let mut score: i32 = 100;
    let mut issues = Vec::new();

    if snapshot.hit_ratio < 0.8 {
        score -= 30;
        issues.push(format!("Low hit ratio: {:.1}%", snapshot.hit_ratio * 100.0));
    }
    if snapshot.memory_fraction() > 0.85 {
        score -= 25;
        issues.push(format!(
            "High memory usage: {:.1}%",
            snapshot.memory_usage_percent
        ));
    }
    if snapshot.avg_response_time_ms > 100.0 {
        score -= 20;
        issues.push(format!(
            "Slow response time: {:.1}ms",
            snapshot.avg_response_time_ms
        ));
    }
    if snapshot.error_rate() > 0.05 {
        score -= 25;
        issues.push(format!("High error rate: {:.1}%", snapshot.error_rate() * 100.0));
    }

    (score.max(0) as u32, issues)
}

impl CacheOptimizer {
    /// Analyze the last `days` of snapshots
    pub async fn analyze_cache_performance(
        &self,
        cache_name: &str,
        days: u32,
    ) -> Result<PerformanceAnalysis> {
        let window = std::time::Duration::from_secs(u64::from(days) * 24 * 3600);
        let snapshots = self.window(cache_name, window).await?;
        analysis::analyze(cache_name, days, &snapshots)
    }

    /// Score the latest snapshot and raise alerts for breaches
    pub async fn monitor_cache_health(&self, cache_name: &str) -> Result<HealthReport> {
        let snapshot = self
            .metrics
            .latest(cache_name)
            .await?
            .ok_or_else(|| Error::NoMetricsData(cache_name.to_string()))?;

        let (score, issues) = health_score(&snapshot);
        let alerts = match &self.alerts {
            Some(engine) => engine.evaluate(&snapshot).await?,
            None => Vec::new(),
        };
        debug!(cache = %cache_name, score, alerts = alerts.len(), "Health checked");

        Ok(HealthReport {
            cache_name: cache_name.to_string(),
            score,
            status: HealthStatus::from_score(score),
            issues,
            alerts,
            snapshot,
        })
    }
}
