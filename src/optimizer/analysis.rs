//! Performance Analysis
//!
//! Summaries, trends, bottlenecks and a composite score over a window of
//! snapshots.

use serde::Serialize;

use super::stats::{mean, standardized_slope};
use crate::domain::models::{AlertSeverity, CacheMetricsSnapshot};
use crate::error::{Error, Result};

/// Direction of a quality metric (hit ratio, response time)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Declining,
    Stable,
}

/// Direction of a quantity (memory)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Growth {
    Increasing,
    Decreasing,
    Stable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub samples: usize,
    pub mean_hit_ratio: f64,
    pub mean_response_time_ms: f64,
    pub mean_memory_percent: f64,
    pub total_operations: u64,
    pub total_errors: u64,
    pub error_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Trends {
    pub hit_ratio: Trend,
    pub response_time: Trend,
    pub memory: Growth,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bottleneck {
    pub area: &'static str,
    pub severity: AlertSeverity,
    pub description: String,
    pub impact: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceAnalysis {
    pub cache_name: String,
    pub window_days: u32,
    pub summary: PerformanceSummary,
    pub trends: Trends,
    pub bottlenecks: Vec<Bottleneck>,
    pub recommendations: Vec<String>,
    /// 0 - 100
    pub performance_score: f64,
}

/// Summarize snapshots (any order)
pub fn summarize(snapshots: &[CacheMetricsSnapshot]) -> PerformanceSummary {
    let hit: Vec<f64> = snapshots.iter().map(|s| s.hit_ratio).collect();
    let rt: Vec<f64> = snapshots.iter().map(|s| s.avg_response_time_ms).collect();
    let mem: Vec<f64> = snapshots.iter().map(|s| s.memory_usage_percent).collect();
    let total_operations: u64 = snapshots.iter().map(|s| s.total_operations()).sum();
    let total_errors: u64 = snapshots.iter().map(|s| s.error_count).sum();

    PerformanceSummary {
        samples: snapshots.len(),
        mean_hit_ratio: mean(&hit),
        mean_response_time_ms: mean(&rt),
        mean_memory_percent: mean(&mem),
        total_operations,
        total_errors,
        error_rate: total_errors as f64 / total_operations.max(1) as f64,
    }
}

fn slope_of(snapshots: &[CacheMetricsSnapshot], metric: impl Fn(&CacheMetricsSnapshot) -> f64) -> f64 {
    let xs: Vec<f64> = snapshots
        .iter()
        .map(|s| s.timestamp.timestamp_millis() as f64 / 1000.0)
        .collect();
    let ys: Vec<f64> = snapshots.iter().map(metric).collect();
    standardized_slope(&xs, &ys)
}

/// Regression trends over time
pub fn trends(snapshots: &[CacheMetricsSnapshot]) -> Trends {
    let quality = |slope: f64, higher_is_better: bool| {
        if slope == 0.0 {
            Trend::Stable
        } else if (slope > 0.0) == higher_is_better {
            Trend::Improving
        } else {
            Trend::Declining
        }
    };

    let memory = slope_of(snapshots, |s| s.memory_usage_percent);
    Trends {
        hit_ratio: quality(slope_of(snapshots, |s| s.hit_ratio), true),
        response_time: quality(slope_of(snapshots, |s| s.avg_response_time_ms), false),
        memory: if memory > 0.0 {
            Growth::Increasing
        } else if memory < 0.0 {
            Growth::Decreasing
        } else {
            Growth::Stable
        },
    }
}

pub fn bottlenecks(summary: &PerformanceSummary) -> Vec<Bottleneck> {
    let mut found = Vec::new();
    if summary.mean_hit_ratio < 0.7 {
        found.push(Bottleneck {
            area: "hit_ratio",
            severity: AlertSeverity::High,
            description: format!("Low hit ratio: {:.1}%", summary.mean_hit_ratio * 100.0),
            impact: "Increased load on the source of truth and slower responses",
        });
    }
    if summary.mean_response_time_ms > 100.0 {
        found.push(Bottleneck {
            area: "response_time",
            severity: AlertSeverity::Medium,
            description: format!(
                "Slow response time: {:.1}ms",
                summary.mean_response_time_ms
            ),
            impact: "Degraded latency for every caller",
        });
    }
    if summary.mean_memory_percent > 85.0 {
        found.push(Bottleneck {
            area: "memory",
            severity: AlertSeverity::High,
            description: format!("High memory usage: {:.1}%", summary.mean_memory_percent),
            impact: "Premature evictions and possible out-of-memory failures",
        });
    }
    found
}

pub fn recommendations(summary: &PerformanceSummary) -> Vec<String> {
    let mut out = Vec::new();
    if summary.mean_hit_ratio < 0.8 {
        out.push("Increase TTL for frequently accessed keys to raise the hit ratio".to_string());
    }
    if summary.mean_response_time_ms > 50.0 {
        out.push("Optimize value serialization or enable compression to cut response time".to_string());
    }
    if summary.mean_memory_percent > 80.0 {
        out.push("Raise the memory allocation or tighten the eviction policy".to_string());
    }
    out
}

/// Composite 0 - 100 score.
///
/// The error term is scaled by 100 before weighting, so any cache with a
/// low error rate saturates the clamp.
pub fn performance_score(summary: &PerformanceSummary) -> f64 {
    let hit = summary.mean_hit_ratio * 40.0;
    let response = (100.0 - summary.mean_response_time_ms).max(0.0) / 100.0 * 30.0;
    let memory = (100.0 - summary.mean_memory_percent).max(0.0) / 100.0 * 20.0;
    let errors = (1.0 - summary.error_rate) * 100.0 * 10.0;
    (hit + response + memory + errors).clamp(0.0, 100.0)
}

/// Full analysis; `NoMetricsData` when the window is empty
pub fn analyze(
    cache_name: &str,
    window_days: u32,
    snapshots: &[CacheMetricsSnapshot],
) -> Result<PerformanceAnalysis> {
    if snapshots.is_empty() {
        return Err(Error::NoMetricsData(cache_name.to_string()));
    }
    let summary = summarize(snapshots);
    Ok(PerformanceAnalysis {
        cache_name: cache_name.to_string(),
        window_days,
        trends: trends(snapshots),
        bottlenecks: bottlenecks(&summary),
        recommendations: recommendations(&summary),
        performance_score: performance_score(&summary),
        summary,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use chrono::{Duration, Utc};

    fn series(hit: &[f64], rt: &[f64], mem: &[f64]) -> Vec<CacheMetricsSnapshot> {
        let start = Utc::now() - Duration::hours(hit.len() as i64);
        hit.iter()
            .zip(rt)
            .zip(mem)
            .enumerate()
            .map(|(i, ((h, r), m))| {
                let mut s = CacheMetricsSnapshot::empty("c");
                s.hit_ratio = *h;
                s.avg_response_time_ms = *r;
                s.memory_usage_percent = *m;
                s.get_operations = 100;
                s.timestamp = start + Duration::hours(i as i64);
                s
            })
            .collect()
    }

    #[test]
    fn test_empty_is_no_data() {
        assert_matches!(analyze("c", 7, &[]), Err(Error::NoMetricsData(_)));
    }

    #[test]
    fn test_trends() {
        let s = series(&[0.5, 0.6, 0.7], &[30.0, 20.0, 10.0], &[40.0, 50.0, 60.0]);
        let t = trends(&s);
        assert_eq!(t.hit_ratio, Trend::Improving);
        assert_eq!(t.response_time, Trend::Improving);
        assert_eq!(t.memory, Growth::Increasing);

        let flat = series(&[0.6, 0.6], &[10.0, 10.0], &[5.0, 5.0]);
        let t = trends(&flat);
        assert_eq!(t.hit_ratio, Trend::Stable);
        assert_eq!(t.memory, Growth::Stable);

        let single = series(&[0.1], &[500.0], &[99.0]);
        assert_eq!(trends(&single).response_time, Trend::Stable);
    }

    #[test]
    fn test_bottlenecks_and_recommendations() {
        let s = series(&[0.6, 0.6], &[120.0, 120.0], &[90.0, 90.0]);
        let analysis = analyze("c", 7, &s).unwrap();
        let areas: Vec<_> = analysis.bottlenecks.iter().map(|b| b.area).collect();
        assert_eq!(areas, vec!["hit_ratio", "response_time", "memory"]);
        assert_eq!(analysis.recommendations.len(), 3);
        assert_eq!(analysis.summary.total_operations, 200);
    }

    #[test]
    fn test_score_saturates() {
        let s = series(&[0.9], &[10.0], &[30.0]);
        assert_eq!(performance_score(&summarize(&s)), 100.0);

        let mut summary = summarize(&s);
        summary.error_rate = 1.0;
        summary.mean_hit_ratio = 0.0;
        summary.mean_response_time_ms = 200.0;
        summary.mean_memory_percent = 100.0;
        assert_eq!(performance_score(&summary), 0.0);
    }
}
