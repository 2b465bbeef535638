//! Cache Benchmark
//!
//! Drives set/get/delete traffic through the manager for a fixed duration.
//! Every iteration writes a value and reads it back; a read that does not
//! return the written value counts as a get error. Every tenth iteration
//! also deletes its key.

use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::stats::{mean, median, percentile};
use super::tuning::CacheOptimizer;
use crate::error::{Error, Result};

/// Benchmark keys expire on their own
const BENCH_TTL_SECONDS: u64 = 60;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OperationCounts {
    pub operations: u64,
    pub errors: u64,
    /// Cumulative latency in milliseconds
    pub total_ms: f64,
}

impl OperationCounts {
    fn observe(&mut self, ok: bool, elapsed: Duration, latencies: &mut Vec<f64>) {
        let ms = elapsed.as_secs_f64() * 1000.0;
        self.operations += 1;
        self.total_ms += ms;
        if !ok {
            self.errors += 1;
        }
        latencies.push(ms);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LatencySummary {
    pub mean_ms: f64,
    pub median_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl LatencySummary {
    pub fn from_samples(samples: &[f64]) -> Self {
        Self {
            mean_ms: mean(samples),
            median_ms: median(samples),
            min_ms: samples.iter().copied().reduce(f64::min).unwrap_or(0.0),
            max_ms: samples.iter().copied().reduce(f64::max).unwrap_or(0.0),
            p95_ms: percentile(samples, 95.0),
            p99_ms: percentile(samples, 99.0),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkReport {
    pub cache_name: String,
    pub duration_secs: f64,
    pub iterations: u64,
    pub set: OperationCounts,
    pub get: OperationCounts,
    pub delete: OperationCounts,
    pub latency: LatencySummary,
    /// Operations per second
    pub throughput: f64,
    pub error_rate: f64,
}

impl CacheOptimizer {
    /// Run a benchmark against an active cache for `duration`
    pub async fn benchmark_cache_performance(
        &self,
        cache_name: &str,
        duration: Duration,
    ) -> Result<BenchmarkReport> {
        let config = self.configs.require(cache_name).await?;
        if !config.is_active {
            return Err(Error::Config(format!("cache {} is inactive", cache_name)));
        }

        let manager = &self.manager;
        let mut set = OperationCounts::default();
        let mut get = OperationCounts::default();
        let mut delete = OperationCounts::default();
        let mut latencies = Vec::new();
        let mut iterations: u64 = 0;
        let started = Instant::now();

        while started.elapsed() < duration {
            let key = format!("__benchmark__:{}", iterations);
            let value = json!({ "iteration": iterations, "payload": "x".repeat(64) });

            let t = Instant::now();
            let stored = manager
                .set(&key, &value, cache_name, Some(BENCH_TTL_SECONDS))
                .await;
            set.observe(stored, t.elapsed(), &mut latencies);

            let t = Instant::now();
            let read = manager.get(&key, cache_name).await;
            get.observe(read.as_ref() == Some(&value), t.elapsed(), &mut latencies);

            if iterations % 10 == 0 {
                let t = Instant::now();
                let removal = manager.delete_with(&key, cache_name, "benchmark", None).await;
                delete.observe(removal.is_clean(), t.elapsed(), &mut latencies);
            }
            iterations += 1;
        }

        let elapsed = started.elapsed().as_secs_f64();
        let operations = set.operations + get.operations + delete.operations;
        let errors = set.errors + get.errors + delete.errors;
        let report = BenchmarkReport {
            cache_name: cache_name.to_string(),
            duration_secs: elapsed,
            iterations,
            latency: LatencySummary::from_samples(&latencies),
            throughput: if elapsed > 0.0 {
                operations as f64 / elapsed
            } else {
                0.0
            },
            error_rate: errors as f64 / operations.max(1) as f64,
            set,
            get,
            delete,
        };

        info!(
            cache = %cache_name,
            iterations,
            throughput = report.throughput,
            error_rate = report.error_rate,
            "Benchmark finished"
        );
        Ok(report)
    }
}
