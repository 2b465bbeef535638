//! Prometheus Telemetry
//!
//! Process metrics exported on `/metrics`, registered into an explicit
//! [`Registry`] so tests and embedders can keep their own.

use prometheus::{HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry};

use crate::error::{Error, Result};

/// Prometheus collectors for cache traffic
#[derive(Clone)]
pub struct CacheTelemetry {
    registry: Registry,
    /// `layercache_requests_total{cache,outcome}`
    pub requests: IntCounterVec,
    /// `layercache_operation_seconds{cache,op}`
    pub operation_seconds: HistogramVec,
    /// `layercache_backend_errors_total{backend}`
    pub backend_errors: IntCounterVec,
}

fn prom_err(e: prometheus::Error) -> Error {
    Error::Internal(format!("Prometheus registration failed: {}", e))
}

impl CacheTelemetry {
    /// Create and register collectors
    pub fn register(registry: Registry) -> Result<Self> {
        let requests = IntCounterVec::new(
            Opts::new("layercache_requests_total", "Cache requests by outcome"),
            &["cache", "outcome"],
        )
        .map_err(prom_err)?;

        let operation_seconds = HistogramVec::new(
            HistogramOpts::new(
                "layercache_operation_seconds",
                "Latency of cache operations across all tiers",
            )
            .buckets(vec![
                0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
            &["cache", "op"],
        )
        .map_err(prom_err)?;

        let backend_errors = IntCounterVec::new(
            Opts::new("layercache_backend_errors_total", "Backend adapter failures"),
            &["backend"],
        )
        .map_err(prom_err)?;

        registry
            .register(Box::new(requests.clone()))
            .map_err(prom_err)?;
        registry
            .register(Box::new(operation_seconds.clone()))
            .map_err(prom_err)?;
        registry
            .register(Box::new(backend_errors.clone()))
            .map_err(prom_err)?;

        Ok(Self {
            registry,
            requests,
            operation_seconds,
            backend_errors,
        })
    }

    /// Registry the collectors live in
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Render the registry in text exposition format
    pub fn render(&self) -> Result<String> {
        use prometheus::{Encoder, TextEncoder};

        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(prom_err)?;
        String::from_utf8(buffer).map_err(|e| Error::Internal(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_includes_series() {
        let telemetry = CacheTelemetry::register(Registry::new()).unwrap();
        telemetry
            .requests
            .with_label_values(&["catalog", "hit"])
            .inc();
        telemetry
            .operation_seconds
            .with_label_values(&["catalog", "get"])
            .observe(0.002);

        let text = telemetry.render().unwrap();
        assert!(text.contains("layercache_requests_total{cache=\"catalog\",outcome=\"hit\"} 1"));
        assert!(text.contains("layercache_operation_seconds_bucket"));
    }

    #[test]
    fn test_double_registration_fails() {
        let registry = Registry::new();
        CacheTelemetry::register(registry.clone()).unwrap();
        assert!(CacheTelemetry::register(registry).is_err());
    }
}
