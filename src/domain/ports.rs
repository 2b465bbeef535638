//! Domain Ports (Port/Adapter Pattern)
//!
//! Abstractions the cache engine depends on. Backends implement
//! [`CacheBackend`]; persistence collaborators implement the repository
//! traits. `crate::store::InMemoryStore` implements every repository.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Domain Layer                            │
//! │  ┌─────────────────────────────────────────────────────┐    │
//! │  │                    Ports (Traits)                    │    │
//! │  │  CacheBackend │ ConfigRepository │ MetricsRepository │    │
//! │  │  AlertRepository │ RecommendationRepository │ ...    │    │
//! │  └─────────────────────────────────────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Infrastructure Layer                       │
//! │  RedisBackend │ MemcachedBackend │ LocalBackend │ InMemoryStore │
//! └─────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::models::{
    AlertKind, CacheAlert, CacheConfiguration, CacheInvalidationRecord, CacheMetricsSnapshot,
    CacheOptimizationRecommendation, CacheWarmingTask, RecommendationStatus,
};
use crate::error::{Error, Result};

// =============================================================================
// Cache Backend Port
// =============================================================================

/// Backend-native introspection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendStats {
    /// Backend name
    pub backend: String,
    /// Number of keys held
    pub keys: Option<u64>,
    /// Memory used in bytes
    pub memory_used_bytes: Option<u64>,
    /// Memory limit in bytes
    pub memory_total_bytes: Option<u64>,
    /// Backend-reported hit ratio (0.0 - 1.0)
    pub hit_ratio: Option<f64>,
    /// Connected clients
    pub connected_clients: Option<u64>,
}

/// Uniform key/value contract over a concrete store.
///
/// Keys handed to a backend are already namespaced by the manager
/// (`<cache>:<namespace>:<key>`); payloads are opaque bytes.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Backend name used in logs and metrics
    fn name(&self) -> &str;

    /// Read a payload
    async fn get(&self, key: &str) -> Result<Option<Bytes>>;

    /// Store a payload with a TTL (zero TTL = no expiry)
    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<bool>;

    /// Remove a key, returning whether it existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Whether [`CacheBackend::scan`] is supported
    fn supports_pattern_scan(&self) -> bool {
        false
    }

    /// Enumerate keys matching a glob pattern (`*`, `?`, `[...]`, `\\` escapes)
    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let _ = pattern;
        Err(Error::Unsupported {
            backend: self.name().to_string(),
            operation: "scan".to_string(),
        })
    }

    /// Backend-native statistics, if the backend exposes any
    async fn stats(&self) -> Result<Option<BackendStats>> {
        Ok(None)
    }
}

// =============================================================================
// Repository Ports
// =============================================================================

/// Durable store for cache configurations
#[async_trait]
pub trait ConfigRepository: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<CacheConfiguration>>;

    /// All configurations ordered by (priority, name)
    async fn list(&self) -> Result<Vec<CacheConfiguration>>;

    /// Insert a new configuration; fails with `ConfigExists` on duplicates
    async fn insert(&self, config: CacheConfiguration) -> Result<CacheConfiguration>;

    /// Replace a configuration if its stored version equals `expected_version`.
    /// Returns the stored configuration with its version bumped.
    async fn update(
        &self,
        config: CacheConfiguration,
        expected_version: u64,
    ) -> Result<CacheConfiguration>;

    async fn delete(&self, name: &str) -> Result<bool>;
}

/// Filter for metrics history queries
#[derive(Debug, Clone, Default)]
pub struct MetricsQuery {
    pub cache_name: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// Append-only snapshot store
#[async_trait]
pub trait MetricsRepository: Send + Sync {
    async fn insert(&self, snapshot: CacheMetricsSnapshot) -> Result<()>;

    /// Snapshots matching the filter, oldest first
    async fn query(&self, query: &MetricsQuery) -> Result<Vec<CacheMetricsSnapshot>>;

    /// Most recent snapshot for a cache
    async fn latest(&self, cache_name: &str) -> Result<Option<CacheMetricsSnapshot>>;

    async fn delete_for_cache(&self, cache_name: &str) -> Result<usize>;
}

/// Append-only invalidation audit log
#[async_trait]
pub trait InvalidationLog: Send + Sync {
    async fn record(&self, record: CacheInvalidationRecord) -> Result<()>;

    async fn list(&self, cache_name: Option<&str>) -> Result<Vec<CacheInvalidationRecord>>;
}

/// Filter for alert listings
#[derive(Debug, Clone, Default)]
pub struct AlertQuery {
    pub cache_name: Option<String>,
    pub unresolved_only: bool,
}

/// Alert store
#[async_trait]
pub trait AlertRepository: Send + Sync {
    async fn insert(&self, alert: CacheAlert) -> Result<()>;

    async fn update(&self, alert: CacheAlert) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<CacheAlert>>;

    /// Unresolved alert of a kind for a cache created at or after `since`
    async fn find_open(
        &self,
        cache_name: &str,
        kind: AlertKind,
        since: DateTime<Utc>,
    ) -> Result<Option<CacheAlert>>;

    /// Matching alerts, newest first
    async fn list(&self, query: &AlertQuery) -> Result<Vec<CacheAlert>>;

    async fn delete_for_cache(&self, cache_name: &str) -> Result<usize>;
}

/// Recommendation store with auto-increment ids
#[async_trait]
pub trait RecommendationRepository: Send + Sync {
    /// Insert and return the assigned id
    async fn insert(&self, recommendation: CacheOptimizationRecommendation) -> Result<u64>;

    async fn get(&self, id: u64) -> Result<Option<CacheOptimizationRecommendation>>;

    async fn update(&self, recommendation: CacheOptimizationRecommendation) -> Result<()>;

    /// Matching recommendations, ordered by id
    async fn list(
        &self,
        cache_name: Option<&str>,
        status: Option<RecommendationStatus>,
    ) -> Result<Vec<CacheOptimizationRecommendation>>;
}

/// Warming task store
#[async_trait]
pub trait WarmingTaskRepository: Send + Sync {
    async fn insert(&self, task: CacheWarmingTask) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<CacheWarmingTask>>;

    async fn update(&self, task: CacheWarmingTask) -> Result<()>;

    async fn list(&self, cache_name: Option<&str>) -> Result<Vec<CacheWarmingTask>>;
}

// =============================================================================
// Event Publisher Port
// =============================================================================

/// Port for publishing domain events (audit trail, external subscribers).
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish a domain event.
    async fn publish(&self, event: super::events::DomainEvent) -> Result<()>;

    /// Publish multiple events.
    async fn publish_all(&self, events: Vec<super::events::DomainEvent>) -> Result<()> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}
