//! In-Memory Repositories
//!
//! [`InMemoryStore`] implements every persistence port. Used by the binary
//! when no external store is wired in, and by tests.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use uuid::Uuid;

use crate::domain::models::{
    AlertKind, CacheAlert, CacheConfiguration, CacheInvalidationRecord, CacheMetricsSnapshot,
    CacheOptimizationRecommendation, CacheWarmingTask, RecommendationStatus,
};
use crate::domain::ports::{
    AlertQuery, AlertRepository, ConfigRepository, InvalidationLog, MetricsQuery,
    MetricsRepository, RecommendationRepository, WarmingTaskRepository,
};
use crate::error::{Error, Result};

/// Process-local implementation of all repository ports
#[derive(Debug, Default)]
pub struct InMemoryStore {
    configs: DashMap<String, CacheConfiguration>,
    snapshots: RwLock<Vec<CacheMetricsSnapshot>>,
    invalidations: RwLock<Vec<CacheInvalidationRecord>>,
    alerts: RwLock<Vec<CacheAlert>>,
    recommendations: DashMap<u64, CacheOptimizationRecommendation>,
    next_recommendation_id: AtomicU64,
    warming_tasks: DashMap<Uuid, CacheWarmingTask>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

// =============================================================================
// Configurations
// =============================================================================

#[async_trait]
impl ConfigRepository for InMemoryStore {
    async fn get(&self, name: &str) -> Result<Option<CacheConfiguration>> {
        Ok(self.configs.get(name).map(|c| c.clone()))
    }

    async fn list(&self) -> Result<Vec<CacheConfiguration>> {
        let mut configs: Vec<_> = self.configs.iter().map(|c| c.clone()).collect();
        configs.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.name.cmp(&b.name)));
        Ok(configs)
    }

    async fn insert(&self, mut config: CacheConfiguration) -> Result<CacheConfiguration> {
        use dashmap::mapref::entry::Entry;

        match self.configs.entry(config.name.clone()) {
            Entry::Occupied(_) => Err(Error::ConfigExists(config.name)),
            Entry::Vacant(slot) => {
                let now = Utc::now();
                config.version = 1;
                config.created_at = now;
                config.updated_at = now;
                slot.insert(config.clone());
                Ok(config)
            }
        }
    }

    async fn update(
        &self,
        mut config: CacheConfiguration,
        expected_version: u64,
    ) -> Result<CacheConfiguration> {
        let mut stored = self
            .configs
            .get_mut(&config.name)
            .ok_or_else(|| Error::ConfigNotFound(config.name.clone()))?;

        if stored.version != expected_version {
            return Err(Error::VersionConflict {
                name: config.name,
                expected: expected_version,
                actual: stored.version,
            });
        }

        config.version = stored.version + 1;
        config.created_at = stored.created_at;
        config.updated_at = Utc::now();
        *stored = config.clone();
        Ok(config)
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.configs.remove(name).is_some())
    }
}

// =============================================================================
// Metrics Snapshots
// =============================================================================

#[async_trait]
impl MetricsRepository for InMemoryStore {
    async fn insert(&self, snapshot: CacheMetricsSnapshot) -> Result<()> {
        self.snapshots.write().push(snapshot);
        Ok(())
    }

    async fn query(&self, query: &MetricsQuery) -> Result<Vec<CacheMetricsSnapshot>> {
        let mut matched: Vec<_> = self
            .snapshots
            .read()
            .iter()
            .filter(|s| query.cache_name.as_deref().map_or(true, |n| s.cache_name == n))
            .filter(|s| query.from.map_or(true, |from| s.timestamp >= from))
            .filter(|s| query.to.map_or(true, |to| s.timestamp <= to))
            .cloned()
            .collect();
        matched.sort_by_key(|s| s.timestamp);
        Ok(matched)
    }

    async fn latest(&self, cache_name: &str) -> Result<Option<CacheMetricsSnapshot>> {
        Ok(self
            .snapshots
            .read()
            .iter()
            .filter(|s| s.cache_name == cache_name)
            .max_by_key(|s| s.timestamp)
            .cloned())
    }

    async fn delete_for_cache(&self, cache_name: &str) -> Result<usize> {
        let mut snapshots = self.snapshots.write();
        let before = snapshots.len();
        snapshots.retain(|s| s.cache_name != cache_name);
        Ok(before - snapshots.len())
    }
}

// =============================================================================
// Invalidation Audit
// =============================================================================

#[async_trait]
impl InvalidationLog for InMemoryStore {
    async fn record(&self, record: CacheInvalidationRecord) -> Result<()> {
        self.invalidations.write().push(record);
        Ok(())
    }

    async fn list(&self, cache_name: Option<&str>) -> Result<Vec<CacheInvalidationRecord>> {
        Ok(self
            .invalidations
            .read()
            .iter()
            .filter(|r| cache_name.map_or(true, |n| r.cache_name == n))
            .cloned()
            .collect())
    }
}

// =============================================================================
// Alerts
// =============================================================================

#[async_trait]
impl AlertRepository for InMemoryStore {
    async fn insert(&self, alert: CacheAlert) -> Result<()> {
        self.alerts.write().push(alert);
        Ok(())
    }

    async fn update(&self, alert: CacheAlert) -> Result<()> {
        let mut alerts = self.alerts.write();
        let slot = alerts
            .iter_mut()
            .find(|a| a.id == alert.id)
            .ok_or_else(|| Error::AlertNotFound(alert.id.to_string()))?;
        *slot = alert;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<CacheAlert>> {
        Ok(self.alerts.read().iter().find(|a| a.id == id).cloned())
    }

    async fn find_open(
        &self,
        cache_name: &str,
        kind: AlertKind,
        since: DateTime<Utc>,
    ) -> Result<Option<CacheAlert>> {
        Ok(self
            .alerts
            .read()
            .iter()
            .filter(|a| {
                a.cache_name == cache_name && a.kind == kind && !a.is_resolved && a.created_at >= since
            })
            .max_by_key(|a| a.created_at)
            .cloned())
    }

    async fn list(&self, query: &AlertQuery) -> Result<Vec<CacheAlert>> {
        let mut matched: Vec<_> = self
            .alerts
            .read()
            .iter()
            .filter(|a| query.cache_name.as_deref().map_or(true, |n| a.cache_name == n))
            .filter(|a| !query.unresolved_only || !a.is_resolved)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(matched)
    }

    async fn delete_for_cache(&self, cache_name: &str) -> Result<usize> {
        let mut alerts = self.alerts.write();
        let before = alerts.len();
        alerts.retain(|a| a.cache_name != cache_name);
        Ok(before - alerts.len())
    }
}

// =============================================================================
// Recommendations
// =============================================================================

#[async_trait]
impl RecommendationRepository for InMemoryStore {
    async fn insert(&self, mut recommendation: CacheOptimizationRecommendation) -> Result<u64> {
        let id = self.next_recommendation_id.fetch_add(1, Ordering::SeqCst) + 1;
        recommendation.id = id;
        self.recommendations.insert(id, recommendation);
        Ok(id)
    }

    async fn get(&self, id: u64) -> Result<Option<CacheOptimizationRecommendation>> {
        Ok(self.recommendations.get(&id).map(|r| r.clone()))
    }

    async fn update(&self, recommendation: CacheOptimizationRecommendation) -> Result<()> {
        let mut slot = self
            .recommendations
            .get_mut(&recommendation.id)
            .ok_or(Error::RecommendationNotFound(recommendation.id))?;
        *slot = recommendation;
        Ok(())
    }

    async fn list(
        &self,
        cache_name: Option<&str>,
        status: Option<RecommendationStatus>,
    ) -> Result<Vec<CacheOptimizationRecommendation>> {
        let mut matched: Vec<_> = self
            .recommendations
            .iter()
            .filter(|r| cache_name.map_or(true, |n| r.cache_name == n))
            .filter(|r| status.map_or(true, |s| r.status == s))
            .map(|r| r.clone())
            .collect();
        matched.sort_by_key(|r| r.id);
        Ok(matched)
    }
}

// =============================================================================
// Warming Tasks
// =============================================================================

#[async_trait]
impl WarmingTaskRepository for InMemoryStore {
    async fn insert(&self, task: CacheWarmingTask) -> Result<()> {
        self.warming_tasks.insert(task.id, task);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<CacheWarmingTask>> {
        Ok(self.warming_tasks.get(&id).map(|t| t.clone()))
    }

    async fn update(&self, task: CacheWarmingTask) -> Result<()> {
        let mut slot = self
            .warming_tasks
            .get_mut(&task.id)
            .ok_or_else(|| Error::WarmingTaskNotFound(task.id.to_string()))?;
        *slot = task;
        Ok(())
    }

    async fn list(&self, cache_name: Option<&str>) -> Result<Vec<CacheWarmingTask>> {
        let mut matched: Vec<_> = self
            .warming_tasks
            .iter()
            .filter(|t| cache_name.map_or(true, |n| t.cache_name == n))
            .map(|t| t.clone())
            .collect();
        matched.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AlertSeverity, BackendType, ConfigMap, OptimizationKind};
    use assert_matches::assert_matches;

    #[tokio::test]
    async fn test_config_versioning() {
        let store = InMemoryStore::new();
        let created = ConfigRepository::insert(&store, CacheConfiguration::new("c", BackendType::Redis))
            .await
            .unwrap();
        assert_eq!(created.version, 1);

        let dup = ConfigRepository::insert(&store, CacheConfiguration::new("c", BackendType::Redis)).await;
        assert_matches!(dup, Err(Error::ConfigExists(_)));

        let updated = ConfigRepository::update(&store, created.clone().with_ttl(60), 1)
            .await
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.ttl_seconds, 60);

        let stale = ConfigRepository::update(&store, created.with_ttl(90), 1).await;
        assert_matches!(
            stale,
            Err(Error::VersionConflict { expected: 1, actual: 2, .. })
        );
    }

    #[tokio::test]
    async fn test_config_list_ordering() {
        let store = InMemoryStore::new();
        for (name, priority) in [("b", 1), ("a", 1), ("z", 0)] {
            ConfigRepository::insert(
                &store,
                CacheConfiguration::new(name, BackendType::Redis).with_priority(priority),
            )
            .await
            .unwrap();
        }
        let names: Vec<_> = ConfigRepository::list(&store)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["z", "a", "b"]);
    }

    #[tokio::test]
    async fn test_metrics_query_window() {
        let store = InMemoryStore::new();
        let mut old = CacheMetricsSnapshot::empty("c");
        old.timestamp = Utc::now() - chrono::Duration::days(10);
        MetricsRepository::insert(&store, old).await.unwrap();
        MetricsRepository::insert(&store, CacheMetricsSnapshot::empty("c")).await.unwrap();
        MetricsRepository::insert(&store, CacheMetricsSnapshot::empty("other")).await.unwrap();

        let recent = store
            .query(&MetricsQuery {
                cache_name: Some("c".into()),
                from: Some(Utc::now() - chrono::Duration::days(1)),
                to: None,
            })
            .await
            .unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(MetricsRepository::delete_for_cache(&store, "c").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_find_open_alert() {
        let store = InMemoryStore::new();
        let alert = CacheAlert::new("c", AlertKind::SlowResponse, AlertSeverity::High, "slow", 100.0, 150.0);
        AlertRepository::insert(&store, alert.clone()).await.unwrap();

        let since = Utc::now() - chrono::Duration::hours(1);
        assert!(store.find_open("c", AlertKind::SlowResponse, since).await.unwrap().is_some());
        assert!(store.find_open("c", AlertKind::HighMemory, since).await.unwrap().is_none());

        let mut resolved = alert;
        resolved.resolve("ops");
        AlertRepository::update(&store, resolved).await.unwrap();
        assert!(store.find_open("c", AlertKind::SlowResponse, since).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recommendation_ids_increment() {
        let store = InMemoryStore::new();
        let rec = CacheOptimizationRecommendation::proposed(
            "c",
            OptimizationKind::Compression,
            ConfigMap::new(),
            ConfigMap::new(),
            "smaller",
            60,
        );
        let first = RecommendationRepository::insert(&store, rec.clone()).await.unwrap();
        let second = RecommendationRepository::insert(&store, rec).await.unwrap();
        assert_eq!((first, second), (1, 2));

        let proposed = RecommendationRepository::list(&store, Some("c"), Some(RecommendationStatus::Proposed))
            .await
            .unwrap();
        assert_eq!(proposed.len(), 2);
    }
}
