//! Configuration Store
//!
//! Wraps a [`ConfigRepository`] with validation at the write boundary, an
//! in-process read cache with a refresh interval, and change events.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, info};

use crate::domain::events::DomainEvent;
use crate::domain::models::CacheConfiguration;
use crate::domain::ports::{ConfigRepository, EventPublisher};
use crate::error::{Error, Result};

/// Default refresh interval for cached configurations
pub const DEFAULT_REFRESH: Duration = Duration::from_secs(30);

struct CachedConfig {
    config: CacheConfiguration,
    loaded_at: Instant,
}

/// Validated, cached access to cache configurations
pub struct ConfigStore {
    repo: Arc<dyn ConfigRepository>,
    events: Option<Arc<dyn EventPublisher>>,
    cache: RwLock<HashMap<String, CachedConfig>>,
    refresh: Duration,
}

impl ConfigStore {
    pub fn new(repo: Arc<dyn ConfigRepository>) -> Self {
        Self {
            repo,
            events: None,
            cache: RwLock::new(HashMap::new()),
            refresh: DEFAULT_REFRESH,
        }
    }

    /// Override the refresh interval (zero disables caching)
    pub fn with_refresh(mut self, refresh: Duration) -> Self {
        self.refresh = refresh;
        self
    }

    /// Publish configuration events
    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Resolve a configuration, served from cache while fresh.
    ///
    /// Only existing configurations are cached; unknown names always go to
    /// the repository and never grow the cache.
    pub async fn get(&self, name: &str) -> Result<Option<CacheConfiguration>> {
        if !self.refresh.is_zero() {
            if let Some(cached) = self.cache.read().get(name) {
                if cached.loaded_at.elapsed() < self.refresh {
                    return Ok(Some(cached.config.clone()));
                }
            }
        }

        match self.repo.get(name).await? {
            Some(config) => {
                self.remember(&config);
                Ok(Some(config))
            }
            None => {
                self.invalidate(name);
                Ok(None)
            }
        }
    }

    /// Number of configurations held in the read cache
    pub fn cached(&self) -> usize {
        self.cache.read().len()
    }

    /// Resolve a configuration or fail with `ConfigNotFound`
    pub async fn require(&self, name: &str) -> Result<CacheConfiguration> {
        self.get(name)
            .await?
            .ok_or_else(|| Error::ConfigNotFound(name.to_string()))
    }

    /// All configurations ordered by (priority, name)
    pub async fn list(&self) -> Result<Vec<CacheConfiguration>> {
        self.repo.list().await
    }

    /// Validate and create a configuration
    pub async fn create(
        &self,
        config: CacheConfiguration,
        actor: Option<&str>,
    ) -> Result<CacheConfiguration> {
        config.validate()?;
        let created = self.repo.insert(config).await?;
        self.remember(&created);

        info!(cache = %created.name, backend = %created.backend_type, "Cache configuration created");
        self.publish(DomainEvent::configuration_changed(
            &created.name,
            created.version,
            actor.map(str::to_string),
        ))
        .await;
        Ok(created)
    }

    /// Validate and replace a configuration, rejecting stale versions
    pub async fn update(
        &self,
        config: CacheConfiguration,
        expected_version: u64,
        actor: Option<&str>,
    ) -> Result<CacheConfiguration> {
        config.validate()?;
        let name = config.name.clone();
        let result = self.repo.update(config, expected_version).await;

        match result {
            Ok(updated) => {
                self.remember(&updated);
                info!(cache = %updated.name, version = updated.version, "Cache configuration updated");
                self.publish(DomainEvent::configuration_changed(
                    &updated.name,
                    updated.version,
                    actor.map(str::to_string),
                ))
                .await;
                Ok(updated)
            }
            Err(e) => {
                // A conflict means our cached copy is stale too
                self.invalidate(&name);
                Err(e)
            }
        }
    }

    /// Remove a configuration record. Callers purge entries and history first.
    pub async fn delete(&self, name: &str) -> Result<bool> {
        let deleted = self.repo.delete(name).await?;
        self.invalidate(name);
        if deleted {
            info!(cache = %name, "Cache configuration deleted");
        }
        Ok(deleted)
    }

    /// Drop a cached entry so the next read goes to the repository
    pub fn invalidate(&self, name: &str) {
        self.cache.write().remove(name);
    }

    /// Drop every cached entry
    pub fn invalidate_all(&self) {
        self.cache.write().clear();
    }

    fn remember(&self, config: &CacheConfiguration) {
        if self.refresh.is_zero() {
            return;
        }
        self.cache.write().insert(
            config.name.clone(),
            CachedConfig {
                config: config.clone(),
                loaded_at: Instant::now(),
            },
        );
    }

    async fn publish(&self, event: DomainEvent) {
        if let Some(events) = &self.events {
            if let Err(e) = events.publish(event).await {
                debug!(error = %e, "Failed to publish configuration event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::BackendType;
    use crate::store::InMemoryStore;
    use assert_matches::assert_matches;

    fn store() -> (Arc<InMemoryStore>, ConfigStore) {
        let repo = Arc::new(InMemoryStore::new());
        let configs = ConfigStore::new(repo.clone());
        (repo, configs)
    }

    #[tokio::test]
    async fn test_validation_at_write_boundary() {
        let (_, configs) = store();
        let invalid = CacheConfiguration::new("c", BackendType::Redis).with_max_size_mb(0);
        assert_matches!(
            configs.create(invalid, None).await,
            Err(Error::Validation { field, .. }) if field == "max_size_mb"
        );
        assert!(configs.get("c").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cached_reads_refresh_on_local_write() {
        let (repo, configs) = store();
        let created = configs
            .create(CacheConfiguration::new("c", BackendType::Redis), Some("admin"))
            .await
            .unwrap();

        // Out-of-band write is not visible until refresh
        ConfigRepository::update(repo.as_ref(), created.clone().with_ttl(10), 1)
            .await
            .unwrap();
        assert_eq!(configs.get("c").await.unwrap().unwrap().ttl_seconds, 3600);

        configs.invalidate("c");
        let fresh = configs.get("c").await.unwrap().unwrap();
        assert_eq!(fresh.ttl_seconds, 10);

        // Local write refreshes the cache
        let updated = configs.update(fresh.clone().with_ttl(20), fresh.version, None).await.unwrap();
        assert_eq!(updated.version, 3);
        assert_eq!(configs.get("c").await.unwrap().unwrap().ttl_seconds, 20);
    }

    #[tokio::test]
    async fn test_stale_update_rejected() {
        let (_, configs) = store();
        let created = configs
            .create(CacheConfiguration::new("c", BackendType::Redis), None)
            .await
            .unwrap();
        configs.update(created.clone().with_ttl(5), 1, None).await.unwrap();

        assert_matches!(
            configs.update(created.with_ttl(6), 1, None).await,
            Err(Error::VersionConflict { .. })
        );
        assert_eq!(configs.require("c").await.unwrap().ttl_seconds, 5);
    }

    #[tokio::test]
    async fn test_unknown_names_are_not_cached() {
        let (repo, configs) = store();
        for i in 0..100 {
            assert!(configs.get(&format!("typo-{}", i)).await.unwrap().is_none());
        }
        assert_eq!(configs.cached(), 0);

        // A configuration written elsewhere is visible right after a miss
        assert!(configs.get("late").await.unwrap().is_none());
        ConfigRepository::insert(repo.as_ref(), CacheConfiguration::new("late", BackendType::Redis))
            .await
            .unwrap();
        assert!(configs.get("late").await.unwrap().is_some());
        assert_eq!(configs.cached(), 1);
    }

    #[tokio::test]
    async fn test_require_missing() {
        let (_, configs) = store();
        assert_matches!(configs.require("nope").await, Err(Error::ConfigNotFound(_)));
    }
}
