//! Configuration Tuning
//!
//! Four independent sub-optimizers read the mean of the recent window and
//! each may propose one configuration delta. Recommendations move through
//!
//! ```text
//! proposed ──► applied ──► rolled_back
//!    │
//!    ├──────► rejected
//!    └──────► superseded (by a newer, different proposal of the same kind)
//! ```
//!
//! Applying stores the replaced values on the recommendation so it can be
//! rolled back; every configuration write carries the caller's expected
//! version.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::stats::mean;
use crate::alerts::AlertEngine;
use crate::cache::MultiLevelCacheManager;
use crate::domain::events::DomainEvent;
use crate::domain::models::{
    CacheConfiguration, CacheMetricsSnapshot, CacheOptimizationRecommendation, ConfigMap,
    EvictionPolicyKind, OptimizationKind, RecommendationStatus, MAX_SIZE_MB, MAX_TTL_SECONDS,
    MIN_SIZE_MB, SETTING_EVICTION_POLICY,
};
use crate::domain::ports::{
    EventPublisher, MetricsQuery, MetricsRepository, RecommendationRepository,
};
use crate::error::{Error, Result};
use crate::store::ConfigStore;

const TTL_KEY: &str = "ttl_seconds";
const SIZE_KEY: &str = "max_size_mb";
const COMPRESSION_KEY: &str = "compression_enabled";

/// Thresholds, multipliers and impact scores used by the sub-optimizers
#[derive(Debug, Clone)]
pub struct OptimizerTuning {
    /// Window averaged by `optimize_cache_configuration`
    pub window: Duration,
    pub ttl_raise_below_hit_ratio: f64,
    pub ttl_raise_factor: f64,
    pub ttl_raise_impact: u8,
    pub ttl_lower_above_hit_ratio: f64,
    pub ttl_lower_factor: f64,
    pub ttl_lower_impact: u8,
    /// Memory thresholds are percentages
    pub memory_grow_above: f64,
    pub memory_grow_factor: f64,
    pub memory_grow_impact: u8,
    pub memory_shrink_below: f64,
    pub memory_shrink_factor: f64,
    pub memory_shrink_impact: u8,
    pub compression_enable_above_memory: f64,
    pub compression_enable_impact: u8,
    pub compression_disable_above_response_ms: f64,
    pub compression_disable_impact: u8,
    pub eviction_below_hit_ratio: f64,
    pub eviction_impact: u8,
}

impl Default for OptimizerTuning {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(24 * 3600),
            ttl_raise_below_hit_ratio: 0.7,
            ttl_raise_factor: 1.5,
            ttl_raise_impact: 75,
            ttl_lower_above_hit_ratio: 0.95,
            ttl_lower_factor: 0.8,
            ttl_lower_impact: 40,
            memory_grow_above: 85.0,
            memory_grow_factor: 1.3,
            memory_grow_impact: 80,
            memory_shrink_below: 50.0,
            memory_shrink_factor: 0.8,
            memory_shrink_impact: 30,
            compression_enable_above_memory: 70.0,
            compression_enable_impact: 60,
            compression_disable_above_response_ms: 100.0,
            compression_disable_impact: 50,
            eviction_below_hit_ratio: 0.8,
            eviction_impact: 45,
        }
    }
}

/// Means over the optimization window
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WindowMeans {
    pub samples: usize,
    pub hit_ratio: f64,
    pub response_time_ms: f64,
    /// `None` when no snapshot carried a memory reading
    pub memory_percent: Option<f64>,
}

impl WindowMeans {
    pub fn from_snapshots(snapshots: &[CacheMetricsSnapshot]) -> Self {
        let hit: Vec<f64> = snapshots.iter().map(|s| s.hit_ratio).collect();
        let rt: Vec<f64> = snapshots.iter().map(|s| s.avg_response_time_ms).collect();
        let mem: Vec<f64> = snapshots
            .iter()
            .filter(|s| s.memory_total_bytes > 0)
            .map(|s| s.memory_usage_percent)
            .collect();
        Self {
            samples: snapshots.len(),
            hit_ratio: mean(&hit),
            response_time_ms: mean(&rt),
            memory_percent: (!mem.is_empty()).then(|| mean(&mem)),
        }
    }
}

fn single(key: &str, value: impl Into<Value>) -> ConfigMap {
    let mut map = ConfigMap::new();
    map.insert(key.to_string(), value.into());
    map
}

fn scale_ttl(ttl: u64, factor: f64) -> u64 {
    ((ttl as f64 * factor).round() as u64).clamp(1, MAX_TTL_SECONDS)
}

fn scale_size(size: u64, factor: f64) -> u64 {
    ((size as f64 * factor).round() as u64).clamp(MIN_SIZE_MB, MAX_SIZE_MB)
}

impl OptimizerTuning {
    pub fn ttl(&self, config: &CacheConfiguration, means: &WindowMeans) -> Option<CacheOptimizationRecommendation> {
        // Zero TTL means no expiry; there is nothing to scale
        if config.ttl_seconds == 0 {
            return None;
        }
        let (factor, impact, text) = if means.hit_ratio < self.ttl_raise_below_hit_ratio {
            (
                self.ttl_raise_factor,
                self.ttl_raise_impact,
                "Longer TTL keeps entries resident and raises the hit ratio",
            )
        } else if means.hit_ratio > self.ttl_lower_above_hit_ratio {
            (
                self.ttl_lower_factor,
                self.ttl_lower_impact,
                "Shorter TTL frees memory with little hit ratio loss",
            )
        } else {
            return None;
        };

        let recommended = scale_ttl(config.ttl_seconds, factor);
        (recommended != config.ttl_seconds).then(|| {
            CacheOptimizationRecommendation::proposed(
                &config.name,
                OptimizationKind::TtlAdjustment,
                single(TTL_KEY, config.ttl_seconds),
                single(TTL_KEY, recommended),
                text,
                impact,
            )
        })
    }

    pub fn memory(&self, config: &CacheConfiguration, means: &WindowMeans) -> Option<CacheOptimizationRecommendation> {
        let memory = means.memory_percent?;
        let (factor, impact, text) = if memory > self.memory_grow_above {
            (
                self.memory_grow_factor,
                self.memory_grow_impact,
                "More memory reduces evictions under pressure",
            )
        } else if memory < self.memory_shrink_below {
            (
                self.memory_shrink_factor,
                self.memory_shrink_impact,
                "Unused allocation can be reclaimed",
            )
        } else {
            return None;
        };

        let recommended = scale_size(config.max_size_mb, factor);
        (recommended != config.max_size_mb).then(|| {
            CacheOptimizationRecommendation::proposed(
                &config.name,
                OptimizationKind::MemoryAllocation,
                single(SIZE_KEY, config.max_size_mb),
                single(SIZE_KEY, recommended),
                text,
                impact,
            )
        })
    }

    pub fn compression(&self, config: &CacheConfiguration, means: &WindowMeans) -> Option<CacheOptimizationRecommendation> {
        let (enable, impact, text) = if !config.compression_enabled
            && means
                .memory_percent
                .is_some_and(|m| m > self.compression_enable_above_memory)
        {
            (
                true,
                self.compression_enable_impact,
                "Compression lowers memory usage",
            )
        } else if config.compression_enabled
            && means.response_time_ms > self.compression_disable_above_response_ms
        {
            (
                false,
                self.compression_disable_impact,
                "Skipping decompression lowers response time",
            )
        } else {
            return None;
        };

        Some(CacheOptimizationRecommendation::proposed(
            &config.name,
            OptimizationKind::Compression,
            single(COMPRESSION_KEY, config.compression_enabled),
            single(COMPRESSION_KEY, enable),
            text,
            impact,
        ))
    }

    pub fn eviction(&self, config: &CacheConfiguration, means: &WindowMeans) -> Option<CacheOptimizationRecommendation> {
        let current = config.eviction_policy();
        if means.hit_ratio >= self.eviction_below_hit_ratio || current != EvictionPolicyKind::Lru {
            return None;
        }
        Some(CacheOptimizationRecommendation::proposed(
            &config.name,
            OptimizationKind::EvictionPolicy,
            single(SETTING_EVICTION_POLICY, current.as_str()),
            single(SETTING_EVICTION_POLICY, EvictionPolicyKind::Lfu.as_str()),
            "LFU keeps frequently read keys resident",
            self.eviction_impact,
        ))
    }

    /// Run every sub-optimizer
    pub fn propose(&self, config: &CacheConfiguration, means: &WindowMeans) -> Vec<CacheOptimizationRecommendation> {
        [
            self.ttl(config, means),
            self.memory(config, means),
            self.compression(config, means),
            self.eviction(config, means),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

/// Current values of `keys` in a configuration (`null` for absent settings)
pub fn current_values<'a>(
    config: &CacheConfiguration,
    keys: impl IntoIterator<Item = &'a String>,
) -> ConfigMap {
    keys.into_iter()
        .map(|key| {
            let value = match key.as_str() {
                TTL_KEY => config.ttl_seconds.into(),
                SIZE_KEY => config.max_size_mb.into(),
                COMPRESSION_KEY => config.compression_enabled.into(),
                other => config.settings.get(other).cloned().unwrap_or(Value::Null),
            };
            (key.clone(), value)
        })
        .collect()
}

/// Write values into a configuration. Unknown keys merge into settings;
/// `null` removes a setting.
pub fn apply_values(config: &mut CacheConfiguration, values: &ConfigMap) -> Result<()> {
    for (key, value) in values {
        match key.as_str() {
            TTL_KEY => {
                config.ttl_seconds = value
                    .as_u64()
                    .ok_or_else(|| Error::validation(TTL_KEY, "must be an unsigned integer"))?
            }
            SIZE_KEY => {
                config.max_size_mb = value
                    .as_u64()
                    .ok_or_else(|| Error::validation(SIZE_KEY, "must be an unsigned integer"))?
            }
            COMPRESSION_KEY => {
                config.compression_enabled = value
                    .as_bool()
                    .ok_or_else(|| Error::validation(COMPRESSION_KEY, "must be a boolean"))?
            }
            other if value.is_null() => {
                config.settings.remove(other);
            }
            other => {
                config.settings.insert(other.to_string(), value.clone());
            }
        }
    }
    Ok(())
}

/// Metrics-driven configuration optimizer
pub struct CacheOptimizer {
    pub(crate) manager: Arc<MultiLevelCacheManager>,
    pub(crate) configs: Arc<ConfigStore>,
    pub(crate) metrics: Arc<dyn MetricsRepository>,
    pub(crate) recommendations: Arc<dyn RecommendationRepository>,
    pub(crate) alerts: Option<Arc<AlertEngine>>,
    pub(crate) events: Option<Arc<dyn EventPublisher>>,
    pub(crate) tuning: OptimizerTuning,
}

impl CacheOptimizer {
    pub fn new(
        manager: Arc<MultiLevelCacheManager>,
        metrics: Arc<dyn MetricsRepository>,
        recommendations: Arc<dyn RecommendationRepository>,
        tuning: OptimizerTuning,
    ) -> Self {
        Self {
            configs: manager.configs().clone(),
            manager,
            metrics,
            recommendations,
            alerts: None,
            events: None,
            tuning,
        }
    }

    /// Raise health alerts through this engine
    pub fn with_alerts(mut self, alerts: Arc<AlertEngine>) -> Self {
        self.alerts = Some(alerts);
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn tuning(&self) -> &OptimizerTuning {
        &self.tuning
    }

    pub fn configs(&self) -> &Arc<ConfigStore> {
        &self.configs
    }

    pub(crate) async fn window(
        &self,
        cache_name: &str,
        window: Duration,
    ) -> Result<Vec<CacheMetricsSnapshot>> {
        let window = chrono::Duration::from_std(window)
            .map_err(|e| Error::Internal(format!("window out of range: {}", e)))?;
        let now = Utc::now();
        self.metrics
            .query(&MetricsQuery {
                cache_name: Some(cache_name.to_string()),
                from: Some(now - window),
                to: Some(now),
            })
            .await
    }

    /// Propose configuration changes from the recent window.
    ///
    /// A proposal identical to an open one of the same kind returns the open
    /// one; a different proposal supersedes it.
    pub async fn optimize_cache_configuration(
        &self,
        cache_name: &str,
    ) -> Result<Vec<CacheOptimizationRecommendation>> {
        let config = self.configs.require(cache_name).await?;
        let snapshots = self.window(cache_name, self.tuning.window).await?;
        if snapshots.is_empty() {
            return Err(Error::NoMetricsData(cache_name.to_string()));
        }

        let means = WindowMeans::from_snapshots(&snapshots);
        let open = self
            .recommendations
            .list(Some(cache_name), Some(RecommendationStatus::Proposed))
            .await?;

        let mut out = Vec::new();
        for mut proposal in self.tuning.propose(&config, &means) {
            let previous = open.iter().find(|r| r.kind == proposal.kind);
            if let Some(existing) = previous {
                if existing.recommended_config == proposal.recommended_config {
                    debug!(cache = %cache_name, kind = %proposal.kind, id = existing.id, "Recommendation unchanged");
                    out.push(existing.clone());
                    continue;
                }
            }

            proposal.id = self.recommendations.insert(proposal.clone()).await?;
            if let Some(existing) = previous {
                let mut superseded = existing.clone();
                superseded.status = RecommendationStatus::Superseded;
                superseded.superseded_by = Some(proposal.id);
                self.recommendations.update(superseded).await?;
                debug!(cache = %cache_name, old = existing.id, new = proposal.id, "Recommendation superseded");
            }
            info!(
                cache = %cache_name,
                kind = %proposal.kind,
                id = proposal.id,
                impact = proposal.impact_score,
                "Optimization proposed"
            );
            out.push(proposal);
        }
        Ok(out)
    }

    async fn load(&self, id: u64) -> Result<CacheOptimizationRecommendation> {
        self.recommendations
            .get(id)
            .await?
            .ok_or(Error::RecommendationNotFound(id))
    }

    fn require_proposed(rec: &CacheOptimizationRecommendation, operation: &str) -> Result<()> {
        match rec.status {
            RecommendationStatus::Proposed => Ok(()),
            RecommendationStatus::Applied => Err(Error::AlreadyApplied(rec.id)),
            other => Err(Error::InvalidRecommendationState {
                id: rec.id,
                status: other.to_string(),
                operation: operation.to_string(),
            }),
        }
    }

    /// Apply a proposed recommendation. Returns the replaced values.
    pub async fn apply_optimization(
        &self,
        id: u64,
        actor: &str,
        expected_version: u64,
    ) -> Result<ConfigMap> {
        let mut rec = self.load(id).await?;
        Self::require_proposed(&rec, "apply")?;

        // Read past the config cache; the version check guards the write anyway
        self.configs.invalidate(&rec.cache_name);
        let mut config = self.configs.require(&rec.cache_name).await?;
        let backup = current_values(&config, rec.recommended_config.keys());
        apply_values(&mut config, &rec.recommended_config)?;
        let updated = self
            .configs
            .update(config, expected_version, Some(actor))
            .await?;

        rec.status = RecommendationStatus::Applied;
        rec.is_applied = true;
        rec.applied_by = Some(actor.to_string());
        rec.applied_at = Some(Utc::now());
        rec.previous_config = Some(backup.clone());
        rec.result = Some(updated.tunables());
        self.recommendations.update(rec.clone()).await?;

        info!(cache = %rec.cache_name, id, kind = %rec.kind, actor = %actor, version = updated.version, "Optimization applied");
        self.publish(DomainEvent::OptimizationApplied {
            cache_name: rec.cache_name.clone(),
            recommendation_id: id,
            kind: rec.kind,
            actor: actor.to_string(),
            timestamp: Utc::now(),
        })
        .await;
        Ok(backup)
    }

    /// Reject a proposed recommendation
    pub async fn reject_optimization(
        &self,
        id: u64,
        actor: &str,
    ) -> Result<CacheOptimizationRecommendation> {
        let mut rec = self.load(id).await?;
        Self::require_proposed(&rec, "reject")?;
        rec.status = RecommendationStatus::Rejected;
        self.recommendations.update(rec.clone()).await?;
        info!(cache = %rec.cache_name, id, actor = %actor, "Optimization rejected");
        Ok(rec)
    }

    /// Restore the values an applied recommendation replaced
    pub async fn rollback_optimization(
        &self,
        id: u64,
        actor: &str,
        expected_version: u64,
    ) -> Result<CacheConfiguration> {
        let mut rec = self.load(id).await?;
        if rec.status != RecommendationStatus::Applied {
            return Err(Error::InvalidRecommendationState {
                id,
                status: rec.status.to_string(),
                operation: "roll back".to_string(),
            });
        }
        let backup = rec.previous_config.clone().ok_or_else(|| {
            Error::Internal(format!("applied optimization {} has no backup", id))
        })?;

        self.configs.invalidate(&rec.cache_name);
        let mut config = self.configs.require(&rec.cache_name).await?;
        apply_values(&mut config, &backup)?;
        let restored = self
            .configs
            .update(config, expected_version, Some(actor))
            .await?;

        rec.status = RecommendationStatus::RolledBack;
        rec.result = Some(restored.tunables());
        self.recommendations.update(rec.clone()).await?;

        info!(cache = %rec.cache_name, id, actor = %actor, "Optimization rolled back");
        self.publish(DomainEvent::OptimizationRolledBack {
            cache_name: rec.cache_name,
            recommendation_id: id,
            actor: actor.to_string(),
            timestamp: Utc::now(),
        })
        .await;
        Ok(restored)
    }

    pub async fn list_recommendations(
        &self,
        cache_name: Option<&str>,
        status: Option<RecommendationStatus>,
    ) -> Result<Vec<CacheOptimizationRecommendation>> {
        self.recommendations.list(cache_name, status).await
    }

    async fn publish(&self, event: DomainEvent) {
        if let Some(events) = &self.events {
            if let Err(e) = events.publish(event).await {
                debug!(error = %e, "Failed to publish optimization event");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::BackendType;

    fn means(hit_ratio: f64, response_time_ms: f64, memory_percent: Option<f64>) -> WindowMeans {
        WindowMeans {
            samples: 10,
            hit_ratio,
            response_time_ms,
            memory_percent,
        }
    }

    fn config() -> CacheConfiguration {
        CacheConfiguration::new("catalog", BackendType::Redis).with_ttl(600)
    }

    #[test]
    fn test_ttl_rules() {
        let tuning = OptimizerTuning::default();
        let rec = tuning.ttl(&config(), &means(0.6, 10.0, None)).unwrap();
        assert_eq!(rec.recommended_config[TTL_KEY], 900);
        assert_eq!(rec.impact_score, 75);

        let rec = tuning.ttl(&config(), &means(0.97, 10.0, None)).unwrap();
        assert_eq!(rec.recommended_config[TTL_KEY], 480);
        assert_eq!(rec.impact_score, 40);

        assert!(tuning.ttl(&config(), &means(0.8, 10.0, None)).is_none());
        assert!(tuning
            .ttl(&config().with_ttl(0), &means(0.1, 10.0, None))
            .is_none());
    }

    #[test]
    fn test_ttl_clamped_to_valid_range() {
        let tuning = OptimizerTuning::default();
        let near_max = config().with_ttl(MAX_TTL_SECONDS - 1);
        let rec = tuning.ttl(&near_max, &means(0.1, 1.0, None)).unwrap();
        assert_eq!(rec.recommended_config[TTL_KEY], MAX_TTL_SECONDS);

        // Already at the bound: nothing to propose
        assert!(tuning
            .ttl(&config().with_ttl(MAX_TTL_SECONDS), &means(0.1, 1.0, None))
            .is_none());
    }

    #[test]
    fn test_memory_rules() {
        let tuning = OptimizerTuning::default();
        let rec = tuning.memory(&config(), &means(0.9, 1.0, Some(90.0))).unwrap();
        assert_eq!(rec.recommended_config[SIZE_KEY], 130);
        assert_eq!(rec.impact_score, 80);

        let rec = tuning.memory(&config(), &means(0.9, 1.0, Some(20.0))).unwrap();
        assert_eq!(rec.recommended_config[SIZE_KEY], 80);

        assert!(tuning.memory(&config(), &means(0.9, 1.0, None)).is_none());
        let tiny = config().with_max_size_mb(MIN_SIZE_MB);
        assert!(tuning.memory(&tiny, &means(0.9, 1.0, Some(10.0))).is_none());
    }

    #[test]
    fn test_compression_and_eviction_rules() {
        let tuning = OptimizerTuning::default();
        let rec = tuning
            .compression(&config(), &means(0.9, 1.0, Some(75.0)))
            .unwrap();
        assert_eq!(rec.recommended_config[COMPRESSION_KEY], true);

        let rec = tuning
            .compression(&config().with_compression(true), &means(0.9, 150.0, None))
            .unwrap();
        assert_eq!(rec.recommended_config[COMPRESSION_KEY], false);
        assert_eq!(rec.impact_score, 50);

        let rec = tuning.eviction(&config(), &means(0.75, 1.0, None)).unwrap();
        assert_eq!(rec.recommended_config[SETTING_EVICTION_POLICY], "lfu");
        let lfu = config().with_setting(SETTING_EVICTION_POLICY, "lfu".into());
        assert!(tuning.eviction(&lfu, &means(0.1, 1.0, None)).is_none());
    }

    #[test]
    fn test_apply_and_restore_values() {
        let mut config = config();
        let recommended: ConfigMap = [
            (TTL_KEY.to_string(), Value::from(900)),
            (SETTING_EVICTION_POLICY.to_string(), Value::from("lfu")),
        ]
        .into_iter()
        .collect();

        let backup = current_values(&config, recommended.keys());
        assert_eq!(backup[SETTING_EVICTION_POLICY], Value::Null);

        apply_values(&mut config, &recommended).unwrap();
        assert_eq!(config.ttl_seconds, 900);
        assert_eq!(config.eviction_policy(), EvictionPolicyKind::Lfu);

        apply_values(&mut config, &backup).unwrap();
        assert_eq!(config.ttl_seconds, 600);
        assert!(config.settings.is_empty());
    }
}
