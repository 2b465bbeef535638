//! Administrative Service
//!
//! Library facade over every subsystem for operator tooling. Each call returns
//! an [`ApiResponse`] envelope instead of a bare `Result`, and every mutating
//! call takes the acting principal.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::alerts::AlertEngine;
use crate::cache::{CacheStats, MultiLevelCacheManager, Removal};
use crate::cdn::{
    AnalyticsReport, Asset, EdgeManager, InvalidationReport, UploadReport, VariantFormat,
    VariantSpec,
};
use crate::domain::events::DomainEvent;
use crate::domain::models::{
    CacheAlert, CacheConfiguration, CacheInvalidationRecord, CacheMetricsSnapshot,
    CacheOptimizationRecommendation, CacheWarmingTask, ConfigMap, InvalidationKind,
    RecommendationStatus,
};
use crate::domain::ports::{AlertQuery, EventPublisher, InvalidationLog, MetricsQuery, MetricsRepository};
use crate::error::{Error, Result};
use crate::optimizer::{BenchmarkReport, CacheOptimizer, HealthReport, PerformanceAnalysis};
use crate::store::ConfigStore;
use crate::warming::{WarmingRun, WarmingScheduler};

/// Longest benchmark an operator may request
pub const MAX_BENCHMARK: Duration = Duration::from_secs(300);

// =============================================================================
// Response envelope
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ApiError {
    pub code: &'static str,
    pub message: String,
}

/// `{success, data | error{message}}`
#[derive(Debug, Clone, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ApiError>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(error: &Error) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: error_code(error),
                message: error.to_string(),
            }),
        }
    }

    pub fn into_result(self) -> std::result::Result<T, ApiError> {
        match (self.data, self.error) {
            (Some(data), _) => Ok(data),
            (None, Some(error)) => Err(error),
            (None, None) => Err(ApiError {
                code: "internal",
                message: "empty response".into(),
            }),
        }
    }
}

/// Stable code for an error
pub fn error_code(error: &Error) -> &'static str {
    match error {
        Error::Validation { .. } | Error::DurationParse(_) | Error::ScheduleParse { .. } => {
            "invalid_input"
        }
        Error::ConfigNotFound(_)
        | Error::RecommendationNotFound(_)
        | Error::AlertNotFound(_)
        | Error::WarmingTaskNotFound(_) => "not_found",
        Error::ConfigExists(_) => "duplicate",
        Error::VersionConflict { .. } => "version_conflict",
        Error::AlreadyApplied(_) => "already_applied",
        Error::InvalidRecommendationState { .. } => "invalid_state",
        Error::NoMetricsData(_) => "no_data",
        Error::Config(_) => "config",
        Error::EdgeProvider { .. } => "edge_provider",
        Error::Image(_) => "image",
        Error::Backend { .. } | Error::BackendTimeout { .. } | Error::Unsupported { .. } => {
            "backend"
        }
        _ => "internal",
    }
}

fn respond<T>(operation: &str, result: Result<T>) -> ApiResponse<T> {
    match result {
        Ok(data) => ApiResponse::ok(data),
        Err(e) => {
            if e.is_no_data() {
                debug!(operation, error = %e, "No data");
            } else {
                warn!(operation, error = %e, "Admin operation failed");
            }
            ApiResponse::failure(&e)
        }
    }
}

/// Counts for a bulk operation
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkReport {
    pub processed: usize,
    /// Targets that held nothing; not a failure
    pub missing: usize,
    pub failed: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl BulkReport {
    fn success(&mut self) {
        self.processed += 1;
    }

    /// Tally one removal. Skipped caches and backend errors are failures;
    /// an empty removal counts as missing when `expect_entry` is set.
    fn removal(&mut self, target: &str, removal: &Removal, expect_entry: bool) {
        if let Some(why) = &removal.skipped {
            self.failure(format!("{}: {}", target, why));
        } else if !removal.errors.is_empty() {
            self.failure(format!("{}: {}", target, removal.errors.join("; ")));
        } else if expect_entry && removal.deleted == 0 {
            self.missing += 1;
        } else {
            self.success();
        }
    }

    fn failure(&mut self, error: impl Into<String>) {
        self.failed += 1;
        self.errors.push(error.into());
    }
}

// =============================================================================
// Request and summary types
// =============================================================================

/// Keys or a pattern to invalidate, with a mandatory reason
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvalidationRequest {
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub pattern: Option<String>,
    pub reason: String,
}

/// What a configuration delete removed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteSummary {
    pub cache_name: String,
    pub purged_keys: usize,
    pub snapshots_removed: usize,
    pub alerts_removed: usize,
}

/// Aggregate over a metrics history window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub cache_name: Option<String>,
    pub snapshots: usize,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub hit_count: u64,
    pub miss_count: u64,
    pub hit_ratio: f64,
    /// Mean of per-snapshot averages
    pub avg_response_time_ms: f64,
    pub max_response_time_ms: f64,
    pub total_operations: u64,
    pub error_count: u64,
    pub error_rate: f64,
}

impl MetricsSummary {
    pub fn from_snapshots(cache_name: Option<String>, snapshots: &[CacheMetricsSnapshot]) -> Self {
        let hit_count = snapshots.iter().map(|s| s.hit_count).sum();
        let miss_count = snapshots.iter().map(|s| s.miss_count).sum();
        let total_operations: u64 = snapshots.iter().map(|s| s.total_operations()).sum();
        let error_count = snapshots.iter().map(|s| s.error_count).sum();
        let response_times: Vec<f64> = snapshots.iter().map(|s| s.avg_response_time_ms).collect();

        Self {
            cache_name,
            snapshots: snapshots.len(),
            from: snapshots.iter().map(|s| s.timestamp).min(),
            to: snapshots.iter().map(|s| s.timestamp).max(),
            hit_count,
            miss_count,
            hit_ratio: CacheMetricsSnapshot::compute_hit_ratio(hit_count, miss_count),
            avg_response_time_ms: crate::optimizer::stats::mean(&response_times),
            max_response_time_ms: snapshots
                .iter()
                .map(|s| s.max_response_time_ms)
                .fold(0.0, f64::max),
            total_operations,
            error_count,
            error_rate: error_count as f64 / total_operations.max(1) as f64,
        }
    }
}

// =============================================================================
// Service
// =============================================================================

/// Operator-facing facade
pub struct AdminService {
    configs: Arc<ConfigStore>,
    manager: Arc<MultiLevelCacheManager>,
    metrics: Arc<dyn MetricsRepository>,
    invalidations: Arc<dyn InvalidationLog>,
    alerts: Arc<AlertEngine>,
    optimizer: Arc<CacheOptimizer>,
    warming: Arc<WarmingScheduler>,
    edge: Arc<EdgeManager>,
    events: Option<Arc<dyn EventPublisher>>,
}

fn require_actor(actor: &str) -> Result<()> {
    if actor.trim().is_empty() {
        return Err(Error::validation("actor", "acting principal is required"));
    }
    Ok(())
}

impl AdminService {
    pub fn new(
        manager: Arc<MultiLevelCacheManager>,
        optimizer: Arc<CacheOptimizer>,
        alerts: Arc<AlertEngine>,
        warming: Arc<WarmingScheduler>,
        edge: Arc<EdgeManager>,
    ) -> Self {
        Self {
            configs: manager.configs().clone(),
            metrics: manager.metrics_repository().clone(),
            invalidations: manager.invalidation_log().clone(),
            manager,
            alerts,
            optimizer,
            warming,
            edge,
            events: None,
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    // -------------------------------------------------------------------------
    // Configurations
    // -------------------------------------------------------------------------

    pub async fn list_configurations(&self) -> ApiResponse<Vec<CacheConfiguration>> {
        respond("list_configurations", self.configs.list().await)
    }

    pub async fn get_configuration(&self, name: &str) -> ApiResponse<CacheConfiguration> {
        respond("get_configuration", self.configs.require(name).await)
    }

    pub async fn cache_stats(&self, name: &str) -> ApiResponse<CacheStats> {
        respond("cache_stats", self.manager.get_cache_stats(name).await)
    }

    pub async fn create_configuration(
        &self,
        config: CacheConfiguration,
        actor: &str,
    ) -> ApiResponse<CacheConfiguration> {
        let result = async {
            require_actor(actor)?;
            self.configs.create(config, Some(actor)).await
        }
        .await;
        respond("create_configuration", result)
    }

    /// Replace a configuration. The name identifies the record and cannot change.
    pub async fn update_configuration(
        &self,
        config: CacheConfiguration,
        expected_version: u64,
        actor: &str,
    ) -> ApiResponse<CacheConfiguration> {
        let result = async {
            require_actor(actor)?;
            self.configs.update(config, expected_version, Some(actor)).await
        }
        .await;
        respond("update_configuration", result)
    }

    /// Delete a configuration after purging its entries, metrics and alerts
    pub async fn delete_configuration(&self, name: &str, actor: &str) -> ApiResponse<DeleteSummary> {
        respond("delete_configuration", self.cascade_delete(name, actor).await)
    }

    async fn cascade_delete(&self, name: &str, actor: &str) -> Result<DeleteSummary> {
        require_actor(actor)?;
        self.configs.invalidate(name);
        self.configs.require(name).await?;

        let purged_keys = self.manager.purge(name, Some(actor)).await;
        let snapshots_removed = self.metrics.delete_for_cache(name).await?;
        let alerts_removed = self.alerts.delete_for_cache(name).await?;
        if !self.configs.delete(name).await? {
            return Err(Error::ConfigNotFound(name.to_string()));
        }

        info!(
            cache = %name,
            actor = %actor,
            purged_keys,
            snapshots_removed,
            alerts_removed,
            "Cache configuration removed"
        );
        self.publish(DomainEvent::ConfigurationDeleted {
            cache_name: name.to_string(),
            purged_keys,
            actor: Some(actor.to_string()),
            timestamp: Utc::now(),
        })
        .await;

        Ok(DeleteSummary {
            cache_name: name.to_string(),
            purged_keys,
            snapshots_removed,
            alerts_removed,
        })
    }

    // -------------------------------------------------------------------------
    // Metrics
    // -------------------------------------------------------------------------

    pub async fn metrics_history(&self, query: &MetricsQuery) -> ApiResponse<Vec<CacheMetricsSnapshot>> {
        respond("metrics_history", self.metrics.query(query).await)
    }

    pub async fn metrics_summary(&self, query: &MetricsQuery) -> ApiResponse<MetricsSummary> {
        let result = self
            .metrics
            .query(query)
            .await
            .map(|snapshots| MetricsSummary::from_snapshots(query.cache_name.clone(), &snapshots));
        respond("metrics_summary", result)
    }

    // -------------------------------------------------------------------------
    // Invalidation
    // -------------------------------------------------------------------------

    /// Delete keys and/or a pattern. Each key and the pattern count once.
    pub async fn invalidate(
        &self,
        cache_name: &str,
        request: &InvalidationRequest,
        actor: &str,
    ) -> ApiResponse<BulkReport> {
        respond(
            "invalidate",
            self.invalidate_inner(cache_name, request, actor).await,
        )
    }

    async fn invalidate_inner(
        &self,
        cache_name: &str,
        request: &InvalidationRequest,
        actor: &str,
    ) -> Result<BulkReport> {
        require_actor(actor)?;
        let reason = request.reason.trim();
        if reason.is_empty() {
            return Err(Error::validation("reason", "a reason is required"));
        }
        let pattern = request.pattern.as_deref().filter(|p| !p.trim().is_empty());
        if request.keys.is_empty() && pattern.is_none() {
            return Err(Error::validation("keys", "provide keys or a pattern"));
        }
        self.configs.require(cache_name).await?;

        let mut report = BulkReport::default();
        for key in &request.keys {
            let removal = self
                .manager
                .delete_with(key, cache_name, reason, Some(actor))
                .await;
            report.removal(key, &removal, true);
        }
        if let Some(pattern) = pattern {
            let removal = self
                .manager
                .invalidate_pattern_with(pattern, cache_name, InvalidationKind::Pattern, reason, Some(actor))
                .await;
            debug!(cache = %cache_name, pattern = %pattern, removed = removal.deleted, "Pattern invalidation requested");
            report.removal(pattern, &removal, false);
        }
        Ok(report)
    }

    pub async fn invalidation_history(
        &self,
        cache_name: Option<&str>,
    ) -> ApiResponse<Vec<CacheInvalidationRecord>> {
        respond(
            "invalidation_history",
            self.invalidations.list(cache_name).await,
        )
    }

    // -------------------------------------------------------------------------
    // Warming
    // -------------------------------------------------------------------------

    pub async fn create_warming_task(
        &self,
        task: CacheWarmingTask,
        actor: &str,
    ) -> ApiResponse<CacheWarmingTask> {
        let result = async {
            require_actor(actor)?;
            self.configs.require(&task.cache_name).await?;
            self.warming.create_task(task).await
        }
        .await;
        respond("create_warming_task", result)
    }

    pub async fn list_warming_tasks(&self, cache_name: Option<&str>) -> ApiResponse<Vec<CacheWarmingTask>> {
        respond("list_warming_tasks", self.warming.list_tasks(cache_name).await)
    }

    pub async fn execute_warming_task(&self, id: Uuid, actor: &str) -> ApiResponse<WarmingRun> {
        let result = async {
            require_actor(actor)?;
            info!(task = %id, actor = %actor, "Warming task triggered");
            self.warming.execute(id).await
        }
        .await;
        respond("execute_warming_task", result)
    }

    // -------------------------------------------------------------------------
    // Alerts
    // -------------------------------------------------------------------------

    pub async fn list_alerts(&self, query: &AlertQuery) -> ApiResponse<Vec<CacheAlert>> {
        respond("list_alerts", self.alerts.list(query).await)
    }

    pub async fn resolve_alert(&self, id: Uuid, actor: &str) -> ApiResponse<CacheAlert> {
        let result = async {
            require_actor(actor)?;
            self.alerts.resolve(id, actor).await
        }
        .await;
        respond("resolve_alert", result)
    }

    /// Resolve many alerts; unknown ids count as failures
    pub async fn bulk_resolve_alerts(&self, ids: &[Uuid], actor: &str) -> ApiResponse<BulkReport> {
        let result = async {
            require_actor(actor)?;
            let mut report = BulkReport::default();
            for id in ids {
                match self.alerts.resolve(*id, actor).await {
                    Ok(_) => report.success(),
                    Err(e) => report.failure(format!("{}: {}", id, e)),
                }
            }
            Ok::<_, Error>(report)
        }
        .await;
        respond("bulk_resolve_alerts", result)
    }

    // -------------------------------------------------------------------------
    // Recommendations
    // -------------------------------------------------------------------------

    pub async fn list_recommendations(
        &self,
        cache_name: Option<&str>,
        status: Option<RecommendationStatus>,
    ) -> ApiResponse<Vec<CacheOptimizationRecommendation>> {
        respond(
            "list_recommendations",
            self.optimizer.list_recommendations(cache_name, status).await,
        )
    }

    pub async fn optimize(&self, cache_name: &str) -> ApiResponse<Vec<CacheOptimizationRecommendation>> {
        respond(
            "optimize",
            self.optimizer.optimize_cache_configuration(cache_name).await,
        )
    }

    pub async fn apply_recommendation(
        &self,
        id: u64,
        expected_version: u64,
        actor: &str,
    ) -> ApiResponse<ConfigMap> {
        let result = async {
            require_actor(actor)?;
            self.optimizer
                .apply_optimization(id, actor, expected_version)
                .await
        }
        .await;
        respond("apply_recommendation", result)
    }

    pub async fn reject_recommendation(
        &self,
        id: u64,
        actor: &str,
    ) -> ApiResponse<CacheOptimizationRecommendation> {
        let result = async {
            require_actor(actor)?;
            self.optimizer.reject_optimization(id, actor).await
        }
        .await;
        respond("reject_recommendation", result)
    }

    pub async fn rollback_recommendation(
        &self,
        id: u64,
        expected_version: u64,
        actor: &str,
    ) -> ApiResponse<CacheConfiguration> {
        let result = async {
            require_actor(actor)?;
            self.optimizer
                .rollback_optimization(id, actor, expected_version)
                .await
        }
        .await;
        respond("rollback_recommendation", result)
    }

    // -------------------------------------------------------------------------
    // On-demand diagnostics
    // -------------------------------------------------------------------------

    pub async fn analyze(&self, cache_name: &str, days: u32) -> ApiResponse<PerformanceAnalysis> {
        let result = async {
            if days == 0 {
                return Err(Error::validation("days", "must be at least 1"));
            }
            self.optimizer.analyze_cache_performance(cache_name, days).await
        }
        .await;
        respond("analyze", result)
    }

    pub async fn benchmark(&self, cache_name: &str, duration: Duration) -> ApiResponse<BenchmarkReport> {
        let result = async {
            if duration.is_zero() || duration > MAX_BENCHMARK {
                return Err(Error::validation(
                    "duration",
                    format!("must be between 1ms and {}s", MAX_BENCHMARK.as_secs()),
                ));
            }
            self.optimizer
                .benchmark_cache_performance(cache_name, duration)
                .await
        }
        .await;
        respond("benchmark", result)
    }

    pub async fn health(&self, cache_name: &str) -> ApiResponse<HealthReport> {
        respond("health", self.optimizer.monitor_cache_health(cache_name).await)
    }

    // -------------------------------------------------------------------------
    // Edge
    // -------------------------------------------------------------------------

    pub async fn cdn_upload(&self, assets: &[Asset], actor: &str) -> ApiResponse<UploadReport> {
        let result = async {
            require_actor(actor)?;
            info!(assets = assets.len(), actor = %actor, "Edge upload requested");
            self.edge.upload_assets(assets).await
        }
        .await;
        respond("cdn_upload", result)
    }

    pub async fn cdn_optimize_image(
        &self,
        asset: &Asset,
        spec: &VariantSpec,
        reencode_to: &[VariantFormat],
        actor: &str,
    ) -> ApiResponse<UploadReport> {
        let result = async {
            require_actor(actor)?;
            self.edge.optimize_image(asset, spec, reencode_to).await
        }
        .await;
        respond("cdn_optimize_image", result)
    }

    pub async fn cdn_invalidate(&self, paths: &[String], actor: &str) -> ApiResponse<InvalidationReport> {
        let result = async {
            require_actor(actor)?;
            info!(paths = paths.len(), actor = %actor, "Edge invalidation requested");
            self.edge.invalidate(paths).await
        }
        .await;
        respond("cdn_invalidate", result)
    }

    pub async fn cdn_analytics(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> ApiResponse<AnalyticsReport> {
        respond("cdn_analytics", self.edge.analytics(from, to).await)
    }

    async fn publish(&self, event: DomainEvent) {
        if let Some(events) = &self.events {
            if let Err(e) = events.publish(event).await {
                debug!(error = %e, "Failed to publish admin event");
            }
        }
    }
}
