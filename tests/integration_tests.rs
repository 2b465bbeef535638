//! layercache Integration Tests
//!
//! End-to-end scenarios across the public API:
//! - Multi-level reads, writes and invalidation
//! - Metrics flushing into alerts and the optimizer
//! - Recommendation lifecycle with optimistic concurrency
//! - Operator facade and edge delivery

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde_json::json;
use tokio_test::{assert_err, assert_ok};

use layercache::adapters::InMemoryEventCollector;
use layercache::alerts::{AlertEngine, AlertPolicy, InMemoryNotifier};
use layercache::backends::LocalBackend;
use layercache::cache::manager::storage_key;
use layercache::cache::{Lookup, MultiLevelCacheManager};
use layercache::domain::{
    AlertKind, AlertQuery, AlertSeverity, BackendStats, BackendType, CacheBackend,
    CacheConfiguration, CacheMetricsSnapshot, InvalidationKind, InvalidationLog,
    MetricsRepository, OptimizationKind, RecommendationStatus,
};
use layercache::metrics::{MetricsRecorder, RecorderConfig};
use layercache::optimizer::{health_score, CacheOptimizer, HealthStatus, OptimizerTuning};
use layercache::store::{ConfigStore, InMemoryStore};
use layercache::Error;

// =============================================================================
// Fixtures
// =============================================================================

/// Delegates to a local backend and counts every call
#[derive(Default)]
struct SpyBackend {
    inner: LocalBackend,
    calls: AtomicUsize,
}

impl SpyBackend {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn touch(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl CacheBackend for SpyBackend {
    fn name(&self) -> &str {
        "spy"
    }

    async fn get(&self, key: &str) -> layercache::Result<Option<Bytes>> {
        self.touch();
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> layercache::Result<bool> {
        self.touch();
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> layercache::Result<bool> {
        self.touch();
        self.inner.delete(key).await
    }

    fn supports_pattern_scan(&self) -> bool {
        true
    }

    async fn scan(&self, pattern: &str) -> layercache::Result<Vec<String>> {
        self.touch();
        self.inner.scan(pattern).await
    }

    async fn stats(&self) -> layercache::Result<Option<BackendStats>> {
        self.touch();
        self.inner.stats().await
    }
}

struct Stack {
    store: Arc<InMemoryStore>,
    configs: Arc<ConfigStore>,
    primary: Arc<SpyBackend>,
    local: Arc<SpyBackend>,
    manager: Arc<MultiLevelCacheManager>,
}

fn stack() -> Stack {
    let store = Arc::new(InMemoryStore::new());
    let configs = Arc::new(ConfigStore::new(store.clone()));
    let primary = Arc::new(SpyBackend::default());
    let local = Arc::new(SpyBackend::default());
    let recorder = MetricsRecorder::new(store.clone(), RecorderConfig::default());
    let manager = Arc::new(
        MultiLevelCacheManager::builder(
            configs.clone(),
            local.clone(),
            recorder,
            store.clone(),
            store.clone(),
        )
        .primary(BackendType::Redis, primary.clone())
        .build(),
    );
    Stack {
        store,
        configs,
        primary,
        local,
        manager,
    }
}

fn snapshot(cache_name: &str, hits: u64, misses: u64, minutes_ago: i64) -> CacheMetricsSnapshot {
    let mut s = CacheMetricsSnapshot::empty(cache_name);
    s.hit_count = hits;
    s.miss_count = misses;
    s.hit_ratio = CacheMetricsSnapshot::compute_hit_ratio(hits, misses);
    s.get_operations = hits + misses;
    s.avg_response_time_ms = 12.0;
    s.timestamp = Utc::now() - chrono::Duration::minutes(minutes_ago);
    s
}

// =============================================================================
// Multi-Level Cache
// =============================================================================

mod cache_tests {
    use super::*;

    #[tokio::test]
    async fn test_cold_start_then_hit() {
        let s = stack();
        s.configs
            .create(
                CacheConfiguration::new("product_list", BackendType::Redis).with_ttl(600),
                None,
            )
            .await
            .unwrap();

        assert_matches!(s.manager.lookup("all", "product_list").await, Lookup::Miss);

        let products = json!([{"sku": "A-1", "price": 10}, {"sku": "B-2", "price": 12}]);
        assert!(s.manager.set("all", &products, "product_list", None).await);
        assert_matches!(
            s.manager.lookup("all", "product_list").await,
            Lookup::Hit { level: 0, value } if value == products
        );

        let snapshots = assert_ok!(s.manager.recorder().flush().await);
        assert_eq!(snapshots.len(), 1);
        let snap = &snapshots[0];
        assert_eq!(snap.cache_name, "product_list");
        assert_eq!(snap.hit_count, 1);
        assert_eq!(snap.miss_count, 1);
        assert_eq!(snap.set_operations, 1);
        assert!((snap.hit_ratio - 0.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_local_hit_promotes_to_primary() {
        let s = stack();
        let config = s
            .configs
            .create(CacheConfiguration::new("catalog", BackendType::Redis), None)
            .await
            .unwrap();
        s.manager.set("sku:1", &json!({"stock": 4}), "catalog", None).await;

        s.primary.inner.clear();
        assert_matches!(s.manager.lookup("sku:1", "catalog").await, Lookup::Hit { level: 1, .. });
        assert!(s.primary.inner.contains(&storage_key(&config, "sku:1")));
        assert_matches!(s.manager.lookup("sku:1", "catalog").await, Lookup::Hit { level: 0, .. });
    }

    #[tokio::test]
    async fn test_inactive_cache_contacts_no_backend() {
        let s = stack();
        let notifier = Arc::new(InMemoryNotifier::new());
        let alerts = Arc::new(
            AlertEngine::new(s.store.clone(), AlertPolicy::default())
                .with_notifier(notifier.clone(), vec!["oncall@example.com".into()]),
        );
        s.manager.recorder().add_listener(alerts.clone());
        s.configs
            .create(
                CacheConfiguration::new("paused", BackendType::Redis).with_active(false),
                None,
            )
            .await
            .unwrap();

        for _ in 0..5 {
            assert_eq!(s.manager.get("k", "paused").await, None);
            assert_eq!(s.manager.get("k", "never_created").await, None);
        }
        assert!(!s.manager.set("k", &json!(1), "paused", None).await);
        assert!(!s.manager.delete("k", "paused").await);
        assert_eq!(s.manager.invalidate_pattern("*", "paused").await, 0);

        assert_eq!(s.primary.calls(), 0);
        assert_eq!(s.local.calls(), 0);

        // Nothing reached a backend, so there is nothing to alert on
        assert!(assert_ok!(s.manager.recorder().flush().await).is_empty());
        let open = assert_ok!(
            alerts
                .list(&AlertQuery {
                    cache_name: None,
                    unresolved_only: true,
                })
                .await
        );
        assert!(open.is_empty());
        assert!(notifier.deliveries().is_empty());
    }

    #[tokio::test]
    async fn test_recreated_cache_does_not_serve_old_entries() {
        let s = stack();
        let first = s
            .configs
            .create(CacheConfiguration::new("prices", BackendType::Redis), None)
            .await
            .unwrap();
        assert!(s.manager.set("eur", &json!(1.0), "prices", None).await);
        assert!(s.configs.delete("prices").await.unwrap());

        let second = s
            .configs
            .create(CacheConfiguration::new("prices", BackendType::Redis), None)
            .await
            .unwrap();
        assert_ne!(storage_key(&first, "eur"), storage_key(&second, "eur"));
        assert_matches!(s.manager.lookup("eur", "prices").await, Lookup::Miss);
    }

    #[tokio::test]
    async fn test_pattern_invalidation_audited_once() {
        let s = stack();
        s.configs
            .create(CacheConfiguration::new("sessions", BackendType::Redis), None)
            .await
            .unwrap();
        for i in 0..5 {
            assert!(
                s.manager
                    .set(&format!("user:{}", i), &json!({"uid": i}), "sessions", None)
                    .await
            );
        }
        s.manager.set("meta", &json!("keep"), "sessions", None).await;

        assert_eq!(s.manager.invalidate_pattern("user:*", "sessions").await, 5);
        for i in 0..5 {
            assert_eq!(s.manager.get(&format!("user:{}", i), "sessions").await, None);
        }
        assert_eq!(s.manager.get("meta", "sessions").await, Some(json!("keep")));

        let records = InvalidationLog::list(s.store.as_ref(), Some("sessions"))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, InvalidationKind::Pattern);
        assert_eq!(records[0].target, "user:*");
        assert!(records[0].success);
    }

    #[tokio::test]
    async fn test_delete_unknown_cache_is_audited_as_failure() {
        let s = stack();
        assert!(!s.manager.delete("k", "ghost").await);

        let records = InvalidationLog::list(s.store.as_ref(), Some("ghost"))
            .await
            .unwrap();
        assert_eq!(records.len(), 1);
        assert!(!records[0].success);
        assert_eq!(s.primary.calls() + s.local.calls(), 0);
    }
}

// =============================================================================
// Metrics → Alerts
// =============================================================================

mod alert_tests {
    use super::*;

    #[tokio::test]
    async fn test_flush_feeds_alert_engine() {
        let s = stack();
        let alerts = Arc::new(AlertEngine::new(s.store.clone(), AlertPolicy::default()));
        s.manager.recorder().add_listener(alerts.clone());
        s.configs
            .create(CacheConfiguration::new("cold", BackendType::Redis), None)
            .await
            .unwrap();

        for i in 0..4 {
            s.manager.get(&format!("missing:{}", i), "cold").await;
        }
        s.manager.recorder().flush().await.unwrap();

        let open = alerts
            .list(&AlertQuery {
                cache_name: Some("cold".into()),
                unresolved_only: true,
            })
            .await
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].kind, AlertKind::LowHitRatio);
        assert_eq!(open[0].severity, AlertSeverity::Critical);
    }

    #[tokio::test]
    async fn test_dedup_and_escalation_notify_once() {
        let store = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(InMemoryNotifier::new());
        let engine = AlertEngine::new(store.clone(), AlertPolicy::default())
            .with_notifier(notifier.clone(), vec!["oncall@example.com".into()]);

        let first = engine.evaluate(&snapshot("api", 70, 30, 2)).await.unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].severity, AlertSeverity::High);
        assert!(notifier.deliveries().is_empty());

        let second = engine.evaluate(&snapshot("api", 40, 60, 1)).await.unwrap();
        assert_eq!(second[0].id, first[0].id);
        assert_eq!(second[0].severity, AlertSeverity::Critical);
        assert_eq!(second[0].occurrences, 2);

        let third = engine.evaluate(&snapshot("api", 30, 70, 0)).await.unwrap();
        assert_eq!(third[0].occurrences, 3);

        let deliveries = notifier.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].recipients, vec!["oncall@example.com".to_string()]);

        let all = engine
            .list(&AlertQuery {
                cache_name: Some("api".into()),
                unresolved_only: false,
            })
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn test_health_score_monotonic() {
        let mut s = snapshot("h", 95, 5, 0);
        let (mut previous, issues) = health_score(&s);
        assert_eq!(previous, 100);
        assert!(issues.is_empty());

        let degradations: [fn(&mut CacheMetricsSnapshot); 4] = [
            |s| s.hit_ratio = 0.4,
            |s| {
                s.memory_total_bytes = 100;
                s.memory_used_bytes = 95;
                s.memory_usage_percent = 95.0;
            },
            |s| s.avg_response_time_ms = 250.0,
            |s| s.error_count = 50,
        ];
        for degrade in degradations {
            degrade(&mut s);
            let (score, _) = health_score(&s);
            assert!(score < previous, "{} should drop below {}", score, previous);
            previous = score;
        }
        assert_eq!(previous, 0);
        assert_eq!(HealthStatus::from_score(previous), HealthStatus::Critical);
    }
}

// =============================================================================
// Optimizer
// =============================================================================

mod optimizer_tests {
    use super::*;

    async fn catalog() -> (Stack, CacheOptimizer) {
        let s = stack();
        s.configs
            .create(
                CacheConfiguration::new("catalog", BackendType::Redis).with_ttl(3600),
                None,
            )
            .await
            .unwrap();
        for i in 0..10 {
            MetricsRepository::insert(s.store.as_ref(), snapshot("catalog", 60, 40, i * 10))
                .await
                .unwrap();
        }
        let optimizer = CacheOptimizer::new(
            s.manager.clone(),
            s.store.clone(),
            s.store.clone(),
            OptimizerTuning::default(),
        );
        (s, optimizer)
    }

    #[tokio::test]
    async fn test_low_hit_ratio_raises_ttl() {
        let (_s, optimizer) = catalog().await;
        let recs = optimizer.optimize_cache_configuration("catalog").await.unwrap();

        let ttl: Vec<_> = recs
            .iter()
            .filter(|r| r.kind == OptimizationKind::TtlAdjustment)
            .collect();
        assert_eq!(ttl.len(), 1);
        assert_eq!(ttl[0].current_config["ttl_seconds"], json!(3600));
        assert_eq!(ttl[0].recommended_config["ttl_seconds"], json!(5400));
        assert_eq!(ttl[0].impact_score, 75);
        assert_eq!(ttl[0].status, RecommendationStatus::Proposed);

        // No memory readings, no memory proposal
        assert!(recs.iter().all(|r| r.kind != OptimizationKind::MemoryAllocation));
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let (_s, optimizer) = catalog().await;
        let first = optimizer.optimize_cache_configuration("catalog").await.unwrap();
        let second = optimizer.optimize_cache_configuration("catalog").await.unwrap();

        let ids = |recs: &[layercache::domain::CacheOptimizationRecommendation]| {
            let mut ids: Vec<u64> = recs.iter().map(|r| r.id).collect();
            ids.sort_unstable();
            ids
        };
        assert_eq!(ids(&first), ids(&second));

        let open = optimizer
            .list_recommendations(Some("catalog"), Some(RecommendationStatus::Proposed))
            .await
            .unwrap();
        assert_eq!(open.len(), first.len());
    }

    #[tokio::test]
    async fn test_no_history_is_an_error() {
        let s = stack();
        s.configs
            .create(CacheConfiguration::new("fresh", BackendType::Redis), None)
            .await
            .unwrap();
        let optimizer = CacheOptimizer::new(
            s.manager.clone(),
            s.store.clone(),
            s.store.clone(),
            OptimizerTuning::default(),
        );
        assert_matches!(
            optimizer.optimize_cache_configuration("fresh").await,
            Err(Error::NoMetricsData(name)) if name == "fresh"
        );
    }

    #[tokio::test]
    async fn test_apply_then_rollback() {
        let (s, optimizer) = catalog().await;
        let recs = optimizer.optimize_cache_configuration("catalog").await.unwrap();
        let ttl = recs
            .iter()
            .find(|r| r.kind == OptimizationKind::TtlAdjustment)
            .unwrap();

        let backup = assert_ok!(optimizer.apply_optimization(ttl.id, "ops", 1).await);
        assert_eq!(backup["ttl_seconds"], json!(3600));

        let applied = s.configs.require("catalog").await.unwrap();
        assert_eq!(applied.ttl_seconds, 5400);
        assert_eq!(applied.version, 2);

        assert_matches!(
            optimizer.apply_optimization(ttl.id, "ops", 2).await,
            Err(Error::AlreadyApplied(id)) if id == ttl.id
        );

        let restored = assert_ok!(optimizer.rollback_optimization(ttl.id, "ops", 2).await);

        // Only applied recommendations can be rolled back
        assert_err!(optimizer.rollback_optimization(ttl.id, "ops", 3).await);
        assert_eq!(restored.ttl_seconds, 3600);
        assert_eq!(restored.version, 3);

        let rec = optimizer
            .list_recommendations(Some("catalog"), Some(RecommendationStatus::RolledBack))
            .await
            .unwrap();
        assert_eq!(rec.len(), 1);
        assert_eq!(rec[0].id, ttl.id);
    }

    #[tokio::test]
    async fn test_stale_version_is_rejected() {
        let (s, optimizer) = catalog().await;
        let recs = optimizer.optimize_cache_configuration("catalog").await.unwrap();
        let ttl = recs
            .iter()
            .find(|r| r.kind == OptimizationKind::TtlAdjustment)
            .unwrap();

        let current = s.configs.require("catalog").await.unwrap();
        s.configs
            .update(current.with_max_size_mb(512), 1, Some("someone-else"))
            .await
            .unwrap();

        assert_matches!(
            optimizer.apply_optimization(ttl.id, "ops", 1).await,
            Err(Error::VersionConflict { expected: 1, actual: 2, .. })
        );
        let unchanged = s.configs.require("catalog").await.unwrap();
        assert_eq!(unchanged.ttl_seconds, 3600);

        let still_open = optimizer
            .list_recommendations(Some("catalog"), Some(RecommendationStatus::Proposed))
            .await
            .unwrap();
        assert!(still_open.iter().any(|r| r.id == ttl.id));
    }
}

// =============================================================================
// Operator Facade
// =============================================================================

mod admin_tests {
    use super::*;
    use layercache::admin::InvalidationRequest;
    use layercache::cdn::{EdgeManager, InMemoryEdgeProvider};
    use layercache::warming::{StaticWarmingSource, WarmingScheduler};
    use layercache::AdminService;

    struct Facade {
        store: Arc<InMemoryStore>,
        events: Arc<InMemoryEventCollector>,
        manager: Arc<MultiLevelCacheManager>,
        alerts: Arc<AlertEngine>,
        admin: AdminService,
    }

    fn facade() -> Facade {
        let store = Arc::new(InMemoryStore::new());
        let events = Arc::new(InMemoryEventCollector::new());
        let configs = Arc::new(ConfigStore::new(store.clone()));
        let manager = Arc::new(
            MultiLevelCacheManager::builder(
                configs,
                Arc::new(LocalBackend::new()),
                MetricsRecorder::new(store.clone(), RecorderConfig::default()),
                store.clone(),
                store.clone(),
            )
            .build(),
        );
        let alerts = Arc::new(AlertEngine::new(store.clone(), AlertPolicy::default()));
        let optimizer = Arc::new(
            CacheOptimizer::new(
                manager.clone(),
                store.clone(),
                store.clone(),
                OptimizerTuning::default(),
            )
            .with_alerts(alerts.clone()),
        );
        let warming = Arc::new(WarmingScheduler::new(
            manager.clone(),
            store.clone(),
            Arc::new(StaticWarmingSource::new()),
        ));
        let edge = Arc::new(
            EdgeManager::new().with_provider(Arc::new(InMemoryEdgeProvider::new("memory"))),
        );
        let admin = AdminService::new(manager.clone(), optimizer, alerts.clone(), warming, edge)
            .with_events(events.clone());
        Facade {
            store,
            events,
            manager,
            alerts,
            admin,
        }
    }

    #[tokio::test]
    async fn test_delete_cascades() {
        let f = facade();
        assert!(
            f.admin
                .create_configuration(CacheConfiguration::new("orders", BackendType::Memcached), "ops")
                .await
                .success
        );
        for i in 0..3 {
            f.manager
                .set(&format!("order:{}", i), &json!({"id": i}), "orders", None)
                .await;
        }
        f.manager.get("order:0", "orders").await;
        f.manager.recorder().flush().await.unwrap();
        f.alerts.evaluate(&snapshot("orders", 1, 9, 0)).await.unwrap();

        let summary = f
            .admin
            .delete_configuration("orders", "ops")
            .await
            .into_result()
            .unwrap();
        assert_eq!(summary.purged_keys, 3);
        assert_eq!(summary.snapshots_removed, 1);
        assert_eq!(summary.alerts_removed, 1);

        assert_eq!(
            f.admin.get_configuration("orders").await.error.unwrap().code,
            "not_found"
        );
        assert!(MetricsRepository::latest(f.store.as_ref(), "orders")
            .await
            .unwrap()
            .is_none());
        assert_eq!(f.events.events_of_type("ConfigurationDeleted").len(), 1);

        let again = f.admin.delete_configuration("orders", "ops").await;
        assert_eq!(again.error.unwrap().code, "not_found");
    }

    #[tokio::test]
    async fn test_invalidation_requires_reason() {
        let f = facade();
        f.admin
            .create_configuration(CacheConfiguration::new("carts", BackendType::Redis), "ops")
            .await;
        f.manager.set("cart:1", &json!([1]), "carts", None).await;

        let missing_reason = InvalidationRequest {
            keys: vec!["cart:1".into()],
            pattern: None,
            reason: "  ".into(),
        };
        let response = f.admin.invalidate("carts", &missing_reason, "ops").await;
        assert_eq!(response.error.unwrap().code, "invalid_input");
        assert!(f.manager.get("cart:1", "carts").await.is_some());

        let request = InvalidationRequest {
            keys: vec!["cart:1".into(), "cart:404".into()],
            pattern: None,
            reason: "price change".into(),
        };
        let report = f
            .admin
            .invalidate("carts", &request, "ops")
            .await
            .into_result()
            .unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.missing, 1);
        assert_eq!(report.failed, 0);
        assert!(f.manager.get("cart:1", "carts").await.is_none());
    }

    #[tokio::test]
    async fn test_edge_upload_through_facade() {
        let f = facade();
        let report = f
            .admin
            .cdn_upload(
                &[
                    layercache::cdn::Asset::new("/css/site.3f9a2b7c1d.css", "body{margin:0}"),
                    layercache::cdn::Asset::new("../escape.txt", "nope"),
                ],
                "ops",
            )
            .await
            .into_result()
            .unwrap();

        assert_eq!(report.processed(), 1);
        assert_eq!(report.failed(), 1);
        let object = &report.uploads[0].object;
        assert_eq!(object.path, "css/site.3f9a2b7c1d.css");
        assert_eq!(object.cache_control, "public, max-age=31536000, immutable");
        assert!(object.etag.starts_with('"'));
    }
}

// =============================================================================
// Edge Delivery
// =============================================================================

mod edge_tests {
    use super::*;
    use layercache::cdn::{Asset, EdgeManager, InMemoryEdgeProvider};

    #[tokio::test]
    async fn test_failing_provider_is_isolated() {
        let healthy = Arc::new(InMemoryEdgeProvider::new("primary-cdn"));
        let broken = Arc::new(InMemoryEdgeProvider::new("backup-cdn"));
        broken.set_failing(true);
        let edge = EdgeManager::new()
            .with_provider(healthy.clone())
            .with_provider(broken.clone());

        let report = edge
            .upload_assets(&[Asset::new("index.html", "<html></html>")])
            .await
            .unwrap();
        assert_eq!(report.processed(), 1);
        let outcomes = &report.uploads[0].providers;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().any(|o| o.provider == "primary-cdn" && o.success));
        assert!(outcomes
            .iter()
            .any(|o| o.provider == "backup-cdn" && !o.success && o.error.is_some()));

        assert!(healthy.object("index.html").is_some());
        assert!(broken.is_empty());

        let purge = edge.invalidate(&["index.html".to_string()]).await.unwrap();
        assert!(!purge.fully_succeeded());
        assert_eq!(healthy.purges().len(), 1);
    }

    #[tokio::test]
    async fn test_served_objects_show_in_analytics() {
        let provider = Arc::new(InMemoryEdgeProvider::new("memory"));
        let edge = EdgeManager::new().with_provider(provider.clone());
        edge.upload_assets(&[Asset::new("app.js", "console.log(1)")])
            .await
            .unwrap();

        assert!(provider.serve("app.js").is_some());
        assert!(provider.serve("missing.js").is_none());

        let now = Utc::now();
        let report = edge
            .analytics(now - chrono::Duration::hours(1), now + chrono::Duration::minutes(1))
            .await
            .unwrap();
        let stats = report.providers[0].data.as_ref().unwrap();
        assert_eq!(stats.requests, 2);
        assert!(stats.bandwidth_bytes > 0);
    }
}
