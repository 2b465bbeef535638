//! Alert Engine
//!
//! Evaluates every persisted snapshot against [`AlertPolicy`] thresholds.
//!
//! - One open alert per (cache, kind) inside the dedup window; repeats bump
//!   `occurrences`, refresh the observed value and may escalate severity
//! - Alerts that become critical are dispatched to the notifier
//! - With `auto_resolve`, a kind that evaluates healthy closes its open alert

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::notifier::Notifier;
use crate::domain::events::DomainEvent;
use crate::domain::models::{AlertKind, AlertSeverity, CacheAlert, CacheMetricsSnapshot};
use crate::domain::ports::{AlertQuery, AlertRepository, EventPublisher};
use crate::error::{Error, Result};
use crate::metrics::SnapshotListener;

/// Resolver recorded on automatically closed alerts
pub const SYSTEM_ACTOR: &str = "system";

/// Alert thresholds and behavior
#[derive(Debug, Clone)]
pub struct AlertPolicy {
    /// Window in which a repeat detection updates the open alert
    pub dedup_window: Duration,
    pub hit_ratio_warning: f64,
    pub hit_ratio_critical: f64,
    pub response_ms_warning: f64,
    pub response_ms_critical: f64,
    /// Memory fraction (0.0 - 1.0)
    pub memory_warning: f64,
    pub memory_critical: f64,
    pub error_rate_warning: f64,
    pub error_rate_critical: f64,
    /// Close open alerts when their condition is back to normal
    pub auto_resolve: bool,
}

impl Default for AlertPolicy {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_secs(3600),
            hit_ratio_warning: 0.8,
            hit_ratio_critical: 0.5,
            response_ms_warning: 100.0,
            response_ms_critical: 200.0,
            memory_warning: 0.85,
            memory_critical: 0.95,
            error_rate_warning: 0.05,
            error_rate_critical: 0.1,
            auto_resolve: false,
        }
    }
}

/// One evaluated condition
#[derive(Debug, Clone, PartialEq)]
pub struct Breach {
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub threshold: f64,
    pub observed: f64,
    pub message: String,
}

/// Result of evaluating a snapshot
#[derive(Debug, Default)]
pub struct Evaluation {
    pub breaches: Vec<Breach>,
    /// Kinds that were evaluated and found healthy
    pub healthy: Vec<AlertKind>,
}

impl AlertPolicy {
    fn check(
        kind: AlertKind,
        observed: f64,
        warning: f64,
        critical: f64,
        below: bool,
        describe: impl Fn(f64, f64) -> String,
    ) -> Option<Breach> {
        let crosses = |limit: f64| if below { observed < limit } else { observed > limit };
        let (severity, threshold) = if crosses(critical) {
            (AlertSeverity::Critical, critical)
        } else if crosses(warning) {
            (AlertSeverity::High, warning)
        } else {
            return None;
        };
        Some(Breach {
            kind,
            severity,
            threshold,
            observed,
            message: describe(observed, threshold),
        })
    }

    /// Evaluate a snapshot. Hit ratio is skipped without read traffic and
    /// memory without a known total.
    pub fn evaluate(&self, snapshot: &CacheMetricsSnapshot) -> Evaluation {
        let mut evaluation = Evaluation::default();
        let mut push = |kind: AlertKind, breach: Option<Breach>| match breach {
            Some(breach) => evaluation.breaches.push(breach),
            None => evaluation.healthy.push(kind),
        };

        if snapshot.hit_count + snapshot.miss_count > 0 {
            push(
                AlertKind::LowHitRatio,
                Self::check(
                    AlertKind::LowHitRatio,
                    snapshot.hit_ratio,
                    self.hit_ratio_warning,
                    self.hit_ratio_critical,
                    true,
                    |o, t| format!("Hit ratio {:.1}% is below {:.1}%", o * 100.0, t * 100.0),
                ),
            );
        }

        push(
            AlertKind::SlowResponse,
            Self::check(
                AlertKind::SlowResponse,
                snapshot.avg_response_time_ms,
                self.response_ms_warning,
                self.response_ms_critical,
                false,
                |o, t| format!("Average response time {:.1}ms exceeds {:.0}ms", o, t),
            ),
        );

        if snapshot.memory_total_bytes > 0 {
            push(
                AlertKind::HighMemory,
                Self::check(
                    AlertKind::HighMemory,
                    snapshot.memory_fraction(),
                    self.memory_warning,
                    self.memory_critical,
                    false,
                    |o, t| format!("Memory usage {:.1}% exceeds {:.0}%", o * 100.0, t * 100.0),
                ),
            );
        }

        push(
            AlertKind::HighErrorRate,
            Self::check(
                AlertKind::HighErrorRate,
                snapshot.error_rate(),
                self.error_rate_warning,
                self.error_rate_critical,
                false,
                |o, t| format!("Error rate {:.1}% exceeds {:.1}%", o * 100.0, t * 100.0),
            ),
        );

        evaluation
    }
}

/// Creates, deduplicates, escalates and resolves alerts
pub struct AlertEngine {
    repo: Arc<dyn AlertRepository>,
    policy: AlertPolicy,
    notifier: Option<Arc<dyn Notifier>>,
    recipients: Vec<String>,
    events: Option<Arc<dyn EventPublisher>>,
}

impl AlertEngine {
    pub fn new(repo: Arc<dyn AlertRepository>, policy: AlertPolicy) -> Self {
        Self {
            repo,
            policy,
            notifier: None,
            recipients: Vec::new(),
            events: None,
        }
    }

    /// Dispatch critical alerts to `recipients` through `notifier`
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>, recipients: Vec<String>) -> Self {
        self.notifier = Some(notifier);
        self.recipients = recipients;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn policy(&self) -> &AlertPolicy {
        &self.policy
    }

    fn window_start(&self) -> DateTime<Utc> {
        let window = chrono::Duration::from_std(self.policy.dedup_window)
            .unwrap_or_else(|_| chrono::Duration::hours(1));
        Utc::now() - window
    }

    /// Evaluate a snapshot and persist the resulting alerts.
    ///
    /// Returns the alerts created or updated by this evaluation.
    pub async fn evaluate(&self, snapshot: &CacheMetricsSnapshot) -> Result<Vec<CacheAlert>> {
        let evaluation = self.policy.evaluate(snapshot);
        let mut touched = Vec::with_capacity(evaluation.breaches.len());

        for breach in evaluation.breaches {
            touched.push(self.raise(&snapshot.cache_name, breach).await?);
        }

        if self.policy.auto_resolve && !evaluation.healthy.is_empty() {
            self.auto_resolve(&snapshot.cache_name, &evaluation.healthy)
                .await?;
        }
        Ok(touched)
    }

    async fn raise(&self, cache_name: &str, breach: Breach) -> Result<CacheAlert> {
        let open = self
            .repo
            .find_open(cache_name, breach.kind, self.window_start())
            .await?;

        let (alert, became_critical) = match open {
            Some(mut alert) => {
                let escalated = breach.severity > alert.severity;
                let became_critical = escalated && breach.severity == AlertSeverity::Critical;
                alert.occurrences += 1;
                alert.observed_value = breach.observed;
                alert.message = breach.message;
                alert.updated_at = Utc::now();
                if escalated {
                    info!(
                        cache = %cache_name,
                        kind = %breach.kind,
                        from = %alert.severity,
                        to = %breach.severity,
                        "Alert escalated"
                    );
                    alert.severity = breach.severity;
                    alert.threshold_value = breach.threshold;
                }
                self.repo.update(alert.clone()).await?;
                debug!(cache = %cache_name, kind = %breach.kind, occurrences = alert.occurrences, "Alert deduplicated");
                (alert, became_critical)
            }
            None => {
                let alert = CacheAlert::new(
                    cache_name,
                    breach.kind,
                    breach.severity,
                    breach.message,
                    breach.threshold,
                    breach.observed,
                );
                self.repo.insert(alert.clone()).await?;
                warn!(
                    cache = %cache_name,
                    kind = %alert.kind,
                    severity = %alert.severity,
                    observed = alert.observed_value,
                    "Alert raised"
                );
                self.publish(DomainEvent::alert_raised(
                    cache_name,
                    alert.kind,
                    alert.severity,
                    alert.observed_value,
                ))
                .await;
                let critical = alert.severity == AlertSeverity::Critical;
                (alert, critical)
            }
        };

        if became_critical {
            self.dispatch(&alert).await;
        }
        Ok(alert)
    }

    async fn dispatch(&self, alert: &CacheAlert) {
        let Some(notifier) = &self.notifier else {
            return;
        };
        if let Err(e) = notifier.notify(alert, &self.recipients).await {
            warn!(
                cache = %alert.cache_name,
                kind = %alert.kind,
                notifier = notifier.name(),
                error = %e,
                "Alert notification failed"
            );
        }
    }

    async fn auto_resolve(&self, cache_name: &str, healthy: &[AlertKind]) -> Result<()> {
        let open = self
            .repo
            .list(&AlertQuery {
                cache_name: Some(cache_name.to_string()),
                unresolved_only: true,
            })
            .await?;
        for mut alert in open.into_iter().filter(|a| healthy.contains(&a.kind)) {
            alert.resolve(SYSTEM_ACTOR);
            self.repo.update(alert.clone()).await?;
            info!(cache = %cache_name, kind = %alert.kind, "Alert auto-resolved");
            self.publish_resolved(&alert).await;
        }
        Ok(())
    }

    /// Resolve an alert. Resolving a closed alert returns it unchanged.
    pub async fn resolve(&self, id: Uuid, actor: &str) -> Result<CacheAlert> {
        let mut alert = self
            .repo
            .get(id)
            .await?
            .ok_or_else(|| Error::AlertNotFound(id.to_string()))?;
        if alert.is_resolved {
            return Ok(alert);
        }
        alert.resolve(actor);
        self.repo.update(alert.clone()).await?;
        info!(cache = %alert.cache_name, kind = %alert.kind, actor = %actor, "Alert resolved");
        self.publish_resolved(&alert).await;
        Ok(alert)
    }

    pub async fn list(&self, query: &AlertQuery) -> Result<Vec<CacheAlert>> {
        self.repo.list(query).await
    }

    /// Remove every alert of a cache (configuration delete cascade)
    pub async fn delete_for_cache(&self, cache_name: &str) -> Result<usize> {
        self.repo.delete_for_cache(cache_name).await
    }

    async fn publish_resolved(&self, alert: &CacheAlert) {
        self.publish(DomainEvent::AlertResolved {
            cache_name: alert.cache_name.clone(),
            kind: alert.kind,
            resolved_by: alert.resolved_by.clone().unwrap_or_default(),
            timestamp: Utc::now(),
        })
        .await;
    }

    async fn publish(&self, event: DomainEvent) {
        if let Some(events) = &self.events {
            if let Err(e) = events.publish(event).await {
                debug!(error = %e, "Failed to publish alert event");
            }
        }
    }
}

#[async_trait]
impl SnapshotListener for AlertEngine {
    async fn on_snapshot(&self, snapshot: &CacheMetricsSnapshot) {
        if let Err(e) = self.evaluate(snapshot).await {
            warn!(cache = %snapshot.cache_name, error = %e, "Alert evaluation failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::InMemoryNotifier;
    use crate::store::InMemoryStore;
    use assert_matches::assert_matches;

    fn snapshot(hits: u64, misses: u64, rt: f64) -> CacheMetricsSnapshot {
        let mut s = CacheMetricsSnapshot::empty("catalog");
        s.hit_count = hits;
        s.miss_count = misses;
        s.hit_ratio = CacheMetricsSnapshot::compute_hit_ratio(hits, misses);
        s.get_operations = hits + misses;
        s.avg_response_time_ms = rt;
        s
    }

    fn engine(policy: AlertPolicy) -> (Arc<InMemoryStore>, Arc<InMemoryNotifier>, AlertEngine) {
        let store = Arc::new(InMemoryStore::new());
        let notifier = Arc::new(InMemoryNotifier::new());
        let engine = AlertEngine::new(store.clone(), policy)
            .with_notifier(notifier.clone(), vec!["ops@example.com".into()]);
        (store, notifier, engine)
    }

    #[test]
    fn test_policy_cutoffs() {
        let policy = AlertPolicy::default();
        let eval = policy.evaluate(&snapshot(70, 30, 10.0));
        assert_eq!(eval.breaches.len(), 1);
        assert_eq!(eval.breaches[0].kind, AlertKind::LowHitRatio);
        assert_eq!(eval.breaches[0].severity, AlertSeverity::High);

        let eval = policy.evaluate(&snapshot(40, 60, 250.0));
        assert!(eval
            .breaches
            .iter()
            .all(|b| b.severity == AlertSeverity::Critical));
        assert_eq!(eval.breaches.len(), 2);

        // No traffic: hit ratio not evaluated
        let eval = policy.evaluate(&snapshot(0, 0, 1.0));
        assert!(eval.breaches.is_empty());
        assert!(!eval.healthy.contains(&AlertKind::LowHitRatio));
    }

    #[tokio::test]
    async fn test_dedup_and_escalation() {
        let (store, notifier, engine) = engine(AlertPolicy::default());

        engine.evaluate(&snapshot(70, 30, 1.0)).await.unwrap();
        engine.evaluate(&snapshot(75, 25, 1.0)).await.unwrap();
        let open = store
            .list(&AlertQuery {
                cache_name: Some("catalog".into()),
                unresolved_only: true,
            })
            .await
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].occurrences, 2);
        assert!(notifier.deliveries().is_empty());

        let touched = engine.evaluate(&snapshot(30, 70, 1.0)).await.unwrap();
        assert_eq!(touched[0].severity, AlertSeverity::Critical);
        assert_eq!(touched[0].id, open[0].id);
        assert_eq!(notifier.deliveries().len(), 1);

        // Still critical: no second dispatch
        engine.evaluate(&snapshot(20, 80, 1.0)).await.unwrap();
        assert_eq!(notifier.deliveries().len(), 1);
    }

    #[tokio::test]
    async fn test_notification_failure_keeps_alert() {
        let store = Arc::new(InMemoryStore::new());
        let engine = AlertEngine::new(store.clone(), AlertPolicy::default())
            .with_notifier(Arc::new(InMemoryNotifier::failing()), vec![]);

        let touched = engine.evaluate(&snapshot(10, 90, 1.0)).await.unwrap();
        assert_eq!(touched.len(), 1);
        assert!(store.get(touched[0].id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_auto_resolve_and_manual_resolve() {
        let (store, _, engine) = engine(AlertPolicy {
            auto_resolve: true,
            ..AlertPolicy::default()
        });

        let raised = engine.evaluate(&snapshot(50, 50, 150.0)).await.unwrap();
        assert_eq!(raised.len(), 2);

        // Hit ratio recovers, response time still slow
        engine.evaluate(&snapshot(95, 5, 150.0)).await.unwrap();
        let open = store
            .list(&AlertQuery {
                cache_name: None,
                unresolved_only: true,
            })
            .await
            .unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].kind, AlertKind::SlowResponse);

        let resolved = engine.resolve(open[0].id, "alice").await.unwrap();
        assert!(resolved.is_resolved);
        assert_eq!(resolved.resolved_by.as_deref(), Some("alice"));

        assert_matches!(
            engine.resolve(Uuid::new_v4(), "alice").await,
            Err(Error::AlertNotFound(_))
        );
    }
}
