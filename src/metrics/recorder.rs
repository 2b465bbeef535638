//! Metrics Recorder
//!
//! Buffers per-operation observations and aggregates them into one
//! [`CacheMetricsSnapshot`] per cache per flush.
//!
//! # Flushing
//!
//! - Size-triggered: when the buffer reaches `buffer_size` it is drained and
//!   persisted on a background task
//! - Periodic: [`MetricsRecorder::spawn_flush_task`] flushes every
//!   `flush_interval` until cancelled
//!
//! Observations are immutable once captured, so a drained batch can be
//! aggregated without holding the buffer lock.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::prometheus::CacheTelemetry;
use crate::domain::events::DomainEvent;
use crate::domain::models::CacheMetricsSnapshot;
use crate::domain::ports::{EventPublisher, MetricsRepository};
use crate::error::Result;
use crate::optimizer::stats;

/// Cache operation family
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Get,
    Set,
    Delete,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Get => "get",
            OperationKind::Set => "set",
            OperationKind::Delete => "delete",
        }
    }
}

/// How an operation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Hit,
    Miss,
    Ok,
    Error,
    Timeout,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Hit => "hit",
            Outcome::Miss => "miss",
            Outcome::Ok => "ok",
            Outcome::Error => "error",
            Outcome::Timeout => "timeout",
        }
    }
}

/// One captured operation
#[derive(Debug, Clone)]
pub struct Observation {
    pub cache_name: String,
    pub kind: OperationKind,
    pub outcome: Outcome,
    pub elapsed: Duration,
    /// Payload bytes written to backends
    pub bytes_in: u64,
    /// Payload bytes read from backends
    pub bytes_out: u64,
    pub at: DateTime<Utc>,
}

impl Observation {
    pub fn new(
        cache_name: impl Into<String>,
        kind: OperationKind,
        outcome: Outcome,
        elapsed: Duration,
    ) -> Self {
        Self {
            cache_name: cache_name.into(),
            kind,
            outcome,
            elapsed,
            bytes_in: 0,
            bytes_out: 0,
            at: Utc::now(),
        }
    }

    pub fn with_bytes(mut self, bytes_in: u64, bytes_out: u64) -> Self {
        self.bytes_in = bytes_in;
        self.bytes_out = bytes_out;
        self
    }
}

/// Latest memory reading for a cache
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MemorySample {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

/// Notified after every persisted snapshot
#[async_trait]
pub trait SnapshotListener: Send + Sync {
    async fn on_snapshot(&self, snapshot: &CacheMetricsSnapshot);
}

/// Recorder configuration
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Observations buffered before a size-triggered flush
    pub buffer_size: usize,
    /// Period of the background flush task
    pub flush_interval: Duration,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            buffer_size: 100,
            flush_interval: Duration::from_secs(60),
        }
    }
}

struct Inner {
    config: RecorderConfig,
    buffer: Mutex<Vec<Observation>>,
    memory: DashMap<String, MemorySample>,
    repo: Arc<dyn MetricsRepository>,
    listeners: RwLock<Vec<Arc<dyn SnapshotListener>>>,
    events: Option<Arc<dyn EventPublisher>>,
    telemetry: Option<CacheTelemetry>,
}

/// Buffered metrics recorder. Cheap to clone.
#[derive(Clone)]
pub struct MetricsRecorder {
    inner: Arc<Inner>,
}

impl MetricsRecorder {
    pub fn new(repo: Arc<dyn MetricsRepository>, config: RecorderConfig) -> Self {
        Self::build(repo, config, None, None)
    }

    /// Create a recorder that also feeds Prometheus and publishes events
    pub fn build(
        repo: Arc<dyn MetricsRepository>,
        config: RecorderConfig,
        telemetry: Option<CacheTelemetry>,
        events: Option<Arc<dyn EventPublisher>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                buffer: Mutex::new(Vec::with_capacity(config.buffer_size)),
                config,
                memory: DashMap::new(),
                repo,
                listeners: RwLock::new(Vec::new()),
                events,
                telemetry,
            }),
        }
    }

    /// Register a snapshot listener (e.g. the alert engine)
    pub fn add_listener(&self, listener: Arc<dyn SnapshotListener>) {
        self.inner.listeners.write().push(listener);
    }

    pub fn config(&self) -> &RecorderConfig {
        &self.inner.config
    }

    /// Observations waiting for the next flush
    pub fn buffered(&self) -> usize {
        self.inner.buffer.lock().len()
    }

    /// Capture an observation; drains the buffer in the background when full
    pub fn record(&self, observation: Observation) {
        if let Some(telemetry) = &self.inner.telemetry {
            let outcome = match (observation.kind, observation.outcome) {
                (OperationKind::Get, o) => o.as_str(),
                (_, Outcome::Ok) => observation.kind.as_str(),
                (_, o) => o.as_str(),
            };
            telemetry
                .requests
                .with_label_values(&[&observation.cache_name, outcome])
                .inc();
            telemetry
                .operation_seconds
                .with_label_values(&[&observation.cache_name, observation.kind.as_str()])
                .observe(observation.elapsed.as_secs_f64());
        }

        let batch = {
            let mut buffer = self.inner.buffer.lock();
            buffer.push(observation);
            if buffer.len() >= self.inner.config.buffer_size {
                Some(std::mem::take(&mut *buffer))
            } else {
                None
            }
        };

        if let Some(batch) = batch {
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    let this = self.clone();
                    handle.spawn(async move {
                        if let Err(e) = this.persist(batch).await {
                            warn!(error = %e, "Size-triggered metrics flush failed");
                        }
                    });
                }
                // No runtime: keep the batch for the next explicit flush
                Err(_) => self.inner.buffer.lock().extend(batch),
            }
        }
    }

    /// Count a request that never reached a backend. Only the Prometheus
    /// counter moves; nothing enters the snapshot buffer.
    pub fn record_request(&self, cache_label: &str, outcome: &str) {
        if let Some(telemetry) = &self.inner.telemetry {
            telemetry
                .requests
                .with_label_values(&[cache_label, outcome])
                .inc();
        }
    }

    /// Count a backend adapter failure
    pub fn record_backend_error(&self, backend: &str) {
        if let Some(telemetry) = &self.inner.telemetry {
            telemetry.backend_errors.with_label_values(&[backend]).inc();
        }
    }

    /// Update the memory reading used for the next snapshot of a cache
    pub fn record_memory(&self, cache_name: &str, sample: MemorySample) {
        self.inner.memory.insert(cache_name.to_string(), sample);
    }

    /// Drain the buffer and persist one snapshot per cache
    pub async fn flush(&self) -> Result<Vec<CacheMetricsSnapshot>> {
        let batch = std::mem::take(&mut *self.inner.buffer.lock());
        self.persist(batch).await
    }

    async fn persist(&self, batch: Vec<Observation>) -> Result<Vec<CacheMetricsSnapshot>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        let mut by_cache: BTreeMap<String, Vec<Observation>> = BTreeMap::new();
        for observation in batch {
            by_cache
                .entry(observation.cache_name.clone())
                .or_default()
                .push(observation);
        }

        let mut snapshots = Vec::with_capacity(by_cache.len());
        for (cache_name, observations) in by_cache {
            let memory = self.inner.memory.get(&cache_name).map(|m| *m);
            let snapshot = aggregate(&cache_name, &observations, memory);
            self.inner.repo.insert(snapshot.clone()).await?;
            debug!(
                cache = %cache_name,
                operations = observations.len(),
                hit_ratio = snapshot.hit_ratio,
                "Metrics snapshot persisted"
            );

            let listeners = self.inner.listeners.read().clone();
            for listener in listeners {
                listener.on_snapshot(&snapshot).await;
            }
            if let Some(events) = &self.inner.events {
                let event = DomainEvent::SnapshotRecorded {
                    cache_name: cache_name.clone(),
                    hit_ratio: snapshot.hit_ratio,
                    timestamp: snapshot.timestamp,
                };
                if let Err(e) = events.publish(event).await {
                    debug!(cache = %cache_name, error = %e, "Failed to publish snapshot event");
                }
            }
            snapshots.push(snapshot);
        }
        Ok(snapshots)
    }

    /// Flush every `flush_interval` until cancelled, then flush once more
    pub fn spawn_flush_task(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.inner.config.flush_interval);
            ticker.tick().await;
            info!(
                interval_secs = this.inner.config.flush_interval.as_secs(),
                "Metrics flush task started"
            );

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let started = Instant::now();
                        match this.flush().await {
                            Ok(snapshots) if !snapshots.is_empty() => debug!(
                                snapshots = snapshots.len(),
                                elapsed_ms = started.elapsed().as_millis() as u64,
                                "Periodic metrics flush"
                            ),
                            Ok(_) => {}
                            Err(e) => warn!(error = %e, "Periodic metrics flush failed"),
                        }
                    }
                }
            }

            if let Err(e) = this.flush().await {
                warn!(error = %e, "Final metrics flush failed");
            }
            info!("Metrics flush task stopped");
        })
    }
}

/// Fold one cache's observations into a snapshot
pub fn aggregate(
    cache_name: &str,
    observations: &[Observation],
    memory: Option<MemorySample>,
) -> CacheMetricsSnapshot {
    let mut snapshot = CacheMetricsSnapshot::empty(cache_name);
    let latencies: Vec<f64> = observations
        .iter()
        .map(|o| o.elapsed.as_secs_f64() * 1000.0)
        .collect();

    for o in observations {
        match o.kind {
            OperationKind::Get => snapshot.get_operations += 1,
            OperationKind::Set => snapshot.set_operations += 1,
            OperationKind::Delete => snapshot.delete_operations += 1,
        }
        match o.outcome {
            Outcome::Hit => snapshot.hit_count += 1,
            Outcome::Miss => snapshot.miss_count += 1,
            Outcome::Error => snapshot.error_count += 1,
            Outcome::Timeout => {
                snapshot.timeout_count += 1;
                snapshot.error_count += 1;
            }
            Outcome::Ok => {}
        }
        snapshot.network_in_bytes += o.bytes_in;
        snapshot.network_out_bytes += o.bytes_out;
    }

    snapshot.hit_ratio = CacheMetricsSnapshot::compute_hit_ratio(snapshot.hit_count, snapshot.miss_count);
    snapshot.avg_response_time_ms = stats::mean(&latencies);
    snapshot.min_response_time_ms = latencies.iter().copied().fold(f64::INFINITY, f64::min);
    snapshot.max_response_time_ms = latencies.iter().copied().fold(0.0, f64::max);
    if !snapshot.min_response_time_ms.is_finite() {
        snapshot.min_response_time_ms = 0.0;
    }
    snapshot.p95_response_time_ms = stats::percentile(&latencies, 95.0);

    if let Some(memory) = memory {
        snapshot.memory_used_bytes = memory.used_bytes;
        snapshot.memory_total_bytes = memory.total_bytes;
        if memory.total_bytes > 0 {
            snapshot.memory_usage_percent =
                memory.used_bytes as f64 / memory.total_bytes as f64 * 100.0;
        }
    }
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::store::InMemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn obs(cache: &str, kind: OperationKind, outcome: Outcome, ms: u64) -> Observation {
        Observation::new(cache, kind, outcome, Duration::from_millis(ms))
    }

    #[test]
    fn test_aggregate() {
        let observations = vec![
            obs("c", OperationKind::Get, Outcome::Hit, 2),
            obs("c", OperationKind::Get, Outcome::Hit, 4),
            obs("c", OperationKind::Get, Outcome::Miss, 6),
            obs("c", OperationKind::Set, Outcome::Ok, 8).with_bytes(100, 0),
            obs("c", OperationKind::Delete, Outcome::Timeout, 10),
        ];
        let snapshot = aggregate(
            "c",
            &observations,
            Some(MemorySample {
                used_bytes: 50,
                total_bytes: 200,
            }),
        );

        assert_eq!(snapshot.hit_count, 2);
        assert_eq!(snapshot.miss_count, 1);
        assert!((snapshot.hit_ratio - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(snapshot.get_operations, 3);
        assert_eq!(snapshot.set_operations, 1);
        assert_eq!(snapshot.delete_operations, 1);
        assert_eq!(snapshot.timeout_count, 1);
        assert_eq!(snapshot.error_count, 1);
        assert_eq!(snapshot.network_in_bytes, 100);
        assert_eq!(snapshot.min_response_time_ms, 2.0);
        assert_eq!(snapshot.max_response_time_ms, 10.0);
        assert_eq!(snapshot.avg_response_time_ms, 6.0);
        assert_eq!(snapshot.memory_usage_percent, 25.0);
    }

    #[tokio::test]
    async fn test_flush_groups_by_cache() {
        let repo = Arc::new(InMemoryStore::new());
        let recorder = MetricsRecorder::new(repo.clone(), RecorderConfig::default());

        recorder.record(obs("a", OperationKind::Get, Outcome::Hit, 1));
        recorder.record(obs("b", OperationKind::Get, Outcome::Miss, 1));
        recorder.record(obs("a", OperationKind::Get, Outcome::Miss, 1));
        assert_eq!(recorder.buffered(), 3);

        let snapshots = recorder.flush().await.unwrap();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(recorder.buffered(), 0);
        assert_eq!(repo.latest("a").await.unwrap().unwrap().hit_count, 1);
        assert!(recorder.flush().await.unwrap().is_empty());
    }

    struct Counting(AtomicUsize);

    #[async_trait]
    impl SnapshotListener for Counting {
        async fn on_snapshot(&self, _snapshot: &CacheMetricsSnapshot) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_size_triggered_flush_notifies_listeners() {
        let repo = Arc::new(InMemoryStore::new());
        let recorder = MetricsRecorder::new(
            repo.clone(),
            RecorderConfig {
                buffer_size: 3,
                flush_interval: Duration::from_secs(3600),
            },
        );
        let listener = Arc::new(Counting(AtomicUsize::new(0)));
        recorder.add_listener(listener.clone());

        for _ in 0..3 {
            recorder.record(obs("c", OperationKind::Get, Outcome::Hit, 1));
        }
        assert_eq!(recorder.buffered(), 0);

        for _ in 0..50 {
            if listener.0.load(Ordering::SeqCst) > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(listener.0.load(Ordering::SeqCst), 1);
        assert_eq!(repo.latest("c").await.unwrap().unwrap().get_operations, 3);
    }

    #[tokio::test]
    async fn test_skipped_request_counts_only_in_telemetry() {
        let repo = Arc::new(InMemoryStore::new());
        let telemetry = CacheTelemetry::register(::prometheus::Registry::new()).unwrap();
        let recorder = MetricsRecorder::build(
            repo.clone(),
            RecorderConfig::default(),
            Some(telemetry.clone()),
            None,
        );

        recorder.record_request("paused", "disabled");
        recorder.record_request("paused", "disabled");

        assert_eq!(recorder.buffered(), 0);
        assert!(recorder.flush().await.unwrap().is_empty());
        assert_eq!(
            telemetry
                .requests
                .with_label_values(&["paused", "disabled"])
                .get(),
            2
        );
    }

    /// Event sink whose transport is down
    struct Unreachable;

    #[async_trait]
    impl EventPublisher for Unreachable {
        async fn publish(&self, _event: DomainEvent) -> Result<()> {
            Err(Error::Internal("event bus unreachable".into()))
        }
    }

    #[tokio::test]
    async fn test_event_failure_keeps_snapshot() {
        let repo = Arc::new(InMemoryStore::new());
        let recorder = MetricsRecorder::build(
            repo.clone(),
            RecorderConfig::default(),
            None,
            Some(Arc::new(Unreachable)),
        );
        recorder.record(obs("c", OperationKind::Get, Outcome::Hit, 1));

        let snapshots = recorder.flush().await.unwrap();
        assert_eq!(snapshots.len(), 1);
        assert!(repo.latest("c").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_flush_task_final_flush_on_cancel() {
        let repo = Arc::new(InMemoryStore::new());
        let recorder = MetricsRecorder::new(
            repo.clone(),
            RecorderConfig {
                buffer_size: 100,
                flush_interval: Duration::from_secs(3600),
            },
        );
        recorder.record(obs("c", OperationKind::Set, Outcome::Ok, 1));

        let cancel = CancellationToken::new();
        let handle = recorder.spawn_flush_task(cancel.clone());
        cancel.cancel();
        handle.await.unwrap();

        assert!(repo.latest("c").await.unwrap().is_some());
    }
}
