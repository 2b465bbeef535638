//! Multi-Level Cache Manager
//!
//! Layers a distributed primary backend (chosen by the configuration's
//! backend type) in front of the in-process local backend.
//!
//! # Read Path
//!
//! ```text
//! resolve config ─► primary.get ─► local.get ─► miss
//!                      │ hit          │ hit
//!                      ▼              ▼
//!                   decode      decode + promote to primary
//! ```
//!
//! Every adapter call is bounded by `min(adapter_timeout, remaining budget)`
//! where the budget is the per-request deadline. Adapters whose slot is
//! exhausted are skipped. Adapter failures never escape [`get`]; they are
//! logged, counted and the next tier is tried.
//!
//! [`get`]: MultiLevelCacheManager::get

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, trace, warn};

use super::codec::{EncodeOptions, PayloadCodec};
use super::compression::CompressionAlgorithm;
use super::lookup::Lookup;
use crate::domain::events::DomainEvent;
use crate::domain::models::{
    BackendType, CacheConfiguration, CacheInvalidationRecord, CacheMetricsSnapshot,
    InvalidationKind, SETTING_COMPRESSION_ALGORITHM,
};
use crate::domain::ports::{
    BackendStats, CacheBackend, EventPublisher, InvalidationLog, MetricsRepository,
};
use crate::error::{Error, Result};
use crate::metrics::{MemorySample, MetricsRecorder, Observation, OperationKind, Outcome};
use crate::store::ConfigStore;

const BYTES_PER_MB: u64 = 1024 * 1024;

/// Timeouts applied to backend calls
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Upper bound for a single adapter call
    pub adapter_timeout: Duration,
    /// Budget shared by all adapter calls of one operation
    pub request_deadline: Duration,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            adapter_timeout: Duration::from_millis(150),
            request_deadline: Duration::from_millis(500),
        }
    }
}

/// Remaining time budget of one operation
#[derive(Debug, Clone, Copy)]
struct Deadline {
    started: Instant,
    budget: Option<Duration>,
}

impl Deadline {
    fn new(budget: Duration) -> Self {
        Self {
            started: Instant::now(),
            budget: Some(budget),
        }
    }

    /// Only the per-adapter timeout applies
    fn unbounded() -> Self {
        Self {
            started: Instant::now(),
            budget: None,
        }
    }

    /// Time an adapter call may take, `None` once the budget is spent
    fn slot(&self, adapter_timeout: Duration) -> Option<Duration> {
        match self.budget {
            None => Some(adapter_timeout),
            Some(budget) => {
                let remaining = budget.checked_sub(self.started.elapsed())?;
                if remaining.is_zero() {
                    None
                } else {
                    Some(remaining.min(adapter_timeout))
                }
            }
        }
    }
}

/// Configuration, latest snapshot and backend introspection for one cache
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub config: CacheConfiguration,
    pub latest_snapshot: Option<CacheMetricsSnapshot>,
    pub backends: Vec<BackendStats>,
}

/// Result of removing entries across tiers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Removal {
    /// Distinct keys removed from at least one tier
    pub deleted: usize,
    /// Per-backend failures
    pub errors: Vec<String>,
    /// Set when the cache was unknown or inactive; no backend was contacted
    pub skipped: Option<String>,
}

impl Removal {
    fn skipped(why: Unserved) -> Self {
        Self {
            skipped: Some(why.as_str().to_string()),
            ..Self::default()
        }
    }

    /// Every contacted tier answered
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.skipped.is_none()
    }
}

/// Why an operation did not reach any backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unserved {
    Inactive,
    Unknown,
}

impl Unserved {
    fn as_str(self) -> &'static str {
        match self {
            Unserved::Inactive => "cache inactive",
            Unserved::Unknown => "configuration not found",
        }
    }
}

/// Label used for requests against caches with no configuration
pub const UNKNOWN_CACHE_LABEL: &str = "<unknown>";

/// Key stored in every backend, scoped to the configuration's namespace
pub fn storage_key(config: &CacheConfiguration, key: &str) -> String {
    format!("{}:{}", config.key_namespace(), key)
}

/// Multi-level cache manager. All collaborators are injected.
pub struct MultiLevelCacheManager {
    configs: Arc<ConfigStore>,
    primaries: HashMap<BackendType, Arc<dyn CacheBackend>>,
    local: Arc<dyn CacheBackend>,
    codec: Arc<PayloadCodec>,
    recorder: MetricsRecorder,
    invalidations: Arc<dyn InvalidationLog>,
    metrics: Arc<dyn MetricsRepository>,
    events: Option<Arc<dyn EventPublisher>>,
    config: ManagerConfig,
}

/// Builder for [`MultiLevelCacheManager`]
pub struct ManagerBuilder {
    configs: Arc<ConfigStore>,
    local: Arc<dyn CacheBackend>,
    recorder: MetricsRecorder,
    invalidations: Arc<dyn InvalidationLog>,
    metrics: Arc<dyn MetricsRepository>,
    primaries: HashMap<BackendType, Arc<dyn CacheBackend>>,
    codec: Arc<PayloadCodec>,
    events: Option<Arc<dyn EventPublisher>>,
    config: ManagerConfig,
}

impl ManagerBuilder {
    /// Serve configurations of `backend_type` from `backend` before the local tier
    pub fn primary(mut self, backend_type: BackendType, backend: Arc<dyn CacheBackend>) -> Self {
        self.primaries.insert(backend_type, backend);
        self
    }

    pub fn codec(mut self, codec: Arc<PayloadCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn events(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> MultiLevelCacheManager {
        MultiLevelCacheManager {
            configs: self.configs,
            primaries: self.primaries,
            local: self.local,
            codec: self.codec,
            recorder: self.recorder,
            invalidations: self.invalidations,
            metrics: self.metrics,
            events: self.events,
            config: self.config,
        }
    }
}

impl MultiLevelCacheManager {
    /// Start building a manager from its required collaborators
    pub fn builder(
        configs: Arc<ConfigStore>,
        local: Arc<dyn CacheBackend>,
        recorder: MetricsRecorder,
        invalidations: Arc<dyn InvalidationLog>,
        metrics: Arc<dyn MetricsRepository>,
    ) -> ManagerBuilder {
        ManagerBuilder {
            configs,
            local,
            recorder,
            invalidations,
            metrics,
            primaries: HashMap::new(),
            codec: Arc::new(PayloadCodec::default()),
            events: None,
            config: ManagerConfig::default(),
        }
    }

    pub fn configs(&self) -> &Arc<ConfigStore> {
        &self.configs
    }

    pub fn recorder(&self) -> &MetricsRecorder {
        &self.recorder
    }

    pub fn invalidation_log(&self) -> &Arc<dyn InvalidationLog> {
        &self.invalidations
    }

    pub fn metrics_repository(&self) -> &Arc<dyn MetricsRepository> {
        &self.metrics
    }

    /// Ordered adapter chain for a configuration: primary (if any), then local
    pub fn chain(&self, config: &CacheConfiguration) -> Vec<Arc<dyn CacheBackend>> {
        let mut chain = Vec::with_capacity(2);
        if let Some(primary) = self.primaries.get(&config.backend_type) {
            chain.push(primary.clone());
        }
        chain.push(self.local.clone());
        chain
    }

    async fn resolve(&self, cache_name: &str) -> Option<CacheConfiguration> {
        match self.configs.get(cache_name).await {
            Ok(config) => config,
            Err(e) => {
                warn!(cache = %cache_name, error = %e, "Configuration lookup failed");
                None
            }
        }
    }

    async fn active_config(&self, cache_name: &str) -> Option<CacheConfiguration> {
        self.resolve(cache_name).await.filter(|c| c.is_active)
    }

    /// Active configuration, or why the cache cannot be served
    async fn target(&self, cache_name: &str) -> std::result::Result<CacheConfiguration, Unserved> {
        match self.resolve(cache_name).await {
            Some(config) if config.is_active => Ok(config),
            Some(_) => Err(Unserved::Inactive),
            None => Err(Unserved::Unknown),
        }
    }

    async fn bounded<T, F>(&self, backend: &str, deadline: &Deadline, call: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let slot = deadline
            .slot(self.config.adapter_timeout)
            .ok_or_else(|| Error::BackendTimeout {
                backend: backend.to_string(),
                timeout_ms: 0,
            })?;
        match tokio::time::timeout(slot, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::BackendTimeout {
                backend: backend.to_string(),
                timeout_ms: slot.as_millis() as u64,
            }),
        }
    }

    fn encode_options(config: &CacheConfiguration) -> EncodeOptions {
        let compression = config.compression_enabled.then(|| {
            config
                .settings
                .get(SETTING_COMPRESSION_ALGORITHM)
                .and_then(|v| v.as_str())
                .and_then(CompressionAlgorithm::parse)
                .unwrap_or_default()
        });
        EncodeOptions {
            compression,
            encrypt: config.encryption_enabled,
        }
    }

    fn observe(
        &self,
        cache_name: &str,
        kind: OperationKind,
        outcome: Outcome,
        started: Instant,
        bytes_in: u64,
        bytes_out: u64,
    ) {
        self.recorder.record(
            Observation::new(cache_name, kind, outcome, started.elapsed())
                .with_bytes(bytes_in, bytes_out),
        );
    }

    // =========================================================================
    // Read Path
    // =========================================================================

    /// Read a value; every failure collapses to `None`
    pub async fn get(&self, key: &str, cache_name: &str) -> Option<Value> {
        self.lookup(key, cache_name).await.into_value()
    }

    /// Read a value, reporting which tier served it
    pub async fn lookup(&self, key: &str, cache_name: &str) -> Lookup {
        let started = Instant::now();
        let config = match self.target(cache_name).await {
            Ok(config) => config,
            Err(why) => {
                trace!(cache = %cache_name, key = %key, reason = why.as_str(), "Cache not served");
                let lookup = Lookup::Disabled;
                // Unknown names stay out of the label set
                let cache_label = match why {
                    Unserved::Inactive => cache_name,
                    Unserved::Unknown => UNKNOWN_CACHE_LABEL,
                };
                self.recorder.record_request(cache_label, lookup.label());
                return lookup;
            }
        };

        let chain = self.chain(&config);
        let skey = storage_key(&config, key);
        let deadline = Deadline::new(self.config.request_deadline);
        let mut failures = 0;
        let mut last_error = None;

        for (level, backend) in chain.iter().enumerate() {
            let payload = match self
                .bounded(backend.name(), &deadline, backend.get(&skey))
                .await
            {
                Ok(Some(payload)) => payload,
                Ok(None) => continue,
                Err(e) => {
                    warn!(cache = %cache_name, key = %key, backend = backend.name(), error = %e, "Backend read failed");
                    self.recorder.record_backend_error(backend.name());
                    failures += 1;
                    last_error = Some(e);
                    continue;
                }
            };

            match self.codec.decode(&payload, config.encryption_enabled) {
                Ok(value) => {
                    if level > 0 {
                        self.promote(&chain[..level], &skey, &payload, &config, &deadline)
                            .await;
                    }
                    debug!(cache = %cache_name, key = %key, level, "Cache hit");
                    self.observe(
                        cache_name,
                        OperationKind::Get,
                        Outcome::Hit,
                        started,
                        0,
                        payload.len() as u64,
                    );
                    return Lookup::Hit { value, level };
                }
                Err(e) => {
                    warn!(cache = %cache_name, key = %key, backend = backend.name(), error = %e, "Undecodable payload");
                    failures += 1;
                    last_error = Some(e);
                }
            }
        }

        let timed_out = matches!(last_error, Some(Error::BackendTimeout { .. }));
        match last_error {
            Some(e) if failures == chain.len() => {
                let outcome = if timed_out { Outcome::Timeout } else { Outcome::Error };
                self.observe(cache_name, OperationKind::Get, outcome, started, 0, 0);
                Lookup::Error(e)
            }
            _ => {
                debug!(cache = %cache_name, key = %key, "Cache miss");
                self.observe(cache_name, OperationKind::Get, Outcome::Miss, started, 0, 0);
                Lookup::Miss
            }
        }
    }

    /// Write the raw payload back to every tier above the one that hit
    async fn promote(
        &self,
        tiers: &[Arc<dyn CacheBackend>],
        skey: &str,
        payload: &bytes::Bytes,
        config: &CacheConfiguration,
        deadline: &Deadline,
    ) {
        for backend in tiers {
            let result = self
                .bounded(
                    backend.name(),
                    deadline,
                    backend.set(skey, payload.clone(), config.ttl()),
                )
                .await;
            match result {
                Ok(_) => trace!(cache = %config.name, key = %skey, backend = backend.name(), "Promoted"),
                Err(e) => {
                    warn!(cache = %config.name, key = %skey, backend = backend.name(), error = %e, "Promotion failed");
                    self.recorder.record_backend_error(backend.name());
                }
            }
        }
    }

    // =========================================================================
    // Write Path
    // =========================================================================

    /// Write a value to every tier. `ttl_seconds` defaults to the
    /// configuration TTL. Returns true if at least one tier stored it.
    pub async fn set(
        &self,
        key: &str,
        value: &Value,
        cache_name: &str,
        ttl_seconds: Option<u64>,
    ) -> bool {
        let started = Instant::now();
        let Some(config) = self.active_config(cache_name).await else {
            trace!(cache = %cache_name, key = %key, "Set skipped, cache disabled or unknown");
            return false;
        };

        let payload = match self.codec.encode(value, Self::encode_options(&config)) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(cache = %cache_name, key = %key, error = %e, "Failed to encode value");
                self.observe(cache_name, OperationKind::Set, Outcome::Error, started, 0, 0);
                return false;
            }
        };

        let ttl = ttl_seconds
            .map(Duration::from_secs)
            .unwrap_or_else(|| config.ttl());
        let skey = storage_key(&config, key);
        let deadline = Deadline::new(self.config.request_deadline);
        let mut stored = 0;
        let mut timed_out = false;

        for backend in self.chain(&config) {
            match self
                .bounded(
                    backend.name(),
                    &deadline,
                    backend.set(&skey, payload.clone(), ttl),
                )
                .await
            {
                Ok(true) => stored += 1,
                Ok(false) => {
                    debug!(cache = %cache_name, key = %key, backend = backend.name(), "Backend declined value")
                }
                Err(e) => {
                    timed_out |= matches!(e, Error::BackendTimeout { .. });
                    warn!(cache = %cache_name, key = %key, backend = backend.name(), error = %e, "Backend write failed");
                    self.recorder.record_backend_error(backend.name());
                }
            }
        }

        let outcome = match (stored, timed_out) {
            (0, true) => Outcome::Timeout,
            (0, false) => Outcome::Error,
            _ => Outcome::Ok,
        };
        self.observe(
            cache_name,
            OperationKind::Set,
            outcome,
            started,
            payload.len() as u64 * stored,
            0,
        );
        stored > 0
    }

    // =========================================================================
    // Invalidation
    // =========================================================================

    /// Delete a key from every tier and audit it
    pub async fn delete(&self, key: &str, cache_name: &str) -> bool {
        self.delete_with(key, cache_name, "manual delete", None)
            .await
            .deleted
            > 0
    }

    /// Delete a key with an explicit reason and principal. Unknown and
    /// inactive caches are audited as failed and no backend is contacted.
    pub async fn delete_with(
        &self,
        key: &str,
        cache_name: &str,
        reason: &str,
        actor: Option<&str>,
    ) -> Removal {
        let started = Instant::now();
        let record = CacheInvalidationRecord::new(cache_name, key, InvalidationKind::Manual, reason)
            .triggered_by(actor.map(str::to_string));

        let config = match self.target(cache_name).await {
            Ok(config) => config,
            Err(why) => {
                debug!(cache = %cache_name, key = %key, reason = why.as_str(), "Delete skipped");
                self.audit(record.outcome(false, Some(why.as_str().into())), 0)
                    .await;
                return Removal::skipped(why);
            }
        };

        let skey = storage_key(&config, key);
        let deadline = Deadline::new(self.config.request_deadline);
        let mut deleted = false;
        let mut errors = Vec::new();

        for backend in self.chain(&config) {
            match self
                .bounded(backend.name(), &deadline, backend.delete(&skey))
                .await
            {
                Ok(existed) => deleted |= existed,
                Err(e) => {
                    warn!(cache = %cache_name, key = %key, backend = backend.name(), error = %e, "Backend delete failed");
                    self.recorder.record_backend_error(backend.name());
                    errors.push(format!("{}: {}", backend.name(), e));
                }
            }
        }

        let outcome = if errors.is_empty() { Outcome::Ok } else { Outcome::Error };
        self.observe(cache_name, OperationKind::Delete, outcome, started, 0, 0);

        let error = (!errors.is_empty()).then(|| errors.join("; "));
        self.audit(record.outcome(deleted, error), usize::from(deleted))
            .await;
        Removal {
            deleted: usize::from(deleted),
            errors,
            skipped: None,
        }
    }

    /// Delete every key matching a glob pattern from tiers that can enumerate keys
    pub async fn invalidate_pattern(&self, pattern: &str, cache_name: &str) -> usize {
        self.invalidate_pattern_with(pattern, cache_name, InvalidationKind::Pattern, "pattern invalidation", None)
            .await
            .deleted
    }

    /// Pattern invalidation with an explicit kind, reason and principal.
    /// Unknown and inactive caches are skipped like [`delete_with`].
    ///
    /// [`delete_with`]: MultiLevelCacheManager::delete_with
    pub async fn invalidate_pattern_with(
        &self,
        pattern: &str,
        cache_name: &str,
        kind: InvalidationKind,
        reason: &str,
        actor: Option<&str>,
    ) -> Removal {
        let record = CacheInvalidationRecord::new(cache_name, pattern, kind, reason)
            .triggered_by(actor.map(str::to_string));

        match self.target(cache_name).await {
            Ok(config) => self.remove_matching(&config, pattern, record).await,
            Err(why) => {
                debug!(cache = %cache_name, pattern = %pattern, reason = why.as_str(), "Pattern invalidation skipped");
                self.audit(record.outcome(false, Some(why.as_str().into())), 0)
                    .await;
                Removal::skipped(why)
            }
        }
    }

    /// Remove every live entry of a cache, active or not (configuration
    /// delete cascade)
    pub async fn purge(&self, cache_name: &str, actor: Option<&str>) -> usize {
        let record = CacheInvalidationRecord::new(
            cache_name,
            "*",
            InvalidationKind::ConfigDelete,
            "configuration deleted",
        )
        .triggered_by(actor.map(str::to_string));

        let Some(config) = self.resolve(cache_name).await else {
            self.audit(record.outcome(false, Some("configuration not found".into())), 0)
                .await;
            return 0;
        };
        self.remove_matching(&config, "*", record).await.deleted
    }

    async fn remove_matching(
        &self,
        config: &CacheConfiguration,
        pattern: &str,
        record: CacheInvalidationRecord,
    ) -> Removal {
        let cache_name = config.name.as_str();
        let prefix = storage_key(config, "");
        let scan_pattern = storage_key(config, pattern);
        let deadline = Deadline::unbounded();
        let mut deleted: HashSet<String> = HashSet::new();
        let mut errors = Vec::new();

        for backend in self
            .chain(config)
            .into_iter()
            .filter(|b| b.supports_pattern_scan())
        {
            let keys = match self
                .bounded(backend.name(), &deadline, backend.scan(&scan_pattern))
                .await
            {
                Ok(keys) => keys,
                Err(e) => {
                    warn!(cache = %cache_name, pattern = %pattern, backend = backend.name(), error = %e, "Backend scan failed");
                    self.recorder.record_backend_error(backend.name());
                    errors.push(format!("{}: {}", backend.name(), e));
                    continue;
                }
            };

            for skey in keys {
                match self
                    .bounded(backend.name(), &deadline, backend.delete(&skey))
                    .await
                {
                    Ok(true) => {
                        let key = skey.strip_prefix(&prefix).unwrap_or(&skey).to_string();
                        deleted.insert(key);
                    }
                    Ok(false) => {}
                    Err(e) => {
                        self.recorder.record_backend_error(backend.name());
                        errors.push(format!("{}: {}", backend.name(), e));
                    }
                }
            }
        }

        info!(cache = %cache_name, pattern = %pattern, deleted = deleted.len(), "Pattern invalidated");
        let error = (!errors.is_empty()).then(|| errors.join("; "));
        self.audit(record.outcome(errors.is_empty(), error), deleted.len())
            .await;
        Removal {
            deleted: deleted.len(),
            errors,
            skipped: None,
        }
    }

    async fn audit(&self, record: CacheInvalidationRecord, deleted: usize) {
        let event = DomainEvent::cache_invalidated(
            &record.cache_name,
            &record.target,
            record.kind,
            deleted,
        );
        if let Err(e) = self.invalidations.record(record).await {
            warn!(error = %e, "Failed to write invalidation record");
        }
        if let Some(events) = &self.events {
            if let Err(e) = events.publish(event).await {
                debug!(error = %e, "Failed to publish invalidation event");
            }
        }
    }

    // =========================================================================
    // Warming & Introspection
    // =========================================================================

    /// Populate keys from a loader. Failures are isolated per key.
    pub async fn warm<F, Fut>(
        &self,
        cache_name: &str,
        keys: &[String],
        loader: F,
    ) -> HashMap<String, bool>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<Option<Value>>>,
    {
        let mut results = HashMap::with_capacity(keys.len());
        for key in keys {
            let stored = match loader(key.clone()).await {
                Ok(Some(value)) => self.set(key, &value, cache_name, None).await,
                Ok(None) => false,
                Err(e) => {
                    warn!(cache = %cache_name, key = %key, error = %e, "Warming loader failed");
                    false
                }
            };
            results.insert(key.clone(), stored);
        }
        debug!(
            cache = %cache_name,
            warmed = results.values().filter(|ok| **ok).count(),
            requested = keys.len(),
            "Warming finished"
        );
        results
    }

    /// Configuration, latest snapshot and backend-native stats
    pub async fn get_cache_stats(&self, cache_name: &str) -> Result<CacheStats> {
        let config = self.configs.require(cache_name).await?;
        let latest_snapshot = self.metrics.latest(cache_name).await?;

        let deadline = Deadline::new(self.config.request_deadline);
        let mut backends = Vec::new();
        for backend in self.chain(&config) {
            match self.bounded(backend.name(), &deadline, backend.stats()).await {
                Ok(Some(stats)) => backends.push(stats),
                Ok(None) => {}
                Err(e) => {
                    warn!(cache = %cache_name, backend = backend.name(), error = %e, "Backend stats unavailable")
                }
            }
        }

        Ok(CacheStats {
            config,
            latest_snapshot,
            backends,
        })
    }

    /// Feed backend memory readings into the recorder for every active cache
    pub async fn sample_memory(&self) -> Result<()> {
        for config in self.configs.list().await?.into_iter().filter(|c| c.is_active) {
            let backend = self
                .primaries
                .get(&config.backend_type)
                .unwrap_or(&self.local)
                .clone();
            let stats = match self
                .bounded(backend.name(), &Deadline::unbounded(), backend.stats())
                .await
            {
                Ok(Some(stats)) => stats,
                Ok(None) => continue,
                Err(e) => {
                    debug!(cache = %config.name, backend = backend.name(), error = %e, "Memory sample skipped");
                    continue;
                }
            };
            let Some(used_bytes) = stats.memory_used_bytes else {
                continue;
            };
            let total_bytes = stats
                .memory_total_bytes
                .unwrap_or(config.max_size_mb * BYTES_PER_MB);
            self.recorder.record_memory(
                &config.name,
                MemorySample {
                    used_bytes,
                    total_bytes,
                },
            );
        }
        Ok(())
    }
}
