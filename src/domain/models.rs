//! Domain Models
//!
//! Persistent entity families owned by the cache engine: configurations,
//! metrics snapshots, invalidation audit rows, alerts, optimization
//! recommendations and warming tasks.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Maximum TTL accepted by a configuration (one year)
pub const MAX_TTL_SECONDS: u64 = 365 * 24 * 60 * 60;

/// Minimum cache size in MB
pub const MIN_SIZE_MB: u64 = 1;

/// Maximum cache size in MB (10GB)
pub const MAX_SIZE_MB: u64 = 10 * 1024;

/// Maximum cache name length
pub const MAX_NAME_LEN: usize = 100;

/// Free-form configuration map
pub type ConfigMap = BTreeMap<String, serde_json::Value>;

// =============================================================================
// Cache Configuration
// =============================================================================

/// Backend family a configuration is served from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BackendType {
    /// Fast distributed store (Redis)
    Redis,
    /// Secondary distributed store (Memcached)
    Memcached,
    /// Database-backed cache table
    Database,
    /// Filesystem cache
    Filesystem,
    /// Edge/CDN cache
    Edge,
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::Redis => write!(f, "redis"),
            BackendType::Memcached => write!(f, "memcached"),
            BackendType::Database => write!(f, "database"),
            BackendType::Filesystem => write!(f, "filesystem"),
            BackendType::Edge => write!(f, "edge"),
        }
    }
}

/// Write strategy declared by a configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WriteStrategy {
    WriteThrough,
    WriteBack,
    WriteAround,
    #[default]
    CacheAside,
}

/// Eviction policy named in a configuration's settings map
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EvictionPolicyKind {
    #[default]
    Lru,
    Lfu,
    Fifo,
    Random,
}

impl EvictionPolicyKind {
    /// Settings value for this policy
    pub fn as_str(&self) -> &'static str {
        match self {
            EvictionPolicyKind::Lru => "lru",
            EvictionPolicyKind::Lfu => "lfu",
            EvictionPolicyKind::Fifo => "fifo",
            EvictionPolicyKind::Random => "random",
        }
    }

    /// Parse from a settings value, case-insensitively
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "lru" => Some(Self::Lru),
            "lfu" => Some(Self::Lfu),
            "fifo" => Some(Self::Fifo),
            "random" => Some(Self::Random),
            _ => None,
        }
    }
}

/// Settings key holding the eviction policy
pub const SETTING_EVICTION_POLICY: &str = "eviction_policy";

/// Settings key holding the compression algorithm
pub const SETTING_COMPRESSION_ALGORITHM: &str = "compression_algorithm";

fn default_true() -> bool {
    true
}

fn default_ttl() -> u64 {
    3600
}

fn default_max_size() -> u64 {
    100
}

fn default_version() -> u64 {
    1
}

/// Durable configuration of a named cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct CacheConfiguration {
    /// Unique, immutable cache name
    pub name: String,
    /// Primary backend family
    pub backend_type: BackendType,
    /// Declared write strategy
    #[serde(default)]
    pub write_strategy: WriteStrategy,
    /// Default TTL in seconds
    #[serde(default = "default_ttl")]
    pub ttl_seconds: u64,
    /// Size limit in MB
    #[serde(default = "default_max_size")]
    pub max_size_mb: u64,
    /// Gzip payloads before storing
    #[serde(default)]
    pub compression_enabled: bool,
    /// Encrypt payloads before storing
    #[serde(default)]
    pub encryption_enabled: bool,
    /// Inactive configurations behave as disabled caches
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Lower priority is tried first
    #[serde(default)]
    pub priority: i32,
    /// Opaque settings (eviction policy, compression algorithm, ...)
    #[serde(default)]
    pub settings: ConfigMap,
    /// Optimistic concurrency stamp, bumped on every write
    #[serde(default = "default_version")]
    pub version: u64,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl CacheConfiguration {
    /// Create a configuration with default TTL (1h) and size (100MB)
    pub fn new(name: impl Into<String>, backend_type: BackendType) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            backend_type,
            write_strategy: WriteStrategy::default(),
            ttl_seconds: default_ttl(),
            max_size_mb: default_max_size(),
            compression_enabled: false,
            encryption_enabled: false,
            is_active: true,
            priority: 0,
            settings: ConfigMap::new(),
            version: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_ttl(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    pub fn with_max_size_mb(mut self, max_size_mb: u64) -> Self {
        self.max_size_mb = max_size_mb;
        self
    }

    pub fn with_compression(mut self, enabled: bool) -> Self {
        self.compression_enabled = enabled;
        self
    }

    pub fn with_encryption(mut self, enabled: bool) -> Self {
        self.encryption_enabled = enabled;
        self
    }

    pub fn with_active(mut self, active: bool) -> Self {
        self.is_active = active;
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    /// Key namespace of this incarnation of the cache. Deleting and
    /// recreating a configuration under the same name yields a new namespace,
    /// so entries written before the delete are never served again.
    pub fn key_namespace(&self) -> String {
        let stamp = self
            .created_at
            .timestamp_nanos_opt()
            .unwrap_or_else(|| self.created_at.timestamp_micros());
        format!("{}:{:x}", self.name, stamp)
    }

    /// Default TTL as a duration
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Eviction policy from settings (LRU when unset or unrecognized)
    pub fn eviction_policy(&self) -> EvictionPolicyKind {
        self.settings
            .get(SETTING_EVICTION_POLICY)
            .and_then(|v| v.as_str())
            .and_then(EvictionPolicyKind::parse)
            .unwrap_or_default()
    }

    /// Validate field ranges. Out-of-range values are rejected, never clamped.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::validation("name", "must not be empty"));
        }
        if self.name.len() > MAX_NAME_LEN {
            return Err(Error::validation(
                "name",
                format!("must be at most {} characters", MAX_NAME_LEN),
            ));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
        {
            return Err(Error::validation(
                "name",
                "may only contain letters, digits, '_', '-' and '.'",
            ));
        }
        if self.ttl_seconds > MAX_TTL_SECONDS {
            return Err(Error::validation(
                "ttl_seconds",
                format!(
                    "{} exceeds the maximum of {} (1 year)",
                    self.ttl_seconds, MAX_TTL_SECONDS
                ),
            ));
        }
        if !(MIN_SIZE_MB..=MAX_SIZE_MB).contains(&self.max_size_mb) {
            return Err(Error::validation(
                "max_size_mb",
                format!(
                    "{} is outside the allowed range {}..={} MB",
                    self.max_size_mb, MIN_SIZE_MB, MAX_SIZE_MB
                ),
            ));
        }
        Ok(())
    }

    /// Snapshot of the tunable fields, used by recommendations and backups
    pub fn tunables(&self) -> ConfigMap {
        let mut map = ConfigMap::new();
        map.insert("ttl_seconds".into(), self.ttl_seconds.into());
        map.insert("max_size_mb".into(), self.max_size_mb.into());
        map.insert(
            "compression_enabled".into(),
            self.compression_enabled.into(),
        );
        map.insert(
            SETTING_EVICTION_POLICY.into(),
            self.eviction_policy().as_str().into(),
        );
        map
    }
}

// =============================================================================
// Metrics Snapshot
// =============================================================================

/// Aggregated metrics for one cache over one interval. Never mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetricsSnapshot {
    pub id: Uuid,
    pub cache_name: String,
    pub hit_count: u64,
    pub miss_count: u64,
    pub hit_ratio: f64,
    pub avg_response_time_ms: f64,
    pub min_response_time_ms: f64,
    pub max_response_time_ms: f64,
    pub p95_response_time_ms: f64,
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    pub memory_usage_percent: f64,
    pub get_operations: u64,
    pub set_operations: u64,
    pub delete_operations: u64,
    pub network_in_bytes: u64,
    pub network_out_bytes: u64,
    pub error_count: u64,
    pub timeout_count: u64,
    pub timestamp: DateTime<Utc>,
}

impl CacheMetricsSnapshot {
    /// Zeroed snapshot stamped now
    pub fn empty(cache_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            cache_name: cache_name.into(),
            hit_count: 0,
            miss_count: 0,
            hit_ratio: 0.0,
            avg_response_time_ms: 0.0,
            min_response_time_ms: 0.0,
            max_response_time_ms: 0.0,
            p95_response_time_ms: 0.0,
            memory_used_bytes: 0,
            memory_total_bytes: 0,
            memory_usage_percent: 0.0,
            get_operations: 0,
            set_operations: 0,
            delete_operations: 0,
            network_in_bytes: 0,
            network_out_bytes: 0,
            error_count: 0,
            timeout_count: 0,
            timestamp: Utc::now(),
        }
    }

    /// hits / (hits + misses), 0 when there was no traffic
    pub fn compute_hit_ratio(hits: u64, misses: u64) -> f64 {
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// get + set + delete
    pub fn total_operations(&self) -> u64 {
        self.get_operations + self.set_operations + self.delete_operations
    }

    /// errors / operations, denominator floored at 1
    pub fn error_rate(&self) -> f64 {
        self.error_count as f64 / self.total_operations().max(1) as f64
    }

    /// Memory usage as a 0.0 - 1.0 fraction
    pub fn memory_fraction(&self) -> f64 {
        self.memory_usage_percent / 100.0
    }
}

// =============================================================================
// Invalidation Audit
// =============================================================================

/// What triggered an invalidation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidationKind {
    Manual,
    Pattern,
    Bulk,
    TtlExpired,
    ConfigDelete,
}

/// Append-only audit row for an invalidation action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheInvalidationRecord {
    pub id: Uuid,
    pub cache_name: String,
    /// Key or pattern targeted
    pub target: String,
    pub kind: InvalidationKind,
    pub reason: String,
    pub triggered_by: Option<String>,
    pub success: bool,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl CacheInvalidationRecord {
    pub fn new(
        cache_name: impl Into<String>,
        target: impl Into<String>,
        kind: InvalidationKind,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            cache_name: cache_name.into(),
            target: target.into(),
            kind,
            reason: reason.into(),
            triggered_by: None,
            success: true,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    pub fn triggered_by(mut self, actor: Option<String>) -> Self {
        self.triggered_by = actor;
        self
    }

    pub fn outcome(mut self, success: bool, error_message: Option<String>) -> Self {
        self.success = success;
        self.error_message = error_message;
        self
    }
}

// =============================================================================
// Alerts
// =============================================================================

/// Alert family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    LowHitRatio,
    HighMemory,
    SlowResponse,
    HighErrorRate,
    ConnectionFailure,
    CapacityLimit,
}

impl std::fmt::Display for AlertKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertKind::LowHitRatio => "low_hit_ratio",
            AlertKind::HighMemory => "high_memory",
            AlertKind::SlowResponse => "slow_response",
            AlertKind::HighErrorRate => "high_error_rate",
            AlertKind::ConnectionFailure => "connection_failure",
            AlertKind::CapacityLimit => "capacity_limit",
        };
        write!(f, "{}", s)
    }
}

/// Alert severity, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AlertSeverity::Low => write!(f, "low"),
            AlertSeverity::Medium => write!(f, "medium"),
            AlertSeverity::High => write!(f, "high"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Threshold breach raised against a cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheAlert {
    pub id: Uuid,
    pub cache_name: String,
    pub kind: AlertKind,
    pub severity: AlertSeverity,
    pub message: String,
    pub threshold_value: f64,
    pub observed_value: f64,
    /// Detections folded into this alert by deduplication
    pub occurrences: u32,
    pub is_resolved: bool,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CacheAlert {
    pub fn new(
        cache_name: impl Into<String>,
        kind: AlertKind,
        severity: AlertSeverity,
        message: impl Into<String>,
        threshold_value: f64,
        observed_value: f64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            cache_name: cache_name.into(),
            kind,
            severity,
            message: message.into(),
            threshold_value,
            observed_value,
            occurrences: 1,
            is_resolved: false,
            resolved_by: None,
            resolved_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Close the alert
    pub fn resolve(&mut self, actor: impl Into<String>) {
        self.is_resolved = true;
        self.resolved_by = Some(actor.into());
        self.resolved_at = Some(Utc::now());
        self.updated_at = Utc::now();
    }
}

// =============================================================================
// Optimization Recommendations
// =============================================================================

/// Area a recommendation tunes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationKind {
    TtlAdjustment,
    MemoryAllocation,
    Compression,
    EvictionPolicy,
    Partitioning,
    Prefetch,
}

impl std::fmt::Display for OptimizationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            OptimizationKind::TtlAdjustment => "ttl_adjustment",
            OptimizationKind::MemoryAllocation => "memory_allocation",
            OptimizationKind::Compression => "compression",
            OptimizationKind::EvictionPolicy => "eviction_policy",
            OptimizationKind::Partitioning => "partitioning",
            OptimizationKind::Prefetch => "prefetch",
        };
        write!(f, "{}", s)
    }
}

/// Recommendation lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationStatus {
    Proposed,
    Applied,
    Rejected,
    Superseded,
    RolledBack,
}

impl std::fmt::Display for RecommendationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            RecommendationStatus::Proposed => "proposed",
            RecommendationStatus::Applied => "applied",
            RecommendationStatus::Rejected => "rejected",
            RecommendationStatus::Superseded => "superseded",
            RecommendationStatus::RolledBack => "rolled_back",
        };
        write!(f, "{}", s)
    }
}

/// Proposed configuration delta produced by the optimizer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheOptimizationRecommendation {
    /// Assigned by the repository on insert
    pub id: u64,
    pub cache_name: String,
    pub kind: OptimizationKind,
    pub current_config: ConfigMap,
    pub recommended_config: ConfigMap,
    pub expected_improvement: String,
    /// 0 - 100
    pub impact_score: u8,
    pub status: RecommendationStatus,
    pub superseded_by: Option<u64>,
    pub is_applied: bool,
    pub applied_by: Option<String>,
    pub applied_at: Option<DateTime<Utc>>,
    /// Configuration values before the recommendation was applied
    pub previous_config: Option<ConfigMap>,
    pub result: Option<ConfigMap>,
    pub created_at: DateTime<Utc>,
}

impl CacheOptimizationRecommendation {
    pub fn proposed(
        cache_name: impl Into<String>,
        kind: OptimizationKind,
        current_config: ConfigMap,
        recommended_config: ConfigMap,
        expected_improvement: impl Into<String>,
        impact_score: u8,
    ) -> Self {
        Self {
            id: 0,
            cache_name: cache_name.into(),
            kind,
            current_config,
            recommended_config,
            expected_improvement: expected_improvement.into(),
            impact_score: impact_score.min(100),
            status: RecommendationStatus::Proposed,
            superseded_by: None,
            is_applied: false,
            applied_by: None,
            applied_at: None,
            previous_config: None,
            result: None,
            created_at: Utc::now(),
        }
    }

    /// Only proposed recommendations are actionable
    pub fn is_actionable(&self) -> bool {
        self.status == RecommendationStatus::Proposed
    }
}

// =============================================================================
// Warming Tasks
// =============================================================================

/// How a warming task is triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarmingKind {
    Scheduled,
    EventDriven,
    Manual,
    Predictive,
}

/// Scheduling descriptor for cache warming
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheWarmingTask {
    pub id: Uuid,
    pub name: String,
    pub cache_name: String,
    pub kind: WarmingKind,
    /// Cron-like schedule (`@every 5m`, `@hourly`, `*/15 * * * *`)
    pub schedule: Option<String>,
    /// Pattern handed to the warming source to select keys
    pub query_pattern: String,
    pub is_active: bool,
    pub success_count: u64,
    pub failure_count: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl CacheWarmingTask {
    pub fn new(
        name: impl Into<String>,
        cache_name: impl Into<String>,
        kind: WarmingKind,
        query_pattern: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            cache_name: cache_name.into(),
            kind,
            schedule: None,
            query_pattern: query_pattern.into(),
            is_active: true,
            success_count: 0,
            failure_count: 0,
            last_run_at: None,
            next_run_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_schedule(mut self, schedule: impl Into<String>) -> Self {
        self.schedule = Some(schedule.into());
        self
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_config_defaults_validate() {
        let config = CacheConfiguration::new("product_list", BackendType::Redis);
        assert!(config.validate().is_ok());
        assert_eq!(config.ttl_seconds, 3600);
        assert!(config.is_active);
        assert_eq!(config.eviction_policy(), EvictionPolicyKind::Lru);
    }

    #[test]
    fn test_ttl_bounds_rejected_not_clamped() {
        let config = CacheConfiguration::new("c", BackendType::Redis).with_ttl(MAX_TTL_SECONDS);
        assert!(config.validate().is_ok());

        let config = config.with_ttl(MAX_TTL_SECONDS + 1);
        assert_matches!(config.validate(), Err(Error::Validation { field, .. }) if field == "ttl_seconds");
    }

    #[test]
    fn test_size_bounds() {
        let base = CacheConfiguration::new("c", BackendType::Redis);
        assert!(base.clone().with_max_size_mb(0).validate().is_err());
        assert!(base.clone().with_max_size_mb(1).validate().is_ok());
        assert!(base.clone().with_max_size_mb(MAX_SIZE_MB).validate().is_ok());
        assert!(base.with_max_size_mb(MAX_SIZE_MB + 1).validate().is_err());
    }

    #[test]
    fn test_name_validation() {
        assert!(CacheConfiguration::new("", BackendType::Redis).validate().is_err());
        assert!(CacheConfiguration::new("has space", BackendType::Redis)
            .validate()
            .is_err());
        assert!(CacheConfiguration::new("a".repeat(101), BackendType::Redis)
            .validate()
            .is_err());
    }

    #[test]
    fn test_key_namespace_follows_creation() {
        let first = CacheConfiguration::new("catalog", BackendType::Redis);
        let mut updated = first.clone().with_ttl(60);
        updated.version = 2;
        assert_eq!(first.key_namespace(), updated.key_namespace());
        assert!(first.key_namespace().starts_with("catalog:"));

        let mut recreated = first.clone();
        recreated.created_at = first.created_at + chrono::Duration::nanoseconds(1);
        assert_ne!(first.key_namespace(), recreated.key_namespace());
    }

    #[test]
    fn test_eviction_policy_setting() {
        let config = CacheConfiguration::new("c", BackendType::Redis)
            .with_setting(SETTING_EVICTION_POLICY, "LFU".into());
        assert_eq!(config.eviction_policy(), EvictionPolicyKind::Lfu);

        let config = config.with_setting(SETTING_EVICTION_POLICY, "bogus".into());
        assert_eq!(config.eviction_policy(), EvictionPolicyKind::Lru);
    }

    #[test]
    fn test_yaml_seed_defaults() {
        let yaml = "name: sessions\nbackend_type: memcached\n";
        let config: CacheConfiguration = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.backend_type, BackendType::Memcached);
        assert_eq!(config.ttl_seconds, 3600);
        assert_eq!(config.version, 1);
        assert!(config.is_active);
    }

    #[test]
    fn test_snapshot_derived_values() {
        assert_eq!(CacheMetricsSnapshot::compute_hit_ratio(0, 0), 0.0);
        assert!((CacheMetricsSnapshot::compute_hit_ratio(3, 1) - 0.75).abs() < f64::EPSILON);

        let mut snapshot = CacheMetricsSnapshot::empty("c");
        assert_eq!(snapshot.error_rate(), 0.0);
        snapshot.error_count = 3;
        assert_eq!(snapshot.error_rate(), 3.0);
        snapshot.get_operations = 60;
        assert!((snapshot.error_rate() - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn test_severity_ordering() {
        assert!(AlertSeverity::Critical > AlertSeverity::High);
        assert!(AlertSeverity::High > AlertSeverity::Medium);
        assert!(AlertSeverity::Medium > AlertSeverity::Low);
    }

    #[test]
    fn test_recommendation_serializes_kind() {
        let rec = CacheOptimizationRecommendation::proposed(
            "catalog",
            OptimizationKind::TtlAdjustment,
            ConfigMap::new(),
            ConfigMap::new(),
            "more hits",
            120,
        );
        assert_eq!(rec.impact_score, 100);
        let json = serde_json::to_string(&rec).unwrap();
        assert!(json.contains("\"ttl_adjustment\""));
        assert!(json.contains("\"proposed\""));
    }
}
