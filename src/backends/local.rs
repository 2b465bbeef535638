//! Local In-Process Backend
//!
//! Sharded in-memory fallback tier. Always the last adapter in a chain.
//!
//! # Features
//!
//! - Per-entry TTL, expired entries dropped lazily on read and during eviction
//! - Capacity-based eviction with configurable high/low watermarks
//! - Policy-driven eviction scoring (LRU, LFU, FIFO, blended)
//! - Glob pattern scan for pattern invalidation

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use tracing::debug;

use super::glob_match;
use super::policy::{AgeBasis, EvictionPolicy};
use super::shard::{ShardedMap, Weighted};
use crate::domain::{BackendStats, CacheBackend};
use crate::error::Result;

/// Number of shards in the local map
const SHARD_COUNT: usize = 64;

/// Configuration for the local backend
#[derive(Debug, Clone)]
pub struct LocalConfig {
    /// Maximum total payload bytes held
    pub capacity_bytes: u64,
    /// Eviction scoring and watermarks
    pub policy: EvictionPolicy,
    /// Maximum entries removed per eviction pass
    pub eviction_batch_size: usize,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: 256 * 1024 * 1024, // 256MB
            policy: EvictionPolicy::default(),
            eviction_batch_size: 1000,
        }
    }
}

/// Access bookkeeping shared between clones of an entry
#[derive(Debug)]
struct AccessStats {
    /// Milliseconds since backend epoch of the last access
    last_access_ms: AtomicU64,
    access_count: AtomicU32,
}

#[derive(Debug, Clone)]
struct LocalEntry {
    value: Bytes,
    inserted_at: Instant,
    expires_at: Option<Instant>,
    stats: Arc<AccessStats>,
}

impl LocalEntry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.map(|at| now >= at).unwrap_or(false)
    }
}

impl Weighted for LocalEntry {
    fn weight(&self) -> u64 {
        self.value.len() as u64
    }
}

/// In-process cache backend
pub struct LocalBackend {
    name: String,
    entries: ShardedMap<String, LocalEntry, SHARD_COUNT>,
    config: LocalConfig,
    policy: RwLock<EvictionPolicy>,
    epoch: Instant,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl Default for LocalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalBackend {
    /// Create a backend with default configuration
    pub fn new() -> Self {
        Self::with_config(LocalConfig::default())
    }

    /// Create a backend with custom configuration
    pub fn with_config(config: LocalConfig) -> Self {
        Self {
            name: "local".to_string(),
            entries: ShardedMap::new(),
            policy: RwLock::new(config.policy.clone()),
            config,
            epoch: Instant::now(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Swap the eviction policy at runtime
    pub fn set_policy(&self, policy: EvictionPolicy) {
        debug!(policy = %policy.name, "Local backend eviction policy changed");
        *self.policy.write() = policy;
    }

    /// Current eviction policy name
    pub fn policy_name(&self) -> String {
        self.policy.read().name.clone()
    }

    /// Whether a live entry exists (does not count as an access)
    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .get(key)
            .map(|e| !e.is_expired(Instant::now()))
            .unwrap_or(false)
    }

    /// Number of entries held (including not-yet-collected expired ones)
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Payload bytes held
    pub fn size(&self) -> u64 {
        self.entries.size_bytes()
    }

    /// Configured capacity in bytes
    pub fn capacity(&self) -> u64 {
        self.config.capacity_bytes
    }

    /// Total evictions performed
    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Hit ratio over the backend's lifetime
    pub fn hit_ratio(&self) -> f64 {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }

    /// Remove all entries
    pub fn clear(&self) {
        self.entries.clear();
    }

    fn elapsed_ms(&self) -> u64 {
        self.epoch.elapsed().as_millis() as u64
    }

    fn should_evict(&self) -> bool {
        let capacity = self.config.capacity_bytes.max(1) as f64;
        self.entries.size_bytes() as f64 / capacity >= self.policy.read().high_watermark
    }

    fn should_continue_eviction(&self, low_watermark: f64) -> bool {
        let capacity = self.config.capacity_bytes.max(1) as f64;
        self.entries.size_bytes() as f64 / capacity > low_watermark
    }

    /// Drop expired entries, then evict by score until the low watermark
    fn evict(&self) {
        let now = Instant::now();
        let expired = self.entries.retain(|_, e| !e.is_expired(now));
        self.evictions
            .fetch_add(expired.len() as u64, Ordering::Relaxed);

        let policy = self.policy.read().clone();
        if !self.should_continue_eviction(policy.low_watermark) {
            return;
        }

        let now_ms = self.elapsed_ms();
        let mut candidates: Vec<(String, f64)> = self
            .entries
            .shards()
            .flat_map(|s| s.entries())
            .filter_map(|(key, entry)| {
                let count = entry.stats.access_count.load(Ordering::Relaxed);
                if policy.should_protect(count) {
                    return None;
                }
                let age = match policy.age_basis {
                    AgeBasis::Insertion => now.duration_since(entry.inserted_at),
                    AgeBasis::LastAccess => Duration::from_millis(
                        now_ms.saturating_sub(entry.stats.last_access_ms.load(Ordering::Relaxed)),
                    ),
                };
                let score = policy.calculate_score(age, count, entry.weight());
                Some((key, score))
            })
            .collect();

        candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        let mut evicted = 0;
        for (key, _) in candidates {
            if !self.should_continue_eviction(policy.low_watermark)
                || evicted >= self.config.eviction_batch_size
            {
                break;
            }
            if self.entries.remove(&key).is_some() {
                evicted += 1;
            }
        }

        self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
        debug!(
            evicted,
            expired = expired.len(),
            size = self.entries.size_bytes(),
            "Local backend eviction pass"
        );
    }
}

#[async_trait]
impl CacheBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if entry.is_expired(now) => {
                self.entries.remove(key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            Some(entry) => {
                entry
                    .stats
                    .last_access_ms
                    .store(self.elapsed_ms(), Ordering::Relaxed);
                entry.stats.access_count.fetch_add(1, Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(entry.value))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<bool> {
        // Refuse entries that could never fit
        if value.len() as u64 > self.config.capacity_bytes {
            return Ok(false);
        }

        let now = Instant::now();
        let entry = LocalEntry {
            value,
            inserted_at: now,
            expires_at: (!ttl.is_zero()).then(|| now + ttl),
            stats: Arc::new(AccessStats {
                last_access_ms: AtomicU64::new(self.elapsed_ms()),
                access_count: AtomicU32::new(0),
            }),
        };
        self.entries.insert(key.to_string(), entry);

        if self.should_evict() {
            self.evict();
        }
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self
            .entries
            .remove(key)
            .map(|e| !e.is_expired(Instant::now()))
            .unwrap_or(false))
    }

    fn supports_pattern_scan(&self) -> bool {
        true
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let now = Instant::now();
        Ok(self
            .entries
            .shards()
            .flat_map(|s| s.entries())
            .filter(|(key, entry)| !entry.is_expired(now) && glob_match(pattern, key))
            .map(|(key, _)| key)
            .collect())
    }

    async fn stats(&self) -> Result<Option<BackendStats>> {
        Ok(Some(BackendStats {
            backend: self.name.clone(),
            keys: Some(self.entries.len() as u64),
            memory_used_bytes: Some(self.entries.size_bytes()),
            memory_total_bytes: Some(self.config.capacity_bytes),
            hit_ratio: Some(self.hit_ratio()),
            connected_clients: None,
        }))
    }
}

// =============================================================================
// Tests
// =============================================================================
