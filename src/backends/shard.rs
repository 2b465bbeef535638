//! Sharded Map Implementation
//!
//! Concurrent hashmap with power-of-two sharding for low-contention reads.
//!
//! # Design
//!
//! - Each shard has its own RwLock, minimizing contention
//! - Power-of-2 shard count enables fast modulo via bitwise AND
//! - Values report their own weight so byte accounting survives overwrites

use parking_lot::RwLock;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};

/// Values stored in a [`ShardedMap`] report their size in bytes
pub trait Weighted {
    fn weight(&self) -> u64;
}

/// Single shard containing a hashmap and statistics
pub struct Shard<K, V> {
    /// The hashmap for this shard
    map: RwLock<HashMap<K, V>>,
    /// Total weight of values (in bytes)
    size_bytes: AtomicU64,
    /// Number of reads
    reads: AtomicU64,
    /// Number of writes
    writes: AtomicU64,
}

impl<K, V> Default for Shard<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Shard<K, V> {
    /// Create a new empty shard
    pub fn new() -> Self {
        Self {
            map: RwLock::new(HashMap::new()),
            size_bytes: AtomicU64::new(0),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Get the number of entries in this shard
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    /// Check if the shard is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get total size of values in bytes
    pub fn size_bytes(&self) -> u64 {
        self.size_bytes.load(Ordering::Relaxed)
    }

    /// Get read count
    pub fn read_count(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }

    /// Get write count
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

impl<K: Eq + Hash + Clone, V: Clone + Weighted> Shard<K, V> {
    /// Get a value from the shard
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.reads.fetch_add(1, Ordering::Relaxed);
        self.map.read().get(key).cloned()
    }

    /// Insert a value, returning the old value if present
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let weight = value.weight();
        let mut guard = self.map.write();
        let old = guard.insert(key, value);

        self.size_bytes.fetch_add(weight, Ordering::Relaxed);
        if let Some(old) = &old {
            self.size_bytes.fetch_sub(old.weight(), Ordering::Relaxed);
        }
        old
    }

    /// Remove a value, returning it if present
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.writes.fetch_add(1, Ordering::Relaxed);
        let removed = self.map.write().remove(key);
        if let Some(v) = &removed {
            self.size_bytes.fetch_sub(v.weight(), Ordering::Relaxed);
        }
        removed
    }

    /// Remove every entry the predicate rejects, returning removed keys
    pub fn retain<F>(&self, mut keep: F) -> Vec<K>
    where
        F: FnMut(&K, &V) -> bool,
    {
        let mut guard = self.map.write();
        let mut removed = Vec::new();
        guard.retain(|k, v| {
            if keep(k, v) {
                true
            } else {
                self.size_bytes.fetch_sub(v.weight(), Ordering::Relaxed);
                removed.push(k.clone());
                false
            }
        });
        if !removed.is_empty() {
            self.writes.fetch_add(1, Ordering::Relaxed);
        }
        removed
    }

    /// Clear all entries
    pub fn clear(&self) {
        self.map.write().clear();
        self.size_bytes.store(0, Ordering::Relaxed);
    }

    /// Get all entries (for iteration)
    pub fn entries(&self) -> Vec<(K, V)> {
        let guard = self.map.read();
        guard.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

/// Sharded map with configurable shard count
pub struct ShardedMap<K, V, const N: usize = 256> {
    shards: Vec<Shard<K, V>>,
}

impl<K, V, const N: usize> Default for ShardedMap<K, V, N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, const N: usize> ShardedMap<K, V, N> {
    /// Create a new sharded map
    pub fn new() -> Self {
        debug_assert!(N.is_power_of_two());
        Self {
            shards: (0..N).map(|_| Shard::new()).collect(),
        }
    }

    /// Get the shard count
    #[inline]
    pub const fn shard_count(&self) -> usize {
        N
    }

    /// Get total number of entries across all shards
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.len()).sum()
    }

    /// Check if the map is empty
    pub fn is_empty(&self) -> bool {
        self.shards.iter().all(|s| s.is_empty())
    }

    /// Get total size in bytes across all shards
    pub fn size_bytes(&self) -> u64 {
        self.shards.iter().map(|s| s.size_bytes()).sum()
    }

    /// Get total read count
    pub fn total_reads(&self) -> u64 {
        self.shards.iter().map(|s| s.read_count()).sum()
    }

    /// Get total write count
    pub fn total_writes(&self) -> u64 {
        self.shards.iter().map(|s| s.write_count()).sum()
    }

    /// Iterate shards
    pub fn shards(&self) -> impl Iterator<Item = &Shard<K, V>> {
        self.shards.iter()
    }
}

impl<K: Eq + Hash + Clone, V: Clone + Weighted, const N: usize> ShardedMap<K, V, N> {
    #[inline]
    fn shard_for<Q: Hash + ?Sized>(&self, key: &Q) -> &Shard<K, V> {
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[(hasher.finish() as usize) & (N - 1)]
    }

    /// Get a value
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shard_for(key).get(key)
    }

    /// Insert a value
    pub fn insert(&self, key: K, value: V) -> Option<V> {
        self.shard_for(&key).insert(key, value)
    }

    /// Remove a value
    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: std::borrow::Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.shard_for(key).remove(key)
    }

    /// Remove every entry the predicate rejects, across all shards
    pub fn retain<F>(&self, mut keep: F) -> Vec<K>
    where
        F: FnMut(&K, &V) -> bool,
    {
        self.shards
            .iter()
            .flat_map(|s| s.retain(&mut keep))
            .collect()
    }

    /// Clear all shards
    pub fn clear(&self) {
        for shard in &self.shards {
            shard.clear();
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
