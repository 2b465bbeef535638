//! Local Eviction Policies
//!
//! Scoring policies for the in-process backend. The policy is process-wide;
//! `LOCAL_EVICTION_POLICY` picks a preset at startup.

use std::time::Duration;

use crate::domain::EvictionPolicyKind;

/// Clock an entry's age is measured against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgeBasis {
    /// Time since last access
    LastAccess,
    /// Time since insertion
    Insertion,
}

/// Eviction policy configuration
#[derive(Debug, Clone)]
pub struct EvictionPolicy {
    /// Name of the policy
    pub name: String,
    /// High watermark (trigger eviction)
    pub high_watermark: f64,
    /// Low watermark (stop eviction)
    pub low_watermark: f64,
    /// Which timestamp age is measured from
    pub age_basis: AgeBasis,
    /// Minimum access count that protects an entry from eviction (0 = none)
    pub min_access_count: u32,
    /// Weight for age in eviction score (0.0 - 1.0)
    pub recency_weight: f64,
    /// Weight for frequency in eviction score (0.0 - 1.0)
    pub frequency_weight: f64,
    /// Weight for size in eviction score (0.0 - 1.0)
    pub size_weight: f64,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        Self::lru()
    }
}

impl EvictionPolicy {
    fn preset(name: &str, age_basis: AgeBasis, recency: f64, frequency: f64, size: f64) -> Self {
        Self {
            name: name.to_string(),
            high_watermark: 0.90,
            low_watermark: 0.80,
            age_basis,
            min_access_count: 0,
            recency_weight: recency,
            frequency_weight: frequency,
            size_weight: size,
        }
    }

    /// Evicts least recently accessed items first
    pub fn lru() -> Self {
        Self::preset("LRU", AgeBasis::LastAccess, 1.0, 0.0, 0.0)
    }

    /// Evicts least frequently accessed items first
    pub fn lfu() -> Self {
        Self::preset("LFU", AgeBasis::LastAccess, 0.0, 1.0, 0.0)
    }

    /// Evicts oldest insertions first
    pub fn fifo() -> Self {
        Self::preset("FIFO", AgeBasis::Insertion, 1.0, 0.0, 0.0)
    }

    /// Balances recency and frequency, with a nudge toward large entries.
    ///
    /// Stands in for "random": no single access pattern dominates.
    pub fn blended() -> Self {
        Self::preset("Blended", AgeBasis::LastAccess, 0.4, 0.4, 0.2)
    }

    /// Policy preset for a configured eviction kind
    pub fn for_kind(kind: EvictionPolicyKind) -> Self {
        match kind {
            EvictionPolicyKind::Lru => Self::lru(),
            EvictionPolicyKind::Lfu => Self::lfu(),
            EvictionPolicyKind::Fifo => Self::fifo(),
            EvictionPolicyKind::Random => Self::blended(),
        }
    }

    /// Override watermarks
    pub fn with_watermarks(mut self, high: f64, low: f64) -> Self {
        self.high_watermark = high;
        self.low_watermark = low.min(high);
        self
    }

    /// Calculate eviction score for an entry. Higher score = evicted sooner.
    pub fn calculate_score(&self, age: Duration, access_count: u32, size_bytes: u64) -> f64 {
        let age_score = age.as_secs_f64() / 3600.0;
        let freq_score = 1.0 / (access_count as f64 + 1.0);
        let size_score = (size_bytes.max(1) as f64).log2() / 30.0;

        self.recency_weight * age_score
            + self.frequency_weight * freq_score
            + self.size_weight * size_score
    }

    /// Check if an entry is protected from eviction
    pub fn should_protect(&self, access_count: u32) -> bool {
        self.min_access_count > 0 && access_count >= self.min_access_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_prefers_stale_entries() {
        let policy = EvictionPolicy::lru();
        let stale = policy.calculate_score(Duration::from_secs(7200), 50, 100);
        let fresh = policy.calculate_score(Duration::from_secs(10), 0, 100);
        assert!(stale > fresh);
    }

    #[test]
    fn test_lfu_prefers_rare_entries() {
        let policy = EvictionPolicy::lfu();
        let rare = policy.calculate_score(Duration::from_secs(1), 0, 100);
        let popular = policy.calculate_score(Duration::from_secs(7200), 100, 100);
        assert!(rare > popular);
    }

    #[test]
    fn test_for_kind() {
        assert_eq!(EvictionPolicy::for_kind(EvictionPolicyKind::Fifo).age_basis, AgeBasis::Insertion);
        assert_eq!(EvictionPolicy::for_kind(EvictionPolicyKind::Lfu).name, "LFU");
    }

    #[test]
    fn test_protection() {
        let mut policy = EvictionPolicy::lru();
        assert!(!policy.should_protect(1000));
        policy.min_access_count = 5;
        assert!(policy.should_protect(5));
        assert!(!policy.should_protect(4));
    }
}
