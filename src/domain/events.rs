//! Domain Events
//!
//! Immutable records of significant occurrences in the cache engine, used for
//! audit logging and for decoupling the administrative surface from side
//! effects.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::models::{AlertKind, AlertSeverity, InvalidationKind, OptimizationKind};

/// Domain event representing a significant occurrence in the system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DomainEvent {
    // =========================================================================
    // Configuration Events
    // =========================================================================
    /// A configuration was created or updated.
    ConfigurationChanged {
        cache_name: String,
        version: u64,
        actor: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// A configuration was deleted and its entries purged.
    ConfigurationDeleted {
        cache_name: String,
        purged_keys: usize,
        actor: Option<String>,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Cache Events
    // =========================================================================
    /// Keys were invalidated.
    CacheInvalidated {
        cache_name: String,
        target: String,
        kind: InvalidationKind,
        deleted: usize,
        timestamp: DateTime<Utc>,
    },

    /// A metrics snapshot was persisted.
    SnapshotRecorded {
        cache_name: String,
        hit_ratio: f64,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Alert Events
    // =========================================================================
    /// An alert was raised.
    AlertRaised {
        cache_name: String,
        kind: AlertKind,
        severity: AlertSeverity,
        observed_value: f64,
        timestamp: DateTime<Utc>,
    },

    /// An alert was resolved.
    AlertResolved {
        cache_name: String,
        kind: AlertKind,
        resolved_by: String,
        timestamp: DateTime<Utc>,
    },

    // =========================================================================
    // Optimization Events
    // =========================================================================
    /// A recommendation was applied to the live configuration.
    OptimizationApplied {
        cache_name: String,
        recommendation_id: u64,
        kind: OptimizationKind,
        actor: String,
        timestamp: DateTime<Utc>,
    },

    /// An applied recommendation was reverted.
    OptimizationRolledBack {
        cache_name: String,
        recommendation_id: u64,
        actor: String,
        timestamp: DateTime<Utc>,
    },
}

impl DomainEvent {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            DomainEvent::ConfigurationChanged { timestamp, .. }
            | DomainEvent::ConfigurationDeleted { timestamp, .. }
            | DomainEvent::CacheInvalidated { timestamp, .. }
            | DomainEvent::SnapshotRecorded { timestamp, .. }
            | DomainEvent::AlertRaised { timestamp, .. }
            | DomainEvent::AlertResolved { timestamp, .. }
            | DomainEvent::OptimizationApplied { timestamp, .. }
            | DomainEvent::OptimizationRolledBack { timestamp, .. } => *timestamp,
        }
    }

    /// Get the event type name.
    pub fn event_type(&self) -> &'static str {
        match self {
            DomainEvent::ConfigurationChanged { .. } => "ConfigurationChanged",
            DomainEvent::ConfigurationDeleted { .. } => "ConfigurationDeleted",
            DomainEvent::CacheInvalidated { .. } => "CacheInvalidated",
            DomainEvent::SnapshotRecorded { .. } => "SnapshotRecorded",
            DomainEvent::AlertRaised { .. } => "AlertRaised",
            DomainEvent::AlertResolved { .. } => "AlertResolved",
            DomainEvent::OptimizationApplied { .. } => "OptimizationApplied",
            DomainEvent::OptimizationRolledBack { .. } => "OptimizationRolledBack",
        }
    }

    /// Get the cache this event concerns.
    pub fn cache_name(&self) -> &str {
        match self {
            DomainEvent::ConfigurationChanged { cache_name, .. }
            | DomainEvent::ConfigurationDeleted { cache_name, .. }
            | DomainEvent::CacheInvalidated { cache_name, .. }
            | DomainEvent::SnapshotRecorded { cache_name, .. }
            | DomainEvent::AlertRaised { cache_name, .. }
            | DomainEvent::AlertResolved { cache_name, .. }
            | DomainEvent::OptimizationApplied { cache_name, .. }
            | DomainEvent::OptimizationRolledBack { cache_name, .. } => cache_name,
        }
    }

    // =========================================================================
    // Factory Methods
    // =========================================================================

    pub fn configuration_changed(
        cache_name: impl Into<String>,
        version: u64,
        actor: Option<String>,
    ) -> Self {
        DomainEvent::ConfigurationChanged {
            cache_name: cache_name.into(),
            version,
            actor,
            timestamp: Utc::now(),
        }
    }

    pub fn cache_invalidated(
        cache_name: impl Into<String>,
        target: impl Into<String>,
        kind: InvalidationKind,
        deleted: usize,
    ) -> Self {
        DomainEvent::CacheInvalidated {
            cache_name: cache_name.into(),
            target: target.into(),
            kind,
            deleted,
            timestamp: Utc::now(),
        }
    }

    pub fn alert_raised(
        cache_name: impl Into<String>,
        kind: AlertKind,
        severity: AlertSeverity,
        observed_value: f64,
    ) -> Self {
        DomainEvent::AlertRaised {
            cache_name: cache_name.into(),
            kind,
            severity,
            observed_value,
            timestamp: Utc::now(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
