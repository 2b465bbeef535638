//! Domain Layer
//!
//! - **Models** (`models.rs`) - Persistent entity families
//! - **Ports** (`ports.rs`) - Trait abstractions for backends and repositories
//! - **Events** (`events.rs`) - Domain events for audit and decoupling

pub mod events;
pub mod models;
pub mod ports;

pub use events::DomainEvent;
pub use models::{
    AlertKind, AlertSeverity, BackendType, CacheAlert, CacheConfiguration,
    CacheInvalidationRecord, CacheMetricsSnapshot, CacheOptimizationRecommendation,
    CacheWarmingTask, ConfigMap, EvictionPolicyKind, InvalidationKind, OptimizationKind,
    RecommendationStatus, WarmingKind, WriteStrategy,
};
pub use ports::{
    AlertQuery, AlertRepository, BackendStats, CacheBackend, ConfigRepository, EventPublisher,
    InvalidationLog, MetricsQuery, MetricsRepository, RecommendationRepository,
    WarmingTaskRepository,
};
