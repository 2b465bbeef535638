//! layercache - Multi-Level Cache Engine
//!
//! Serves named caches through an ordered chain of backends (a primary
//! distributed store per configuration, then an in-process tier), records
//! per-operation metrics, raises threshold alerts and proposes configuration
//! changes from the recorded history.
//!
//! # Architecture
//!
//! ```text
//!               ┌────────────────────────┐
//! get/set/... ─▶│ MultiLevelCacheManager │──▶ Redis | Memcached ──▶ Local
//!               └───────────┬────────────┘
//!                           │ observations
//!                           ▼
//!               ┌────────────────────────┐  snapshots  ┌─────────────┐
//!               │    MetricsRecorder     │────────────▶│ AlertEngine │
//!               └───────────┬────────────┘             └─────────────┘
//!                           ▼
//!               ┌────────────────────────┐
//!               │     CacheOptimizer     │──▶ recommendations
//!               └────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`adapters`] - Event publisher implementations
//! - [`admin`] - Operator facade with response envelopes
//! - [`alerts`] - Threshold alerts and notification dispatch
//! - [`backends`] - Cache backend implementations
//! - [`cache`] - The manager, payload codec and compression
//! - [`cdn`] - Static-asset delivery through edge providers
//! - [`domain`] - Models, ports and events
//! - [`error`] - Error types
//! - [`metrics`] - Observation buffering and Prometheus telemetry
//! - [`optimizer`] - Analysis, tuning, health and benchmarks
//! - [`settings`] - Command-line and environment configuration
//! - [`store`] - Configuration store and in-memory repositories
//! - [`warming`] - Scheduled cache warming

pub mod adapters;
pub mod admin;
pub mod alerts;
pub mod backends;
pub mod cache;
pub mod cdn;
pub mod domain;
pub mod error;
pub mod metrics;
pub mod optimizer;
pub mod settings;
pub mod store;
pub mod warming;

// Re-export commonly used types
pub use admin::{AdminService, ApiResponse, BulkReport};
pub use alerts::{AlertEngine, AlertPolicy};
pub use cache::{Lookup, MultiLevelCacheManager};
pub use cdn::EdgeManager;
pub use error::{Error, Result};
pub use metrics::MetricsRecorder;
pub use optimizer::{CacheOptimizer, OptimizerTuning};
pub use settings::Settings;
pub use store::{ConfigStore, InMemoryStore};
pub use warming::WarmingScheduler;
