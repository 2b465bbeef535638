//! Metrics
//!
//! - [`MetricsRecorder`] - buffered per-operation observations aggregated
//!   into persisted snapshots
//! - [`CacheTelemetry`] - Prometheus collectors served on `/metrics`

pub mod prometheus;
pub mod recorder;

pub use self::prometheus::CacheTelemetry;
pub use recorder::{
    MemorySample, MetricsRecorder, Observation, OperationKind, Outcome, RecorderConfig,
    SnapshotListener,
};
