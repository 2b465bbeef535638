//! Cache Optimizer
//!
//! - [`analysis`] - summaries, regression trends, bottlenecks, score
//! - [`tuning`] - configuration proposals and the recommendation lifecycle
//! - [`health`] - health scoring and alerting
//! - [`benchmark`] - synthetic load through the manager

pub mod analysis;
pub mod benchmark;
pub mod health;
pub mod stats;
pub mod tuning;

pub use analysis::{Bottleneck, Growth, PerformanceAnalysis, PerformanceSummary, Trend, Trends};
pub use benchmark::{BenchmarkReport, LatencySummary, OperationCounts};
pub use health::{health_score, HealthReport, HealthStatus};
pub use tuning::{CacheOptimizer, OptimizerTuning, WindowMeans};
