//! Error types for the layercache engine

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the cache engine
#[derive(Error, Debug)]
#[allow(clippy::enum_variant_names)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML configuration file error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Duration parse error
    #[error("Failed to parse duration: {0}")]
    DurationParse(String),

    /// Schedule parse error
    #[error("Invalid schedule '{schedule}': {reason}")]
    ScheduleParse { schedule: String, reason: String },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // =========================================================================
    // Backend Errors
    // =========================================================================
    /// Backend operation failed
    #[error("Backend {backend} failed: {reason}")]
    Backend { backend: String, reason: String },

    /// Backend operation exceeded its timeout
    #[error("Backend {backend} timed out after {timeout_ms}ms")]
    BackendTimeout { backend: String, timeout_ms: u64 },

    /// Backend does not support the requested operation
    #[error("Backend {backend} does not support {operation}")]
    Unsupported { backend: String, operation: String },

    // =========================================================================
    // Payload Errors
    // =========================================================================
    /// Compression failed
    #[error("Compression with {algorithm} failed: {reason}")]
    CompressionFailed { algorithm: String, reason: String },

    /// Decompression failed
    #[error("Decompression with {algorithm} failed: {reason}")]
    DecompressionFailed { algorithm: String, reason: String },

    /// Encryption or decryption failed
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Stored payload is malformed
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    // =========================================================================
    // Configuration Store Errors
    // =========================================================================
    /// Validation failed at the configuration-write boundary
    #[error("Validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Cache configuration not found
    #[error("Cache configuration not found: {0}")]
    ConfigNotFound(String),

    /// Cache configuration already exists
    #[error("Cache configuration already exists: {0}")]
    ConfigExists(String),

    /// Stale write rejected by optimistic concurrency
    #[error("Version conflict for {name}: expected {expected}, found {actual}")]
    VersionConflict {
        name: String,
        expected: u64,
        actual: u64,
    },

    // =========================================================================
    // Optimizer / Alert Errors
    // =========================================================================
    /// Recommendation not found
    #[error("Optimization recommendation not found: {0}")]
    RecommendationNotFound(u64),

    /// Recommendation has already been applied
    #[error("Optimization {0} has already been applied")]
    AlreadyApplied(u64),

    /// Recommendation is not in a state that allows the operation
    #[error("Optimization {id} is {status}, cannot {operation}")]
    InvalidRecommendationState {
        id: u64,
        status: String,
        operation: String,
    },

    /// No metrics are available for the requested cache/window
    #[error("No metrics data available for cache {0}")]
    NoMetricsData(String),

    /// Alert not found
    #[error("Alert not found: {0}")]
    AlertNotFound(String),

    /// Warming task not found
    #[error("Warming task not found: {0}")]
    WarmingTaskNotFound(String),

    /// Notification dispatch failed
    #[error("Notification dispatch failed: {0}")]
    Notification(String),

    // =========================================================================
    // Edge / CDN Errors
    // =========================================================================
    /// Edge provider call failed
    #[error("Edge provider {provider} failed: {reason}")]
    EdgeProvider { provider: String, reason: String },

    /// Image processing failed
    #[error("Image processing failed: {0}")]
    Image(String),
}

impl Error {
    /// Shorthand for a backend failure
    pub fn backend(backend: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Error::Backend {
            backend: backend.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for a validation failure
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is the benign "no data" case
    pub fn is_no_data(&self) -> bool {
        matches!(self, Error::NoMetricsData(_))
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        Error::backend("redis", e)
    }
}

impl From<image::ImageError> for Error {
    fn from(e: image::ImageError) -> Self {
        Error::Image(e.to_string())
    }
}
