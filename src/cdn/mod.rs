//! Edge Delivery
//!
//! Static-asset delivery through one or more CDN/object-storage providers:
//! - [`assets`] - content typing, gzip, ETag and cache-control policy
//! - [`images`] - responsive variants and re-encodes
//! - [`provider`] - the [`EdgeProvider`] port and its implementations
//! - [`manager`] - per-provider fan-out with isolated failures

pub mod assets;
pub mod images;
pub mod manager;
pub mod provider;

pub use assets::{Asset, AssetClass, CacheControlPolicy, EdgeObject};
pub use images::{ImageVariant, VariantFormat, VariantSpec};
pub use manager::{
    AnalyticsReport, AssetUpload, EdgeManager, InvalidationReport, ProviderOutcome, UploadReport,
};
pub use provider::{
    EdgeAnalytics, EdgeProvider, HttpEdgeProvider, HttpProviderConfig, InMemoryEdgeProvider,
};
