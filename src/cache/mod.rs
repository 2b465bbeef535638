//! Multi-Level Cache
//!
//! - [`MultiLevelCacheManager`] - tier chain, promotion and invalidation
//! - [`PayloadCodec`] - envelope, compression and encryption of stored values
//! - [`Lookup`] - internal outcome of a read

pub mod codec;
pub mod compression;
pub mod lookup;
pub mod manager;

pub use codec::{EncodeOptions, PayloadCodec};
pub use compression::{CompressionAlgorithm, CompressionManager};
pub use lookup::Lookup;
pub use manager::{CacheStats, ManagerConfig, MultiLevelCacheManager, Removal};
