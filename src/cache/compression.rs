//! Payload Compression
//!
//! Gzip (default) and LZ4 with fallback to uncompressed storage when
//! compression fails or does not shrink the payload.
//!
//! # Example
//!
//! ```
//! use layercache::cache::compression::{CompressionAlgorithm, CompressionManager};
//!
//! let manager = CompressionManager::new();
//!
//! let data = b"Hello, this is test data that should compress well! Hello, this is test data.";
//! let (compressed, algorithm) = manager.compress_with(data, CompressionAlgorithm::Gzip);
//!
//! let decompressed = manager.decompress(&compressed, algorithm).unwrap();
//! assert_eq!(decompressed.as_ref(), data);
//! ```

use std::io::{Read, Write};

use bytes::Bytes;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::{Error, Result};

// =============================================================================
// Compression Algorithm
// =============================================================================

/// Supported compression algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionAlgorithm {
    /// No compression
    None,
    /// Gzip (deflate)
    #[default]
    Gzip,
    /// LZ4 - fast compression
    Lz4,
}

impl CompressionAlgorithm {
    /// Get human-readable name
    pub fn name(&self) -> &'static str {
        match self {
            CompressionAlgorithm::None => "none",
            CompressionAlgorithm::Gzip => "gzip",
            CompressionAlgorithm::Lz4 => "lz4",
        }
    }

    /// Parse a settings value
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "gzip" | "gz" => Some(Self::Gzip),
            "lz4" => Some(Self::Lz4),
            _ => None,
        }
    }

    /// Wire identifier stored in payload headers
    pub fn id(&self) -> u8 {
        match self {
            CompressionAlgorithm::None => 0,
            CompressionAlgorithm::Gzip => 1,
            CompressionAlgorithm::Lz4 => 2,
        }
    }

    /// Inverse of [`CompressionAlgorithm::id`]
    pub fn from_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(Self::None),
            1 => Some(Self::Gzip),
            2 => Some(Self::Lz4),
            _ => None,
        }
    }
}

impl std::fmt::Display for CompressionAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

// =============================================================================
// Compression Configuration
// =============================================================================

/// Configuration for compression
#[derive(Debug, Clone)]
pub struct CompressionConfig {
    /// Minimum size to compress (smaller payloads are stored uncompressed)
    pub min_size_bytes: usize,
    /// Gzip level (0 - 9)
    pub gzip_level: u32,
    /// LZ4 high-compression level
    pub lz4_level: i32,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self {
            min_size_bytes: 64,
            gzip_level: 6,
            lz4_level: 4,
        }
    }
}

// =============================================================================
// Compressor Trait
// =============================================================================

/// Trait for compression implementations
pub trait Compressor: Send + Sync {
    /// Get the algorithm identifier
    fn algorithm(&self) -> CompressionAlgorithm;

    /// Compress data
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompress data
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Pass-through compressor
pub struct NoopCompressor;

impl Compressor for NoopCompressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::None
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// Gzip compressor
pub struct GzipCompressor {
    level: u32,
}

impl GzipCompressor {
    pub fn with_level(level: u32) -> Self {
        Self { level: level.min(9) }
    }
}

impl Compressor for GzipCompressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Gzip
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let failed = |e: std::io::Error| Error::CompressionFailed {
            algorithm: "gzip".into(),
            reason: e.to_string(),
        };
        let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::new(self.level));
        encoder.write_all(data).map_err(failed)?;
        encoder.finish().map_err(failed)
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        GzDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| Error::DecompressionFailed {
                algorithm: "gzip".into(),
                reason: e.to_string(),
            })?;
        Ok(out)
    }
}

/// LZ4 compressor
pub struct Lz4Compressor {
    level: i32,
}

impl Lz4Compressor {
    pub fn with_level(level: i32) -> Self {
        Self { level }
    }
}

impl Compressor for Lz4Compressor {
    fn algorithm(&self) -> CompressionAlgorithm {
        CompressionAlgorithm::Lz4
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4::block::compress(
            data,
            Some(lz4::block::CompressionMode::HIGHCOMPRESSION(self.level)),
            true,
        )
        .map_err(|e| Error::CompressionFailed {
            algorithm: "lz4".into(),
            reason: e.to_string(),
        })
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4::block::decompress(data, None).map_err(|e| Error::DecompressionFailed {
            algorithm: "lz4".into(),
            reason: e.to_string(),
        })
    }
}

// =============================================================================
// Compression Manager
// =============================================================================

/// Dispatches to the compressor for an algorithm, with fallback
pub struct CompressionManager {
    config: CompressionConfig,
    noop: NoopCompressor,
    gzip: GzipCompressor,
    lz4: Lz4Compressor,
}

impl CompressionManager {
    pub fn new() -> Self {
        Self::with_config(CompressionConfig::default())
    }

    pub fn with_config(config: CompressionConfig) -> Self {
        Self {
            noop: NoopCompressor,
            gzip: GzipCompressor::with_level(config.gzip_level),
            lz4: Lz4Compressor::with_level(config.lz4_level),
            config,
        }
    }

    fn compressor(&self, algorithm: CompressionAlgorithm) -> &dyn Compressor {
        match algorithm {
            CompressionAlgorithm::None => &self.noop,
            CompressionAlgorithm::Gzip => &self.gzip,
            CompressionAlgorithm::Lz4 => &self.lz4,
        }
    }

    /// Compress with a specific algorithm.
    ///
    /// Returns (data, algorithm_used). Falls back to uncompressed when the
    /// payload is small, compression fails, or the result is not smaller.
    pub fn compress_with(&self, data: &[u8], algorithm: CompressionAlgorithm) -> (Bytes, CompressionAlgorithm) {
        if algorithm == CompressionAlgorithm::None || data.len() < self.config.min_size_bytes {
            return (Bytes::copy_from_slice(data), CompressionAlgorithm::None);
        }

        match self.compressor(algorithm).compress(data) {
            Ok(compressed) if compressed.len() < data.len() => (Bytes::from(compressed), algorithm),
            Ok(_) => (Bytes::copy_from_slice(data), CompressionAlgorithm::None),
            Err(e) => {
                tracing::warn!(%algorithm, error = %e, "Compression failed, storing uncompressed");
                (Bytes::copy_from_slice(data), CompressionAlgorithm::None)
            }
        }
    }

    /// Decompress data
    pub fn decompress(&self, data: &[u8], algorithm: CompressionAlgorithm) -> Result<Bytes> {
        Ok(Bytes::from(self.compressor(algorithm).decompress(data)?))
    }

    pub fn config(&self) -> &CompressionConfig {
        &self.config
    }
}

impl Default for CompressionManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_DATA: &[u8] = b"Hello, this is test data that should compress well. \
        It has some repetition: Hello, this is test data that should compress well.";

    #[test]
    fn test_gzip_roundtrip() {
        let compressor = GzipCompressor::with_level(6);
        let compressed = compressor.compress(TEST_DATA).unwrap();
        assert!(compressed.len() < TEST_DATA.len());
        assert_eq!(compressor.decompress(&compressed).unwrap(), TEST_DATA);
    }

    #[test]
    fn test_lz4_roundtrip() {
        let compressor = Lz4Compressor::with_level(4);
        let compressed = compressor.compress(TEST_DATA).unwrap();
        assert_eq!(compressor.decompress(&compressed).unwrap(), TEST_DATA);
    }

    #[test]
    fn test_small_payload_skips_compression() {
        let manager = CompressionManager::new();
        let (result, algorithm) = manager.compress_with(b"tiny", CompressionAlgorithm::Gzip);
        assert_eq!(algorithm, CompressionAlgorithm::None);
        assert_eq!(result.as_ref(), b"tiny");
    }

    #[test]
    fn test_incompressible_falls_back() {
        let manager = CompressionManager::new();
        let noise: Vec<u8> = (0..2000u32)
            .map(|i| (i.wrapping_mul(2654435761) >> 13) as u8)
            .collect();
        let (result, algorithm) = manager.compress_with(&noise, CompressionAlgorithm::Gzip);
        if algorithm == CompressionAlgorithm::None {
            assert_eq!(result.len(), noise.len());
        } else {
            assert!(result.len() < noise.len());
        }
    }

    #[test]
    fn test_corrupt_gzip_is_an_error() {
        let manager = CompressionManager::new();
        let err = manager
            .decompress(b"definitely not gzip", CompressionAlgorithm::Gzip)
            .unwrap_err();
        assert!(matches!(err, Error::DecompressionFailed { .. }));
    }

    #[test]
    fn test_algorithm_ids() {
        for alg in [CompressionAlgorithm::None, CompressionAlgorithm::Gzip, CompressionAlgorithm::Lz4] {
            assert_eq!(CompressionAlgorithm::from_id(alg.id()), Some(alg));
        }
        assert_eq!(CompressionAlgorithm::from_id(9), None);
        assert_eq!(CompressionAlgorithm::parse("LZ4"), Some(CompressionAlgorithm::Lz4));
    }
}
