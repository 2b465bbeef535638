//! Edge Asset Preparation
//!
//! Turns a raw file into the object pushed to edge providers: content type
//! from the extension, gzip for text types, a SHA-256 ETag over the original
//! bytes and a `Cache-Control` header chosen by extension class.

use std::io::Write;

use bytes::Bytes;
use flate2::write::GzEncoder;
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::{Error, Result};

/// One year, for fingerprinted assets
pub const IMMUTABLE_MAX_AGE: u64 = 31_536_000;

/// Raw file submitted for upload
#[derive(Debug, Clone)]
pub struct Asset {
    /// Edge path, without a leading slash
    pub path: String,
    pub body: Bytes,
}

impl Asset {
    pub fn new(path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            path: path.into().trim_start_matches('/').to_string(),
            body: body.into(),
        }
    }
}

/// Object ready to be pushed to a provider
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeObject {
    pub path: String,
    #[serde(skip)]
    pub body: Bytes,
    pub content_type: String,
    /// `gzip` when the body was compressed
    pub content_encoding: Option<String>,
    /// Quoted hex SHA-256 of the original bytes
    pub etag: String,
    pub cache_control: String,
    pub original_size: usize,
}

impl EdgeObject {
    pub fn stored_size(&self) -> usize {
        self.body.len()
    }
}

/// Class of an asset for cache-control purposes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetClass {
    /// Content-hashed file name (`app.3f2a9c1b.js`)
    Fingerprinted,
    /// Scripts, styles, fonts and images without a fingerprint
    Static,
    /// HTML and JSON documents
    Document,
    Other,
}

/// Cache-control header policy by asset class
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheControlPolicy {
    pub static_max_age: u64,
    pub document_max_age: u64,
    pub default_max_age: u64,
    /// Minimum hex run in a file stem segment that marks a fingerprint
    pub fingerprint_min_len: usize,
}

impl Default for CacheControlPolicy {
    fn default() -> Self {
        Self {
            static_max_age: 86_400,
            document_max_age: 300,
            default_max_age: 3_600,
            fingerprint_min_len: 8,
        }
    }
}

const STATIC_EXTENSIONS: &[&str] = &[
    "js", "mjs", "css", "woff", "woff2", "ttf", "otf", "eot", "png", "jpg", "jpeg", "gif", "webp",
    "avif", "svg", "ico", "wasm", "map",
];

const DOCUMENT_EXTENSIONS: &[&str] = &["html", "htm", "json", "xml", "txt", "webmanifest"];

impl CacheControlPolicy {
    pub fn classify(&self, path: &str) -> AssetClass {
        let file = path.rsplit('/').next().unwrap_or(path);
        let ext = match file.rsplit_once('.') {
            Some((_, ext)) => ext.to_ascii_lowercase(),
            None => return AssetClass::Other,
        };

        if DOCUMENT_EXTENSIONS.contains(&ext.as_str()) {
            return AssetClass::Document;
        }
        if !STATIC_EXTENSIONS.contains(&ext.as_str()) {
            return AssetClass::Other;
        }
        if self.is_fingerprinted(file) {
            AssetClass::Fingerprinted
        } else {
            AssetClass::Static
        }
    }

    fn is_fingerprinted(&self, file: &str) -> bool {
        let mut segments: Vec<&str> = file.split(['.', '-', '_']).collect();
        // extension
        segments.pop();
        segments.iter().skip(1).any(|s| {
            s.len() >= self.fingerprint_min_len && s.chars().all(|c| c.is_ascii_hexdigit())
        })
    }

    /// Header value for a path
    pub fn header_for(&self, path: &str) -> String {
        match self.classify(path) {
            AssetClass::Fingerprinted => {
                format!("public, max-age={}, immutable", IMMUTABLE_MAX_AGE)
            }
            AssetClass::Static => format!("public, max-age={}", self.static_max_age),
            AssetClass::Document => format!(
                "public, max-age={}, must-revalidate",
                self.document_max_age
            ),
            AssetClass::Other => format!("public, max-age={}", self.default_max_age),
        }
    }
}

/// Text-like content types worth compressing
pub fn is_compressible(content_type: &str) -> bool {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim();
    essence.starts_with("text/")
        || matches!(
            essence,
            "application/javascript"
                | "application/json"
                | "application/xml"
                | "application/wasm"
                | "application/manifest+json"
                | "image/svg+xml"
        )
}

/// Quoted hex SHA-256
pub fn etag(body: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(body);
    format!("\"{}\"", hex::encode(hasher.finalize()))
}

fn gzip(body: &[u8]) -> Result<Vec<u8>> {
    let failed = |e: std::io::Error| Error::CompressionFailed {
        algorithm: "gzip".into(),
        reason: e.to_string(),
    };
    let mut encoder = GzEncoder::new(Vec::new(), flate2::Compression::best());
    encoder.write_all(body).map_err(failed)?;
    encoder.finish().map_err(failed)
}

/// Build the edge object for an asset
pub fn prepare(asset: &Asset, policy: &CacheControlPolicy) -> Result<EdgeObject> {
    if asset.path.is_empty() || asset.path.contains("..") {
        return Err(Error::validation("path", format!("invalid asset path '{}'", asset.path)));
    }

    let content_type = mime_guess::from_path(&asset.path)
        .first_or_octet_stream()
        .to_string();

    let (body, content_encoding) = if is_compressible(&content_type) && !asset.body.is_empty() {
        let compressed = gzip(&asset.body)?;
        if compressed.len() < asset.body.len() {
            (Bytes::from(compressed), Some("gzip".to_string()))
        } else {
            (asset.body.clone(), None)
        }
    } else {
        (asset.body.clone(), None)
    };

    Ok(EdgeObject {
        path: asset.path.clone(),
        etag: etag(&asset.body),
        cache_control: policy.header_for(&asset.path),
        original_size: asset.body.len(),
        content_type,
        content_encoding,
        body,
    })
}
