//! Payload Codec
//!
//! Turns a JSON value into the bytes stored in every backend, and back.
//!
//! # Wire Format
//!
//! ```text
//! envelope  = MAGIC | flags | body
//! flags     = compression id (low nibble) | FLAG_JSON
//! body      = text bytes or JSON bytes, possibly compressed
//! encrypted = nonce (12 bytes) | AES-256-GCM(envelope)
//! ```
//!
//! String values are stored as raw text; everything else is JSON-encoded.
//! The same bytes are written to every tier so any tier can serve them.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::Bytes;
use rand::RngCore;
use serde_json::Value;

use super::compression::{CompressionAlgorithm, CompressionManager};
use crate::error::{Error, Result};

/// First byte of every envelope
const MAGIC: u8 = 0xC7;

/// Body is JSON rather than raw text
const FLAG_JSON: u8 = 0x10;

/// Nonce size for AES-256-GCM (96 bits)
const NONCE_SIZE: usize = 12;

/// Key size for AES-256 (256 bits)
pub const KEY_SIZE: usize = 32;

/// Per-write encoding choices derived from a cache configuration
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Algorithm to try, `None` when compression is disabled
    pub compression: Option<CompressionAlgorithm>,
    /// Encrypt the envelope
    pub encrypt: bool,
}

/// Encodes and decodes cache payloads
pub struct PayloadCodec {
    compression: CompressionManager,
    cipher: Option<Aes256Gcm>,
}

impl std::fmt::Debug for PayloadCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PayloadCodec")
            .field("has_key", &self.has_key())
            .finish_non_exhaustive()
    }
}

impl Default for PayloadCodec {
    fn default() -> Self {
        Self::new(None)
    }
}

impl PayloadCodec {
    /// Create a codec; without a key, encrypted caches fail to encode/decode
    pub fn new(key: Option<[u8; KEY_SIZE]>) -> Self {
        Self {
            compression: CompressionManager::new(),
            cipher: key.map(|k| Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&k))),
        }
    }

    /// Whether an encryption key is configured
    pub fn has_key(&self) -> bool {
        self.cipher.is_some()
    }

    /// Parse a key from a hex or base64 string
    pub fn parse_key(key_str: &str) -> Result<[u8; KEY_SIZE]> {
        let key_str = key_str.trim();
        if key_str.len() == KEY_SIZE * 2 {
            if let Ok(bytes) = hex::decode(key_str) {
                let mut key = [0u8; KEY_SIZE];
                key.copy_from_slice(&bytes);
                return Ok(key);
            }
        }

        let bytes = BASE64
            .decode(key_str)
            .map_err(|e| Error::Encryption(format!("Invalid base64 key: {}", e)))?;
        if bytes.len() != KEY_SIZE {
            return Err(Error::Encryption(format!(
                "Key must be {} bytes, got {}",
                KEY_SIZE,
                bytes.len()
            )));
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&bytes);
        Ok(key)
    }

    /// Generate a new random key
    pub fn generate_key() -> [u8; KEY_SIZE] {
        let mut key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut key);
        key
    }

    fn cipher(&self) -> Result<&Aes256Gcm> {
        self.cipher
            .as_ref()
            .ok_or_else(|| Error::Encryption("no encryption key configured".into()))
    }

    /// Encode a value for storage
    pub fn encode(&self, value: &Value, options: EncodeOptions) -> Result<Bytes> {
        let (body, json_flag) = match value {
            Value::String(text) => (text.as_bytes().to_vec(), 0),
            other => (serde_json::to_vec(other)?, FLAG_JSON),
        };

        let (body, algorithm) = match options.compression {
            Some(algorithm) => self.compression.compress_with(&body, algorithm),
            None => (Bytes::from(body), CompressionAlgorithm::None),
        };

        let mut envelope = Vec::with_capacity(body.len() + 2);
        envelope.push(MAGIC);
        envelope.push(algorithm.id() | json_flag);
        envelope.extend_from_slice(&body);

        if !options.encrypt {
            return Ok(Bytes::from(envelope));
        }

        let cipher = self.cipher()?;
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), envelope.as_slice())
            .map_err(|e| Error::Encryption(format!("Encryption failed: {}", e)))?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&ciphertext);
        Ok(Bytes::from(out))
    }

    /// Decode a stored payload
    pub fn decode(&self, payload: &[u8], encrypted: bool) -> Result<Value> {
        let plaintext;
        let envelope = if encrypted {
            if payload.len() <= NONCE_SIZE {
                return Err(Error::MalformedPayload("encrypted payload too short".into()));
            }
            let (nonce, ciphertext) = payload.split_at(NONCE_SIZE);
            plaintext = self
                .cipher()?
                .decrypt(Nonce::from_slice(nonce), ciphertext)
                .map_err(|e| Error::Encryption(format!("Decryption failed: {}", e)))?;
            plaintext.as_slice()
        } else {
            payload
        };

        let (header, body) = match envelope {
            [MAGIC, flags, body @ ..] => (*flags, body),
            _ => return Err(Error::MalformedPayload("missing envelope header".into())),
        };

        let algorithm = CompressionAlgorithm::from_id(header & 0x0f).ok_or_else(|| {
            Error::MalformedPayload(format!("unknown compression id {}", header & 0x0f))
        })?;
        let body = self.compression.decompress(body, algorithm)?;

        if header & FLAG_JSON != 0 {
            Ok(serde_json::from_slice(&body)?)
        } else {
            String::from_utf8(body.to_vec())
                .map(Value::String)
                .map_err(|e| Error::MalformedPayload(format!("text body is not UTF-8: {}", e)))
        }
    }
}
