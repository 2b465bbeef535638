//! Memcached Backend
//!
//! Minimal client for the Memcached text protocol (`get`, `set`, `delete`,
//! `stats`) over pooled tokio TCP connections.
//!
//! Memcached cannot enumerate keys, so this backend never takes part in
//! pattern invalidation.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::domain::{BackendStats, CacheBackend};
use crate::error::{Error, Result};

/// Longest key Memcached accepts
const MAX_KEY_LEN: usize = 250;

/// Expirations above this many seconds are read as absolute unix timestamps
const RELATIVE_EXPIRY_LIMIT: u64 = 60 * 60 * 24 * 30;

/// Configuration for the Memcached backend
#[derive(Debug, Clone)]
pub struct MemcachedConfig {
    /// `host:port`
    pub addr: String,
    /// Idle connections kept for reuse
    pub max_idle: usize,
    /// TCP connect timeout
    pub connect_timeout: Duration,
}

impl Default for MemcachedConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:11211".to_string(),
            max_idle: 8,
            connect_timeout: Duration::from_millis(500),
        }
    }
}

type Connection = BufReader<TcpStream>;

/// Memcached cache backend
pub struct MemcachedBackend {
    config: MemcachedConfig,
    idle: Mutex<Vec<Connection>>,
}

impl MemcachedBackend {
    /// Create a backend. Connections are opened lazily.
    pub fn new(config: MemcachedConfig) -> Self {
        Self {
            config,
            idle: Mutex::new(Vec::new()),
        }
    }

    async fn acquire(&self) -> Result<Connection> {
        if let Some(conn) = self.idle.lock().await.pop() {
            return Ok(conn);
        }

        let stream = tokio::time::timeout(
            self.config.connect_timeout,
            TcpStream::connect(&self.config.addr),
        )
        .await
        .map_err(|_| Error::BackendTimeout {
            backend: "memcached".into(),
            timeout_ms: self.config.connect_timeout.as_millis() as u64,
        })?
        .map_err(|e| Error::backend("memcached", format!("connect {}: {}", self.config.addr, e)))?;
        stream.set_nodelay(true)?;

        debug!(addr = %self.config.addr, "Opened memcached connection");
        Ok(BufReader::new(stream))
    }

    async fn release(&self, conn: Connection) {
        let mut idle = self.idle.lock().await;
        if idle.len() < self.config.max_idle {
            idle.push(conn);
        }
    }

    /// Write a request on a pooled connection
    async fn send(&self, request: &[u8]) -> Result<Connection> {
        let mut conn = self.acquire().await?;
        conn.get_mut().write_all(request).await?;
        Ok(conn)
    }

    /// Return the connection to the pool only when the exchange completed cleanly
    async fn finish<T>(&self, conn: Connection, result: Result<T>) -> Result<T> {
        if result.is_ok() {
            self.release(conn).await;
        }
        result
    }

    /// Keys with whitespace, control characters or excess length are hashed
    pub fn wire_key(key: &str) -> String {
        let valid = key.len() <= MAX_KEY_LEN
            && !key.is_empty()
            && key.bytes().all(|b| b > b' ' && b != 0x7f);
        if valid {
            key.to_string()
        } else {
            format!("sha256:{}", hex::encode(Sha256::digest(key.as_bytes())))
        }
    }

    /// Encode a TTL as a Memcached expiration value
    pub fn expiration(ttl: Duration) -> u64 {
        let secs = ttl.as_secs();
        if secs > RELATIVE_EXPIRY_LIMIT {
            chrono::Utc::now().timestamp().max(0) as u64 + secs
        } else {
            secs
        }
    }
}

async fn read_line(conn: &mut Connection) -> Result<String> {
    let mut line = String::new();
    let n = conn.read_line(&mut line).await?;
    if n == 0 {
        return Err(Error::backend("memcached", "connection closed"));
    }
    let line = line.trim_end_matches(['\r', '\n']).to_string();
    if line == "ERROR" || line.starts_with("CLIENT_ERROR") || line.starts_with("SERVER_ERROR") {
        return Err(Error::backend("memcached", line));
    }
    Ok(line)
}

async fn read_value(conn: &mut Connection) -> Result<Option<Bytes>> {
    let header = read_line(conn).await?;
    if header == "END" {
        return Ok(None);
    }

    // VALUE <key> <flags> <bytes>
    let len: usize = header
        .split_whitespace()
        .nth(3)
        .and_then(|s| s.parse().ok())
        .filter(|_| header.starts_with("VALUE "))
        .ok_or_else(|| Error::backend("memcached", format!("unexpected reply: {}", header)))?;

    let mut data = vec![0u8; len + 2];
    conn.read_exact(&mut data).await?;
    data.truncate(len);

    let end = read_line(conn).await?;
    if end != "END" {
        return Err(Error::backend("memcached", format!("expected END, got {}", end)));
    }
    Ok(Some(Bytes::from(data)))
}

async fn read_stats(conn: &mut Connection) -> Result<Vec<(String, String)>> {
    let mut stats = Vec::new();
    loop {
        let line = read_line(conn).await?;
        if line == "END" {
            return Ok(stats);
        }
        let mut parts = line.splitn(3, ' ');
        if let (Some("STAT"), Some(name), Some(value)) = (parts.next(), parts.next(), parts.next())
        {
            stats.push((name.to_string(), value.to_string()));
        }
    }
}

/// Fold `stats` output into [`BackendStats`]
pub fn parse_stats(stats: &[(String, String)]) -> BackendStats {
    let get = |name: &str| -> Option<u64> {
        stats
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, v)| v.parse().ok())
    };

    let hit_ratio = match (get("get_hits"), get("get_misses")) {
        (Some(hits), Some(misses)) if hits + misses > 0 => {
            Some(hits as f64 / (hits + misses) as f64)
        }
        _ => None,
    };

    BackendStats {
        backend: "memcached".to_string(),
        keys: get("curr_items"),
        memory_used_bytes: get("bytes"),
        memory_total_bytes: get("limit_maxbytes"),
        hit_ratio,
        connected_clients: get("curr_connections"),
    }
}

#[async_trait]
impl CacheBackend for MemcachedBackend {
    fn name(&self) -> &str {
        "memcached"
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let request = format!("get {}\r\n", Self::wire_key(key));
        let mut conn = self.send(request.as_bytes()).await?;
        let result = read_value(&mut conn).await;
        let value = self.finish(conn, result).await?;
        trace!(key, hit = value.is_some(), "memcached get");
        Ok(value)
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<bool> {
        let mut request = format!(
            "set {} 0 {} {}\r\n",
            Self::wire_key(key),
            Self::expiration(ttl),
            value.len()
        )
        .into_bytes();
        request.extend_from_slice(&value);
        request.extend_from_slice(b"\r\n");

        let mut conn = self.send(&request).await?;
        let result = read_line(&mut conn).await;
        Ok(self.finish(conn, result).await? == "STORED")
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let request = format!("delete {}\r\n", Self::wire_key(key));
        let mut conn = self.send(request.as_bytes()).await?;
        let result = read_line(&mut conn).await;
        let reply = self.finish(conn, result).await?;
        match reply.as_str() {
            "DELETED" => Ok(true),
            "NOT_FOUND" => Ok(false),
            other => Err(Error::backend("memcached", format!("unexpected reply: {}", other))),
        }
    }

    async fn stats(&self) -> Result<Option<BackendStats>> {
        let mut conn = self.send(b"stats\r\n").await?;
        let result = read_stats(&mut conn).await;
        let stats = self.finish(conn, result).await?;
        Ok(Some(parse_stats(&stats)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn test_wire_key() {
        assert_eq!(MemcachedBackend::wire_key("sessions:abc"), "sessions:abc");

        let spaced = MemcachedBackend::wire_key("has space");
        assert!(spaced.starts_with("sha256:"));
        assert_eq!(spaced.len(), "sha256:".len() + 64);

        let long = MemcachedBackend::wire_key(&"k".repeat(300));
        assert!(long.starts_with("sha256:"));
    }

    #[test]
    fn test_expiration_encoding() {
        assert_eq!(MemcachedBackend::expiration(Duration::from_secs(3600)), 3600);
        let far = MemcachedBackend::expiration(Duration::from_secs(RELATIVE_EXPIRY_LIMIT + 1));
        assert!(far > chrono::Utc::now().timestamp() as u64);
    }

    #[test]
    fn test_parse_stats() {
        let stats = vec![
            ("curr_items".to_string(), "42".to_string()),
            ("bytes".to_string(), "1024".to_string()),
            ("limit_maxbytes".to_string(), "67108864".to_string()),
            ("get_hits".to_string(), "3".to_string()),
            ("get_misses".to_string(), "1".to_string()),
            ("curr_connections".to_string(), "5".to_string()),
        ];
        let parsed = parse_stats(&stats);
        assert_eq!(parsed.keys, Some(42));
        assert_eq!(parsed.memory_total_bytes, Some(67108864));
        assert_eq!(parsed.hit_ratio, Some(0.75));
        assert_eq!(parsed.connected_clients, Some(5));
    }

    /// Serve one scripted reply per request line
    async fn scripted_server(replies: Vec<&'static str>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut conn = BufReader::new(stream);
            for reply in replies {
                let mut line = String::new();
                conn.read_line(&mut line).await.unwrap();
                if line.starts_with("set ") {
                    let mut payload = String::new();
                    conn.read_line(&mut payload).await.unwrap();
                }
                conn.get_mut().write_all(reply.as_bytes()).await.unwrap();
            }
        });
        addr
    }

    #[tokio::test]
    async fn test_protocol_exchange() {
        let addr = scripted_server(vec![
            "STORED\r\n",
            "VALUE sessions:1 0 5\r\nhello\r\nEND\r\n",
            "DELETED\r\n",
            "END\r\n",
        ])
        .await;

        let backend = MemcachedBackend::new(MemcachedConfig {
            addr,
            ..Default::default()
        });

        assert!(backend
            .set("sessions:1", Bytes::from_static(b"hello"), Duration::from_secs(60))
            .await
            .unwrap());
        assert_eq!(
            backend.get("sessions:1").await.unwrap(),
            Some(Bytes::from_static(b"hello"))
        );
        assert!(backend.delete("sessions:1").await.unwrap());
        assert_eq!(backend.get("sessions:1").await.unwrap(), None);
        assert!(!backend.supports_pattern_scan());
    }

    #[tokio::test]
    async fn test_server_error_surfaces() {
        let addr = scripted_server(vec!["SERVER_ERROR out of memory\r\n"]).await;
        let backend = MemcachedBackend::new(MemcachedConfig {
            addr,
            ..Default::default()
        });
        let err = backend
            .set("k", Bytes::from_static(b"v"), Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Backend { .. }));
    }
}
