//! Redis Backend
//!
//! Fast distributed tier. Uses a [`ConnectionManager`] so a dropped
//! connection is re-established transparently.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tracing::{debug, info};

use crate::domain::{BackendStats, CacheBackend};
use crate::error::Result;

/// Configuration for the Redis backend
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Connection URL (`redis://host:port/db`)
    pub url: String,
    /// Keys requested per SCAN round trip
    pub scan_count: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            scan_count: 500,
        }
    }
}

/// Redis cache backend
pub struct RedisBackend {
    conn: ConnectionManager,
    config: RedisConfig,
}

impl RedisBackend {
    /// Connect and verify with PING
    pub async fn connect(config: RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        let mut conn = ConnectionManager::new(client).await?;

        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!(url = %config.url, "Redis cache backend connected");

        Ok(Self { conn, config })
    }
}

/// Parse `INFO` output (`key:value` lines) into [`BackendStats`]
pub fn parse_info(info: &str, dbsize: Option<u64>) -> BackendStats {
    let field = |name: &str| -> Option<&str> {
        info.lines()
            .filter_map(|line| line.trim().split_once(':'))
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v)
    };
    let number = |name: &str| field(name).and_then(|v| v.parse::<u64>().ok());

    let hit_ratio = match (number("keyspace_hits"), number("keyspace_misses")) {
        (Some(hits), Some(misses)) if hits + misses > 0 => {
            Some(hits as f64 / (hits + misses) as f64)
        }
        _ => None,
    };

    BackendStats {
        backend: "redis".to_string(),
        keys: dbsize,
        memory_used_bytes: number("used_memory"),
        // maxmemory 0 means unlimited
        memory_total_bytes: number("maxmemory").filter(|m| *m > 0),
        hit_ratio,
        connected_clients: number("connected_clients"),
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    fn name(&self) -> &str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<Bytes>> {
        let mut conn = self.conn.clone();
        let data: Option<Vec<u8>> = conn.get(key).await?;
        Ok(data.map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn.clone();
        let secs = ttl.as_secs();
        if secs == 0 {
            conn.set::<_, _, ()>(key, value.as_ref()).await?;
        } else {
            conn.set_ex::<_, _, ()>(key, value.as_ref(), secs).await?;
        }
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = conn.del(key).await?;
        Ok(deleted > 0)
    }

    fn supports_pattern_scan(&self) -> bool {
        true
    }

    async fn scan(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn.clone();
        let mut cursor: u64 = 0;
        let mut keys = Vec::new();

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(self.config.scan_count)
                .query_async(&mut conn)
                .await?;
            keys.extend(batch);
            cursor = next;
            if cursor == 0 {
                break;
            }
        }

        // SCAN may return a key more than once
        keys.sort();
        keys.dedup();
        debug!(pattern, matched = keys.len(), "Redis scan complete");
        Ok(keys)
    }

    async fn stats(&self) -> Result<Option<BackendStats>> {
        let mut conn = self.conn.clone();
        let info: String = redis::cmd("INFO").query_async(&mut conn).await?;
        let dbsize: u64 = redis::cmd("DBSIZE").query_async(&mut conn).await?;
        Ok(Some(parse_info(&info, Some(dbsize))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_info() {
        let info = "# Memory\r\nused_memory:1048576\r\nmaxmemory:0\r\n\
                    # Stats\r\nkeyspace_hits:90\r\nkeyspace_misses:10\r\n\
                    # Clients\r\nconnected_clients:7\r\n";
        let stats = parse_info(info, Some(12));
        assert_eq!(stats.memory_used_bytes, Some(1048576));
        assert_eq!(stats.memory_total_bytes, None);
        assert_eq!(stats.hit_ratio, Some(0.9));
        assert_eq!(stats.connected_clients, Some(7));
        assert_eq!(stats.keys, Some(12));
    }

    #[test]
    fn test_parse_info_without_traffic() {
        let stats = parse_info("keyspace_hits:0\nkeyspace_misses:0\n", None);
        assert_eq!(stats.hit_ratio, None);
    }
}
