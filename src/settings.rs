//! Process Settings
//!
//! Command-line flags, each backed by an environment variable, and the YAML
//! seed file of cache configurations.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};

use crate::alerts::AlertPolicy;
use crate::cache::{ManagerConfig, PayloadCodec};
use crate::domain::models::{CacheConfiguration, EvictionPolicyKind};
use crate::error::{Error, Result};
use crate::metrics::RecorderConfig;

/// Multi-level cache engine
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Settings {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Redis URL for fast-distributed caches
    #[arg(long, env = "REDIS_URL")]
    pub redis_url: Option<String>,

    /// Memcached address (host:port) for secondary-distributed caches
    #[arg(long, env = "MEMCACHED_ADDR")]
    pub memcached_addr: Option<String>,

    /// AES-256 key for encrypted caches, hex or base64
    #[arg(long, env = "CACHE_ENCRYPTION_KEY", hide_env_values = true)]
    pub encryption_key: Option<String>,

    /// Local tier capacity in megabytes
    #[arg(long, env = "LOCAL_CAPACITY_MB", default_value = "256")]
    pub local_capacity_mb: u64,

    /// Eviction policy of the local tier (lru, lfu, fifo, random)
    #[arg(long, env = "LOCAL_EVICTION_POLICY", default_value = "lru", value_parser = parse_eviction_policy)]
    pub local_eviction_policy: EvictionPolicyKind,

    /// Observations buffered before a metrics flush
    #[arg(long, env = "METRICS_BUFFER_SIZE", default_value = "100")]
    pub metrics_buffer_size: usize,

    /// Periodic metrics flush interval (e.g. 60s, 5m)
    #[arg(long, env = "METRICS_FLUSH_INTERVAL", default_value = "60s", value_parser = parse_duration)]
    pub metrics_flush_interval: Duration,

    /// Timeout for a single backend call in milliseconds
    #[arg(long, env = "ADAPTER_TIMEOUT_MS", default_value = "150")]
    pub adapter_timeout_ms: u64,

    /// Budget for all backend calls of one operation in milliseconds
    #[arg(long, env = "REQUEST_DEADLINE_MS", default_value = "500")]
    pub request_deadline_ms: u64,

    /// Configuration cache refresh interval in seconds
    #[arg(long, env = "CONFIG_REFRESH_SECONDS", default_value = "30")]
    pub config_refresh_seconds: u64,

    /// Recipients of critical alerts (comma separated)
    #[arg(long, env = "ALERT_RECIPIENTS", value_delimiter = ',')]
    pub alert_recipients: Vec<String>,

    /// Webhook receiving critical alerts
    #[arg(long, env = "ALERT_WEBHOOK_URL")]
    pub alert_webhook_url: Option<String>,

    /// Close alerts automatically when their condition clears
    #[arg(long, env = "ALERT_AUTO_RESOLVE")]
    pub alert_auto_resolve: bool,

    /// YAML list of cache configurations created at startup
    #[arg(long, env = "CACHE_CONFIG_FILE")]
    pub cache_config_file: Option<PathBuf>,

    /// Health server bind address
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    pub health_addr: String,

    /// Metrics server bind address
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    pub metrics_addr: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the engine (default)
    Serve,
    /// Print the JSON schema of the configuration seed file
    Schema,
}

impl Settings {
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            adapter_timeout: Duration::from_millis(self.adapter_timeout_ms),
            request_deadline: Duration::from_millis(self.request_deadline_ms),
        }
    }

    pub fn recorder_config(&self) -> RecorderConfig {
        RecorderConfig {
            buffer_size: self.metrics_buffer_size.max(1),
            flush_interval: self.metrics_flush_interval,
        }
    }

    pub fn alert_policy(&self) -> AlertPolicy {
        AlertPolicy {
            auto_resolve: self.alert_auto_resolve,
            ..AlertPolicy::default()
        }
    }

    pub fn config_refresh(&self) -> Duration {
        Duration::from_secs(self.config_refresh_seconds)
    }

    /// Recipients with blanks removed
    pub fn recipients(&self) -> Vec<String> {
        self.alert_recipients
            .iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect()
    }

    /// Payload codec with the configured key, if any
    pub fn codec(&self) -> Result<PayloadCodec> {
        let key = self
            .encryption_key
            .as_deref()
            .map(PayloadCodec::parse_key)
            .transpose()?;
        Ok(PayloadCodec::new(key))
    }
}

/// Read a YAML list of configurations
pub fn load_seed(path: &Path) -> Result<Vec<CacheConfiguration>> {
    let text = std::fs::read_to_string(path)?;
    parse_seed(&text)
}

pub fn parse_seed(text: &str) -> Result<Vec<CacheConfiguration>> {
    let configs: Vec<CacheConfiguration> = serde_yaml::from_str(text)?;
    for config in &configs {
        config.validate().map_err(|e| {
            Error::Config(format!("seed entry '{}' is invalid: {}", config.name, e))
        })?;
    }
    Ok(configs)
}

/// JSON schema of the seed file
pub fn seed_schema() -> Result<String> {
    let schema = schemars::schema_for!(Vec<CacheConfiguration>);
    Ok(serde_json::to_string_pretty(&schema)?)
}

pub fn parse_eviction_policy(s: &str) -> Result<EvictionPolicyKind> {
    EvictionPolicyKind::parse(s.trim())
        .ok_or_else(|| Error::validation("eviction_policy", format!("unknown policy '{}'", s)))
}

/// Parse a duration like `30s`, `5m`, `1h30m`, `2d`. A bare number is seconds.
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(Error::DurationParse("empty duration string".to_string()));
    }

    let mut total_secs: u64 = 0;
    let mut digits = String::new();
    for c in s.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let n: u64 = digits
            .parse()
            .map_err(|_| Error::DurationParse(format!("invalid number in duration: {}", s)))?;
        digits.clear();
        let unit = match c.to_ascii_lowercase() {
            'd' => 86_400,
            'h' => 3_600,
            'm' => 60,
            's' => 1,
            other => {
                return Err(Error::DurationParse(format!(
                    "unknown duration unit: {}",
                    other
                )))
            }
        };
        total_secs += n * unit;
    }
    if !digits.is_empty() {
        total_secs += digits
            .parse::<u64>()
            .map_err(|_| Error::DurationParse(format!("invalid number in duration: {}", s)))?;
    }

    if total_secs == 0 {
        return Err(Error::DurationParse(
            "duration must be greater than 0".to_string(),
        ));
    }
    Ok(Duration::from_secs(total_secs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("60s").unwrap(), Duration::from_secs(60));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("2D").unwrap(), Duration::from_secs(172_800));
        assert_eq!(parse_duration(" 45 ").unwrap(), Duration::from_secs(45));
        assert!(parse_duration("").is_err());
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("5w").is_err());
        assert!(parse_duration("m").is_err());
    }

    #[test]
    fn test_defaults_from_args() {
        let settings = Settings::try_parse_from(["layercache"]).unwrap();
        assert_eq!(settings.command, None);
        assert_eq!(settings.metrics_buffer_size, 100);
        assert_eq!(settings.metrics_flush_interval, Duration::from_secs(60));
        assert_eq!(settings.manager_config().adapter_timeout, Duration::from_millis(150));
        assert_eq!(settings.manager_config().request_deadline, Duration::from_millis(500));
        assert_eq!(settings.config_refresh(), Duration::from_secs(30));
        assert!(!settings.codec().unwrap().has_key());
        assert_eq!(settings.local_eviction_policy, EvictionPolicyKind::Lru);

        let lfu = Settings::try_parse_from(["layercache", "--local-eviction-policy", "LFU"]).unwrap();
        assert_eq!(lfu.local_eviction_policy, EvictionPolicyKind::Lfu);
        assert!(Settings::try_parse_from(["layercache", "--local-eviction-policy", "clock"]).is_err());
    }

    #[test]
    fn test_recipients_and_key() {
        let key = hex::encode([7u8; 32]);
        let settings = Settings::try_parse_from([
            "layercache",
            "--alert-recipients",
            "ops@example.com, ,oncall@example.com",
            "--encryption-key",
            key.as_str(),
            "schema",
        ])
        .unwrap();
        assert_eq!(settings.command, Some(Command::Schema));
        assert_eq!(
            settings.recipients(),
            vec!["ops@example.com", "oncall@example.com"]
        );
        assert!(settings.codec().unwrap().has_key());

        let bad = Settings::try_parse_from(["layercache", "--encryption-key", "short"]).unwrap();
        assert_matches!(bad.codec(), Err(Error::Encryption(_)));
    }

    #[test]
    fn test_seed_parsing() {
        let yaml = r#"
- name: product_list
  backend_type: redis
  ttl_seconds: 300
  compression_enabled: true
- name: sessions
  backend_type: memcached
  settings:
    eviction_policy: lfu
"#;
        let configs = parse_seed(yaml).unwrap();
        assert_eq!(configs.len(), 2);
        assert_eq!(configs[0].ttl_seconds, 300);
        assert_eq!(configs[1].settings["eviction_policy"], "lfu");

        let invalid = "- name: big\n  backend_type: redis\n  max_size_mb: 999999\n";
        assert_matches!(parse_seed(invalid), Err(Error::Config(_)));
        assert!(seed_schema().unwrap().contains("backend_type"));
    }
}
