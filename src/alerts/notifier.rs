//! Alert Notifiers
//!
//! Dispatch targets for critical alerts. Dispatch failures are reported to
//! the engine, which logs them; they never fail alert creation.

use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{error, info};

use crate::domain::models::CacheAlert;
use crate::error::{Error, Result};

/// Delivers an alert to a set of recipients
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Notifier name for logs
    fn name(&self) -> &str;

    async fn notify(&self, alert: &CacheAlert, recipients: &[String]) -> Result<()>;
}

/// Writes notifications to the log
#[derive(Debug, Clone, Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    fn name(&self) -> &str {
        "logging"
    }

    async fn notify(&self, alert: &CacheAlert, recipients: &[String]) -> Result<()> {
        error!(
            cache = %alert.cache_name,
            kind = %alert.kind,
            severity = %alert.severity,
            observed = alert.observed_value,
            threshold = alert.threshold_value,
            recipients = %recipients.join(","),
            "{}",
            alert.message
        );
        Ok(())
    }
}

/// Delivered notification captured by [`InMemoryNotifier`]
#[derive(Debug, Clone)]
pub struct Delivery {
    pub alert: CacheAlert,
    pub recipients: Vec<String>,
}

/// Keeps notifications in memory for inspection
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    deliveries: RwLock<Vec<Delivery>>,
    fail: bool,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every dispatch fails
    pub fn failing() -> Self {
        Self {
            deliveries: RwLock::new(Vec::new()),
            fail: true,
        }
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.read().clone()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    fn name(&self) -> &str {
        "in-memory"
    }

    async fn notify(&self, alert: &CacheAlert, recipients: &[String]) -> Result<()> {
        if self.fail {
            return Err(Error::Notification("dispatch refused".into()));
        }
        self.deliveries.write().push(Delivery {
            alert: alert.clone(),
            recipients: recipients.to_vec(),
        });
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    alert: &'a CacheAlert,
    recipients: &'a [String],
}

/// Posts alerts as JSON to an HTTP endpoint
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| Error::Notification(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn notify(&self, alert: &CacheAlert, recipients: &[String]) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(&WebhookPayload { alert, recipients })
            .send()
            .await
            .map_err(|e| Error::Notification(format!("POST {} failed: {}", self.url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Notification(format!(
                "POST {} returned {}",
                self.url, status
            )));
        }
        info!(cache = %alert.cache_name, kind = %alert.kind, url = %self.url, "Alert webhook delivered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AlertKind, AlertSeverity};

    fn alert() -> CacheAlert {
        CacheAlert::new(
            "catalog",
            AlertKind::HighMemory,
            AlertSeverity::Critical,
            "memory at 97%",
            0.95,
            0.97,
        )
    }

    #[tokio::test]
    async fn test_in_memory_notifier() {
        let notifier = InMemoryNotifier::new();
        notifier
            .notify(&alert(), &["ops@example.com".to_string()])
            .await
            .unwrap();
        let deliveries = notifier.deliveries();
        assert_eq!(deliveries.len(), 1);
        assert_eq!(deliveries[0].recipients, vec!["ops@example.com"]);

        assert!(InMemoryNotifier::failing().notify(&alert(), &[]).await.is_err());
    }

    #[tokio::test]
    async fn test_webhook_unreachable_is_error() {
        let notifier = WebhookNotifier::new("http://127.0.0.1:9/alerts").unwrap();
        let err = notifier.notify(&alert(), &[]).await.unwrap_err();
        assert!(matches!(err, Error::Notification(_)));
    }
}
