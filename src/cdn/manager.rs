//! Edge Manager
//!
//! Fans uploads, purges and analytics out to every configured provider.
//! Providers run concurrently, each under its own timeout, and a failing
//! provider only affects its own outcome entry.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{info, warn};

use super::assets::{prepare, Asset, CacheControlPolicy, EdgeObject};
use super::images::{generate_variants, reencode, VariantFormat, VariantSpec};
use super::provider::{EdgeAnalytics, EdgeProvider};
use crate::error::{Error, Result};

/// Result of one provider call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderOutcome<T> {
    pub provider: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ProviderOutcome<T> {
    fn from_result(provider: &str, result: Result<T>) -> Self {
        match result {
            Ok(data) => Self {
                provider: provider.to_string(),
                success: true,
                data: Some(data),
                error: None,
            },
            Err(e) => Self {
                provider: provider.to_string(),
                success: false,
                data: None,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Upload of one asset to every provider
#[derive(Debug, Clone, Serialize)]
pub struct AssetUpload {
    pub object: EdgeObject,
    pub providers: Vec<ProviderOutcome<()>>,
}

impl AssetUpload {
    /// Stored by at least one provider
    pub fn uploaded(&self) -> bool {
        self.providers.iter().any(|p| p.success)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UploadReport {
    pub uploads: Vec<AssetUpload>,
    /// Assets rejected before reaching any provider
    pub rejected: Vec<RejectedAsset>,
}

impl UploadReport {
    pub fn processed(&self) -> usize {
        self.uploads.iter().filter(|u| u.uploaded()).count()
    }

    pub fn failed(&self) -> usize {
        self.rejected.len() + self.uploads.iter().filter(|u| !u.uploaded()).count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RejectedAsset {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct InvalidationReport {
    pub paths: Vec<String>,
    /// Purge reference per provider
    pub providers: Vec<ProviderOutcome<Option<String>>>,
}

impl InvalidationReport {
    pub fn fully_succeeded(&self) -> bool {
        self.providers.iter().all(|p| p.success)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub providers: Vec<ProviderOutcome<EdgeAnalytics>>,
}

/// Dispatches asset operations to edge providers
pub struct EdgeManager {
    providers: Vec<Arc<dyn EdgeProvider>>,
    policy: CacheControlPolicy,
    timeout: Duration,
}

impl EdgeManager {
    pub fn new() -> Self {
        Self {
            providers: Vec::new(),
            policy: CacheControlPolicy::default(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_provider(mut self, provider: Arc<dyn EdgeProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn with_policy(mut self, policy: CacheControlPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn policy(&self) -> &CacheControlPolicy {
        &self.policy
    }

    pub fn provider_names(&self) -> Vec<String> {
        self.providers.iter().map(|p| p.name().to_string()).collect()
    }

    /// Run `call` against every provider concurrently
    async fn fan_out<'a, T, F, Fut>(&'a self, call: F) -> Vec<ProviderOutcome<T>>
    where
        F: Fn(&'a Arc<dyn EdgeProvider>) -> Fut,
        Fut: Future<Output = Result<T>> + 'a,
    {
        let timeout = self.timeout;
        let calls = self.providers.iter().map(|provider| {
            let fut = call(provider);
            async move {
                let name = provider.name();
                let result = match tokio::time::timeout(timeout, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(Error::EdgeProvider {
                        provider: name.to_string(),
                        reason: format!("timed out after {:?}", timeout),
                    }),
                };
                if let Err(e) = &result {
                    warn!(provider = %name, error = %e, "Edge provider call failed");
                }
                ProviderOutcome::from_result(name, result)
            }
        });
        join_all(calls).await
    }

    fn ensure_providers(&self) -> Result<()> {
        if self.providers.is_empty() {
            return Err(Error::Config("no edge providers configured".into()));
        }
        Ok(())
    }

    async fn push(&self, object: EdgeObject) -> AssetUpload {
        let providers = self.fan_out(|p| p.upload(&object)).await;
        AssetUpload { object, providers }
    }

    /// Prepare and upload a batch of assets
    pub async fn upload_assets(&self, assets: &[Asset]) -> Result<UploadReport> {
        self.ensure_providers()?;
        let mut report = UploadReport {
            uploads: Vec::with_capacity(assets.len()),
            rejected: Vec::new(),
        };
        for asset in assets {
            match prepare(asset, &self.policy) {
                Ok(object) => report.uploads.push(self.push(object).await),
                Err(e) => report.rejected.push(RejectedAsset {
                    path: asset.path.clone(),
                    error: e.to_string(),
                }),
            }
        }
        info!(
            processed = report.processed(),
            failed = report.failed(),
            "Edge upload finished"
        );
        Ok(report)
    }

    /// Generate responsive variants (and optional full-size re-encodes) and upload them
    pub async fn optimize_image(
        &self,
        asset: &Asset,
        spec: &VariantSpec,
        reencode_to: &[VariantFormat],
    ) -> Result<UploadReport> {
        self.ensure_providers()?;
        let mut variants = generate_variants(&asset.path, &asset.body, spec)?;
        for format in reencode_to {
            variants.push(reencode(&asset.path, &asset.body, *format)?);
        }
        let assets: Vec<Asset> = variants
            .into_iter()
            .map(|v| Asset::new(v.path, v.body))
            .collect();
        self.upload_assets(&assets).await
    }

    /// Purge paths on every provider
    pub async fn invalidate(&self, paths: &[String]) -> Result<InvalidationReport> {
        self.ensure_providers()?;
        if paths.is_empty() {
            return Err(Error::validation("paths", "at least one path is required"));
        }
        let providers = self.fan_out(|p| p.invalidate(paths)).await;
        info!(
            paths = paths.len(),
            failed = providers.iter().filter(|p| !p.success).count(),
            "Edge invalidation finished"
        );
        Ok(InvalidationReport {
            paths: paths.to_vec(),
            providers,
        })
    }

    /// Provider analytics over `[from, to]`
    pub async fn analytics(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<AnalyticsReport> {
        self.ensure_providers()?;
        if from > to {
            return Err(Error::validation("from", "must not be after 'to'"));
        }
        let providers = self.fan_out(|p| p.analytics(from, to)).await;
        Ok(AnalyticsReport { from, to, providers })
    }
}

impl Default for EdgeManager {
    fn default() -> Self {
        Self::new()
    }
}
