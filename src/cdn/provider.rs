//! Edge Providers
//!
//! A provider is one CDN or object store. [`InMemoryEdgeProvider`] keeps
//! objects in process; [`HttpEdgeProvider`] talks to a provider's HTTP API.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::assets::EdgeObject;
use crate::backends::glob_match;
use crate::error::{Error, Result};

/// Provider-native traffic figures for a date range
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EdgeAnalytics {
    pub requests: u64,
    pub bandwidth_bytes: u64,
    pub cache_hit_ratio: f64,
    pub threats: u64,
}

/// A CDN or object store that serves uploaded assets
#[async_trait]
pub trait EdgeProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn upload(&self, object: &EdgeObject) -> Result<()>;

    /// Purge cached copies of paths. Paths may end in `*`.
    /// Returns the provider's purge reference, if any.
    async fn invalidate(&self, paths: &[String]) -> Result<Option<String>>;

    async fn analytics(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<EdgeAnalytics>;
}

// =============================================================================
// In-memory provider
// =============================================================================

#[derive(Debug, Clone)]
pub struct StoredObject {
    pub object: EdgeObject,
    pub uploaded_at: DateTime<Utc>,
}

/// Provider backed by a map, with traffic counters fed by [`serve`](Self::serve)
pub struct InMemoryEdgeProvider {
    name: String,
    objects: DashMap<String, StoredObject>,
    purges: Mutex<Vec<Vec<String>>>,
    requests: AtomicU64,
    hits: AtomicU64,
    bandwidth: AtomicU64,
    failing: AtomicBool,
}

impl InMemoryEdgeProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            objects: DashMap::new(),
            purges: Mutex::new(Vec::new()),
            requests: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            bandwidth: AtomicU64::new(0),
            failing: AtomicBool::new(false),
        }
    }

    /// Make every call fail until reset
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    pub fn object(&self, path: &str) -> Option<StoredObject> {
        self.objects.get(path).map(|o| o.clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Purge batches received so far
    pub fn purges(&self) -> Vec<Vec<String>> {
        self.purges.lock().clone()
    }

    /// Simulate an edge request for a path
    pub fn serve(&self, path: &str) -> Option<EdgeObject> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let object = self.objects.get(path).map(|o| o.object.clone())?;
        self.hits.fetch_add(1, Ordering::Relaxed);
        self.bandwidth
            .fetch_add(object.stored_size() as u64, Ordering::Relaxed);
        Some(object)
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(Error::EdgeProvider {
                provider: self.name.clone(),
                reason: "provider unavailable".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl EdgeProvider for InMemoryEdgeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upload(&self, object: &EdgeObject) -> Result<()> {
        self.check()?;
        self.objects.insert(
            object.path.clone(),
            StoredObject {
                object: object.clone(),
                uploaded_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn invalidate(&self, paths: &[String]) -> Result<Option<String>> {
        self.check()?;
        // Purging evicts edge copies; the origin object stays
        let matched = self
            .objects
            .iter()
            .filter(|o| {
                paths
                    .iter()
                    .any(|p| glob_match(p.trim_start_matches('/'), o.key()))
            })
            .count();
        let mut purges = self.purges.lock();
        purges.push(paths.to_vec());
        Ok(Some(format!("purge-{}-{}", purges.len(), matched)))
    }

    async fn analytics(&self, _from: DateTime<Utc>, _to: DateTime<Utc>) -> Result<EdgeAnalytics> {
        self.check()?;
        let requests = self.requests.load(Ordering::Relaxed);
        let hits = self.hits.load(Ordering::Relaxed);
        Ok(EdgeAnalytics {
            requests,
            bandwidth_bytes: self.bandwidth.load(Ordering::Relaxed),
            cache_hit_ratio: if requests == 0 {
                0.0
            } else {
                hits as f64 / requests as f64
            },
            threats: 0,
        })
    }
}

// =============================================================================
// HTTP provider
// =============================================================================

/// Connection settings for an HTTP edge API
#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    pub name: String,
    /// API root, e.g. `https://cdn.example.com/api/v1/zones/web`
    pub base_url: String,
    pub api_token: Option<String>,
    pub timeout: Duration,
}

impl HttpProviderConfig {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token: None,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }
}

#[derive(Debug, Serialize)]
struct PurgeRequest<'a> {
    paths: &'a [String],
}

#[derive(Debug, Deserialize)]
struct PurgeResponse {
    #[serde(default)]
    id: Option<String>,
}

/// Generic REST edge API:
/// `PUT /objects/{path}`, `POST /purge`, `GET /analytics?since=&until=`
pub struct HttpEdgeProvider {
    config: HttpProviderConfig,
    client: reqwest::Client,
}

impl HttpEdgeProvider {
    pub fn new(config: HttpProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| Error::EdgeProvider {
                provider: config.name.clone(),
                reason: e.to_string(),
            })?;
        Ok(Self { config, client })
    }

    fn failure(&self, reason: impl std::fmt::Display) -> Error {
        Error::EdgeProvider {
            provider: self.config.name.clone(),
            reason: reason.to_string(),
        }
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let response = self
            .authorized(request)
            .send()
            .await
            .map_err(|e| self.failure(e))?;
        if !response.status().is_success() {
            return Err(self.failure(format!("HTTP {}", response.status())));
        }
        Ok(response)
    }
}

#[async_trait]
impl EdgeProvider for HttpEdgeProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn upload(&self, object: &EdgeObject) -> Result<()> {
        let url = format!(
            "{}/objects/{}",
            self.config.base_url,
            urlencoding::encode(&object.path)
        );
        let mut request = self
            .client
            .put(url)
            .header(reqwest::header::CONTENT_TYPE, &object.content_type)
            .header(reqwest::header::CACHE_CONTROL, &object.cache_control)
            .header(reqwest::header::ETAG, &object.etag)
            .body(object.body.clone());
        if let Some(encoding) = &object.content_encoding {
            request = request.header(reqwest::header::CONTENT_ENCODING, encoding);
        }
        self.send(request).await?;
        Ok(())
    }

    async fn invalidate(&self, paths: &[String]) -> Result<Option<String>> {
        let url = format!("{}/purge", self.config.base_url);
        let response = self
            .send(self.client.post(url).json(&PurgeRequest { paths }))
            .await?;
        let body: PurgeResponse = response.json().await.map_err(|e| self.failure(e))?;
        Ok(body.id)
    }

    async fn analytics(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<EdgeAnalytics> {
        let url = format!("{}/analytics", self.config.base_url);
        let request = self
            .client
            .get(url)
            .query(&[("since", from.to_rfc3339()), ("until", to.to_rfc3339())]);
        let response = self.send(request).await?;
        response.json().await.map_err(|e| self.failure(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cdn::assets::{prepare, Asset, CacheControlPolicy};
    use assert_matches::assert_matches;

    fn object(path: &str) -> EdgeObject {
        prepare(&Asset::new(path, "body { color: red }"), &CacheControlPolicy::default()).unwrap()
    }

    #[tokio::test]
    async fn test_in_memory_upload_and_serve() {
        let provider = InMemoryEdgeProvider::new("memory");
        provider.upload(&object("site.css")).await.unwrap();
        assert_eq!(provider.len(), 1);

        assert!(provider.serve("site.css").is_some());
        assert!(provider.serve("missing.css").is_none());

        let stats = provider.analytics(Utc::now(), Utc::now()).await.unwrap();
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.cache_hit_ratio, 0.5);
        assert!(stats.bandwidth_bytes > 0);
    }

    #[tokio::test]
    async fn test_in_memory_failure() {
        let provider = InMemoryEdgeProvider::new("flaky");
        provider.set_failing(true);
        assert_matches!(
            provider.upload(&object("a.css")).await,
            Err(Error::EdgeProvider { provider, .. }) if provider == "flaky"
        );
        provider.set_failing(false);
        let reference = provider.invalidate(&["/a.css".to_string()]).await.unwrap();
        assert_eq!(reference.as_deref(), Some("purge-1-0"));
        assert_eq!(provider.purges().len(), 1);
    }

    #[test]
    fn test_http_config() {
        let config = HttpProviderConfig::new("cdn", "https://cdn.example.com/api/").with_token("t");
        assert_eq!(config.base_url, "https://cdn.example.com/api");
        let provider = HttpEdgeProvider::new(config).unwrap();
        assert_eq!(provider.name(), "cdn");
    }
}
