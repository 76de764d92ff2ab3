//! Network loading of entry documents, scripts and stylesheets.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

use crate::entry::cache::ResourceCache;
use crate::entry::config::LoaderConfig;
use crate::entry::resource::{LoadedResource, ResourceDescriptor, ResourceLoadResult};
use crate::error::{EntryError, FailureReason, ResourceError, Result};

/// Fetches resources with a per-call timeout.
///
/// Cloning is cheap; clones share the HTTP connection pool and cache.
#[derive(Debug, Clone)]
pub struct ResourceLoader {
    client: Client,
    timeout: Duration,
    cache: Option<Arc<ResourceCache>>,
}

impl ResourceLoader {
    /// Create a loader from configuration.
    pub fn new(config: &LoaderConfig) -> Result<Self> {
        let mut builder = Client::builder().user_agent(config.user_agent.as_str());
        if !config.proxy_from_env {
            builder = builder.no_proxy();
        }
        let client = builder.build().map_err(EntryError::HttpClient)?;

        Ok(Self {
            client,
            timeout: config.timeout,
            cache: config
                .cache_resources
                .then(|| Arc::new(ResourceCache::new())),
        })
    }

    /// Create a loader around an existing client, without caching.
    pub fn with_client(client: Client, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            cache: None,
        }
    }

    /// The default per-resource timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The resource cache, if caching is enabled.
    pub fn cache(&self) -> Option<&ResourceCache> {
        self.cache.as_deref()
    }

    /// Load one resource with the default timeout.
    pub async fn load(&self, descriptor: &ResourceDescriptor) -> ResourceLoadResult {
        self.load_with_timeout(descriptor, self.timeout).await
    }

    /// Load one resource. The fetch is abandoned once `timeout` elapses.
    pub async fn load_with_timeout(
        &self,
        descriptor: &ResourceDescriptor,
        timeout: Duration,
    ) -> ResourceLoadResult {
        if let Some(content) = self.cache().and_then(|cache| cache.get(&descriptor.url)) {
            debug!(url = %descriptor.url, kind = %descriptor.kind, "resource cache hit");
            return Ok(LoadedResource {
                url: descriptor.url.clone(),
                kind: descriptor.kind,
                content: content.to_string(),
            });
        }

        let started = Instant::now();
        let fetched = self
            .fetch_text(
                &descriptor.url,
                Some(descriptor.kind.content_type()),
                &BTreeMap::new(),
                timeout,
            )
            .await;

        match fetched {
            Ok(content) => {
                debug!(
                    url = %descriptor.url,
                    kind = %descriptor.kind,
                    bytes = content.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "loaded resource"
                );
                if let Some(cache) = self.cache() {
                    cache.insert(descriptor.url.clone(), &content);
                }
                Ok(LoadedResource {
                    url: descriptor.url.clone(),
                    kind: descriptor.kind,
                    content,
                })
            }
            Err(reason) => {
                warn!(url = %descriptor.url, kind = %descriptor.kind, %reason, "resource load failed");
                Err(ResourceError {
                    url: descriptor.url.clone(),
                    kind: descriptor.kind,
                    reason,
                })
            }
        }
    }

    /// Load every descriptor concurrently and wait for all of them to settle.
    /// Results are in descriptor order; one failure does not cancel siblings.
    pub async fn load_all(&self, descriptors: &[ResourceDescriptor]) -> Vec<ResourceLoadResult> {
        join_all(descriptors.iter().map(|descriptor| self.load(descriptor))).await
    }

    /// Like [`load_all`](Self::load_all), wrapped for all-or-nothing handling.
    pub async fn load_batch(&self, descriptors: &[ResourceDescriptor]) -> BatchResult {
        BatchResult {
            results: self.load_all(descriptors).await,
        }
    }

    /// Fetch an entry document with caller-supplied headers.
    pub async fn fetch_document(
        &self,
        url: &Url,
        headers: &BTreeMap<String, String>,
    ) -> std::result::Result<String, FailureReason> {
        debug!(%url, "fetching entry document");
        self.fetch_text(url, None, headers, self.timeout).await
    }

    async fn fetch_text(
        &self,
        url: &Url,
        content_type: Option<&str>,
        headers: &BTreeMap<String, String>,
        timeout: Duration,
    ) -> std::result::Result<String, FailureReason> {
        let classify = |e: reqwest::Error| {
            if e.is_timeout() {
                FailureReason::Timeout(timeout)
            } else {
                FailureReason::Network(e.to_string())
            }
        };

        let request = async {
            let mut request = self.client.get(url.clone());
            if let Some(content_type) = content_type {
                request = request.header(CONTENT_TYPE, content_type);
            }
            for (name, value) in headers {
                request = request.header(name.as_str(), value.as_str());
            }

            let response = request.send().await.map_err(&classify)?;
            let status = response.status();
            if !status.is_success() {
                return Err(FailureReason::HttpStatus(status.as_u16()));
            }
            response.text().await.map_err(&classify)
        };

        match tokio::time::timeout(timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(FailureReason::Timeout(timeout)),
        }
    }
}

/// Settled results of a concurrent batch.
#[derive(Debug, Clone)]
pub struct BatchResult {
    results: Vec<ResourceLoadResult>,
}

impl BatchResult {
    /// Per-resource results in descriptor order.
    pub fn results(&self) -> &[ResourceLoadResult] {
        &self.results
    }

    /// Whether every resource loaded.
    pub fn is_complete(&self) -> bool {
        self.results.iter().all(|r| r.is_ok())
    }

    /// All-or-nothing view: every body, or every failure.
    pub fn into_result(self) -> std::result::Result<Vec<LoadedResource>, Vec<ResourceError>> {
        let (loaded, failed) = self.partial();
        if failed.is_empty() {
            Ok(loaded)
        } else {
            Err(failed)
        }
    }

    /// Partial view: whatever loaded, plus whatever failed.
    pub fn partial(self) -> (Vec<LoadedResource>, Vec<ResourceError>) {
        let mut loaded = Vec::with_capacity(self.results.len());
        let mut failed = Vec::new();
        for result in self.results {
            match result {
                Ok(resource) => loaded.push(resource),
                Err(error) => failed.push(error),
            }
        }
        (loaded, failed)
    }
}
