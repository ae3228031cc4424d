use std::fmt;

use reqwest::{StatusCode, Url};
use serde_json::json;
use tracing::{debug, info, warn};

use super::{
    FetchedResponse, InterceptedRequest, Network, OfflineError, RequestKind, ResponseCache,
};

/// Name of the current response cache. Bump the version to drop old caches
/// on the next activate.
pub const CACHE_NAME: &str = "fieldcache-static-v1";

/// Path of the generic page served for navigations while offline.
pub const SHELL_PATH: &str = "/";

const OFFLINE_API_ERROR: &str = "Network unavailable and no cached response";

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Network,
    Cache,
    /// The precached shell page, standing in for an uncached navigation.
    Shell,
    /// Built locally because nothing else was available.
    Synthetic,
}

impl fmt::Display for ResponseSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ResponseSource::Network => "network",
            ResponseSource::Cache => "cache",
            ResponseSource::Shell => "offline shell",
            ResponseSource::Synthetic => "offline fallback",
        })
    }
}

#[derive(Debug, Clone)]
pub struct ServedResponse {
    pub response: FetchedResponse,
    pub source: ResponseSource,
    pub kind: RequestKind,
}

impl ServedResponse {
    fn new(response: FetchedResponse, source: ResponseSource, kind: RequestKind) -> Self {
        Self {
            response,
            source,
            kind,
        }
    }

    pub fn is_offline(&self) -> bool {
        self.source != ResponseSource::Network
    }
}

/// Outcome of `Interceptor::install`.
#[derive(Debug, Default)]
pub struct InstallReport {
    pub cached: Vec<String>,
    pub skipped: Vec<String>,
}

/// Serves the requests of one origin from the network and a response cache.
pub struct Interceptor<N> {
    origin: Url,
    cache: ResponseCache,
    network: N,
    precache: Vec<String>,
}

impl<N: Network> Interceptor<N> {
    pub fn new(origin: Url, cache: ResponseCache, network: N) -> Self {
        Self {
            origin,
            cache,
            network,
            precache: Vec::new(),
        }
    }

    /// Static asset paths to fetch on install, in addition to the shell.
    pub fn with_precache(mut self, paths: Vec<String>) -> Self {
        self.precache = paths;
        self
    }

    pub fn cache(&self) -> &ResponseCache {
        &self.cache
    }

    pub fn shell_url(&self) -> Url {
        self.origin.join(SHELL_PATH).unwrap_or_else(|_| self.origin.clone())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Precache the shell page and the configured static assets. Assets that
    /// fail to load are skipped; the shell is required.
    pub async fn install(&self) -> Result<InstallReport, OfflineError> {
        let mut report = InstallReport::default();

        let shell = self.shell_url();
        let response = self.network.fetch(&InterceptedRequest::navigate(shell.clone())).await?;
        if !response.is_success() {
            return Err(OfflineError::Precache {
                url: shell.to_string(),
                status: response.status.as_u16(),
            });
        }
        self.cache.put(&shell, &response)?;
        report.cached.push(shell.to_string());

        for path in &self.precache {
            let url = InterceptedRequest::resolve(&self.origin, path)?;
            match self.network.fetch(&InterceptedRequest::get(url.clone())).await {
                Ok(response) if response.is_success() => {
                    self.cache.put(&url, &response)?;
                    report.cached.push(url.to_string());
                }
                Ok(response) => {
                    warn!(url = %url, status = response.status.as_u16(), "Precache skipped");
                    report.skipped.push(url.to_string());
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "Precache skipped");
                    report.skipped.push(url.to_string());
                }
            }
        }

        info!(
            cache = self.cache.name(),
            cached = report.cached.len(),
            skipped = report.skipped.len(),
            "Install complete"
        );
        Ok(report)
    }

    /// Delete every cache except the current one. Returns the deleted names.
    pub fn activate(&self) -> Result<Vec<String>, OfflineError> {
        let root = self.cache.root();
        let mut deleted = Vec::new();
        for name in ResponseCache::cache_names(root)? {
            if name != self.cache.name() && ResponseCache::delete_cache(root, &name)? {
                info!(cache = %name, "Deleted old cache");
                deleted.push(name);
            }
        }
        Ok(deleted)
    }

    // =========================================================================
    // Fetch handling
    // =========================================================================

    pub async fn handle(
        &self,
        request: &InterceptedRequest,
    ) -> Result<ServedResponse, OfflineError> {
        let kind = request.classify(&self.origin);
        debug!(url = %request.url, kind = kind.label(), "Intercepted request");

        match kind {
            RequestKind::StaticAsset => self.cache_first(request).await,
            RequestKind::Api => self.network_first_api(request).await,
            RequestKind::Navigation => self.network_first_navigation(request).await,
            RequestKind::Passthrough => {
                let response = self.network.fetch(request).await?;
                Ok(ServedResponse::new(response, ResponseSource::Network, kind))
            }
        }
    }

    /// Serve from cache; on a miss fetch and populate the cache.
    async fn cache_first(
        &self,
        request: &InterceptedRequest,
    ) -> Result<ServedResponse, OfflineError> {
        let kind = RequestKind::StaticAsset;
        if let Some(cached) = self.lookup(&request.url) {
            return Ok(ServedResponse::new(cached, ResponseSource::Cache, kind));
        }

        let response = match self.network.fetch(request).await {
            Ok(response) => response,
            Err(e) if e.is_network_failure() => {
                return Err(OfflineError::NotCached(request.url.to_string()));
            }
            Err(e) => return Err(e),
        };
        self.store(&request.url, &response);
        Ok(ServedResponse::new(response, ResponseSource::Network, kind))
    }

    /// Network, then cache, then a synthetic JSON error.
    async fn network_first_api(
        &self,
        request: &InterceptedRequest,
    ) -> Result<ServedResponse, OfflineError> {
        let kind = RequestKind::Api;
        match self.network.fetch(request).await {
            Ok(response) => {
                self.store(&request.url, &response);
                Ok(ServedResponse::new(response, ResponseSource::Network, kind))
            }
            Err(e) if e.is_network_failure() => {
                debug!(url = %request.url, error = %e, "API request failed, falling back");
                if let Some(cached) = self.lookup(&request.url) {
                    return Ok(ServedResponse::new(cached, ResponseSource::Cache, kind));
                }
                let body = json!({ "offline": true, "error": OFFLINE_API_ERROR }).to_string();
                let response = FetchedResponse::synthetic(
                    request.url.clone(),
                    StatusCode::SERVICE_UNAVAILABLE,
                    "application/json",
                    body,
                );
                Ok(ServedResponse::new(response, ResponseSource::Synthetic, kind))
            }
            Err(e) => Err(e),
        }
    }

    /// Network, then the cached page, then the shell.
    async fn network_first_navigation(
        &self,
        request: &InterceptedRequest,
    ) -> Result<ServedResponse, OfflineError> {
        let kind = RequestKind::Navigation;
        match self.network.fetch(request).await {
            Ok(response) => {
                self.store(&request.url, &response);
                Ok(ServedResponse::new(response, ResponseSource::Network, kind))
            }
            Err(e) if e.is_network_failure() => {
                debug!(url = %request.url, error = %e, "Navigation failed, falling back");
                if let Some(cached) = self.lookup(&request.url) {
                    return Ok(ServedResponse::new(cached, ResponseSource::Cache, kind));
                }
                if let Some(shell) = self.lookup(&self.shell_url()) {
                    return Ok(ServedResponse::new(shell, ResponseSource::Shell, kind));
                }
                let response = FetchedResponse::synthetic(
                    request.url.clone(),
                    StatusCode::SERVICE_UNAVAILABLE,
                    "text/plain",
                    "Offline",
                );
                Ok(ServedResponse::new(response, ResponseSource::Synthetic, kind))
            }
            Err(e) => Err(e),
        }
    }

    /// Cache read where an unreadable entry counts as a miss.
    fn lookup(&self, url: &Url) -> Option<FetchedResponse> {
        match self.cache.match_url(url) {
            Ok(found) => found,
            Err(e) => {
                warn!(url = %url, error = %e, "Response cache read failed");
                None
            }
        }
    }

    /// Cache successful responses; a failed write never fails the request.
    fn store(&self, url: &Url, response: &FetchedResponse) {
        if !response.is_success() {
            return;
        }
        if let Err(e) = self.cache.put(url, response) {
            warn!(url = %url, error = %e, "Response cache write failed");
        }
    }
}
