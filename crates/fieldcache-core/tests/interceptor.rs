//! Integration tests for the request interceptor.
//!
//! A scripted network stands in for the server so each test can decide
//! whether the network is up and count how often it was reached.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use fieldcache_core::offline::CACHE_NAME;
use fieldcache_core::{
    FetchedResponse, HttpNetwork, InterceptedRequest, Interceptor, Network, OfflineError,
    RequestKind, ResponseCache, ResponseSource,
};
use reqwest::{Method, StatusCode, Url};
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const ORIGIN: &str = "http://localhost:5000";

#[derive(Default)]
struct ScriptedNetwork {
    online: AtomicBool,
    calls: AtomicUsize,
    responses: Mutex<HashMap<String, (u16, String)>>,
}

impl ScriptedNetwork {
    fn online() -> Self {
        let network = Self::default();
        network.online.store(true, Ordering::SeqCst);
        network
    }

    fn respond(&self, path: &str, status: u16, body: &str) {
        self.responses
            .lock()
            .unwrap()
            .insert(url(path).to_string(), (status, body.to_string()));
    }

    fn go_offline(&self) {
        self.online.store(false, Ordering::SeqCst);
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Network for &ScriptedNetwork {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<FetchedResponse, OfflineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.online.load(Ordering::SeqCst) {
            return Err(OfflineError::Disconnected);
        }
        let (status, body) = self
            .responses
            .lock()
            .unwrap()
            .get(request.url.as_str())
            .cloned()
            .unwrap_or((404, "not found".to_string()));
        Ok(FetchedResponse::synthetic(
            request.url.clone(),
            StatusCode::from_u16(status).unwrap(),
            "text/plain",
            body,
        ))
    }
}

fn url(path: &str) -> Url {
    Url::parse(ORIGIN).unwrap().join(path).unwrap()
}

fn interceptor<'a>(
    dir: &TempDir,
    network: &'a ScriptedNetwork,
) -> Interceptor<&'a ScriptedNetwork> {
    let cache = ResponseCache::open(dir.path(), CACHE_NAME).unwrap();
    Interceptor::new(Url::parse(ORIGIN).unwrap(), cache, network)
}

// ============================================================================
// Static assets: cache-first
// ============================================================================

#[tokio::test]
async fn test_static_asset_cached_after_first_fetch() {
    let dir = tempfile::tempdir().unwrap();
    let network = ScriptedNetwork::online();
    network.respond("/static/app.js", 200, "console.log(1)");
    let interceptor = interceptor(&dir, &network);
    let request = InterceptedRequest::get(url("/static/app.js"));

    let first = interceptor.handle(&request).await.unwrap();
    assert_eq!(first.source, ResponseSource::Network);
    assert_eq!(first.kind, RequestKind::StaticAsset);

    let second = interceptor.handle(&request).await.unwrap();
    assert_eq!(second.source, ResponseSource::Cache);
    assert_eq!(second.response.text(), "console.log(1)");
    assert_eq!(network.calls(), 1);
}

#[tokio::test]
async fn test_static_asset_error_status_not_cached() {
    let dir = tempfile::tempdir().unwrap();
    let network = ScriptedNetwork::online();
    let interceptor = interceptor(&dir, &network);
    let request = InterceptedRequest::get(url("/missing.css"));

    let served = interceptor.handle(&request).await.unwrap();
    assert_eq!(served.response.status, StatusCode::NOT_FOUND);

    interceptor.handle(&request).await.unwrap();
    assert_eq!(network.calls(), 2);
}

#[tokio::test]
async fn test_static_asset_offline_and_uncached() {
    let dir = tempfile::tempdir().unwrap();
    let network = ScriptedNetwork::default();
    let interceptor = interceptor(&dir, &network);

    let err = interceptor
        .handle(&InterceptedRequest::get(url("/static/app.js")))
        .await
        .unwrap_err();
    assert!(matches!(err, OfflineError::NotCached(_)));
}

// ============================================================================
// API calls: network-first with synthetic fallback
// ============================================================================

#[tokio::test]
async fn test_api_prefers_network() {
    let dir = tempfile::tempdir().unwrap();
    let network = ScriptedNetwork::online();
    network.respond("/api/programs", 200, "v1");
    let interceptor = interceptor(&dir, &network);
    let request = InterceptedRequest::get(url("/api/programs"));

    interceptor.handle(&request).await.unwrap();
    network.respond("/api/programs", 200, "v2");
    let served = interceptor.handle(&request).await.unwrap();

    assert_eq!(served.source, ResponseSource::Network);
    assert_eq!(served.response.text(), "v2");
}

#[tokio::test]
async fn test_api_falls_back_to_cache() {
    let dir = tempfile::tempdir().unwrap();
    let network = ScriptedNetwork::online();
    network.respond("/api/programs", 200, "[1,2]");
    let interceptor = interceptor(&dir, &network);
    let request = InterceptedRequest::get(url("/api/programs"));

    interceptor.handle(&request).await.unwrap();
    network.go_offline();
    let served = interceptor.handle(&request).await.unwrap();

    assert_eq!(served.source, ResponseSource::Cache);
    assert!(served.is_offline());
    assert_eq!(served.response.text(), "[1,2]");
}

#[tokio::test]
async fn test_api_synthetic_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let network = ScriptedNetwork::default();
    let interceptor = interceptor(&dir, &network);

    let served = interceptor
        .handle(&InterceptedRequest::get(url("/api/programs")))
        .await
        .unwrap();

    assert_eq!(served.source, ResponseSource::Synthetic);
    assert_eq!(served.response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(served.response.content_type(), Some("application/json"));
    let body: serde_json::Value = serde_json::from_slice(&served.response.body).unwrap();
    assert_eq!(body["offline"], true);
}

#[tokio::test]
async fn test_api_server_error_passed_through() {
    let dir = tempfile::tempdir().unwrap();
    let network = ScriptedNetwork::online();
    network.respond("/api/programs", 200, "good");
    let interceptor = interceptor(&dir, &network);
    let request = InterceptedRequest::get(url("/api/programs"));

    interceptor.handle(&request).await.unwrap();
    network.respond("/api/programs", 500, "bad");
    let served = interceptor.handle(&request).await.unwrap();

    assert_eq!(served.source, ResponseSource::Network);
    assert_eq!(served.response.status, StatusCode::INTERNAL_SERVER_ERROR);

    // The cached copy is still the last good response
    network.go_offline();
    let served = interceptor.handle(&request).await.unwrap();
    assert_eq!(served.response.text(), "good");
}

// ============================================================================
// Navigations: network-first with shell fallback
// ============================================================================

#[tokio::test]
async fn test_navigation_falls_back_to_cached_page_then_shell() {
    let dir = tempfile::tempdir().unwrap();
    let network = ScriptedNetwork::online();
    network.respond("/", 200, "<html>shell</html>");
    network.respond("/config", 200, "<html>config</html>");
    let interceptor = interceptor(&dir, &network);

    interceptor.install().await.unwrap();
    interceptor
        .handle(&InterceptedRequest::navigate(url("/config")))
        .await
        .unwrap();
    network.go_offline();

    let cached = interceptor
        .handle(&InterceptedRequest::navigate(url("/config")))
        .await
        .unwrap();
    assert_eq!(cached.source, ResponseSource::Cache);
    assert_eq!(cached.response.text(), "<html>config</html>");

    let shell = interceptor
        .handle(&InterceptedRequest::navigate(url("/login")))
        .await
        .unwrap();
    assert_eq!(shell.source, ResponseSource::Shell);
    assert_eq!(shell.response.text(), "<html>shell</html>");
}

#[tokio::test]
async fn test_navigation_without_shell() {
    let dir = tempfile::tempdir().unwrap();
    let network = ScriptedNetwork::default();
    let interceptor = interceptor(&dir, &network);

    let served = interceptor
        .handle(&InterceptedRequest::navigate(url("/login")))
        .await
        .unwrap();
    assert_eq!(served.source, ResponseSource::Synthetic);
    assert_eq!(served.response.text(), "Offline");
}

// ============================================================================
// Passthrough and lifecycle
// ============================================================================

#[tokio::test]
async fn test_post_bypasses_cache() {
    let dir = tempfile::tempdir().unwrap();
    let network = ScriptedNetwork::online();
    network.respond("/api/select-program", 200, "{\"ok\":true}");
    let interceptor = interceptor(&dir, &network);
    let request = InterceptedRequest::new(Method::POST, url("/api/select-program"))
        .with_body("{\"program_id\":3}");

    let served = interceptor.handle(&request).await.unwrap();
    assert_eq!(served.kind, RequestKind::Passthrough);
    assert!(interceptor.cache().keys().unwrap().is_empty());

    network.go_offline();
    let err = interceptor.handle(&request).await.unwrap_err();
    assert!(err.is_network_failure());
}

#[tokio::test]
async fn test_install_precaches_and_skips_failures() {
    let dir = tempfile::tempdir().unwrap();
    let network = ScriptedNetwork::online();
    network.respond("/", 200, "shell");
    network.respond("/static/app.css", 200, "css");
    let interceptor = interceptor(&dir, &network)
        .with_precache(vec!["/static/app.css".to_string(), "/static/gone.js".to_string()]);

    let report = interceptor.install().await.unwrap();

    assert_eq!(report.cached, vec![url("/").to_string(), url("/static/app.css").to_string()]);
    assert_eq!(report.skipped, vec![url("/static/gone.js").to_string()]);

    network.go_offline();
    let served = interceptor
        .handle(&InterceptedRequest::get(url("/static/app.css")))
        .await
        .unwrap();
    assert_eq!(served.source, ResponseSource::Cache);
}

#[tokio::test]
async fn test_install_requires_shell() {
    let dir = tempfile::tempdir().unwrap();
    let network = ScriptedNetwork::online();
    let interceptor = interceptor(&dir, &network);

    let err = interceptor.install().await.unwrap_err();
    assert!(matches!(err, OfflineError::Precache { status: 404, .. }));
}

#[tokio::test]
async fn test_activate_deletes_old_caches() {
    let dir = tempfile::tempdir().unwrap();
    ResponseCache::open(dir.path(), "fieldcache-static-v0").unwrap();
    let network = ScriptedNetwork::online();
    let interceptor = interceptor(&dir, &network);

    let deleted = interceptor.activate().unwrap();

    assert_eq!(deleted, vec!["fieldcache-static-v0"]);
    assert_eq!(ResponseCache::cache_names(dir.path()).unwrap(), vec![CACHE_NAME]);
}

#[tokio::test]
async fn test_http_network_against_server() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/static/app.css"))
        .respond_with(ResponseTemplate::new(200).set_body_string("body{}"))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let origin = Url::parse(&server.uri()).unwrap();
    let cache = ResponseCache::open(dir.path(), CACHE_NAME).unwrap();
    let interceptor = Interceptor::new(origin.clone(), cache, HttpNetwork::new(true).unwrap());

    let request = InterceptedRequest::get(origin.join("/static/app.css").unwrap());
    let served = interceptor.handle(&request).await.unwrap();
    assert_eq!(served.source, ResponseSource::Network);
    assert_eq!(served.response.text(), "body{}");

    drop(server);
    let served = interceptor.handle(&request).await.unwrap();
    assert_eq!(served.source, ResponseSource::Cache);
}
