use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

use super::{InterceptedRequest, OfflineError};

/// HTTP request timeout in seconds for intercepted requests.
const FETCH_TIMEOUT_SECS: u64 = 15;

/// A complete response, either fresh from the network, read back from the
/// response cache, or synthesized while offline.
#[derive(Debug, Clone)]
pub struct FetchedResponse {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl FetchedResponse {
    /// Build a response that never touched the network.
    pub fn synthetic(
        url: Url,
        status: StatusCode,
        content_type: &'static str,
        body: impl Into<Bytes>,
    ) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static(content_type));
        Self {
            url,
            status,
            headers,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn content_type(&self) -> Option<&str> {
        self.headers.get(header::CONTENT_TYPE)?.to_str().ok()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Where intercepted requests go when they need the network.
pub trait Network {
    fn fetch(
        &self,
        request: &InterceptedRequest,
    ) -> impl Future<Output = Result<FetchedResponse, OfflineError>> + Send;
}

/// The real network, via reqwest.
#[derive(Clone)]
pub struct HttpNetwork {
    client: Client,
}

impl HttpNetwork {
    pub fn new(verify_tls: bool) -> Result<Self, OfflineError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
            .danger_accept_invalid_certs(!verify_tls)
            .build()?;
        Ok(Self { client })
    }
}

impl Network for HttpNetwork {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<FetchedResponse, OfflineError> {
        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(request.headers.clone());
        if let Some(ref body) = request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await?;
        let status = response.status();
        let headers = response.headers().clone();
        let url = response.url().clone();
        let body = response.bytes().await?;
        debug!(url = %url, status = status.as_u16(), bytes = body.len(), "Fetched from network");

        Ok(FetchedResponse {
            url,
            status,
            headers,
            body,
        })
    }
}

/// A network that is always down, for working strictly from the caches.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineNetwork;

impl Network for OfflineNetwork {
    async fn fetch(&self, request: &InterceptedRequest) -> Result<FetchedResponse, OfflineError> {
        debug!(url = %request.url, "Offline, not fetching");
        Err(OfflineError::Disconnected)
    }
}
