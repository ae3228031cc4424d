use bytes::Bytes;
use reqwest::header::{self, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, Url};

use super::OfflineError;

/// How the interceptor treats a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    /// Same-origin GET for anything that is neither a page nor an API call.
    StaticAsset,
    /// Same-origin GET under `/api/`.
    Api,
    /// Top-level page load.
    Navigation,
    /// Non-GET or cross-origin; goes to the network untouched.
    Passthrough,
}

impl RequestKind {
    pub fn label(&self) -> &'static str {
        match self {
            RequestKind::StaticAsset => "static",
            RequestKind::Api => "api",
            RequestKind::Navigation => "navigation",
            RequestKind::Passthrough => "passthrough",
        }
    }
}

/// An outgoing request as seen by the interceptor.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
    /// Set for top-level page loads (`mode: navigate`).
    pub navigate: bool,
    pub body: Option<Bytes>,
}

impl InterceptedRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: HeaderMap::new(),
            navigate: false,
            body: None,
        }
    }

    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    /// A page navigation to `url`.
    pub fn navigate(url: Url) -> Self {
        let mut request = Self::get(url);
        request.navigate = true;
        request
            .headers
            .insert(header::ACCEPT, HeaderValue::from_static("text/html"));
        request
    }

    /// Parse `target` as an absolute URL, or resolve it against `origin`.
    pub fn resolve(origin: &Url, target: &str) -> Result<Url, OfflineError> {
        Url::parse(target)
            .or_else(|_| origin.join(target))
            .map_err(|e| OfflineError::InvalidUrl(format!("{}: {}", target, e)))
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    fn accepts_html(&self) -> bool {
        self.headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .any(|v| v.contains("text/html"))
    }

    /// Classify against the origin the interceptor serves.
    pub fn classify(&self, origin: &Url) -> RequestKind {
        if self.method != Method::GET || self.url.origin() != origin.origin() {
            RequestKind::Passthrough
        } else if self.navigate || self.accepts_html() {
            RequestKind::Navigation
        } else if self.url.path().starts_with("/api/") {
            RequestKind::Api
        } else {
            RequestKind::StaticAsset
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("http://localhost:5000").unwrap()
    }

    fn url(path: &str) -> Url {
        origin().join(path).unwrap()
    }

    #[test]
    fn test_classify_static() {
        let request = InterceptedRequest::get(url("/static/app.js"));
        assert_eq!(request.classify(&origin()), RequestKind::StaticAsset);
    }

    #[test]
    fn test_classify_api() {
        let request = InterceptedRequest::get(url("/api/programs"));
        assert_eq!(request.classify(&origin()), RequestKind::Api);

        // `/apiary` is not an API path
        let request = InterceptedRequest::get(url("/apiary.png"));
        assert_eq!(request.classify(&origin()), RequestKind::StaticAsset);
    }

    #[test]
    fn test_classify_navigation() {
        assert_eq!(
            InterceptedRequest::navigate(url("/login")).classify(&origin()),
            RequestKind::Navigation
        );

        let request = InterceptedRequest::get(url("/config")).with_header(
            header::ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml"),
        );
        assert_eq!(request.classify(&origin()), RequestKind::Navigation);
    }

    #[test]
    fn test_classify_passthrough() {
        let post = InterceptedRequest::new(Method::POST, url("/api/select-program"));
        assert_eq!(post.classify(&origin()), RequestKind::Passthrough);

        let other_port =
            InterceptedRequest::get(Url::parse("http://localhost:8080/app.js").unwrap());
        assert_eq!(other_port.classify(&origin()), RequestKind::Passthrough);

        let cdn = InterceptedRequest::navigate(Url::parse("https://cdn.example.org/").unwrap());
        assert_eq!(cdn.classify(&origin()), RequestKind::Passthrough);
    }

    #[test]
    fn test_resolve() {
        assert_eq!(
            InterceptedRequest::resolve(&origin(), "/api/programs").unwrap().as_str(),
            "http://localhost:5000/api/programs"
        );
        assert_eq!(
            InterceptedRequest::resolve(&origin(), "https://other.example.org/x").unwrap().as_str(),
            "https://other.example.org/x"
        );
    }
}
