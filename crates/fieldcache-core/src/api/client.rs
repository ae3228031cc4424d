//! API client for communicating with the 121 REST API.
//!
//! This module provides the `ApiClient` struct for logging in and making
//! cookie-authenticated requests for program and registration data.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use futures::stream::{self, StreamExt};
use reqwest::{header, Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::auth::SessionData;
use crate::config::normalize_url;
use crate::models::{Program, ProgramSummary, Record};

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Name of the cookie carrying the 121 access token.
const TOKEN_COOKIE: &str = "access_token_general";

/// Maximum number of retries for rate-limited (429) requests.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

/// Maximum concurrent program detail requests when building the program list.
const MAX_CONCURRENT_REQUESTS: usize = 4;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    access_token_general: Option<String>,
    #[serde(default)]
    permissions: Option<HashMap<String, Value>>,
}

/// API client for a 121 server.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a client for the server at `base_url`.
    pub fn new(base_url: &str, verify_tls: bool) -> Result<Self> {
        let base_url = normalize_url(base_url);
        if base_url.is_empty() {
            anyhow::bail!("Missing url121. Set it with `fieldcache config --url121 <URL>` first.");
        }
        if !verify_tls {
            warn!(url = %base_url, "TLS certificate verification disabled");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .danger_accept_invalid_certs(!verify_tls)
            .build()?;

        Ok(Self {
            client,
            base_url,
            token: None,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create a new ApiClient with the given token, sharing the connection pool.
    pub fn with_token(&self, token: String) -> Self {
        Self {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: Some(token),
        }
    }

    /// Log in and return the session: the access token and the ids of the
    /// programs the user has permissions for.
    pub async fn login(&self, username: &str, password: &str) -> Result<SessionData> {
        let url = format!("{}/api/users/login", self.base_url);

        let response = self
            .client
            .post(&url)
            .json(&LoginRequest { username, password })
            .send()
            .await
            .map_err(ApiError::from)
            .context("Unable to reach login server.")?;

        match response.status() {
            StatusCode::CREATED => {}
            StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED => {
                return Err(ApiError::InvalidCredentials.into());
            }
            status => return Err(ApiError::LoginFailed(status.as_u16()).into()),
        }

        let login: LoginResponse = response
            .json()
            .await
            .context("Failed to parse login response")?;

        let token = login
            .access_token_general
            .filter(|t| !t.is_empty())
            .ok_or(ApiError::MissingToken)?;

        let program_ids = Self::program_ids(login.permissions.unwrap_or_default());
        debug!(username, programs = program_ids.len(), "Login succeeded");

        Ok(SessionData::new(token, username.to_string(), program_ids))
    }

    /// Program ids are the keys of the `permissions` object.
    fn program_ids(permissions: HashMap<String, Value>) -> Vec<i64> {
        let mut ids: Vec<i64> = permissions
            .keys()
            .filter_map(|key| match key.trim().parse::<i64>() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(key = %key, "Ignoring non-numeric program permission");
                    None
                }
            })
            .collect();
        ids.sort_unstable();
        ids
    }

    fn auth_headers(&self) -> Result<header::HeaderMap> {
        let token = self.token.as_ref().ok_or(ApiError::NotAuthenticated)?;
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::COOKIE,
            header::HeaderValue::from_str(&format!("{}={}", TOKEN_COOKIE, token))?,
        );
        Ok(headers)
    }

    /// Check if response is successful, returning an error with body if not.
    /// Returns Ok(Some(response)) for success, Ok(None) for rate limit (should retry),
    /// or Err for other errors.
    async fn check_response_for_retry(
        response: reqwest::Response,
    ) -> Result<Option<reqwest::Response>> {
        if response.status().is_success() {
            Ok(Some(response))
        } else if response.status() == StatusCode::TOO_MANY_REQUESTS {
            Ok(None)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(ApiError::from_status(status, &body).into())
        }
    }

    async fn get<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let response = self
                .client
                .get(url)
                .headers(self.auth_headers()?)
                .send()
                .await
                .map_err(ApiError::from)
                .with_context(|| format!("Failed to send GET request to {}", url))?;

            match Self::check_response_for_retry(response).await? {
                Some(response) => {
                    return response
                        .json()
                        .await
                        .with_context(|| format!("Failed to parse JSON response from {}", url));
                }
                None => {
                    retries += 1;
                    if retries > MAX_RATE_LIMIT_RETRIES {
                        return Err(ApiError::RateLimited.into());
                    }
                    warn!(url, retry = retries, backoff_ms, "Rate limited, backing off");
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    backoff_ms *= 2;
                }
            }
        }
    }

    // =========================================================================
    // Programs
    // =========================================================================

    pub async fn get_program(&self, program_id: i64) -> Result<Program> {
        let url = format!("{}/api/programs/{}", self.base_url, program_id);
        self.get(&url)
            .await
            .with_context(|| format!("Unable to load program {}", program_id))
    }

    /// Titles for the given programs, sorted case-insensitively. A program
    /// whose details cannot be fetched is listed as `Program {id}`.
    pub async fn list_programs(&self, program_ids: &[i64]) -> Vec<ProgramSummary> {
        let mut programs: Vec<ProgramSummary> = stream::iter(program_ids.iter().copied())
            .map(|id| async move {
                match self.get_program(id).await {
                    Ok(program) => ProgramSummary::from_program(id, &program),
                    Err(e) => {
                        warn!(program_id = id, error = %e, "Using fallback program title");
                        ProgramSummary {
                            id,
                            title: ProgramSummary::fallback_title(id),
                        }
                    }
                }
            })
            .buffered(MAX_CONCURRENT_REQUESTS)
            .collect()
            .await;

        programs.sort_by_key(|p| p.title.to_lowercase());
        programs
    }

    // =========================================================================
    // Registrations
    // =========================================================================

    /// Fetch the records of a program for offline use. Accepts either a bare
    /// array or a `{ "data": [...] }` page; elements without an id are skipped.
    pub async fn fetch_program_records(&self, program_id: i64) -> Result<Vec<Record>> {
        let url = format!("{}/api/programs/{}/registrations", self.base_url, program_id);
        let body: Value = self
            .get(&url)
            .await
            .with_context(|| format!("Unable to load records for program {}", program_id))?;

        let items = match body {
            Value::Array(items) => items,
            Value::Object(mut page) => Self::take_data(&mut page).ok_or_else(|| {
                ApiError::InvalidResponse("registrations response has no data array".to_string())
            })?,
            other => {
                return Err(ApiError::InvalidResponse(format!(
                    "expected registrations array, got {}",
                    other
                ))
                .into())
            }
        };

        let total = items.len();
        let records: Vec<Record> = items
            .into_iter()
            .filter_map(|item| Record::from_server(program_id, item))
            .collect();

        if records.len() < total {
            warn!(program_id, skipped = total - records.len(), "Skipped records without an id");
        }
        debug!(program_id, count = records.len(), "Fetched program records");
        Ok(records)
    }

    fn take_data(page: &mut Map<String, Value>) -> Option<Vec<Value>> {
        match page.remove("data")? {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }
}
