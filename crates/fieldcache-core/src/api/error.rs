use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Incorrect username or password.")]
    InvalidCredentials,

    #[error("Login failed ({0}).")]
    LoginFailed(u16),

    #[error("Login succeeded but access_token_general was not returned.")]
    MissingToken,

    #[error("Not logged in")]
    NotAuthenticated,

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// True when the server could not be reached at all, as opposed to the
    /// server answering with an error.
    pub fn is_network(&self) -> bool {
        match self {
            ApiError::NetworkError(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn test_from_status_mapping() {
        let status = |code: StatusCode, body: &str| ApiError::from_status(code, body);

        assert!(matches!(status(StatusCode::UNAUTHORIZED, ""), ApiError::Unauthorized));
        assert!(matches!(
            status(StatusCode::FORBIDDEN, "no"),
            ApiError::AccessDenied(b) if b == "no"
        ));
        assert!(matches!(status(StatusCode::NOT_FOUND, ""), ApiError::NotFound(_)));
        assert!(matches!(status(StatusCode::TOO_MANY_REQUESTS, ""), ApiError::RateLimited));
        assert!(matches!(status(StatusCode::BAD_GATEWAY, ""), ApiError::ServerError(_)));
        assert!(matches!(status(StatusCode::IM_A_TEAPOT, ""), ApiError::InvalidResponse(_)));
    }

    #[test]
    fn test_truncate_body() {
        let long = "é".repeat(400);
        let truncated = ApiError::truncate_body(&long);
        assert!(truncated.ends_with("(truncated, 800 total bytes)"));
        assert_eq!(ApiError::truncate_body("short"), "short");
    }

    #[test]
    fn test_login_messages() {
        assert_eq!(ApiError::InvalidCredentials.to_string(), "Incorrect username or password.");
        assert_eq!(ApiError::LoginFailed(500).to_string(), "Login failed (500).");
    }
}
