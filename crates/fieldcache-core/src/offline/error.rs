use thiserror::Error;

#[derive(Error, Debug)]
pub enum OfflineError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Network is unavailable")]
    Disconnected,

    #[error("{0} is not cached and the network is unavailable")]
    NotCached(String),

    #[error("Failed to precache {url} (status {status})")]
    Precache { url: String, status: u16 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Response cache I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Response cache entry is invalid: {0}")]
    Metadata(#[from] serde_json::Error),
}

impl OfflineError {
    /// Failures that mean "the network did not answer", which the
    /// network-first policies fall back from.
    pub fn is_network_failure(&self) -> bool {
        matches!(self, OfflineError::Network(_) | OfflineError::Disconnected)
    }
}
