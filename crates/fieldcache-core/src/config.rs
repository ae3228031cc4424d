//! Application configuration management.
//!
//! This module handles loading and saving the application configuration,
//! which includes the 121 server URL, TLS verification, the web application
//! whose requests are intercepted, and the last used username.
//!
//! Configuration is stored at `~/.config/fieldcache/config.json`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::store::origin_slug;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "fieldcache";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default address of the offline-enabled web application.
pub const DEFAULT_APP_URL: &str = "http://localhost:5000";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub url121: String,
    #[serde(rename = "VERIFY_TLS")]
    pub verify_tls: bool,
    pub app_url: String,
    /// Verify TLS certificates of `app_url` when intercepting its requests.
    pub app_verify_tls: bool,
    pub last_username: Option<String>,
    /// Static asset paths precached on install, relative to `app_url`.
    pub precache: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url121: String::new(),
            verify_tls: true,
            app_url: DEFAULT_APP_URL.to_string(),
            app_verify_tls: true,
            last_username: None,
            precache: Vec::new(),
        }
    }
}

impl Config {
    /// Load from the default location, writing defaults there on first use.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(?path, "No config file, writing defaults");
            let config = Self::default();
            config.save_to(path)?;
            return Ok(config);
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `FIELDCACHE_*` environment overrides on top of the stored values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("FIELDCACHE_URL121") {
            self.set_url121(&url);
        }
        if let Some(app_url) = lookup("FIELDCACHE_APP_URL") {
            self.app_url = normalize_url(&app_url);
        }
        if let Some(verify) = lookup_bool(&lookup, "FIELDCACHE_VERIFY_TLS") {
            self.verify_tls = verify;
        }
        if let Some(verify) = lookup_bool(&lookup, "FIELDCACHE_APP_VERIFY_TLS") {
            self.app_verify_tls = verify;
        }
    }

    pub fn set_url121(&mut self, url: &str) {
        self.url121 = normalize_url(url);
    }

    pub fn is_configured(&self) -> bool {
        !self.url121.is_empty()
    }

    /// Origin of the web application; scopes the record store and response caches.
    pub fn app_origin(&self) -> Result<Url> {
        Url::parse(&self.app_url)
            .with_context(|| format!("Invalid app_url: {}", self.app_url))
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Per-origin cache directory holding the record store, response caches
    /// and the session file. Fails when `app_url` is not a valid URL.
    pub fn cache_dir(&self) -> Result<PathBuf> {
        let slug = origin_slug(&self.app_origin()?);
        let cache_root = dirs::cache_dir().unwrap_or_else(|| {
            warn!("Could not find cache directory, using ./cache");
            PathBuf::from("./cache")
        });
        Ok(cache_root.join(APP_NAME).join(slug))
    }
}

/// Trim whitespace and trailing slashes from a base URL.
pub fn normalize_url(url: &str) -> String {
    url.trim().trim_end_matches('/').to_string()
}

fn lookup_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<bool> {
    let raw = lookup(key)?;
    let value = parse_bool(&raw);
    if value.is_none() {
        warn!(key, value = %raw, "Ignoring invalid boolean override");
    }
    value
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

// ============================================================================
// Tests
// ============================================================================
