//! Application state for the fieldcache command line.
//!
//! `App` ties together the configuration, the session, the API client and
//! the per-origin record store, and implements each command on top of them.

use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use fieldcache_core::config::normalize_url;
use fieldcache_core::offline::CACHE_NAME;
use fieldcache_core::sync;
use fieldcache_core::{
    ApiClient, Config, CredentialStore, HttpNetwork, InterceptedRequest, Interceptor, Network,
    OfflineNetwork, RecordStore, ResponseCache, Session,
};
use reqwest::Method;
use tracing::{debug, warn};

/// Directory under the origin cache dir holding the response caches.
const RESPONSE_CACHE_DIR: &str = "caches";

/// Changes requested by `fieldcache config`.
#[derive(Debug, Default)]
pub struct ConfigChanges {
    pub url121: Option<String>,
    pub verify_tls: Option<bool>,
    pub app_url: Option<String>,
    pub app_verify_tls: Option<bool>,
    pub precache: Vec<String>,
}

impl ConfigChanges {
    fn is_empty(&self) -> bool {
        self.url121.is_none()
            && self.verify_tls.is_none()
            && self.app_url.is_none()
            && self.app_verify_tls.is_none()
            && self.precache.is_empty()
    }
}

pub struct App {
    config: Config,
    session: Session,
    cache_dir: PathBuf,
}

impl App {
    pub fn new() -> Result<Self> {
        let mut config = match Config::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Config::default()
            }
        };
        config.apply_env_overrides();

        let cache_dir = config
            .cache_dir()
            .context("Cannot locate the cache directory for app_url")?;
        debug!(?cache_dir, "Cache directory configured");

        let mut session = Session::new(cache_dir.clone());
        if let Err(e) = session.load() {
            warn!(error = %e, "Ignoring unreadable session");
        }

        Ok(Self {
            config,
            session,
            cache_dir,
        })
    }

    fn api(&self) -> Result<ApiClient> {
        let api = ApiClient::new(&self.config.url121, self.config.verify_tls)?;
        Ok(match self.session.token() {
            Some(token) => api.with_token(token.to_string()),
            None => api,
        })
    }

    fn store(&self) -> Result<RecordStore> {
        RecordStore::open(&self.cache_dir).context("Failed to open record store")
    }

    fn program_or_selected(&self, program: Option<i64>) -> Result<i64> {
        match program {
            Some(id) => Ok(id),
            None => Ok(self.session.selected_program()?),
        }
    }

    // =========================================================================
    // Configuration
    // =========================================================================

    /// Update the stored configuration. Works on the file as saved, without
    /// environment overrides, so it can repair an invalid `app_url`.
    pub fn configure(changes: ConfigChanges) -> Result<()> {
        let mut config = Config::load()?;
        let changed = !changes.is_empty();
        if let Some(url) = changes.url121 {
            config.set_url121(&url);
        }
        if let Some(verify) = changes.verify_tls {
            config.verify_tls = verify;
        }
        if let Some(url) = changes.app_url {
            config.app_url = normalize_url(&url);
            config.app_origin()?;
        }
        if let Some(verify) = changes.app_verify_tls {
            config.app_verify_tls = verify;
        }
        if !changes.precache.is_empty() {
            config.precache = changes.precache;
        }
        if changed {
            config.save()?;
            eprintln!("Saved configuration.");
        }
        println!("{}", serde_json::to_string_pretty(&config)?);
        Ok(())
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    pub async fn login(&mut self, username: Option<String>, remember: bool) -> Result<()> {
        let username = match username.or_else(|| self.config.last_username.clone()) {
            Some(u) if !u.trim().is_empty() => u.trim().to_string(),
            _ => Self::prompt_username()?,
        };
        let password = match std::env::var("FIELDCACHE_PASSWORD") {
            Ok(p) if !p.is_empty() => p,
            _ => match CredentialStore::get_password(&username) {
                Some(p) => p,
                None => rpassword::prompt_password("Password: ")?,
            },
        };

        let data = self.api()?.login(&username, &password).await?;
        let count = data.program_ids.len();

        if remember {
            if let Err(e) = CredentialStore::store(&username, &password) {
                warn!(error = %e, "Failed to store credentials");
            }
        }

        self.config.last_username = Some(username.clone());
        if let Err(e) = Self::remember_username(&username) {
            warn!(error = %e, "Failed to save config");
        }

        self.session.update(data);
        self.session.save()?;
        println!("Logged in as {} ({} programs)", username, count);
        Ok(())
    }

    /// Save the username to the config file, leaving environment overrides out.
    fn remember_username(username: &str) -> Result<()> {
        let mut config = Config::load()?;
        config.last_username = Some(username.to_string());
        config.save()
    }

    fn prompt_username() -> Result<String> {
        print!("Username: ");
        io::stdout().flush()?;
        let mut username = String::new();
        io::stdin().read_line(&mut username)?;
        Ok(username.trim().to_string())
    }

    pub fn logout(&mut self) -> Result<()> {
        if let Some(ref data) = self.session.data {
            if let Err(e) = CredentialStore::delete(&data.username) {
                warn!(error = %e, "Failed to delete credentials");
            }
        }
        self.session.clear()?;
        println!("Logged out");
        Ok(())
    }

    // =========================================================================
    // Programs
    // =========================================================================

    pub async fn programs(&self) -> Result<()> {
        let selected = self.session.selected_program().ok();
        let ids = self.session.program_ids().to_vec();
        if ids.is_empty() {
            anyhow::bail!("No programs available. Log in first.");
        }

        for program in self.api()?.list_programs(&ids).await {
            let marker = if Some(program.id) == selected { "*" } else { " " };
            println!("{} {:>5}  {}", marker, program.id, program.title);
        }
        Ok(())
    }

    pub fn select(&mut self, program_id: i64) -> Result<()> {
        self.session.select_program(program_id)?;
        self.session.save()?;
        println!("Selected program {}", program_id);
        Ok(())
    }

    // =========================================================================
    // Records
    // =========================================================================

    pub async fn sync(&self, program: Option<i64>) -> Result<()> {
        let program_id = self.program_or_selected(program)?;
        let mut store = self.store()?;
        let outcome = sync::sync_or_load(&self.api()?, &mut store, program_id).await?;
        eprintln!("{}", outcome.status.status_text());
        Ok(())
    }

    pub fn records(&self, program: Option<i64>) -> Result<()> {
        let program_id = self.program_or_selected(program)?;
        let store = self.store()?;
        let records = match store.load_program(program_id) {
            Some(cached) => {
                eprintln!(
                    "{} records for program {} (synced {})",
                    cached.data.len(),
                    program_id,
                    cached.age_display()
                );
                cached.data
            }
            None => {
                eprintln!("No stored records for program {}", program_id);
                Vec::new()
            }
        };
        println!("{}", serde_json::to_string_pretty(&records)?);
        Ok(())
    }

    // =========================================================================
    // Interception
    // =========================================================================

    fn interceptor<N: Network>(&self, network: N) -> Result<Interceptor<N>> {
        let cache = ResponseCache::open(&self.cache_dir.join(RESPONSE_CACHE_DIR), CACHE_NAME)?;
        Ok(Interceptor::new(self.config.app_origin()?, cache, network)
            .with_precache(self.config.precache.clone()))
    }

    pub async fn install(&self) -> Result<()> {
        let interceptor = self.interceptor(HttpNetwork::new(self.config.app_verify_tls)?)?;
        let report = interceptor.install().await?;
        for name in interceptor.activate()? {
            eprintln!("Deleted old cache {}", name);
        }
        for url in &report.cached {
            println!("cached  {}", url);
        }
        for url in &report.skipped {
            println!("skipped {}", url);
        }
        Ok(())
    }

    pub async fn fetch(
        &self,
        target: &str,
        navigate: bool,
        method: &str,
        offline: bool,
    ) -> Result<()> {
        let origin = self.config.app_origin()?;
        let url = InterceptedRequest::resolve(&origin, target)?;
        let method = Method::from_bytes(method.to_ascii_uppercase().as_bytes())
            .with_context(|| format!("Invalid method: {}", method))?;

        let mut request = if navigate {
            InterceptedRequest::navigate(url)
        } else {
            InterceptedRequest::get(url)
        };
        request.method = method;

        if offline {
            self.serve(self.interceptor(OfflineNetwork)?, &request).await
        } else {
            let network = HttpNetwork::new(self.config.app_verify_tls)?;
            self.serve(self.interceptor(network)?, &request).await
        }
    }

    async fn serve<N: Network>(
        &self,
        interceptor: Interceptor<N>,
        request: &InterceptedRequest,
    ) -> Result<()> {
        let served = interceptor.handle(request).await?;
        eprintln!(
            "{} {} ({}, from {})",
            served.response.status.as_u16(),
            served.response.url,
            served.kind.label(),
            served.source
        );
        io::stdout().write_all(&served.response.body)?;
        Ok(())
    }

    // =========================================================================
    // Status
    // =========================================================================

    pub fn status(&self) -> Result<()> {
        let server = if self.config.is_configured() {
            self.config.url121.as_str()
        } else {
            "(not set)"
        };
        println!("121 server:   {}", server);
        println!("Verify TLS:   {}", self.config.verify_tls);
        println!("App URL:      {}", self.config.app_url);
        println!("App TLS:      {}", self.config.app_verify_tls);
        println!("Cache dir:    {}", self.cache_dir.display());

        match self.session.data {
            Some(ref data) => {
                let selected = data
                    .selected_program_id
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "none".to_string());
                println!("Logged in as: {} (selected program: {})", data.username, selected);
            }
            None => println!("Logged in as: (not logged in)"),
        }

        let store = self.store()?;
        for program_id in store.synced_programs() {
            if let Some(cached) = store.load_program(program_id) {
                let stale = if cached.is_stale() { ", stale" } else { "" };
                println!(
                    "Program {:>5}: {} records, synced {}{}",
                    program_id,
                    cached.data.len(),
                    cached.age_display(),
                    stale
                );
            }
        }

        let caches = ResponseCache::cache_names(&self.cache_dir.join(RESPONSE_CACHE_DIR))?;
        let caches = if caches.is_empty() {
            "none".to_string()
        } else {
            caches.join(", ")
        };
        println!("Response caches: {}", caches);
        Ok(())
    }
}
