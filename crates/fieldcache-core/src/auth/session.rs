use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Session file name in cache directory
const SESSION_FILE: &str = "session.json";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Invalid program_id: {0}")]
    InvalidProgram(i64),

    #[error("No program selected")]
    NoProgramSelected,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    /// Value of the `access_token_general` cookie.
    pub token: String,
    pub username: String,
    pub program_ids: Vec<i64>,
    pub selected_program_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl SessionData {
    pub fn new(token: String, username: String, program_ids: Vec<i64>) -> Self {
        let selected_program_id = program_ids.first().copied();
        Self {
            token,
            username,
            program_ids,
            selected_program_id,
            created_at: Utc::now(),
        }
    }
}

pub struct Session {
    cache_dir: PathBuf,
    pub data: Option<SessionData>,
}

impl Session {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            data: None,
        }
    }

    /// Load session from disk
    pub fn load(&mut self) -> Result<bool> {
        let path = self.session_path();
        if !path.exists() {
            return Ok(false);
        }
        let contents = std::fs::read_to_string(&path)
            .context("Failed to read session file")?;
        let data: SessionData = serde_json::from_str(&contents)
            .context("Failed to parse session file")?;
        self.data = Some(data);
        Ok(true)
    }

    /// Save session to disk
    pub fn save(&self) -> Result<()> {
        if let Some(ref data) = self.data {
            let path = self.session_path();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let contents = serde_json::to_string_pretty(data)?;
            std::fs::write(path, contents)?;
        }
        Ok(())
    }

    /// Clear session data (logout)
    pub fn clear(&mut self) -> Result<()> {
        self.data = None;
        let path = self.session_path();
        if path.exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }

    pub fn update(&mut self, data: SessionData) {
        self.data = Some(data);
    }

    pub fn token(&self) -> Option<&str> {
        self.data.as_ref().map(|d| d.token.as_str())
    }

    pub fn is_logged_in(&self) -> bool {
        self.data.is_some()
    }

    pub fn program_ids(&self) -> &[i64] {
        self.data.as_ref().map(|d| d.program_ids.as_slice()).unwrap_or(&[])
    }

    pub fn selected_program(&self) -> Result<i64, SessionError> {
        let data = self.data.as_ref().ok_or(SessionError::NotLoggedIn)?;
        data.selected_program_id.ok_or(SessionError::NoProgramSelected)
    }

    /// Select one of the programs this session can access.
    pub fn select_program(&mut self, program_id: i64) -> Result<i64, SessionError> {
        let data = self.data.as_mut().ok_or(SessionError::NotLoggedIn)?;
        if !data.program_ids.contains(&program_id) {
            return Err(SessionError::InvalidProgram(program_id));
        }
        data.selected_program_id = Some(program_id);
        Ok(program_id)
    }

    fn session_path(&self) -> PathBuf {
        self.cache_dir.join(SESSION_FILE)
    }
}
