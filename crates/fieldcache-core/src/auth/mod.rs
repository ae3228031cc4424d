//! Authentication module for managing 121 sessions and credentials.
//!
//! This module provides:
//! - `Session`: the login token, accessible programs and the selected program
//! - `CredentialStore`: optional OS-level password storage via keyring
//!
//! Sessions are persisted to disk in the per-origin cache directory.

pub mod credentials;
pub mod session;

pub use credentials::CredentialStore;
pub use session::{Session, SessionData, SessionError};
