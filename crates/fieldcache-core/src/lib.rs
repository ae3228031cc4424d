//! Core library for fieldcache.
//!
//! fieldcache keeps a 121 program-management web application usable when the
//! network goes away. It provides:
//!
//! - `api`: client for the 121 REST API (login, programs, registrations)
//! - `auth`: persisted session and keychain-backed credentials
//! - `store`: persistent per-origin record store, one collection per program
//! - `offline`: request interceptor applying cache-first / network-first policies
//! - `sync`: delete-then-reinsert program sync and offline status text

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod offline;
pub mod store;
pub mod sync;

pub use api::{ApiClient, ApiError};
pub use auth::{CredentialStore, Session, SessionData, SessionError};
pub use config::Config;
pub use models::{Program, ProgramSummary, Record};
pub use offline::{
    FetchedResponse, HttpNetwork, InterceptedRequest, Interceptor, Network, OfflineError,
    OfflineNetwork, RequestKind, ResponseCache, ResponseSource, ServedResponse,
};
pub use store::{CachedData, RecordStore, StoreError};
pub use sync::{SyncOutcome, SyncStatus};
