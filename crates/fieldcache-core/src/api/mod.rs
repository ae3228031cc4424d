//! REST API client module for the 121 platform.
//!
//! This module provides the `ApiClient` for logging in and fetching the
//! programs and registrations that fieldcache keeps available offline.
//!
//! The API authenticates with the `access_token_general` cookie returned by
//! the login endpoint.

pub mod client;
pub mod error;

pub use client::ApiClient;
pub use error::ApiError;
