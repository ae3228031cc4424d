//! Offline request interception.
//!
//! Every request the web application makes is classified and served by one
//! of three fixed policies:
//!
//! - static assets: cache-first, populating the cache on a miss
//! - API calls: network-first, then cache, then a synthetic offline reply
//! - page navigations: network-first, then cache, then the precached shell
//!
//! Responses are kept in a versioned, persistent `ResponseCache`. Network
//! access goes through the `Network` trait so the interceptor can run against
//! the real network (`HttpNetwork`) or a disconnected one (`OfflineNetwork`).

pub mod cache;
pub mod error;
pub mod interceptor;
pub mod network;
pub mod request;

pub use cache::ResponseCache;
pub use error::OfflineError;
pub use interceptor::{InstallReport, Interceptor, ResponseSource, ServedResponse, CACHE_NAME};
pub use network::{FetchedResponse, HttpNetwork, Network, OfflineNetwork};
pub use request::{InterceptedRequest, RequestKind};
