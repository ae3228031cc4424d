//! Local record store for offline data access.
//!
//! This module provides the `RecordStore`, a persistent per-origin database
//! of records grouped by program id. Syncing a program deletes its records
//! and inserts the fresh set; reading a program returns whatever was last
//! synced, together with the time of that sync.

pub mod cached;
pub mod records;

pub use cached::CachedData;
pub use records::{origin_slug, RecordStore, StoreError};
