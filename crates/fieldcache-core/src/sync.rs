//! Program sync between the 121 server and the local record store.
//!
//! A sync fetches every record of a program and replaces the program's
//! collection in the store (delete, then insert). When the server cannot be
//! reached the last synced records are served instead, and `SyncStatus`
//! renders the status line shown to the user.

use anyhow::Result;
use tracing::{info, warn};

use crate::api::{ApiClient, ApiError};
use crate::models::Record;
use crate::store::RecordStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncStatus {
    /// Fresh records were fetched and stored.
    Synced { program_id: i64, count: usize },
    /// The server was unavailable; records come from the last sync.
    Cached {
        program_id: i64,
        count: usize,
        age: String,
        offline: bool,
    },
    /// The server was unavailable and nothing was ever synced.
    Empty { program_id: i64, offline: bool },
}

impl SyncStatus {
    pub fn program_id(&self) -> i64 {
        match self {
            SyncStatus::Synced { program_id, .. }
            | SyncStatus::Cached { program_id, .. }
            | SyncStatus::Empty { program_id, .. } => *program_id,
        }
    }

    pub fn status_text(&self) -> String {
        match self {
            SyncStatus::Synced { program_id, count } => {
                format!("Synced {} records for program {}", count, program_id)
            }
            SyncStatus::Cached {
                count, age, offline, ..
            } => format!(
                "{}: showing {} cached records (synced {})",
                prefix(*offline),
                count,
                age
            ),
            SyncStatus::Empty { program_id, offline } => {
                format!("{}: no cached records for program {}", prefix(*offline), program_id)
            }
        }
    }
}

fn prefix(offline: bool) -> &'static str {
    if offline {
        "Offline"
    } else {
        "Sync failed"
    }
}

#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub records: Vec<Record>,
    pub status: SyncStatus,
}

/// Fetch the program's records and replace the stored collection.
pub async fn sync_program(
    api: &ApiClient,
    store: &mut RecordStore,
    program_id: i64,
) -> Result<SyncOutcome> {
    let records = api.fetch_program_records(program_id).await?;
    store_program(store, program_id, records)
}

fn store_program(
    store: &mut RecordStore,
    program_id: i64,
    records: Vec<Record>,
) -> Result<SyncOutcome> {
    let count = store.replace_program_records(program_id, records)?;
    info!(program_id, count, "Program synced");
    Ok(SyncOutcome {
        records: store.get_program_records(program_id),
        status: SyncStatus::Synced { program_id, count },
    })
}

/// Read a program from the store only.
pub fn load_program(store: &RecordStore, program_id: i64, offline: bool) -> SyncOutcome {
    match store.load_program(program_id) {
        Some(cached) => SyncOutcome {
            status: SyncStatus::Cached {
                program_id,
                count: cached.data.len(),
                age: cached.age_display(),
                offline,
            },
            records: cached.data,
        },
        None => SyncOutcome {
            records: Vec::new(),
            status: SyncStatus::Empty { program_id, offline },
        },
    }
}

/// Sync when the server answers, otherwise fall back to the stored records.
/// Store failures are returned; fetch failures are not.
pub async fn sync_or_load(
    api: &ApiClient,
    store: &mut RecordStore,
    program_id: i64,
) -> Result<SyncOutcome> {
    match api.fetch_program_records(program_id).await {
        Ok(records) => store_program(store, program_id, records),
        Err(e) => {
            let offline = e
                .downcast_ref::<ApiError>()
                .is_some_and(ApiError::is_network);
            warn!(program_id, offline, error = %e, "Sync failed, using stored records");
            Ok(load_program(store, program_id, offline))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_text() {
        assert_eq!(
            SyncStatus::Synced { program_id: 3, count: 12 }.status_text(),
            "Synced 12 records for program 3"
        );
        assert_eq!(
            SyncStatus::Cached {
                program_id: 3,
                count: 12,
                age: "5m ago".to_string(),
                offline: true,
            }
            .status_text(),
            "Offline: showing 12 cached records (synced 5m ago)"
        );
        assert_eq!(
            SyncStatus::Empty { program_id: 3, offline: true }.status_text(),
            "Offline: no cached records for program 3"
        );
        assert_eq!(
            SyncStatus::Empty { program_id: 3, offline: false }.status_text(),
            "Sync failed: no cached records for program 3"
        );
    }

    #[test]
    fn test_load_program_never_synced() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path()).unwrap();

        let outcome = load_program(&store, 8, true);
        assert!(outcome.records.is_empty());
        assert_eq!(outcome.status, SyncStatus::Empty { program_id: 8, offline: true });
    }

    #[test]
    fn test_load_program_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = RecordStore::open(dir.path()).unwrap();
        store
            .replace_program_records(8, vec![Record::new("a", 8, json!({}))])
            .unwrap();

        let outcome = load_program(&store, 8, true);
        assert_eq!(outcome.records.len(), 1);
        assert_eq!(
            outcome.status.status_text(),
            "Offline: showing 1 cached records (synced just now)"
        );
        assert_eq!(outcome.status.program_id(), 8);
    }
}
