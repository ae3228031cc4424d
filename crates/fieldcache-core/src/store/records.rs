use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::CachedData;
use crate::models::Record;

/// Database file name inside the origin directory.
const DB_FILE: &str = "records.json";

/// Schema version written to new databases. Older files are upgraded on open.
const DB_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record store is corrupt ({path}): {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Record store version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("Failed to encode record store: {0}")]
    Encode(#[from] serde_json::Error),
}

/// On-disk layout: records keyed by id, plus the last sync time per program.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Database {
    version: u32,
    records: BTreeMap<String, Record>,
    #[serde(default)]
    synced: BTreeMap<i64, DateTime<Utc>>,
}

/// Persistent record store for one origin.
///
/// Record ids are the primary key across all programs; writing a record whose
/// id already exists replaces it. Reads are ordered by id.
pub struct RecordStore {
    path: PathBuf,
    db: Database,
}

impl RecordStore {
    /// Open the store in `dir`, creating an empty database if none exists.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(DB_FILE);

        let mut db = if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            serde_json::from_str::<Database>(&contents).map_err(|source| StoreError::Corrupt {
                path: path.clone(),
                source,
            })?
        } else {
            Database::default()
        };

        if db.version > DB_VERSION {
            return Err(StoreError::UnsupportedVersion {
                found: db.version,
                supported: DB_VERSION,
            });
        }

        let store = if db.version < DB_VERSION {
            info!(from = db.version, to = DB_VERSION, ?path, "Creating record store");
            db.version = DB_VERSION;
            write_database(&path, &db)?;
            Self { path, db }
        } else {
            Self { path, db }
        };

        debug!(path = ?store.path, records = store.db.records.len(), "Record store opened");
        Ok(store)
    }

    /// Open the store for `origin` under `root`, one directory per origin.
    pub fn open_origin(root: &Path, origin: &Url) -> Result<Self, StoreError> {
        Self::open(&root.join(origin_slug(origin)))
    }

    /// Delete every record of `program_id`, then insert `records` into that
    /// collection. Returns the number of records now stored for the program.
    pub fn replace_program_records(
        &mut self,
        program_id: i64,
        records: Vec<Record>,
    ) -> Result<usize, StoreError> {
        let mut db = self.db.clone();
        let before = db.records.len();
        db.records.retain(|_, r| r.program_id != program_id);
        let removed = before - db.records.len();

        for mut record in records {
            record.program_id = program_id;
            if let Some(previous) = db.records.insert(record.id.clone(), record) {
                if previous.program_id != program_id {
                    debug!(
                        id = %previous.id,
                        from = previous.program_id,
                        to = program_id,
                        "Record moved between programs"
                    );
                }
            }
        }

        db.synced.insert(program_id, Utc::now());
        write_database(&self.path, &db)?;
        self.db = db;

        let stored = self.count_program_records(program_id);
        debug!(program_id, removed, stored, "Replaced program records");
        Ok(stored)
    }

    /// All records of `program_id`; empty when the program was never synced.
    pub fn get_program_records(&self, program_id: i64) -> Vec<Record> {
        self.db
            .records
            .values()
            .filter(|r| r.program_id == program_id)
            .cloned()
            .collect()
    }

    /// Records of `program_id` with the time they were synced, or `None` if
    /// the program has never been synced.
    pub fn load_program(&self, program_id: i64) -> Option<CachedData<Vec<Record>>> {
        let synced_at = *self.db.synced.get(&program_id)?;
        Some(CachedData::at(self.get_program_records(program_id), synced_at))
    }

    pub fn count_program_records(&self, program_id: i64) -> usize {
        self.db
            .records
            .values()
            .filter(|r| r.program_id == program_id)
            .count()
    }

    /// Program ids that have been synced at least once.
    pub fn synced_programs(&self) -> Vec<i64> {
        self.db.synced.keys().copied().collect()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Write to a temporary file and rename over the database.
fn write_database(path: &Path, db: &Database) -> Result<(), StoreError> {
    let tmp = path.with_extension("json.tmp");
    std::fs::write(&tmp, serde_json::to_vec_pretty(db)?)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Directory-safe name for an origin, e.g. `https_121.example.org_443`.
pub fn origin_slug(origin: &Url) -> String {
    let host = origin.host_str().unwrap_or("local");
    let raw = match origin.port_or_known_default() {
        Some(port) => format!("{}_{}_{}", origin.scheme(), host, port),
        None => format!("{}_{}", origin.scheme(), host),
    };
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
