//! Data models for 121 entities.
//!
//! - `Program`, `ProgramSummary`: programs the signed-in user can access
//! - `Record`: a synced registration, grouped by program in the local store

pub mod program;
pub mod record;

pub use program::{Program, ProgramSummary};
pub use record::Record;
