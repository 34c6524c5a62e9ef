//! Storage module for relational job records
//!
//! This module handles:
//! - SQLite database initialization and schema management
//! - Loading the records of a parent job
//! - Bulk write-back of enriched records by row id

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStore;
pub use traits::{RecordStore, StorageError, StorageResult};

use std::path::Path;

/// Initializes or opens a record store
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
pub fn open_store(path: &Path) -> StorageResult<SqliteStore> {
    SqliteStore::new(path)
}
