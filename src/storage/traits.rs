//! Storage traits and error types
//!
//! This module defines the trait interface for relational record stores and
//! associated error types.

use crate::config::RecordsConfig;
use crate::item::WorkItem;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Relational store of records grouped under parent jobs
///
/// Records are addressed by a stable row id that survives enrichment.
pub trait RecordStore {
    /// Creates a job, or returns the id of the existing one
    fn create_job(&mut self, job_key: &str) -> StorageResult<i64>;

    /// Adds a record to a job
    ///
    /// # Returns
    ///
    /// The row id of the new record
    fn insert_item(&mut self, job_key: &str, record: &Map<String, Value>) -> StorageResult<i64>;

    /// Loads the records of a job that carry at least one candidate link
    ///
    /// # Arguments
    ///
    /// * `job_key` - External job id
    /// * `fields` - Record field names used to find candidate links
    fn load_items(&self, job_key: &str, fields: &RecordsConfig) -> StorageResult<Vec<WorkItem>>;

    /// Writes items back by row id
    ///
    /// Items without a row id are skipped, as are items whose
    /// (title, identity, address, phone) key already belongs to another row.
    ///
    /// # Returns
    ///
    /// The number of rows updated
    fn bulk_update(
        &mut self,
        job_key: &str,
        items: &[WorkItem],
        fields: &RecordsConfig,
    ) -> StorageResult<usize>;
}
