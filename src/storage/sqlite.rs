//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the RecordStore trait.

use crate::config::RecordsConfig;
use crate::item::{value_text, WorkItem};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{RecordStore, StorageError, StorageResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;

/// Fields that together identify a record within a job
const CONFLICT_FIELDS: [&str; 3] = ["title", "address", "phone"];

/// SQLite storage backend
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens or creates a store at `path`
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn job_id(&self, job_key: &str) -> StorageResult<i64> {
        self.conn
            .query_row(
                "SELECT id FROM jobs WHERE job_key = ?1",
                params![job_key],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StorageError::JobNotFound(job_key.to_string()))
    }

    fn rows(&self, job_id: i64) -> StorageResult<Vec<(i64, Map<String, Value>)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, payload FROM job_items WHERE job_id = ?1 ORDER BY id")?;

        let raw = stmt
            .query_map(params![job_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut rows = Vec::with_capacity(raw.len());
        for (id, payload) in raw {
            match serde_json::from_str::<Value>(&payload)? {
                Value::Object(record) => rows.push((id, record)),
                _ => tracing::warn!("Row {} does not hold an object payload", id),
            }
        }
        Ok(rows)
    }
}

fn conflict_key(record: &Map<String, Value>, fields: &RecordsConfig) -> Vec<String> {
    let text = |field: &str| record.get(field).map(value_text).unwrap_or_default();

    let mut key: Vec<String> = CONFLICT_FIELDS.iter().map(|field| text(field)).collect();
    key.push(text(&fields.identity_field));
    key
}

impl RecordStore for SqliteStore {
    fn create_job(&mut self, job_key: &str) -> StorageResult<i64> {
        if let Ok(id) = self.job_id(job_key) {
            return Ok(id);
        }

        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO jobs (job_key, created_at) VALUES (?1, ?2)",
            params![job_key, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn insert_item(&mut self, job_key: &str, record: &Map<String, Value>) -> StorageResult<i64> {
        let job_id = self.job_id(job_key)?;
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO job_items (job_id, payload, updated_at) VALUES (?1, ?2, ?3)",
            params![job_id, serde_json::to_string(record)?, now],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn load_items(&self, job_key: &str, fields: &RecordsConfig) -> StorageResult<Vec<WorkItem>> {
        let job_id = self.job_id(job_key)?;

        let items = self
            .rows(job_id)?
            .into_iter()
            .map(|(id, record)| WorkItem::from_row(id, record, fields))
            .filter(|item| !item.candidate_links(fields).is_empty())
            .collect();

        Ok(items)
    }

    fn bulk_update(
        &mut self,
        job_key: &str,
        items: &[WorkItem],
        fields: &RecordsConfig,
    ) -> StorageResult<usize> {
        let job_id = self.job_id(job_key)?;

        let existing: HashMap<Vec<String>, i64> = self
            .rows(job_id)?
            .into_iter()
            .map(|(id, record)| (conflict_key(&record, fields), id))
            .collect();

        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        let mut updated = 0;

        for item in items {
            let Some(id) = item.record_id else {
                continue;
            };

            let key = conflict_key(&item.record, fields);
            if existing.get(&key).is_some_and(|owner| *owner != id) {
                tracing::warn!("Skipping update of row {} due to duplicate key conflict", id);
                continue;
            }

            updated += tx.execute(
                "UPDATE job_items SET payload = ?1, updated_at = ?2 WHERE id = ?3 AND job_id = ?4",
                params![serde_json::to_string(&item.record)?, now, id, job_id],
            )?;
        }

        tx.commit()?;
        Ok(updated)
    }
}
