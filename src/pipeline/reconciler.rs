//! Merges worker output into a job's persisted record list

use crate::config::RecordsConfig;
use crate::item::{migrate_legacy_field, overlay_non_blank, value_text, WorkItem};
use crate::queue::{JobQueue, QueueError};
use crate::url::normalize_identity;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Writes enriched items back over the persisted list
///
/// Stored order is preserved and only identities already present in the list
/// are touched. Non-blank fresh values overwrite; blank ones never do.
pub struct Reconciler {
    queue: Arc<dyn JobQueue>,
    fields: RecordsConfig,
    retention: Duration,
}

impl Reconciler {
    pub fn new(queue: Arc<dyn JobQueue>, fields: RecordsConfig, retention: Duration) -> Self {
        Self {
            queue,
            fields,
            retention,
        }
    }

    /// Saves fresh items into the persisted list of `job_id`
    ///
    /// # Returns
    ///
    /// The number of stored identities that received fresh values; 0 when the
    /// list could not be read or written
    pub async fn save_back(&self, job_id: &str, fresh: &[WorkItem]) -> usize {
        match self.try_save_back(job_id, fresh).await {
            Ok(updated) => updated,
            Err(e) => {
                tracing::error!("Failed to save results for job {}: {}", job_id, e);
                0
            }
        }
    }

    async fn try_save_back(&self, job_id: &str, fresh: &[WorkItem]) -> Result<usize, QueueError> {
        if fresh.is_empty() {
            return Ok(0);
        }

        let mut stored = self.queue.load(job_id).await?;

        let mut positions: HashMap<String, usize> = HashMap::new();
        for (position, record) in stored.iter_mut().enumerate() {
            migrate_legacy_field(record, &self.fields);
            let identity = record
                .get(&self.fields.identity_field)
                .map(|value| normalize_identity(&value_text(value)))
                .unwrap_or_default();
            positions.entry(identity).or_insert(position);
        }

        let mut updated = HashSet::new();
        for item in fresh {
            let Some(&position) = positions.get(&item.identity) else {
                tracing::debug!("Dropping result for unknown identity {}", item.identity);
                continue;
            };

            let mut values = item.record.clone();
            values.remove(&self.fields.identity_field);
            overlay_non_blank(&mut stored[position], &values);
            updated.insert(item.identity.as_str());
        }

        if stored.is_empty() {
            return Ok(0);
        }

        self.queue
            .replace_all_with_expiry(job_id, &stored, self.retention)
            .await?;

        tracing::info!(
            "Saved {} records to job {} ({} updated)",
            stored.len(),
            job_id,
            updated.len()
        );

        Ok(updated.len())
    }
}
