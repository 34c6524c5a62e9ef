//! Polling drain loop over a job's durable list
//!
//! This module handles:
//! - Polling the list at a fixed interval
//! - Deciding when a job is over (producer signal or idle patience)
//! - Chunked processing and per-chunk reconciliation
//! - Finalizing the job: deferred writes, tracker reset, optional cleanup

use crate::config::RecordsConfig;
use crate::item::WorkItem;
use crate::pipeline::{Reconciler, Tracker, WorkerPool};
use crate::queue::{CompletionState, JobQueue};
use std::sync::Arc;
use std::time::Duration;

/// When the loop stops waiting for more items
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Patience {
    /// Poll until the producer signals completion; items seen in the final
    /// poll are still processed
    UntilSignal,

    /// Give up after a number of consecutive empty polls, with a shorter
    /// allowance once the first batch arrived
    Adaptive {
        idle_ticks: u32,
        idle_ticks_after_batch: u32,
    },
}

/// Summary of a finished drain
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Identities updated by per-chunk reconciliation
    pub updated: u64,

    /// Non-empty polls processed
    pub batches: usize,

    /// Empty polls across the whole run
    pub idle_ticks: u32,
}

/// Drains the list of one job
pub struct DrainLoop {
    queue: Arc<dyn JobQueue>,
    workers: Arc<WorkerPool>,
    reconciler: Arc<Reconciler>,
    fields: RecordsConfig,
    patience: Patience,
    poll_interval: Duration,
    chunk_size: usize,
    clear_on_done: bool,
}

impl DrainLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<dyn JobQueue>,
        workers: Arc<WorkerPool>,
        reconciler: Arc<Reconciler>,
        fields: RecordsConfig,
        patience: Patience,
        poll_interval: Duration,
        chunk_size: usize,
        clear_on_done: bool,
    ) -> Self {
        Self {
            queue,
            workers,
            reconciler,
            fields,
            patience,
            poll_interval,
            chunk_size: chunk_size.max(1),
            clear_on_done,
        }
    }

    /// Runs the loop to completion
    ///
    /// # Arguments
    ///
    /// * `job_id` - Key of the job's list
    /// * `tracker` - Per-job context; reset before returning
    pub async fn run(&self, job_id: &str, tracker: &Arc<Tracker>) -> DrainReport {
        let mut report = DrainReport::default();
        let mut idle = 0u32;

        loop {
            let complete = match self.patience {
                Patience::UntilSignal => self.is_complete(job_id).await,
                Patience::Adaptive { .. } => false,
            };

            let items = self.pull_unseen(job_id, tracker).await;

            if items.is_empty() {
                report.idle_ticks += 1;
                match self.patience {
                    Patience::UntilSignal if complete => break,
                    Patience::UntilSignal => {}
                    Patience::Adaptive {
                        idle_ticks,
                        idle_ticks_after_batch,
                    } => {
                        idle += 1;
                        let allowance = if report.batches == 0 {
                            idle_ticks
                        } else {
                            idle_ticks_after_batch
                        };
                        if idle >= allowance {
                            tracing::info!(
                                "No new items for job {} after {} polls, finishing",
                                job_id,
                                idle
                            );
                            break;
                        }
                    }
                }
                tokio::time::sleep(self.poll_interval).await;
                continue;
            }

            idle = 0;
            report.batches += 1;
            tracing::info!("Imported {} items for job {}", items.len(), job_id);
            report.updated += self.drain(job_id, items, tracker).await;

            if complete {
                break;
            }
        }

        self.finish(job_id, tracker).await;

        tracing::info!(
            "Job {} done: {} items updated in {} batches",
            job_id,
            report.updated,
            report.batches
        );
        report
    }

    async fn is_complete(&self, job_id: &str) -> bool {
        match self.queue.completion(job_id).await {
            Ok(state) => state == CompletionState::Complete,
            Err(e) => {
                tracing::warn!("Failed to read completion signal for {}: {}", job_id, e);
                false
            }
        }
    }

    /// Pulls the list and keeps identities not handled yet in this job
    async fn pull_unseen(&self, job_id: &str, tracker: &Tracker) -> Vec<WorkItem> {
        let records = match self.queue.pull(job_id).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("Failed to pull items for {}: {}", job_id, e);
                return Vec::new();
            }
        };

        records
            .into_iter()
            .filter_map(|record| WorkItem::from_raw(record, &self.fields))
            .filter(|item| !tracker.seen(&item.identity))
            .collect()
    }

    async fn drain(&self, job_id: &str, items: Vec<WorkItem>, tracker: &Arc<Tracker>) -> u64 {
        let mut updated = 0u64;
        let mut remaining = items.into_iter().peekable();

        while remaining.peek().is_some() {
            let chunk: Vec<WorkItem> = remaining.by_ref().take(self.chunk_size).collect();
            let results = self.workers.process_batch(chunk, tracker).await;
            let saved = self.reconciler.save_back(job_id, &results).await;
            tracing::info!("{} items updated in chunk", saved);
            updated += saved as u64;
        }

        updated
    }

    async fn finish(&self, job_id: &str, tracker: &Tracker) {
        let pending = tracker.drain_pending();
        if pending.is_empty() {
            tracing::debug!("No deferred results for job {}", job_id);
        } else {
            let saved = self.reconciler.save_back(job_id, &pending).await;
            tracing::info!("Final write for job {}: {} items", job_id, saved);
        }

        tracker.reset();

        if self.clear_on_done {
            if let Err(e) = self.queue.delete(job_id).await {
                tracing::error!("Failed to clean up list {}: {}", job_id, e);
            }
        }
    }
}
