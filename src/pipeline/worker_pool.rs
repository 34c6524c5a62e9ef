//! Bounded-concurrency enrichment of a chunk of work items
//!
//! This module handles:
//! - Enriching one item from its candidate links until it is complete
//! - Fanning a chunk out over tasks bounded by a semaphore
//! - Guaranteeing one output per input, even when a task fails

use crate::config::RecordsConfig;
use crate::extract::Extractor;
use crate::fetch::FetchEngine;
use crate::item::WorkItem;
use crate::pipeline::Tracker;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Fetches and extracts a single item
pub struct Enricher {
    engine: Arc<FetchEngine>,
    extractor: Arc<dyn Extractor>,
    fields: RecordsConfig,
    required: Vec<String>,
}

impl Enricher {
    pub fn new(
        engine: Arc<FetchEngine>,
        extractor: Arc<dyn Extractor>,
        fields: RecordsConfig,
        required: Vec<String>,
    ) -> Self {
        Self {
            engine,
            extractor,
            fields,
            required,
        }
    }

    /// Enriches an item from its candidate links
    ///
    /// Links are tried in order and the running result is merged after each
    /// fetched page; the first complete result stops the walk.
    ///
    /// # Returns
    ///
    /// The merged item and whether any page content was fetched
    pub async fn enrich(&self, item: WorkItem) -> (WorkItem, bool) {
        if item.is_complete(&self.required) {
            return (item, false);
        }

        let links = item.candidate_links(&self.fields);
        let mut result = item;
        let mut fetched = false;

        for link in links {
            let content = self.engine.fetch(&link).await;
            if content.is_empty() {
                tracing::debug!("No content for {} ({})", link, result.identity);
                continue;
            }

            fetched = true;
            let extracted = self.extractor.extract(&content);
            result = result.merge_extracted(&extracted, &self.fields.description_field);

            if result.is_complete(&self.required) {
                break;
            }
        }

        (result, fetched)
    }
}

/// Processes chunks of items with at most `concurrency` in flight
pub struct WorkerPool {
    enricher: Arc<Enricher>,
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(enricher: Enricher, concurrency: usize) -> Self {
        Self {
            enricher: Arc::new(enricher),
            semaphore: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Enriches a batch of items
    ///
    /// Items enriched from at least one fetched page are recorded in the
    /// tracker. A task that fails or panics contributes its original item.
    ///
    /// # Returns
    ///
    /// One item per input, in completion order
    pub async fn process_batch(&self, items: Vec<WorkItem>, tracker: &Arc<Tracker>) -> Vec<WorkItem> {
        let mut originals = Vec::with_capacity(items.len());
        let mut tasks = JoinSet::new();

        for (index, item) in items.into_iter().enumerate() {
            originals.push(item.clone());

            let enricher = Arc::clone(&self.enricher);
            let semaphore = Arc::clone(&self.semaphore);
            let tracker = Arc::clone(tracker);

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let fallback = item.clone();

                // The inner task isolates panics raised while enriching.
                let inner = tokio::spawn(async move { enricher.enrich(item).await });
                match inner.await {
                    Ok((enriched, true)) => {
                        tracker.record(enriched.clone());
                        (index, enriched)
                    }
                    Ok((unchanged, false)) => (index, unchanged),
                    Err(e) => {
                        tracing::warn!("Worker for {} failed: {}", fallback.identity, e);
                        (index, fallback)
                    }
                }
            });
        }

        let mut results = Vec::with_capacity(originals.len());
        let mut returned = HashSet::new();

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, item)) => {
                    returned.insert(index);
                    results.push(item);
                }
                Err(e) => tracing::warn!("Worker task aborted: {}", e),
            }
        }

        for (index, original) in originals.into_iter().enumerate() {
            if !returned.contains(&index) {
                results.push(original);
            }
        }

        results
    }
}
