//! Per-category job execution
//!
//! This module handles:
//! - Building the fetch engine, extractor and worker pool for a category
//! - Running a queue-backed job through the drain loop
//! - Running a store-backed job as a single chunked pass

use crate::browser::BrowserLauncher;
use crate::config::Config;
use crate::extract::SelectorExtractor;
use crate::fetch::FetchEngine;
use crate::item::WorkItem;
use crate::pipeline::{
    DrainLoop, Enricher, JobKind, JobProfile, Reconciler, RecordSource, Tracker, WorkerPool,
};
use crate::proxy::ProxyPool;
use crate::queue::{JobQueue, RedisQueue};
use crate::storage::{open_store, RecordStore, StorageResult};
use crate::ConfigError;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared handle to a relational record store
pub type SharedStore = Arc<Mutex<dyn RecordStore + Send>>;

/// Runs jobs of one category
///
/// The proxy pool lives as long as the runner, so bans and fallback
/// engagement carry over from one job to the next.
pub struct JobRunner {
    kind: JobKind,
    profile: JobProfile,
    config: Arc<Config>,
    workers: Arc<WorkerPool>,
    pool: Arc<ProxyPool>,
    queue: Option<Arc<dyn JobQueue>>,
    store: Option<SharedStore>,
}

impl JobRunner {
    /// Builds a runner for `kind`
    ///
    /// # Arguments
    ///
    /// * `kind` - Job category
    /// * `config` - Loaded configuration
    /// * `launcher` - Browser capability the fetch engine drives
    /// * `endpoints` - Responsive proxy endpoints seeding the pool
    /// * `queue` - Durable list backend, required by queue-backed categories
    /// * `store` - Relational store, required by store-backed categories
    ///
    /// # Returns
    ///
    /// * `Ok(JobRunner)` - Ready to run jobs
    /// * `Err(ConfigError)` - The field table is invalid or a required backend is missing
    pub fn new(
        kind: JobKind,
        config: Arc<Config>,
        launcher: Arc<dyn BrowserLauncher>,
        endpoints: Vec<String>,
        queue: Option<Arc<dyn JobQueue>>,
        store: Option<SharedStore>,
    ) -> Result<Self, ConfigError> {
        let profile = kind.profile();

        match profile.source {
            RecordSource::Store if store.is_none() => {
                return Err(ConfigError::Validation(format!(
                    "{} jobs need a record store",
                    kind
                )));
            }
            RecordSource::Queue { .. } if queue.is_none() => {
                return Err(ConfigError::Validation(format!(
                    "{} jobs need a job queue",
                    kind
                )));
            }
            _ => {}
        }

        let settings = profile.fetch.settings(&config);
        let pool = Arc::new(ProxyPool::for_profile(endpoints, &settings));
        let engine = Arc::new(FetchEngine::new(
            Arc::clone(&pool),
            launcher,
            config.fetch.clone(),
            settings,
            config.proxy.scheme.clone(),
        ));

        let rules = profile.table.rules(&config.records.description_field)?;
        let enricher = Enricher::new(
            engine,
            Arc::new(SelectorExtractor::new(rules)),
            config.records.clone(),
            config.worker.required_fields.clone(),
        );
        let workers = Arc::new(WorkerPool::new(enricher, config.worker.concurrency));

        Ok(Self {
            kind,
            profile,
            config,
            workers,
            pool,
            queue,
            store,
        })
    }

    /// Opens the backend `kind` reads its records from and builds a runner
    ///
    /// Store-backed categories open the SQLite database named in the config;
    /// queue-backed categories connect to Redis.
    ///
    /// # Returns
    ///
    /// * `Ok(JobRunner)` - Backend reachable and runner built
    /// * `Err(EnrichError)` - The backend could not be opened
    pub async fn connect(
        kind: JobKind,
        config: Arc<Config>,
        launcher: Arc<dyn BrowserLauncher>,
        endpoints: Vec<String>,
    ) -> crate::Result<Self> {
        let (queue, store) = match kind.profile().source {
            RecordSource::Store => {
                let store = open_store(Path::new(&config.store.database_path))?;
                tracing::info!("Opened record store at {}", config.store.database_path);
                let store: SharedStore = Arc::new(Mutex::new(store));
                (None, Some(store))
            }
            RecordSource::Queue { .. } => {
                let queue: Arc<dyn JobQueue> = Arc::new(RedisQueue::connect(&config.queue).await?);
                tracing::info!("Connected to job lists at {}", config.queue.url);
                (Some(queue), None)
            }
        };

        Ok(Self::new(kind, config, launcher, endpoints, queue, store)?)
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn pool(&self) -> &Arc<ProxyPool> {
        &self.pool
    }

    /// Runs one job to completion
    ///
    /// Never fails: backend errors are logged and reduce the count.
    ///
    /// # Returns
    ///
    /// The number of updated records
    pub async fn run(&self, job_id: &str) -> u64 {
        tracing::info!("Starting {} job {}", self.kind, job_id);
        let tracker = Arc::new(Tracker::new());

        let updated = match (self.profile.source, &self.queue, &self.store) {
            (RecordSource::Queue { wait, clear_on_done }, Some(queue), _) => {
                let reconciler = Reconciler::new(
                    Arc::clone(queue),
                    self.config.records.clone(),
                    self.config.queue.retention(),
                );
                let drain = DrainLoop::new(
                    Arc::clone(queue),
                    Arc::clone(&self.workers),
                    Arc::new(reconciler),
                    self.config.records.clone(),
                    wait.patience(&self.config.queue),
                    self.config.queue.poll_interval(),
                    self.config.worker.concurrency,
                    clear_on_done,
                );
                drain.run(job_id, &tracker).await.updated
            }
            (RecordSource::Store, _, Some(store)) => self.run_store_pass(job_id, store, &tracker).await,
            _ => {
                tracing::error!("No backend for {} job {}", self.kind, job_id);
                0
            }
        };

        tracing::info!(
            "Finished {} job {}: {} items updated ({})",
            self.kind,
            job_id,
            updated,
            self.pool.stats()
        );
        updated
    }

    async fn run_store_pass(&self, job_id: &str, store: &SharedStore, tracker: &Arc<Tracker>) -> u64 {
        let loaded = lock(store).load_items(job_id, &self.config.records);
        let items = match loaded {
            Ok(items) => items,
            Err(e) => {
                tracing::error!("Failed to load items for job {}: {}", job_id, e);
                return 0;
            }
        };
        tracing::info!("Imported {} items for job {}", items.len(), job_id);

        let mut updated = 0u64;
        let chunk_size = self.config.worker.concurrency.max(1);
        let mut remaining = items.into_iter().peekable();

        while remaining.peek().is_some() {
            let chunk: Vec<WorkItem> = remaining.by_ref().take(chunk_size).collect();
            let results = self.workers.process_batch(chunk, tracker).await;

            match save_chunk(store, job_id, &results, &self.config) {
                Ok(saved) => {
                    tracing::info!("{} items updated in chunk", saved);
                    updated += saved as u64;
                }
                Err(e) => tracing::error!("Failed to save chunk for job {}: {}", job_id, e),
            }
        }

        tracker.reset();
        updated
    }
}

fn lock(store: &SharedStore) -> MutexGuard<'_, dyn RecordStore + Send + 'static> {
    store.lock().unwrap_or_else(PoisonError::into_inner)
}

fn save_chunk(
    store: &SharedStore,
    job_id: &str,
    results: &[WorkItem],
    config: &Config,
) -> StorageResult<usize> {
    lock(store).bulk_update(job_id, results, &config.records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BrokerConfig, QueueConfig, StoreConfig};
    use crate::config::{FetchConfig, ProxyConfig, RecordsConfig, WorkerConfig};
    use crate::pipeline::testing::{record, PageLauncher, PHONE_PAGE};
    use crate::queue::MemoryQueue;
    use crate::storage::SqliteStore;
    use serde_json::json;

    fn config() -> Arc<Config> {
        Arc::new(Config {
            fetch: FetchConfig {
                fallback_egress: Some("127.0.0.1:9050".to_string()),
                settle_delay_ms: 0,
                attempt_deadline_ms: 500,
                ..FetchConfig::default()
            },
            proxy: ProxyConfig::default(),
            worker: WorkerConfig {
                concurrency: 2,
                required_fields: vec!["phone".to_string()],
            },
            records: RecordsConfig::default(),
            queue: QueueConfig {
                poll_interval_ms: 1,
                idle_ticks: 5,
                ..QueueConfig::for_url("redis://127.0.0.1/0")
            },
            broker: BrokerConfig {
                url: "redis://127.0.0.1/1".to_string(),
                inbound_prefix: "send_to_facebook".to_string(),
                ack_prefix: "ack_facebook".to_string(),
                ack_delay_ms: 0,
                pop_timeout_secs: 1.0,
            },
            store: StoreConfig {
                database_path: ":memory:".to_string(),
            },
        })
    }

    #[test]
    fn test_missing_backend_is_rejected() {
        let launcher = PageLauncher::new(&[]);
        let result = JobRunner::new(JobKind::Business, config(), launcher, Vec::new(), None, None);
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[tokio::test]
    async fn test_connect_opens_configured_store() {
        let runner = JobRunner::connect(JobKind::Business, config(), PageLauncher::new(&[]), Vec::new())
            .await
            .unwrap();

        assert_eq!(runner.kind(), JobKind::Business);
        assert_eq!(runner.run("nothing-here").await, 0);
    }

    #[tokio::test]
    async fn test_business_job_updates_store() {
        let mut store = SqliteStore::new_in_memory().unwrap();
        store.create_job("oid-1").unwrap();
        store
            .insert_item(
                "oid-1",
                &record(json!({"title": "Acme", "phone": "", "social": "https://facebook.com/a"})),
            )
            .unwrap();
        store
            .insert_item("oid-1", &record(json!({"title": "Other", "phone": ""})))
            .unwrap();
        let store: SharedStore = Arc::new(Mutex::new(store));

        let launcher = PageLauncher::new(&[("https://facebook.com/a", PHONE_PAGE)]);
        let runner = JobRunner::new(
            JobKind::Business,
            config(),
            launcher,
            Vec::new(),
            None,
            Some(Arc::clone(&store)),
        )
        .unwrap();

        assert_eq!(runner.run("oid-1").await, 1);

        let items = lock(&store)
            .load_items("oid-1", &RecordsConfig::default())
            .unwrap();
        assert_eq!(items[0].text("phone"), "555-1111");
        assert_eq!(items[0].text("title"), "Acme");
    }

    #[tokio::test]
    async fn test_business_job_unknown_oid() {
        let store: SharedStore = Arc::new(Mutex::new(SqliteStore::new_in_memory().unwrap()));
        let runner = JobRunner::new(
            JobKind::Business,
            config(),
            PageLauncher::new(&[]),
            Vec::new(),
            None,
            Some(store),
        )
        .unwrap();

        assert_eq!(runner.run("missing").await, 0);
    }

    #[tokio::test]
    async fn test_web_job_drains_queue() {
        let queue = Arc::new(MemoryQueue::new());
        queue.enqueue(
            "J1",
            record(json!({"link": "http://a.biz", "phone": "", "social": "https://facebook.com/a"})),
        );

        let launcher = PageLauncher::new(&[("https://facebook.com/a", PHONE_PAGE)]);
        let runner = JobRunner::new(
            JobKind::Web,
            config(),
            launcher,
            Vec::new(),
            Some(queue.clone() as Arc<dyn JobQueue>),
            None,
        )
        .unwrap();

        assert_eq!(runner.run("J1").await, 1);
        assert_eq!(queue.stored("J1")[0]["phone"], "555-1111");
        assert_eq!(queue.stored("J1")[0]["web"], "http://a.biz");
    }
}
