//! Enrichment pipeline
//!
//! This module handles:
//! - Job categories and the profile each one runs with
//! - Bounded-concurrency enrichment of work items
//! - Reconciliation of results with stored records
//! - Draining durable job lists until a job is over

mod drain;
mod reconciler;
mod runner;
mod tracker;
mod worker_pool;

#[cfg(test)]
pub(crate) mod testing;

pub use drain::{DrainLoop, DrainReport, Patience};
pub use reconciler::Reconciler;
pub use runner::{JobRunner, SharedStore};
pub use tracker::Tracker;
pub use worker_pool::{Enricher, WorkerPool};

use crate::config::{Config, FetchProfileConfig, QueueConfig};
use crate::extract::{business_table, web_table, FieldRule};
use crate::ConfigError;
use std::fmt;

/// Category of an enrichment job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobKind {
    Business,
    Web,
    Google,
}

/// Which fetch profile a job uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchTier {
    Standard,
    Hardened,
}

/// Which field table extracts pages for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldTable {
    Business,
    Web,
}

/// How a durable-list job decides it is over
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    UntilSignal,
    Adaptive,
}

/// Where a job's records come from and go back to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSource {
    /// Single pass over the relational store
    Store,

    /// Polling drain over the durable list
    Queue { wait: Wait, clear_on_done: bool },
}

/// Everything that differs between job categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobProfile {
    pub fetch: FetchTier,
    pub table: FieldTable,
    pub source: RecordSource,
}

const PROFILES: [(JobKind, JobProfile); 3] = [
    (
        JobKind::Business,
        JobProfile {
            fetch: FetchTier::Standard,
            table: FieldTable::Business,
            source: RecordSource::Store,
        },
    ),
    (
        JobKind::Web,
        JobProfile {
            fetch: FetchTier::Hardened,
            table: FieldTable::Web,
            source: RecordSource::Queue {
                wait: Wait::Adaptive,
                clear_on_done: false,
            },
        },
    ),
    (
        JobKind::Google,
        JobProfile {
            fetch: FetchTier::Standard,
            table: FieldTable::Business,
            source: RecordSource::Queue {
                wait: Wait::UntilSignal,
                clear_on_done: true,
            },
        },
    ),
];

impl JobKind {
    pub const ALL: [JobKind; 3] = [JobKind::Business, JobKind::Web, JobKind::Google];

    /// Looks up the profile of this category
    pub fn profile(self) -> JobProfile {
        PROFILES
            .iter()
            .find(|(kind, _)| *kind == self)
            .map(|(_, profile)| *profile)
            .unwrap_or(PROFILES[0].1)
    }

    /// One-letter code used in bus keys
    pub fn code(self) -> char {
        match self {
            JobKind::Business => 'b',
            JobKind::Web => 'w',
            JobKind::Google => 'g',
        }
    }

    /// Bus key requests for this category arrive on
    pub fn inbound_key(self, prefix: &str) -> String {
        format!("{}_{}_q", prefix, self.code())
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobKind::Business => "business",
            JobKind::Web => "web",
            JobKind::Google => "google",
        };
        write!(f, "{}", name)
    }
}

impl FetchTier {
    pub fn settings(self, config: &Config) -> FetchProfileConfig {
        match self {
            FetchTier::Standard => config.fetch.standard.clone(),
            FetchTier::Hardened => config.fetch.hardened.clone(),
        }
    }
}

impl FieldTable {
    pub fn rules(self, description_field: &str) -> Result<Vec<FieldRule>, ConfigError> {
        match self {
            FieldTable::Business => business_table(description_field),
            FieldTable::Web => web_table(description_field),
        }
    }
}

impl Wait {
    pub fn patience(self, queue: &QueueConfig) -> Patience {
        match self {
            Wait::UntilSignal => Patience::UntilSignal,
            Wait::Adaptive => Patience::Adaptive {
                idle_ticks: queue.idle_ticks,
                idle_ticks_after_batch: queue.idle_ticks_after_batch,
            },
        }
    }
}
