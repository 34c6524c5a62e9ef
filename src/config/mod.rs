//! Configuration module for Profile-Enrich
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use profile_enrich::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("enrich.toml")).unwrap();
//! println!("Worker concurrency: {}", config.worker.concurrency);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    BrokerConfig, Config, FetchConfig, FetchProfileConfig, ProxyConfig, QueueConfig,
    RecordsConfig, StoreConfig, WorkerConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_candidates, load_config, load_config_with_hash};
