//! Profile-Enrich: resilient social-profile enrichment
//!
//! This crate fills in missing fields of business records by fetching their
//! social-profile pages through a proxied headless browser, extracting the
//! missing values and reconciling them with previously stored state.

pub mod broker;
pub mod browser;
pub mod config;
pub mod extract;
pub mod fetch;
pub mod item;
pub mod pipeline;
pub mod proxy;
pub mod queue;
pub mod storage;
pub mod url;

use thiserror::Error;

/// Main error type for Profile-Enrich operations
#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] queue::QueueError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid CSS selector in config: {0}")]
    InvalidSelector(String),
}

/// Result type alias for Profile-Enrich operations
pub type Result<T> = std::result::Result<T, EnrichError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use item::WorkItem;
pub use pipeline::{JobKind, JobRunner, Tracker};
pub use proxy::ProxyPool;
pub use url::normalize_identity;
