use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Profile-Enrich
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub records: RecordsConfig,
    pub queue: QueueConfig,
    pub broker: BrokerConfig,
    pub store: StoreConfig,
}

/// Browser fetch behavior shared by every fetch profile
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct FetchConfig {
    /// Always-available egress used when the pool is empty or disqualified
    pub fallback_egress: Option<String>,

    /// Selector whose presence means the profile page has rendered
    pub page_selector: String,

    /// Selector for the lazily-loaded content region (best effort)
    pub content_selector: String,

    /// Substring of the current location that marks a login wall
    pub login_marker: String,

    /// Lowercased title fragment of the bot-challenge interstitial
    pub challenge_title: String,

    /// Bounded wait for the page selector (milliseconds)
    pub navigation_timeout_ms: u64,

    /// Bounded wait for the content selector (milliseconds)
    pub content_timeout_ms: u64,

    /// Pause before looking for the content region (milliseconds)
    pub settle_delay_ms: u64,

    /// Hard deadline for a whole attempt, browser launch included (milliseconds)
    pub attempt_deadline_ms: u64,

    pub standard: FetchProfileConfig,
    pub hardened: FetchProfileConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            fallback_egress: None,
            page_selector: "html#facebook".to_string(),
            content_selector: "div[class*='xieb3on']".to_string(),
            login_marker: "login".to_string(),
            challenge_title: "just a moment".to_string(),
            navigation_timeout_ms: 10_000,
            content_timeout_ms: 20_000,
            settle_delay_ms: 3_000,
            attempt_deadline_ms: 90_000,
            standard: FetchProfileConfig::standard(),
            hardened: FetchProfileConfig::hardened(),
        }
    }
}

impl FetchConfig {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn content_timeout(&self) -> Duration {
        Duration::from_millis(self.content_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn attempt_deadline(&self) -> Duration {
        Duration::from_millis(self.attempt_deadline_ms)
    }
}

/// Retry budget and pool policy for one fetch profile
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FetchProfileConfig {
    /// Total attempts per URL
    pub max_attempts: u32,

    /// Leading attempts allowed on pooled endpoints
    pub regular_attempts: u32,

    /// Counted failures after which an endpoint is banned
    pub ban_threshold: u32,

    /// Regular-tier failures after which only the fallback egress is used
    #[serde(default)]
    pub fallback_ceiling: Option<u32>,

    /// Whether to wait for the secondary content region
    #[serde(default)]
    pub wait_for_content: bool,
}

impl FetchProfileConfig {
    /// Cheap profile: five attempts, the last one on the fallback egress
    pub fn standard() -> Self {
        Self {
            max_attempts: 5,
            regular_attempts: 4,
            ban_threshold: 5,
            fallback_ceiling: None,
            wait_for_content: false,
        }
    }

    /// Higher-pressure profile with a global escalation ceiling
    pub fn hardened() -> Self {
        Self {
            max_attempts: 3,
            regular_attempts: 1,
            ban_threshold: 3,
            fallback_ceiling: Some(25),
            wait_for_content: true,
        }
    }
}

/// Candidate proxy supply and probing
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct ProxyConfig {
    /// Inline candidate endpoints (`host:port`)
    pub candidates: Vec<String>,

    /// File with one candidate endpoint per line
    pub candidates_file: Option<PathBuf>,

    /// Scheme used to reach pooled endpoints
    pub scheme: String,

    /// URL fetched through each candidate to check it is alive
    pub probe_url: String,

    /// Per-candidate probe timeout (milliseconds)
    pub probe_timeout_ms: u64,

    /// Probes in flight at once
    pub probe_concurrency: usize,

    /// Seed the pool without probing
    pub skip_probe: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            candidates: Vec::new(),
            candidates_file: None,
            scheme: "socks5".to_string(),
            probe_url: "http://ident.me".to_string(),
            probe_timeout_ms: 5_000,
            probe_concurrency: 50,
            skip_probe: false,
        }
    }
}

/// Worker pool behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct WorkerConfig {
    /// Maximum browser sessions per job, also the chunk size
    pub concurrency: usize,

    /// Fields that must all be non-empty for an item to be complete
    pub required_fields: Vec<String>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: 22,
            required_fields: ["logo", "address", "phone", "email", "title"]
                .iter()
                .map(|f| f.to_string())
                .collect(),
        }
    }
}

/// Field names of the raw records exchanged with the producer
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RecordsConfig {
    pub identity_field: String,
    pub legacy_identity_field: String,
    pub description_field: String,
    pub social_field: String,
    pub link_separator: String,

    /// Host fragment a social link must contain to be fetched
    pub source_host: String,
}

impl Default for RecordsConfig {
    fn default() -> Self {
        Self {
            identity_field: "web".to_string(),
            legacy_identity_field: "link".to_string(),
            description_field: "description".to_string(),
            social_field: "social".to_string(),
            link_separator: " | ".to_string(),
            source_host: "facebook.com".to_string(),
        }
    }
}

/// Durable list and polling behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct QueueConfig {
    /// Redis database holding the persisted per-job lists
    pub url: String,

    /// Redis database the producer fills (defaults to `url`)
    #[serde(default)]
    pub source_url: Option<String>,

    /// Redis database holding completion signals (defaults to `url`)
    #[serde(default)]
    pub signal_url: Option<String>,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Idle polls tolerated before the first batch
    #[serde(default = "default_idle_ticks")]
    pub idle_ticks: u32,

    /// Idle polls tolerated once a batch has been processed
    #[serde(default = "default_idle_ticks_after_batch")]
    pub idle_ticks_after_batch: u32,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
}

impl QueueConfig {
    /// Queue settings for `url` with every other value at its default
    pub fn for_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            source_url: None,
            signal_url: None,
            poll_interval_ms: default_poll_interval_ms(),
            idle_ticks: default_idle_ticks(),
            idle_ticks_after_batch: default_idle_ticks_after_batch(),
            retention_days: default_retention_days(),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(u64::from(self.retention_days) * 24 * 60 * 60)
    }
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_idle_ticks() -> u32 {
    300
}

fn default_idle_ticks_after_batch() -> u32 {
    1
}

fn default_retention_days() -> u32 {
    7
}

/// Message bus connecting the producer and this service
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BrokerConfig {
    pub url: String,

    #[serde(default = "default_inbound_prefix")]
    pub inbound_prefix: String,

    #[serde(default = "default_ack_prefix")]
    pub ack_prefix: String,

    /// Pause before publishing the acknowledgment (milliseconds)
    #[serde(default = "default_ack_delay_ms")]
    pub ack_delay_ms: u64,

    /// Blocking pop timeout (seconds)
    #[serde(default = "default_pop_timeout_secs")]
    pub pop_timeout_secs: f64,
}

fn default_inbound_prefix() -> String {
    "send_to_facebook".to_string()
}

fn default_ack_prefix() -> String {
    "ack_facebook".to_string()
}

fn default_ack_delay_ms() -> u64 {
    5_000
}

fn default_pop_timeout_secs() -> f64 {
    5.0
}

/// Relational store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct StoreConfig {
    /// Path to the SQLite database file
    pub database_path: String,
}
