//! Shared fixtures: a scripted browser and test configuration

use async_trait::async_trait;
use profile_enrich::browser::{BrowserError, BrowserLauncher, BrowserSession};
use profile_enrich::config::{
    BrokerConfig, Config, FetchConfig, ProxyConfig, QueueConfig, RecordsConfig, StoreConfig,
    WorkerConfig,
};
use profile_enrich::queue::RawRecord;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const FALLBACK: &str = "10.0.0.1:9050";

pub const PHONE_PAGE: &str = r#"<html><head><title>Acme | Facebook</title></head><body>
<h1>Acme</h1>
<div><div><img src="https://static.xx.fbcdn.net/rsrc.php/v3/yT/r/Dc7-7AgwkwS.png"></div><div><span>555-1111</span></div></div>
</body></html>"#;

pub const EMAIL_PAGE: &str = r#"<html><head><title>Acme | Facebook</title></head><body>
<div><div><i data-visualcompletion="css-img" style="background-position: 0px -155px"></i></div><div>hello@b.biz</div></div>
</body></html>"#;

pub const CHALLENGE_PAGE: &str =
    "<html><head><title>Just a moment...</title></head><body></body></html>";

/// Browser serving fixed pages by URL
///
/// Egresses marked as challenged always get the bot challenge instead.
#[derive(Default)]
pub struct FakeBrowser {
    pages: HashMap<String, String>,
    challenged: HashSet<String>,
    launches: Mutex<Vec<String>>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    pub fn challenge_on(mut self, egress: &str) -> Self {
        self.challenged.insert(egress.to_string());
        self
    }

    /// Egress of every launch so far, in order
    pub fn launches(&self) -> Vec<String> {
        self.launches.lock().unwrap().clone()
    }
}

#[async_trait]
impl BrowserLauncher for FakeBrowser {
    async fn launch(&self, egress: &str) -> Result<Box<dyn BrowserSession>, BrowserError> {
        self.launches.lock().unwrap().push(egress.to_string());
        Ok(Box::new(FakeSession {
            pages: self.pages.clone(),
            challenged: self.challenged.contains(egress),
            url: String::new(),
        }))
    }
}

struct FakeSession {
    pages: HashMap<String, String>,
    challenged: bool,
    url: String,
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.url = url.to_string();
        Ok(())
    }

    async fn wait_for_selector(&mut self, _selector: &str, _timeout: Duration) -> bool {
        self.challenged || self.pages.contains_key(&self.url)
    }

    async fn page_source(&mut self) -> Result<String, BrowserError> {
        if self.challenged {
            return Ok(CHALLENGE_PAGE.to_string());
        }
        self.pages
            .get(&self.url)
            .cloned()
            .ok_or_else(|| BrowserError::Session("no page".to_string()))
    }

    async fn current_location(&mut self) -> Result<String, BrowserError> {
        Ok(self.url.clone())
    }

    fn close(&mut self) {}
}

/// Configuration with fast polling and a fallback egress
pub fn test_config(idle_ticks: u32) -> Arc<Config> {
    Arc::new(Config {
        fetch: FetchConfig {
            fallback_egress: Some(FALLBACK.to_string()),
            settle_delay_ms: 0,
            attempt_deadline_ms: 1_000,
            ..FetchConfig::default()
        },
        proxy: ProxyConfig::default(),
        worker: WorkerConfig {
            concurrency: 3,
            required_fields: vec!["phone".to_string(), "email".to_string()],
        },
        records: RecordsConfig::default(),
        queue: QueueConfig {
            poll_interval_ms: 1,
            idle_ticks,
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

pub fn record(value: Value) -> RawRecord {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected an object"),
    }
}
