//! Fakes shared by pipeline tests

use crate::browser::{BrowserError, BrowserLauncher, BrowserSession};
use crate::config::{FetchConfig, FetchProfileConfig, RecordsConfig};
use crate::extract::{web_table, Extractor, SelectorExtractor};
use crate::fetch::FetchEngine;
use crate::pipeline::{Enricher, WorkerPool};
use crate::proxy::ProxyPool;
use crate::queue::RawRecord;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub(crate) const PHONE_PAGE: &str = r#"<html><head><title>Acme | Facebook</title></head><body>
<h1>Acme</h1>
<div><div><img src="https://static.xx.fbcdn.net/rsrc.php/v3/yT/r/Dc7-7AgwkwS.png"></div><div><span>555-1111</span></div></div>
</body></html>"#;

/// Serves fixed pages by URL; unknown URLs never render
pub(crate) struct PageLauncher {
    pages: Arc<HashMap<String, String>>,
    launches: AtomicUsize,
}

impl PageLauncher {
    pub(crate) fn new(pages: &[(&str, &str)]) -> Arc<Self> {
        Arc::new(Self {
            pages: Arc::new(
                pages
                    .iter()
                    .map(|(url, html)| (url.to_string(), html.to_string()))
                    .collect(),
            ),
            launches: AtomicUsize::new(0),
        })
    }

    pub(crate) fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserLauncher for PageLauncher {
    async fn launch(&self, _egress: &str) -> Result<Box<dyn BrowserSession>, BrowserError> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(PageSession {
            pages: Arc::clone(&self.pages),
            url: String::new(),
        }))
    }
}

struct PageSession {
    pages: Arc<HashMap<String, String>>,
    url: String,
}

#[async_trait]
impl BrowserSession for PageSession {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.url = url.to_string();
        Ok(())
    }

    async fn wait_for_selector(&mut self, _selector: &str, _timeout: Duration) -> bool {
        self.pages.contains_key(&self.url)
    }

    async fn page_source(&mut self) -> Result<String, BrowserError> {
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

/// Extractor that panics on every page
pub(crate) struct PanickingExtractor;

impl Extractor for PanickingExtractor {
    fn extract(&self, _html: &str) -> Map<String, Value> {
        panic!("extractor blew up")
    }
}

/// Engine with an empty pool, so every attempt goes to the fallback egress
pub(crate) fn fallback_engine(launcher: Arc<PageLauncher>) -> Arc<FetchEngine> {
    let profile = FetchProfileConfig::standard();
    let settings = FetchConfig {
        fallback_egress: Some("127.0.0.1:9050".to_string()),
        settle_delay_ms: 0,
        attempt_deadline_ms: 500,
        ..FetchConfig::default()
    };
    let pool = Arc::new(ProxyPool::for_profile(Vec::new(), &profile));
    Arc::new(FetchEngine::new(pool, launcher, settings, profile, "socks5"))
}

pub(crate) fn workers(launcher: Arc<PageLauncher>, extractor: Arc<dyn Extractor>) -> WorkerPool {
    let enricher = Enricher::new(
        fallback_engine(launcher),
        extractor,
        RecordsConfig::default(),
        vec!["phone".to_string()],
    );
    WorkerPool::new(enricher, 4)
}

pub(crate) fn web_extractor() -> Arc<dyn Extractor> {
    Arc::new(SelectorExtractor::new(web_table("description").unwrap()))
}

pub(crate) fn record(value: Value) -> RawRecord {
    match value {
        Value::Object(map) => map,
        _ => panic!("expected an object"),
    }
}
