//! Headless Chrome implementation of the browser capability
//!
//! headless_chrome is blocking, so every call runs on the blocking pool. The
//! session keeps the `Browser` handle itself and only hands the tab to
//! blocking closures, so dropping the session kills the Chrome process even
//! while a call is still in flight.

use super::{BrowserError, BrowserLauncher, BrowserSession};
use crate::config::FetchConfig;
use async_trait::async_trait;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::sync::Arc;
use std::time::Duration;

/// Launches one headless Chrome process per session
#[derive(Debug, Clone)]
pub struct ChromeLauncher {
    /// Idle timeout handed to Chrome, also bounds a single blocking call
    idle_timeout: Duration,
}

impl ChromeLauncher {
    pub fn new(idle_timeout: Duration) -> Self {
        Self { idle_timeout }
    }

    /// Launcher whose Chrome outlives any single fetch attempt
    pub fn for_fetch(settings: &FetchConfig) -> Self {
        Self::new(settings.attempt_deadline())
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    async fn launch(&self, egress: &str) -> Result<Box<dyn BrowserSession>, BrowserError> {
        let egress = egress.to_string();
        let idle_timeout = self.idle_timeout;

        let (browser, tab) = tokio::task::spawn_blocking(move || {
            let options = LaunchOptions::default_builder()
                .headless(true)
                .sandbox(false)
                .proxy_server(Some(egress.as_str()))
                .idle_browser_timeout(idle_timeout)
                .build()
                .map_err(|e| BrowserError::Launch(e.to_string()))?;

            let browser = Browser::new(options).map_err(|e| BrowserError::Launch(e.to_string()))?;
            let tab = browser
                .new_tab()
                .map_err(|e| BrowserError::Launch(format!("failed to open tab: {}", e)))?;
            Ok::<_, BrowserError>((browser, tab))
        })
        .await
        .map_err(|e| BrowserError::Task(e.to_string()))??;

        Ok(Box::new(ChromeSession {
            browser: Some(browser),
            tab: Some(tab),
        }))
    }
}

/// A Chrome process with a single tab
pub struct ChromeSession {
    browser: Option<Browser>,
    tab: Option<Arc<Tab>>,
}

impl ChromeSession {
    fn tab(&self) -> Result<Arc<Tab>, BrowserError> {
        self.tab
            .clone()
            .ok_or_else(|| BrowserError::Session("session already closed".to_string()))
    }
}

async fn on_tab<T, F>(tab: Arc<Tab>, call: F) -> Result<T, BrowserError>
where
    T: Send + 'static,
    F: FnOnce(&Tab) -> Result<T, BrowserError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || call(&tab))
        .await
        .map_err(|e| BrowserError::Task(e.to_string()))?
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        let url = url.to_string();
        on_tab(self.tab()?, move |tab| {
            tab.navigate_to(&url)
                .map(|_| ())
                .map_err(|e| BrowserError::Navigation(e.to_string()))
        })
        .await
    }

    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> bool {
        let selector = selector.to_string();
        let tab = match self.tab() {
            Ok(tab) => tab,
            Err(_) => return false,
        };
        on_tab(tab, move |tab| {
            Ok(tab
                .wait_for_element_with_custom_timeout(&selector, timeout)
                .is_ok())
        })
        .await
        .unwrap_or(false)
    }

    async fn page_source(&mut self) -> Result<String, BrowserError> {
        on_tab(self.tab()?, |tab| {
            tab.get_content()
                .map_err(|e| BrowserError::Session(e.to_string()))
        })
        .await
    }

    async fn current_location(&mut self) -> Result<String, BrowserError> {
        on_tab(self.tab()?, |tab| Ok(tab.get_url())).await
    }

    fn close(&mut self) {
        self.tab = None;
        // dropping the last Browser handle kills the process
        self.browser = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_idle_timeout_follows_attempt_deadline() {
        let settings = FetchConfig {
            attempt_deadline_ms: 180_000,
            ..FetchConfig::default()
        };
        let launcher = ChromeLauncher::for_fetch(&settings);
        assert_eq!(launcher.idle_timeout, Duration::from_secs(180));
    }
}
