//! Multi-tier retrying fetch loop
//!
//! This module handles:
//! - Choosing between a pooled endpoint and the fallback egress per attempt
//! - Driving one browser session per attempt under a hard deadline
//! - Classifying each attempt and feeding the result back into the pool

use crate::browser::{BrowserLauncher, SessionGuard};
use crate::config::{FetchConfig, FetchProfileConfig};
use crate::fetch::outcome::{classify_content, is_login_redirect, FetchOutcome};
use crate::proxy::ProxyPool;
use crate::url::endpoint_url;
use std::sync::Arc;

/// Egress chosen for one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
enum Egress {
    /// A pooled endpoint, returned to the pool after the attempt
    Pooled(String),

    /// The fallback egress, never tracked
    Fallback(String),
}

/// Fetches pages through the proxy pool with a bounded attempt budget
pub struct FetchEngine {
    pool: Arc<ProxyPool>,
    launcher: Arc<dyn BrowserLauncher>,
    settings: FetchConfig,
    profile: FetchProfileConfig,
    scheme: String,
}

impl FetchEngine {
    /// Creates a new fetch engine
    ///
    /// # Arguments
    ///
    /// * `pool` - Shared proxy pool
    /// * `launcher` - Browser capability
    /// * `settings` - Selectors, markers and timeouts
    /// * `profile` - Attempt budget for this engine
    /// * `scheme` - Scheme used to reach pooled endpoints
    pub fn new(
        pool: Arc<ProxyPool>,
        launcher: Arc<dyn BrowserLauncher>,
        settings: FetchConfig,
        profile: FetchProfileConfig,
        scheme: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            launcher,
            settings,
            profile,
            scheme: scheme.into(),
        }
    }

    /// Fetches `url`, returning its markup or an empty string once the budget is spent
    ///
    /// # Attempt Flow
    ///
    /// | Outcome | Pooled endpoint | Regular-tier counter |
    /// |---------|-----------------|----------------------|
    /// | Success | released healthy, stop | - |
    /// | NoContent | requeued as is | - |
    /// | LoginRedirect | removed | +1 |
    /// | BotChallenge, Timeout, driver errors | released failed | +1 |
    ///
    /// Attempts on the fallback egress never touch the pool.
    pub async fn fetch(&self, url: &str) -> String {
        for attempt in 0..self.profile.max_attempts {
            let egress = match self.select_egress(attempt) {
                Some(egress) => egress,
                None => {
                    tracing::debug!("Attempt {} for {}: no usable egress, skipping", attempt + 1, url);
                    continue;
                }
            };

            let address = match &egress {
                Egress::Pooled(endpoint) => endpoint_url(&self.scheme, endpoint),
                Egress::Fallback(address) => address.clone(),
            };

            let outcome =
                match tokio::time::timeout(self.settings.attempt_deadline(), self.attempt(url, &address))
                    .await
                {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        tracing::debug!("Attempt deadline passed for {} via {}", url, address);
                        FetchOutcome::Timeout
                    }
                };

            tracing::debug!(
                "Attempt {}/{} for {} via {}: {}",
                attempt + 1,
                self.profile.max_attempts,
                url,
                address,
                outcome
            );

            if let Egress::Pooled(endpoint) = &egress {
                self.settle(endpoint, &outcome);
            }

            if let FetchOutcome::Success(content) = outcome {
                return content;
            }
        }

        tracing::info!("No content for {} after {} attempts", url, self.profile.max_attempts);
        String::new()
    }

    fn select_egress(&self, attempt: u32) -> Option<Egress> {
        if attempt < self.profile.regular_attempts && !self.pool.should_use_only_fallback() {
            if let Some(endpoint) = self.pool.acquire() {
                return Some(Egress::Pooled(endpoint));
            }
        }

        self.settings.fallback_egress.clone().map(Egress::Fallback)
    }

    /// Feeds the outcome of an attempt on a pooled endpoint back into the pool
    fn settle(&self, endpoint: &str, outcome: &FetchOutcome) {
        match outcome {
            FetchOutcome::Success(_) => self.pool.release(endpoint, false),
            FetchOutcome::NoContent => self.pool.requeue(endpoint),
            FetchOutcome::LoginRedirect => {
                self.pool.remove(endpoint);
                self.pool.record_regular_tier_failure();
            }
            FetchOutcome::BotChallenge
            | FetchOutcome::Timeout
            | FetchOutcome::DriverInitFailure
            | FetchOutcome::DriverError(_) => {
                self.pool.release(endpoint, true);
                self.pool.record_regular_tier_failure();
            }
        }
    }

    /// Runs one browser session against `url`
    ///
    /// The session guard closes the browser on every return path and when
    /// the deadline cancels this future.
    async fn attempt(&self, url: &str, egress: &str) -> FetchOutcome {
        let session = match self.launcher.launch(egress).await {
            Ok(session) => session,
            Err(e) => {
                tracing::debug!("Browser launch via {} failed: {}", egress, e);
                return FetchOutcome::DriverInitFailure;
            }
        };
        let mut session = SessionGuard::new(session);

        if let Err(e) = session.navigate(url).await {
            return FetchOutcome::DriverError(e.to_string());
        }

        if !session
            .wait_for_selector(&self.settings.page_selector, self.settings.navigation_timeout())
            .await
        {
            return FetchOutcome::Timeout;
        }

        match session.current_location().await {
            Ok(location) if is_login_redirect(url, &location, &self.settings.login_marker) => {
                return FetchOutcome::LoginRedirect;
            }
            Ok(_) => {}
            Err(e) => return FetchOutcome::DriverError(e.to_string()),
        }

        if self.profile.wait_for_content {
            tokio::time::sleep(self.settings.settle_delay()).await;
            if !session
                .wait_for_selector(&self.settings.content_selector, self.settings.content_timeout())
                .await
            {
                tracing::debug!("Content region did not appear on {}", url);
            }
        }

        match session.page_source().await {
            Ok(source) => classify_content(source, &self.settings.challenge_title),
            Err(e) => FetchOutcome::DriverError(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::browser::{BrowserError, BrowserSession};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    const PAGE: &str = "<html id=\"facebook\"><head><title>Acme</title></head><body>ok</body></html>";
    const CHALLENGE: &str = "<html><head><title>Just a moment...</title></head></html>";

    #[derive(Clone)]
    enum Script {
        LaunchFails,
        Missing,
        Page { location: Option<String>, source: String },
        Hang,
    }

    struct ScriptedLauncher {
        scripts: Mutex<VecDeque<Script>>,
        egresses: Mutex<Vec<String>>,
    }

    impl ScriptedLauncher {
        fn new(scripts: Vec<Script>) -> Arc<Self> {
            Arc::new(Self {
                scripts: Mutex::new(scripts.into()),
                egresses: Mutex::new(Vec::new()),
            })
        }

        fn egresses(&self) -> Vec<String> {
            self.egresses.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BrowserLauncher for ScriptedLauncher {
        async fn launch(&self, egress: &str) -> Result<Box<dyn BrowserSession>, BrowserError> {
            self.egresses.lock().unwrap().push(egress.to_string());
            let script = self.scripts.lock().unwrap().pop_front().unwrap_or(Script::Missing);
            match script {
                Script::LaunchFails => Err(BrowserError::Launch("no chrome".to_string())),
                other => Ok(Box::new(ScriptedSession {
                    script: other,
                    url: String::new(),
                })),
            }
        }
    }

    struct ScriptedSession {
        script: Script,
        url: String,
    }

    #[async_trait]
    impl BrowserSession for ScriptedSession {
        async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
            if matches!(self.script, Script::Hang) {
                std::future::pending::<()>().await;
            }
            self.url = url.to_string();
            Ok(())
        }

        async fn wait_for_selector(&mut self, _selector: &str, _timeout: Duration) -> bool {
            matches!(self.script, Script::Page { .. })
        }

        async fn page_source(&mut self) -> Result<String, BrowserError> {
            match &self.script {
                Script::Page { source, .. } => Ok(source.clone()),
                _ => Err(BrowserError::Session("no page".to_string())),
            }
        }

        async fn current_location(&mut self) -> Result<String, BrowserError> {
            match &self.script {
                Script::Page {
                    location: Some(location),
                    ..
                } => Ok(location.clone()),
                _ => Ok(self.url.clone()),
            }
        }

        fn close(&mut self) {}
    }

    fn page(source: &str) -> Script {
        Script::Page {
            location: None,
            source: source.to_string(),
        }
    }

    fn settings(fallback: Option<&str>) -> FetchConfig {
        FetchConfig {
            fallback_egress: fallback.map(str::to_string),
            settle_delay_ms: 0,
            attempt_deadline_ms: 200,
            ..FetchConfig::default()
        }
    }

    fn engine(
        pool: Arc<ProxyPool>,
        launcher: Arc<ScriptedLauncher>,
        fallback: Option<&str>,
        profile: FetchProfileConfig,
    ) -> FetchEngine {
        FetchEngine::new(pool, launcher, settings(fallback), profile, "socks5")
    }

    fn pool(endpoints: &[&str], profile: &FetchProfileConfig) -> Arc<ProxyPool> {
        Arc::new(ProxyPool::for_profile(
            endpoints.iter().map(|e| e.to_string()).collect(),
            profile,
        ))
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let profile = FetchProfileConfig::standard();
        let pool = pool(&["a:1"], &profile);
        let launcher = ScriptedLauncher::new(vec![page(PAGE)]);
        let engine = engine(Arc::clone(&pool), Arc::clone(&launcher), None, profile);

        assert_eq!(engine.fetch("https://facebook.com/acme").await, PAGE);
        assert_eq!(launcher.egresses(), vec!["socks5://a:1"]);
        assert_eq!(pool.stats().active, 1);
    }

    #[tokio::test]
    async fn test_challenge_marks_endpoint_and_retries() {
        let profile = FetchProfileConfig::standard();
        let pool = pool(&["a:1", "b:1"], &profile);
        let launcher = ScriptedLauncher::new(vec![page(CHALLENGE), page(PAGE)]);
        let engine = engine(Arc::clone(&pool), Arc::clone(&launcher), None, profile);

        assert_eq!(engine.fetch("https://facebook.com/acme").await, PAGE);

        let stats = pool.stats();
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.regular_failures, 1);
        assert_eq!(launcher.egresses(), vec!["socks5://a:1", "socks5://b:1"]);
    }

    #[tokio::test]
    async fn test_login_redirect_removes_endpoint() {
        let profile = FetchProfileConfig::standard();
        let pool = pool(&["a:1"], &profile);
        let launcher = ScriptedLauncher::new(vec![Script::Page {
            location: Some("https://facebook.com/login/?next=acme".to_string()),
            source: PAGE.to_string(),
        }]);
        let engine = engine(Arc::clone(&pool), launcher, None, profile);

        assert_eq!(engine.fetch("https://facebook.com/acme").await, "");

        let stats = pool.stats();
        assert_eq!(stats.banned, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.regular_failures, 1);
    }

    #[tokio::test]
    async fn test_last_standard_attempt_uses_fallback() {
        let profile = FetchProfileConfig::standard();
        let pool = pool(&["a:1"], &profile);
        let launcher = ScriptedLauncher::new(vec![
            Script::Missing,
            Script::Missing,
            Script::Missing,
            Script::Missing,
            page(PAGE),
        ]);
        let engine = engine(
            Arc::clone(&pool),
            Arc::clone(&launcher),
            Some("http://residential:8000"),
            profile,
        );

        assert_eq!(engine.fetch("https://facebook.com/acme").await, PAGE);

        let egresses = launcher.egresses();
        assert_eq!(egresses.len(), 5);
        assert_eq!(egresses[4], "http://residential:8000");
        assert_eq!(pool.stats().regular_failures, 4);
    }

    #[tokio::test]
    async fn test_empty_pool_without_fallback_skips_attempts() {
        let profile = FetchProfileConfig::hardened();
        let pool = pool(&[], &profile);
        let launcher = ScriptedLauncher::new(vec![]);
        let engine = engine(Arc::clone(&pool), Arc::clone(&launcher), None, profile);

        assert_eq!(engine.fetch("https://facebook.com/acme").await, "");
        assert!(launcher.egresses().is_empty());
        assert_eq!(pool.stats().regular_failures, 0);
    }

    #[tokio::test]
    async fn test_fallback_failures_do_not_touch_pool() {
        let profile = FetchProfileConfig::hardened();
        let pool = pool(&[], &profile);
        let launcher = ScriptedLauncher::new(vec![Script::LaunchFails, Script::LaunchFails]);
        let engine = engine(
            Arc::clone(&pool),
            Arc::clone(&launcher),
            Some("http://residential:8000"),
            profile,
        );

        assert_eq!(engine.fetch("https://facebook.com/acme").await, "");
        assert_eq!(launcher.egresses().len(), 3);
        assert_eq!(pool.stats().regular_failures, 0);
    }

    #[tokio::test]
    async fn test_engaged_fallback_bypasses_pool() {
        let profile = FetchProfileConfig {
            fallback_ceiling: Some(1),
            ..FetchProfileConfig::hardened()
        };
        let pool = pool(&["a:1"], &profile);
        pool.record_regular_tier_failure();

        let launcher = ScriptedLauncher::new(vec![page(PAGE)]);
        let engine = engine(
            Arc::clone(&pool),
            Arc::clone(&launcher),
            Some("http://residential:8000"),
            profile,
        );

        assert_eq!(engine.fetch("https://facebook.com/acme").await, PAGE);
        assert_eq!(launcher.egresses(), vec!["http://residential:8000"]);
        assert_eq!(pool.stats().active, 1);
    }

    #[tokio::test]
    async fn test_hung_session_hits_deadline() {
        let profile = FetchProfileConfig {
            max_attempts: 2,
            regular_attempts: 2,
            ..FetchProfileConfig::standard()
        };
        let pool = pool(&["a:1"], &profile);
        let launcher = ScriptedLauncher::new(vec![Script::Hang, page(PAGE)]);
        let engine = engine(Arc::clone(&pool), launcher, None, profile);

        assert_eq!(engine.fetch("https://facebook.com/acme").await, PAGE);
        assert_eq!(pool.stats().regular_failures, 1);
    }

    #[tokio::test]
    async fn test_no_content_requeues_without_failure() {
        let profile = FetchProfileConfig {
            max_attempts: 1,
            regular_attempts: 1,
            ..FetchProfileConfig::standard()
        };
        let pool = pool(&["a:1"], &profile);
        let launcher = ScriptedLauncher::new(vec![page("")]);
        let engine = engine(Arc::clone(&pool), launcher, None, profile);

        assert_eq!(engine.fetch("https://facebook.com/acme").await, "");

        let stats = pool.stats();
        assert_eq!(stats.active, 1);
        assert_eq!(stats.failed, 0);
        assert_eq!(stats.regular_failures, 0);
    }
}
