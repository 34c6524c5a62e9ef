//! Browser client capability
//!
//! This module handles:
//! - The launcher/session traits the fetch engine drives
//! - Scoped sessions that are always closed, including on cancellation
//! - The headless Chrome implementation

mod chrome;

pub use chrome::ChromeLauncher;

use async_trait::async_trait;
use std::ops::{Deref, DerefMut};
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a browser client
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("Failed to launch browser: {0}")]
    Launch(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Browser session error: {0}")]
    Session(String),

    #[error("Browser task failed: {0}")]
    Task(String),
}

/// Starts browser sessions bound to an egress
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    /// Launches a new session whose traffic goes through `egress`
    async fn launch(&self, egress: &str) -> Result<Box<dyn BrowserSession>, BrowserError>;
}

/// One live browser session
#[async_trait]
pub trait BrowserSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    /// Waits up to `timeout` for `selector` to appear, returning whether it did
    async fn wait_for_selector(&mut self, selector: &str, timeout: Duration) -> bool;

    async fn page_source(&mut self) -> Result<String, BrowserError>;

    async fn current_location(&mut self) -> Result<String, BrowserError>;

    /// Releases the session; must be safe to call more than once
    fn close(&mut self);
}

/// Owns a session and closes it when dropped
pub struct SessionGuard {
    session: Box<dyn BrowserSession>,
}

impl SessionGuard {
    pub fn new(session: Box<dyn BrowserSession>) -> Self {
        Self { session }
    }
}

impl Deref for SessionGuard {
    type Target = dyn BrowserSession;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session.as_mut()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.close();
    }
}
