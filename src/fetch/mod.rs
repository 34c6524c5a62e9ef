//! Browser-driven page fetching
//!
//! This module contains the resilient fetch loop, including:
//! - Proxy tier selection per attempt
//! - Attempt outcome classification
//! - Feedback into the proxy pool

mod engine;
mod outcome;

pub use engine::FetchEngine;
pub use outcome::{classify_content, is_bot_challenge, is_login_redirect, FetchOutcome};
