use scraper::{Html, Selector};
use std::fmt;

/// Result of a single fetch attempt
///
/// Only `Success` carries page content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The page rendered and is not a challenge
    Success(String),

    /// The page rendered but produced no markup
    NoContent,

    /// An anti-automation interstitial was served instead of the page
    BotChallenge,

    /// Navigation ended on a login wall
    LoginRedirect,

    /// The page-presence signal never appeared, or the attempt deadline passed
    Timeout,

    /// The browser could not be started on the chosen egress
    DriverInitFailure,

    /// Any other error raised while driving the browser
    DriverError(String),
}

impl fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchOutcome::Success(content) => write!(f, "success ({} bytes)", content.len()),
            FetchOutcome::NoContent => write!(f, "no content"),
            FetchOutcome::BotChallenge => write!(f, "bot challenge"),
            FetchOutcome::LoginRedirect => write!(f, "login redirect"),
            FetchOutcome::Timeout => write!(f, "timeout"),
            FetchOutcome::DriverInitFailure => write!(f, "driver init failure"),
            FetchOutcome::DriverError(e) => write!(f, "driver error: {}", e),
        }
    }
}

/// Classifies captured page source
pub fn classify_content(source: String, challenge_title: &str) -> FetchOutcome {
    if source.trim().is_empty() {
        FetchOutcome::NoContent
    } else if is_bot_challenge(&source, challenge_title) {
        FetchOutcome::BotChallenge
    } else {
        FetchOutcome::Success(source)
    }
}

/// Detects a challenge interstitial by its `<title>` text
pub fn is_bot_challenge(html: &str, challenge_title: &str) -> bool {
    let selector = match Selector::parse("title") {
        Ok(selector) => selector,
        Err(_) => return false,
    };

    let document = Html::parse_document(html);
    let marker = challenge_title.to_lowercase();

    document.select(&selector).any(|title| {
        title
            .text()
            .collect::<String>()
            .to_lowercase()
            .contains(&marker)
    })
}

/// Detects a redirect away from the requested page onto a login wall
pub fn is_login_redirect(requested: &str, location: &str, login_marker: &str) -> bool {
    let requested = requested.trim_end_matches('/');
    let current = location.trim_end_matches('/');
    current != requested && current.to_lowercase().contains(&login_marker.to_lowercase())
}
