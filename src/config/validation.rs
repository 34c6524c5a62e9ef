use crate::config::types::{
    BrokerConfig, Config, FetchConfig, FetchProfileConfig, ProxyConfig, QueueConfig,
    RecordsConfig, StoreConfig, WorkerConfig,
};
use crate::ConfigError;
use url::Url;

const PROXY_SCHEMES: &[&str] = &["socks5", "socks5h", "http", "https"];

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_fetch_config(&config.fetch)?;
    validate_proxy_config(&config.proxy)?;
    validate_worker_config(&config.worker)?;
    validate_records_config(&config.records)?;
    validate_queue_config(&config.queue)?;
    validate_broker_config(&config.broker)?;
    validate_store_config(&config.store)?;
    Ok(())
}

/// Validates browser fetch settings and both fetch profiles
fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if let Some(egress) = &config.fallback_egress {
        Url::parse(egress).map_err(|e| {
            ConfigError::InvalidUrl(format!("Invalid fallback-egress '{}': {}", egress, e))
        })?;
    }

    validate_selector(&config.page_selector)?;
    validate_selector(&config.content_selector)?;

    if config.login_marker.trim().is_empty() {
        return Err(ConfigError::Validation(
            "login-marker cannot be empty".to_string(),
        ));
    }

    if config.challenge_title.trim().is_empty() {
        return Err(ConfigError::Validation(
            "challenge-title cannot be empty".to_string(),
        ));
    }

    if config.navigation_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "navigation-timeout-ms must be > 0".to_string(),
        ));
    }

    // The deadline has to leave room for both bounded waits
    let waits = config.navigation_timeout_ms + config.content_timeout_ms + config.settle_delay_ms;
    if config.attempt_deadline_ms < waits {
        return Err(ConfigError::Validation(format!(
            "attempt-deadline-ms ({}) must cover navigation, settle and content waits ({})",
            config.attempt_deadline_ms, waits
        )));
    }

    validate_profile("standard", &config.standard)?;
    validate_profile("hardened", &config.hardened)?;
    Ok(())
}

fn validate_profile(name: &str, profile: &FetchProfileConfig) -> Result<(), ConfigError> {
    if profile.max_attempts < 1 {
        return Err(ConfigError::Validation(format!(
            "fetch.{}.max-attempts must be >= 1, got {}",
            name, profile.max_attempts
        )));
    }

    if profile.regular_attempts > profile.max_attempts {
        return Err(ConfigError::Validation(format!(
            "fetch.{}.regular-attempts ({}) cannot exceed max-attempts ({})",
            name, profile.regular_attempts, profile.max_attempts
        )));
    }

    if profile.ban_threshold < 1 {
        return Err(ConfigError::Validation(format!(
            "fetch.{}.ban-threshold must be >= 1",
            name
        )));
    }

    if profile.fallback_ceiling == Some(0) {
        return Err(ConfigError::Validation(format!(
            "fetch.{}.fallback-ceiling must be >= 1 when set",
            name
        )));
    }

    Ok(())
}

fn validate_selector(selector: &str) -> Result<(), ConfigError> {
    scraper::Selector::parse(selector)
        .map(|_| ())
        .map_err(|e| ConfigError::InvalidSelector(format!("'{}': {:?}", selector, e)))
}

/// Validates proxy supply and probe settings
fn validate_proxy_config(config: &ProxyConfig) -> Result<(), ConfigError> {
    if !PROXY_SCHEMES.contains(&config.scheme.as_str()) {
        return Err(ConfigError::Validation(format!(
            "proxy.scheme must be one of {:?}, got '{}'",
            PROXY_SCHEMES, config.scheme
        )));
    }

    Url::parse(&config.probe_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid probe-url: {}", e)))?;

    if config.probe_concurrency < 1 {
        return Err(ConfigError::Validation(
            "probe-concurrency must be >= 1".to_string(),
        ));
    }

    if config.probe_timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "probe-timeout-ms must be > 0".to_string(),
        ));
    }

    Ok(())
}

/// Validates worker pool settings
fn validate_worker_config(config: &WorkerConfig) -> Result<(), ConfigError> {
    if config.concurrency < 1 || config.concurrency > 256 {
        return Err(ConfigError::Validation(format!(
            "worker.concurrency must be between 1 and 256, got {}",
            config.concurrency
        )));
    }

    if config.required_fields.is_empty() {
        return Err(ConfigError::Validation(
            "worker.required-fields cannot be empty".to_string(),
        ));
    }

    if config.required_fields.iter().any(|f| f.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "worker.required-fields cannot contain blank names".to_string(),
        ));
    }

    Ok(())
}

fn validate_records_config(config: &RecordsConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("identity-field", &config.identity_field),
        ("legacy-identity-field", &config.legacy_identity_field),
        ("description-field", &config.description_field),
        ("social-field", &config.social_field),
        ("link-separator", &config.link_separator),
        ("source-host", &config.source_host),
    ] {
        if value.is_empty() {
            return Err(ConfigError::Validation(format!(
                "records.{} cannot be empty",
                name
            )));
        }
    }

    if config.identity_field == config.legacy_identity_field {
        return Err(ConfigError::Validation(
            "records.legacy-identity-field must differ from identity-field".to_string(),
        ));
    }

    Ok(())
}

/// Validates durable list settings
fn validate_queue_config(config: &QueueConfig) -> Result<(), ConfigError> {
    validate_redis_url("queue.url", &config.url)?;
    if let Some(url) = &config.source_url {
        validate_redis_url("queue.source-url", url)?;
    }
    if let Some(url) = &config.signal_url {
        validate_redis_url("queue.signal-url", url)?;
    }

    if config.poll_interval_ms == 0 {
        return Err(ConfigError::Validation(
            "queue.poll-interval-ms must be > 0".to_string(),
        ));
    }

    if config.idle_ticks < 1 || config.idle_ticks_after_batch < 1 {
        return Err(ConfigError::Validation(
            "queue idle tick ceilings must be >= 1".to_string(),
        ));
    }

    if config.retention_days < 1 {
        return Err(ConfigError::Validation(
            "queue.retention-days must be >= 1".to_string(),
        ));
    }

    Ok(())
}

fn validate_broker_config(config: &BrokerConfig) -> Result<(), ConfigError> {
    validate_redis_url("broker.url", &config.url)?;

    if config.inbound_prefix.is_empty() || config.ack_prefix.is_empty() {
        return Err(ConfigError::Validation(
            "broker key prefixes cannot be empty".to_string(),
        ));
    }

    if config.pop_timeout_secs.is_nan() || config.pop_timeout_secs <= 0.0 {
        return Err(ConfigError::Validation(
            "broker.pop-timeout-secs must be > 0".to_string(),
        ));
    }

    Ok(())
}

fn validate_store_config(config: &StoreConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "store.database-path cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_redis_url(name: &str, value: &str) -> Result<(), ConfigError> {
    let url = Url::parse(value)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid {} '{}': {}", name, value, e)))?;

    if !matches!(url.scheme(), "redis" | "rediss" | "redis+unix" | "unix") {
        return Err(ConfigError::Validation(format!(
            "{} must use a redis scheme, got '{}'",
            name,
            url.scheme()
        )));
    }

    Ok(())
}
