//! Liveness probing of candidate proxy endpoints

use crate::config::ProxyConfig;
use crate::url::endpoint_url;
use reqwest::{Client, Proxy};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Builds a client that routes every request through the given endpoint
///
/// # Arguments
///
/// * `scheme` - Proxy scheme used when the endpoint carries none
/// * `endpoint` - Candidate endpoint (`host:port`)
/// * `timeout` - Whole-request timeout
pub fn build_probe_client(
    scheme: &str,
    endpoint: &str,
    timeout: Duration,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .proxy(Proxy::all(endpoint_url(scheme, endpoint))?)
        .timeout(timeout)
        .connect_timeout(timeout)
        .build()
}

/// Checks whether an endpoint answers a request for the probe URL
pub async fn probe_endpoint(config: &ProxyConfig, endpoint: &str) -> bool {
    let timeout = Duration::from_millis(config.probe_timeout_ms);
    let client = match build_probe_client(&config.scheme, endpoint, timeout) {
        Ok(client) => client,
        Err(e) => {
            tracing::debug!("Skipping proxy {}: {}", endpoint, e);
            return false;
        }
    };

    match client.get(&config.probe_url).send().await {
        Ok(response) if response.status().is_success() => true,
        Ok(response) => {
            tracing::debug!("Proxy {} answered {}", endpoint, response.status());
            false
        }
        Err(e) => {
            tracing::debug!("Proxy {} unreachable: {}", endpoint, e);
            false
        }
    }
}

/// Probes all candidates with bounded concurrency and keeps the responsive ones
///
/// The surviving endpoints keep the order in which they were supplied.
///
/// # Arguments
///
/// * `config` - Probe URL, timeout, scheme and concurrency
/// * `candidates` - Endpoints to check
///
/// # Returns
///
/// The endpoints that answered the probe successfully
pub async fn probe_candidates(config: &ProxyConfig, candidates: Vec<String>) -> Vec<String> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let semaphore = Arc::new(Semaphore::new(config.probe_concurrency.max(1)));
    let config = Arc::new(config.clone());
    let mut tasks = JoinSet::new();

    for (index, endpoint) in candidates.into_iter().enumerate() {
        let semaphore = Arc::clone(&semaphore);
        let config = Arc::clone(&config);
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            if probe_endpoint(&config, &endpoint).await {
                Some((index, endpoint))
            } else {
                None
            }
        });
    }

    let mut alive = Vec::new();
    let mut checked = 0usize;
    while let Some(joined) = tasks.join_next().await {
        checked += 1;
        match joined {
            Ok(Some(found)) => alive.push(found),
            Ok(None) => {}
            Err(e) => tracing::warn!("Probe task failed: {}", e),
        }
    }

    alive.sort_by_key(|(index, _)| *index);
    tracing::info!("{} of {} proxy candidates responded", alive.len(), checked);

    alive.into_iter().map(|(_, endpoint)| endpoint).collect()
}
