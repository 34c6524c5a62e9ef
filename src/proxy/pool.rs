//! Proxy pool with per-endpoint failure scoring
//!
//! This module handles:
//! - The FIFO supply of healthy and failing endpoints
//! - Counted failures with a permanent ban at the threshold
//! - Unconditional removal for endpoints caught behind a login wall
//! - The global regular-tier failure counter and the sticky fallback flag

use crate::config::FetchProfileConfig;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Snapshot of the pool counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Endpoints the pool was seeded with
    pub total: usize,

    /// Endpoints currently waiting in the supply
    pub active: usize,

    /// Endpoints permanently excluded
    pub banned: usize,

    /// Distinct endpoints with a non-zero failure count
    pub failed: usize,

    /// Regular-tier failures recorded so far
    pub regular_failures: u32,

    /// Failures after which only the fallback egress is used
    pub ceiling: Option<u32>,
}

impl fmt::Display for PoolStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "total={} active={} banned={} failed={} regular_failures={}",
            self.total, self.active, self.banned, self.failed, self.regular_failures
        )?;
        match self.ceiling {
            Some(ceiling) => write!(f, "/{}", ceiling),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Default)]
struct PoolState {
    supply: VecDeque<String>,
    failures: HashMap<String, u32>,
    banned: HashSet<String>,
    regular_failures: u32,
    fallback_engaged: bool,
    total: usize,
}

impl PoolState {
    fn enqueue(&mut self, endpoint: &str) {
        if !self.banned.contains(endpoint) && !self.supply.iter().any(|e| e == endpoint) {
            self.supply.push_back(endpoint.to_string());
        }
    }

    fn ban(&mut self, endpoint: &str) {
        self.supply.retain(|e| e != endpoint);
        self.banned.insert(endpoint.to_string());
    }
}

/// Tracks egress health and hands out endpoints in FIFO order
///
/// Every read-modify-write of the supply, the failure counts and the fallback
/// flag happens under one mutex, so a failure increment and the ban-or-requeue
/// decision that follows it are a single step.
#[derive(Debug)]
pub struct ProxyPool {
    state: Mutex<PoolState>,
    ban_threshold: u32,
    ceiling: Option<u32>,
}

impl ProxyPool {
    /// Creates a pool seeded with the given endpoints
    ///
    /// # Arguments
    ///
    /// * `endpoints` - Responsive candidate endpoints, duplicates are ignored
    /// * `ban_threshold` - Counted failures after which an endpoint is banned
    /// * `ceiling` - Regular-tier failures after which the fallback egress is used exclusively
    pub fn new(endpoints: Vec<String>, ban_threshold: u32, ceiling: Option<u32>) -> Self {
        let mut state = PoolState::default();
        for endpoint in &endpoints {
            state.enqueue(endpoint);
        }
        state.total = state.supply.len();

        Self {
            state: Mutex::new(state),
            ban_threshold: ban_threshold.max(1),
            ceiling,
        }
    }

    /// Creates a pool using the thresholds of a fetch profile
    pub fn for_profile(endpoints: Vec<String>, profile: &FetchProfileConfig) -> Self {
        Self::new(endpoints, profile.ban_threshold, profile.fallback_ceiling)
    }

    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Takes the endpoint at the head of the supply
    ///
    /// The endpoint is checked out until it is released, requeued or removed.
    pub fn acquire(&self) -> Option<String> {
        self.lock().supply.pop_front()
    }

    /// Returns a checked-out endpoint with the result of its attempt
    ///
    /// A failure increments the endpoint's count; at the ban threshold the
    /// endpoint is banned for good, otherwise it goes back to the supply. A
    /// success resets the count and requeues it. Banned endpoints stay banned.
    pub fn release(&self, endpoint: &str, failed: bool) {
        let mut state = self.lock();

        if state.banned.contains(endpoint) {
            return;
        }

        if failed {
            let count = {
                let count = state.failures.entry(endpoint.to_string()).or_insert(0);
                *count += 1;
                *count
            };

            if count >= self.ban_threshold {
                state.ban(endpoint);
                tracing::warn!(
                    "Banned proxy {} after {} failures ({} banned)",
                    endpoint,
                    count,
                    state.banned.len()
                );
                return;
            }

            tracing::debug!("Proxy {} failed ({}/{})", endpoint, count, self.ban_threshold);
        } else {
            state.failures.remove(endpoint);
        }

        state.enqueue(endpoint);
    }

    /// Puts a checked-out endpoint back without touching its failure count
    pub fn requeue(&self, endpoint: &str) {
        self.lock().enqueue(endpoint);
    }

    /// Bans an endpoint unconditionally
    pub fn remove(&self, endpoint: &str) {
        let mut state = self.lock();
        if state.banned.contains(endpoint) {
            return;
        }
        state.ban(endpoint);
        tracing::warn!(
            "Removed proxy {} after a login redirect ({} banned)",
            endpoint,
            state.banned.len()
        );
    }

    /// Counts one regular-tier failure and engages the fallback at the ceiling
    pub fn record_regular_tier_failure(&self) {
        let mut state = self.lock();
        state.regular_failures = state.regular_failures.saturating_add(1);

        if let Some(ceiling) = self.ceiling {
            if !state.fallback_engaged && state.regular_failures >= ceiling {
                state.fallback_engaged = true;
                tracing::warn!(
                    "{} regular-tier failures, switching to the fallback egress for the rest of the run",
                    state.regular_failures
                );
            }
        }
    }

    /// Whether every further fetch must go through the fallback egress
    pub fn should_use_only_fallback(&self) -> bool {
        self.lock().fallback_engaged
    }

    pub fn stats(&self) -> PoolStats {
        let state = self.lock();
        PoolStats {
            total: state.total,
            active: state.supply.len(),
            banned: state.banned.len(),
            failed: state.failures.values().filter(|count| **count > 0).count(),
            regular_failures: state.regular_failures,
            ceiling: self.ceiling,
        }
    }
}
