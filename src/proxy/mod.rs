//! Egress proxy management
//!
//! Candidate endpoints are probed once at startup, and the responsive ones
//! seed a [`ProxyPool`] that scores them as fetches succeed or fail.

mod pool;
mod probe;

pub use pool::{PoolStats, ProxyPool};
pub use probe::{build_probe_client, probe_candidates, probe_endpoint};
