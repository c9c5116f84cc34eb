//! Shared health state for the /health endpoint.
//! Updated by the upstream client on every call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Upstream call counters. Written by the provider, read by the API.
#[derive(Default)]
pub struct HealthState {
    pub upstream_requests: AtomicU64,
    pub upstream_failures: AtomicU64,
    /// Epoch seconds of the most recent failed upstream call (0 = none).
    pub last_failure_at: AtomicU64,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_upstream_requests(&self) {
        self.upstream_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_upstream_failure(&self) {
        self.upstream_failures.fetch_add(1, Ordering::Relaxed);
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        self.last_failure_at.store(now, Ordering::Relaxed);
    }

    pub fn upstream_requests(&self) -> u64 {
        self.upstream_requests.load(Ordering::Relaxed)
    }

    pub fn upstream_failures(&self) -> u64 {
        self.upstream_failures.load(Ordering::Relaxed)
    }

    pub fn last_failure_at(&self) -> Option<u64> {
        match self.last_failure_at.load(Ordering::Relaxed) {
            0 => None,
            ts => Some(ts),
        }
    }
}
