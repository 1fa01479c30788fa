//! Shared health state for the /health endpoint.
//! Updated by the /predict handler and the pipeline.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Shared health counters.
#[derive(Default)]
pub struct HealthState {
    /// /predict requests currently running.
    requests_in_flight: AtomicU64,
    /// Rows committed to storage since process start.
    rows_committed: AtomicU64,
    /// Requests that ended in an error.
    requests_failed: AtomicU64,
    /// Nanosecond timestamp of the last finished request (0 = none).
    last_request_at_ns: AtomicU64,
}

/// Marks a request as in flight until dropped.
pub struct RequestGuard<'a> {
    health: &'a HealthState,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin_request(&self) -> RequestGuard<'_> {
        self.requests_in_flight.fetch_add(1, Ordering::Relaxed);
        RequestGuard { health: self }
    }

    pub fn add_rows_committed(&self, n: u64) {
        self.rows_committed.fetch_add(n, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.requests_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn requests_in_flight(&self) -> u64 {
        self.requests_in_flight.load(Ordering::Relaxed)
    }

    pub fn rows_committed(&self) -> u64 {
        self.rows_committed.load(Ordering::Relaxed)
    }

    pub fn requests_failed(&self) -> u64 {
        self.requests_failed.load(Ordering::Relaxed)
    }

    pub fn last_request_at_ns(&self) -> u64 {
        self.last_request_at_ns.load(Ordering::Relaxed)
    }
}

impl Drop for RequestGuard<'_> {
    fn drop(&mut self) {
        self.health.requests_in_flight.fetch_sub(1, Ordering::Relaxed);
        self.health.last_request_at_ns.store(now_ns(), Ordering::Relaxed);
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_tracks_in_flight_requests() {
        let health = HealthState::new();
        {
            let _a = health.begin_request();
            let _b = health.begin_request();
            assert_eq!(health.requests_in_flight(), 2);
        }
        assert_eq!(health.requests_in_flight(), 0);
        assert!(health.last_request_at_ns() > 0);
    }

    #[test]
    fn counts_rows_and_failures() {
        let health = HealthState::new();
        health.add_rows_committed(1000);
        health.add_rows_committed(500);
        health.record_failure();
        assert_eq!(health.rows_committed(), 1500);
        assert_eq!(health.requests_failed(), 1);
    }
}
