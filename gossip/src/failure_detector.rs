//! Liveness policy.
//!
//! The gossiper only needs a yes/no answer per endpoint. The policy decides
//! how heartbeat activity translates into that answer.

use std::time::{Duration, Instant};

use dashmap::DashMap;

use crate::endpoint::Endpoint;

pub trait FailureDetector: Send + Sync {
    /// Record that the endpoint's heartbeat was seen to advance at `now`.
    fn report(&self, endpoint: Endpoint, now: Instant);

    /// Whether the endpoint should currently be considered alive.
    fn is_alive(&self, endpoint: Endpoint, now: Instant) -> bool;

    /// Forget everything about the endpoint.
    fn remove(&self, endpoint: Endpoint);
}

/// Alive while the heartbeat advanced within `timeout`.
#[derive(Debug)]
pub struct TimeoutFailureDetector {
    timeout: Duration,
    last_seen: DashMap<Endpoint, Instant>,
}

impl TimeoutFailureDetector {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_seen: DashMap::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn last_seen(&self, endpoint: Endpoint) -> Option<Instant> {
        self.last_seen.get(&endpoint).map(|entry| *entry.value())
    }
}

impl FailureDetector for TimeoutFailureDetector {
    fn report(&self, endpoint: Endpoint, now: Instant) {
        self.last_seen
            .entry(endpoint)
            .and_modify(|seen| {
                if now > *seen {
                    *seen = now;
                }
            })
            .or_insert(now);
    }

    fn is_alive(&self, endpoint: Endpoint, now: Instant) -> bool {
        self.last_seen
            .get(&endpoint)
            .is_some_and(|seen| now.saturating_duration_since(*seen) <= self.timeout)
    }

    fn remove(&self, endpoint: Endpoint) {
        self.last_seen.remove(&endpoint);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_endpoint_is_dead() {
        let fd = TimeoutFailureDetector::new(Duration::from_secs(5));
        assert!(!fd.is_alive(Endpoint::v4(10, 0, 0, 1), Instant::now()));
    }

    #[test]
    fn test_alive_until_timeout() {
        let fd = TimeoutFailureDetector::new(Duration::from_secs(5));
        let ep = Endpoint::v4(10, 0, 0, 1);
        let t0 = Instant::now();
        fd.report(ep, t0);
        assert!(fd.is_alive(ep, t0 + Duration::from_secs(5)));
        assert!(!fd.is_alive(ep, t0 + Duration::from_secs(6)));

        fd.report(ep, t0 + Duration::from_secs(6));
        assert!(fd.is_alive(ep, t0 + Duration::from_secs(10)));
    }

    #[test]
    fn test_report_never_moves_backwards() {
        let fd = TimeoutFailureDetector::new(Duration::from_secs(1));
        let ep = Endpoint::v4(10, 0, 0, 1);
        let t0 = Instant::now();
        fd.report(ep, t0 + Duration::from_secs(3));
        fd.report(ep, t0);
        assert_eq!(fd.last_seen(ep), Some(t0 + Duration::from_secs(3)));

        fd.remove(ep);
        assert!(fd.last_seen(ep).is_none());
    }
}
