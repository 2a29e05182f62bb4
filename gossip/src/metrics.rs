//! Gossip metrics.
//!
//! Counters are kept locally for snapshots and also emitted through the
//! `metrics` facade, so whatever recorder the host process installs sees them.

use std::sync::atomic::{AtomicU64, Ordering};

use metrics::{counter, gauge};

#[derive(Debug, Default)]
pub struct GossipMetrics {
    rounds_started: AtomicU64,
    rounds_completed: AtomicU64,
    rounds_timed_out: AtomicU64,
    rounds_failed: AtomicU64,
    states_applied: AtomicU64,
    stale_ignored: AtomicU64,
    malformed_rejected: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub rounds_started: u64,
    pub rounds_completed: u64,
    pub rounds_timed_out: u64,
    pub rounds_failed: u64,
    pub states_applied: u64,
    pub stale_ignored: u64,
    pub malformed_rejected: u64,
}

impl GossipMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_round_started(&self) {
        self.rounds_started.fetch_add(1, Ordering::Relaxed);
        counter!("gossip_rounds_total", "outcome" => "started").increment(1);
    }

    pub fn record_round_completed(&self) {
        self.rounds_completed.fetch_add(1, Ordering::Relaxed);
        counter!("gossip_rounds_total", "outcome" => "completed").increment(1);
    }

    pub fn record_round_timed_out(&self) {
        self.rounds_timed_out.fetch_add(1, Ordering::Relaxed);
        counter!("gossip_rounds_total", "outcome" => "timed_out").increment(1);
    }

    pub fn record_round_failed(&self) {
        self.rounds_failed.fetch_add(1, Ordering::Relaxed);
        counter!("gossip_rounds_total", "outcome" => "failed").increment(1);
    }

    pub fn record_state_applied(&self) {
        self.states_applied.fetch_add(1, Ordering::Relaxed);
        counter!("gossip_states_applied_total").increment(1);
    }

    pub fn record_stale_ignored(&self) {
        self.stale_ignored.fetch_add(1, Ordering::Relaxed);
        counter!("gossip_stale_states_total").increment(1);
    }

    pub fn record_malformed(&self) {
        self.malformed_rejected.fetch_add(1, Ordering::Relaxed);
        counter!("gossip_malformed_entries_total").increment(1);
    }

    pub fn set_membership(&self, live: usize, unreachable: usize) {
        gauge!("gossip_live_endpoints").set(live as f64);
        gauge!("gossip_unreachable_endpoints").set(unreachable as f64);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rounds_started: self.rounds_started.load(Ordering::Relaxed),
            rounds_completed: self.rounds_completed.load(Ordering::Relaxed),
            rounds_timed_out: self.rounds_timed_out.load(Ordering::Relaxed),
            rounds_failed: self.rounds_failed.load(Ordering::Relaxed),
            states_applied: self.states_applied.load(Ordering::Relaxed),
            stale_ignored: self.stale_ignored.load(Ordering::Relaxed),
            malformed_rejected: self.malformed_rejected.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let m = GossipMetrics::new();
        m.record_round_started();
        m.record_round_started();
        m.record_round_completed();
        m.record_round_timed_out();
        m.record_stale_ignored();
        m.record_malformed();
        m.set_membership(3, 1);

        let s = m.snapshot();
        assert_eq!(s.rounds_started, 2);
        assert_eq!(s.rounds_completed, 1);
        assert_eq!(s.rounds_timed_out, 1);
        assert_eq!(s.rounds_failed, 0);
        assert_eq!(s.stale_ignored, 1);
        assert_eq!(s.malformed_rejected, 1);
    }
}
