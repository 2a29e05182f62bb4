use std::fmt;

use serde::{Deserialize, Serialize};

use crate::version::VersionGenerator;

/// A node's incarnation and liveness pulse.
///
/// Ordering is lexicographic on `(generation, version)`: any version of a
/// newer generation dominates every version of an older one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HeartBeatState {
    pub generation: i32,
    pub version: i32,
}

impl HeartBeatState {
    pub fn new(generation: i32) -> Self {
        Self {
            generation,
            version: 0,
        }
    }

    pub fn with_version(generation: i32, version: i32) -> Self {
        Self {
            generation,
            version,
        }
    }

    /// Advance the pulse using the owner's version generator.
    pub fn update_heartbeat(&mut self, versions: &VersionGenerator) {
        self.version = versions.next();
    }

    /// Jump to a generation strictly newer than the current one.
    pub fn force_newer_generation(&mut self) {
        self.generation = self.generation.saturating_add(1);
        self.version = 0;
    }
}

impl fmt::Display for HeartBeatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{ generation = {}, version = {} }}",
            self.generation, self.version
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_dominates_version() {
        let old = HeartBeatState::with_version(1, 1_000);
        let restarted = HeartBeatState::with_version(2, 1);
        assert!(restarted > old);
        assert!(HeartBeatState::with_version(1, 2) > HeartBeatState::with_version(1, 1));
    }

    #[test]
    fn test_update_heartbeat_uses_generator() {
        let versions = VersionGenerator::new();
        versions.next();
        let mut hb = HeartBeatState::new(7);
        hb.update_heartbeat(&versions);
        assert_eq!(hb.version, 2);
        hb.update_heartbeat(&versions);
        assert_eq!(hb.version, 3);
        assert_eq!(hb.generation, 7);
    }

    #[test]
    fn test_force_newer_generation() {
        let mut hb = HeartBeatState::with_version(5, 40);
        hb.force_newer_generation();
        assert_eq!(hb, HeartBeatState::new(6));
        assert!(hb > HeartBeatState::with_version(5, 40));
    }
}
