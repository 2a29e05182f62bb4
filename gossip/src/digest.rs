//! Compact endpoint summaries used to compare two nodes' knowledge.

use std::{cmp::Ordering, fmt};

use serde::{Deserialize, Serialize};

use crate::{
    endpoint::Endpoint,
    endpoint_state::EndpointState,
    error::{GossipError, GossipResult},
};

/// `(endpoint, generation, max_version)` without any value payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GossipDigest {
    pub endpoint: Endpoint,
    pub generation: i32,
    pub max_version: i32,
}

impl GossipDigest {
    pub fn new(endpoint: Endpoint, generation: i32, max_version: i32) -> Self {
        Self {
            endpoint,
            generation,
            max_version,
        }
    }

    /// Summarize a known endpoint state.
    pub fn from_state(endpoint: Endpoint, state: &EndpointState) -> Self {
        Self::new(endpoint, state.generation(), state.max_version())
    }

    /// Compare freshness only: generation first, then max version.
    pub fn freshness_cmp(&self, other: &GossipDigest) -> Ordering {
        (self.generation, self.max_version).cmp(&(other.generation, other.max_version))
    }

    pub fn validate(&self) -> GossipResult<()> {
        if self.generation < 0 || self.max_version < 0 {
            return Err(GossipError::malformed(
                self.endpoint,
                format!(
                    "negative digest generation={} max_version={}",
                    self.generation, self.max_version
                ),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for GossipDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.endpoint, self.generation, self.max_version)
    }
}

/// Order digests stalest first so that, if a round is cut short, the peers
/// this node knows least about were asked for first. Ties keep their
/// original relative order.
pub fn sort_stalest_first(digests: &mut [GossipDigest]) {
    digests.sort_by(GossipDigest::freshness_cmp);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        application_state::ApplicationState, heartbeat::HeartBeatState,
        versioned_value::VersionedValue,
    };

    fn ep(last: u8) -> Endpoint {
        Endpoint::v4(10, 0, 0, last)
    }

    #[test]
    fn test_from_state_uses_max_version() {
        let state = EndpointState::with_states(
            HeartBeatState::with_version(4, 10),
            [(ApplicationState::Load, VersionedValue::new("1.0", 12))],
        );
        let digest = GossipDigest::from_state(ep(1), &state);
        assert_eq!(digest, GossipDigest::new(ep(1), 4, 12));
    }

    #[test]
    fn test_stalest_first_ordering() {
        let mut digests = vec![
            GossipDigest::new(ep(1), 2, 5),
            GossipDigest::new(ep(2), 1, 100),
            GossipDigest::new(ep(3), 2, 1),
        ];
        sort_stalest_first(&mut digests);
        let order: Vec<_> = digests
            .iter()
            .map(|d| (d.generation, d.max_version))
            .collect();
        assert_eq!(order, vec![(1, 100), (2, 1), (2, 5)]);
    }

    #[test]
    fn test_validate() {
        assert!(GossipDigest::new(ep(1), 1, 0).validate().is_ok());
        assert!(GossipDigest::new(ep(1), 1, -1).validate().is_err());
        assert!(GossipDigest::new(ep(1), -3, 2).validate().is_err());
    }
}
