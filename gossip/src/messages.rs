//! The three gossip messages exchanged in one round.
//!
//! Framing and encoding belong to the transport; these are plain values that
//! derive serde so any codec can carry them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{digest::GossipDigest, endpoint::Endpoint, endpoint_state::EndpointState};

/// Round opener: a digest for every endpoint the initiator gossips about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Syn {
    pub cluster_id: String,
    pub partitioner: String,
    pub digests: Vec<GossipDigest>,
}

/// Receiver's answer: digests it wants full state for, and full states it
/// knows to be newer than what the initiator summarized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub digest_list: Vec<GossipDigest>,
    pub endpoint_state_map: BTreeMap<Endpoint, EndpointState>,
}

/// Initiator's final reply with the states the receiver asked for.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack2 {
    pub endpoint_state_map: BTreeMap<Endpoint, EndpointState>,
}

impl Ack {
    pub fn is_empty(&self) -> bool {
        self.digest_list.is_empty() && self.endpoint_state_map.is_empty()
    }
}
