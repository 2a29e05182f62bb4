//! The local view of the cluster.
//!
//! One table per gossiper, mutated only by the gossiper. Everyone else gets
//! clones out of it.

use std::collections::{btree_map, BTreeMap};

use crate::{
    application_state::ApplicationState, digest::GossipDigest, endpoint::Endpoint,
    endpoint_state::EndpointState, versioned_value::VersionedValue,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EndpointStateTable {
    entries: BTreeMap<Endpoint, EndpointState>,
}

impl EndpointStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, endpoint: &Endpoint) -> Option<&EndpointState> {
        self.entries.get(endpoint)
    }

    pub(crate) fn get_mut(&mut self, endpoint: &Endpoint) -> Option<&mut EndpointState> {
        self.entries.get_mut(endpoint)
    }

    pub fn get_application_state(
        &self,
        endpoint: &Endpoint,
        key: ApplicationState,
    ) -> Option<&VersionedValue> {
        self.entries
            .get(endpoint)
            .and_then(|state| state.get_application_state(key))
    }

    pub fn contains(&self, endpoint: &Endpoint) -> bool {
        self.entries.contains_key(endpoint)
    }

    /// Insert or replace, returning the previous state.
    pub(crate) fn insert(
        &mut self,
        endpoint: Endpoint,
        state: EndpointState,
    ) -> Option<EndpointState> {
        self.entries.insert(endpoint, state)
    }

    pub(crate) fn remove(&mut self, endpoint: &Endpoint) -> Option<EndpointState> {
        self.entries.remove(endpoint)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn endpoints(&self) -> impl Iterator<Item = Endpoint> + '_ {
        self.entries.keys().copied()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, Endpoint, EndpointState> {
        self.entries.iter()
    }

    pub fn digest(&self, endpoint: &Endpoint) -> Option<GossipDigest> {
        self.entries
            .get(endpoint)
            .map(|state| GossipDigest::from_state(*endpoint, state))
    }

    /// Point-in-time copy of every entry.
    pub fn snapshot(&self) -> BTreeMap<Endpoint, EndpointState> {
        self.entries.clone()
    }
}
