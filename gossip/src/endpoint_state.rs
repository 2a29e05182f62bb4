//! Per-endpoint gossip state and the merge rule that reconciles two views of it.

use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    application_state::ApplicationState,
    endpoint::Endpoint,
    error::{GossipError, GossipResult},
    heartbeat::HeartBeatState,
    versioned_value::{self, VersionedValue, SHUTDOWN},
};

/// Heartbeat plus every application state known for one endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointState {
    heartbeat: HeartBeatState,
    states: BTreeMap<ApplicationState, VersionedValue>,
}

impl EndpointState {
    pub fn new(heartbeat: HeartBeatState) -> Self {
        Self {
            heartbeat,
            states: BTreeMap::new(),
        }
    }

    pub fn with_states(
        heartbeat: HeartBeatState,
        states: impl IntoIterator<Item = (ApplicationState, VersionedValue)>,
    ) -> Self {
        Self {
            heartbeat,
            states: states.into_iter().collect(),
        }
    }

    pub fn heartbeat(&self) -> HeartBeatState {
        self.heartbeat
    }

    pub fn set_heartbeat(&mut self, heartbeat: HeartBeatState) {
        self.heartbeat = heartbeat;
    }

    pub(crate) fn heartbeat_mut(&mut self) -> &mut HeartBeatState {
        &mut self.heartbeat
    }

    pub fn generation(&self) -> i32 {
        self.heartbeat.generation
    }

    /// Absent keys are `None`, never a default value.
    pub fn get_application_state(&self, key: ApplicationState) -> Option<&VersionedValue> {
        self.states.get(&key)
    }

    pub fn application_states(&self) -> &BTreeMap<ApplicationState, VersionedValue> {
        &self.states
    }

    pub fn add_application_state(&mut self, key: ApplicationState, value: VersionedValue) {
        self.states.insert(key, value);
    }

    /// Highest version carried by the heartbeat or any application state.
    pub fn max_version(&self) -> i32 {
        self.states
            .values()
            .map(|v| v.version)
            .fold(self.heartbeat.version, i32::max)
    }

    /// First segment of the STATUS value, empty when no status is known.
    pub fn status(&self) -> &str {
        self.get_application_state(ApplicationState::Status)
            .and_then(|v| versioned_value::status_parts(&v.value).first().copied())
            .unwrap_or("")
    }

    pub fn is_shutdown(&self) -> bool {
        self.status() == SHUTDOWN
    }

    pub fn is_rpc_ready(&self) -> bool {
        self.get_application_state(ApplicationState::RpcReady)
            .and_then(|v| v.value.parse::<i32>().ok())
            .is_some_and(|v| v != 0)
    }

    pub fn host_id(&self) -> Option<Uuid> {
        self.get_application_state(ApplicationState::HostId)
            .and_then(|v| Uuid::parse_str(&v.value).ok())
    }

    /// Reject states no honest peer can produce.
    pub fn validate(&self, endpoint: Endpoint) -> GossipResult<()> {
        if self.heartbeat.generation < 0 {
            return Err(GossipError::malformed(endpoint, "negative generation"));
        }
        if self.heartbeat.version < 0 {
            return Err(GossipError::malformed(endpoint, "negative heartbeat version"));
        }
        if let Some((key, value)) = self.states.iter().find(|(_, v)| v.version < 0) {
            return Err(GossipError::malformed(
                endpoint,
                format!("negative version {} for {}", value.version, key),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for EndpointState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HeartBeatState = {}, AppStateMap =", self.heartbeat)?;
        for (key, value) in &self.states {
            write!(f, " {{ {} : {} }} ", key, value)?;
        }
        Ok(())
    }
}

// ============================================================================
// Merge
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeKind {
    /// Remote is an older incarnation; local state kept untouched.
    Stale,
    /// Same incarnation and nothing newer arrived.
    Unchanged,
    /// Same incarnation; heartbeat and/or some keys advanced.
    Updated,
    /// Remote is a newer incarnation and replaced the local state.
    Restarted,
}

#[derive(Debug, Clone)]
pub struct Merged {
    pub state: EndpointState,
    /// Keys whose value changed, in key order.
    pub changed: Vec<ApplicationState>,
    pub kind: MergeKind,
    pub heartbeat_advanced: bool,
}

/// Reconcile the local view of an endpoint with a remote one.
///
/// Never moves backwards: a lower remote generation is ignored, a higher one
/// replaces everything, and within a generation each key keeps whichever
/// side has the higher version.
pub fn merge(local: &EndpointState, remote: &EndpointState) -> Merged {
    let local_gen = local.heartbeat.generation;
    let remote_gen = remote.heartbeat.generation;

    if remote_gen > local_gen {
        return Merged {
            state: remote.clone(),
            changed: remote.states.keys().copied().collect(),
            kind: MergeKind::Restarted,
            heartbeat_advanced: true,
        };
    }

    if remote_gen < local_gen {
        return Merged {
            state: local.clone(),
            changed: Vec::new(),
            kind: MergeKind::Stale,
            heartbeat_advanced: false,
        };
    }

    let mut state = local.clone();
    let heartbeat_advanced = remote.heartbeat.version > local.heartbeat.version;
    if heartbeat_advanced {
        state.heartbeat.version = remote.heartbeat.version;
    }

    let mut changed = Vec::new();
    for (key, remote_value) in &remote.states {
        let adopt = match local.states.get(key) {
            Some(local_value) => remote_value.is_newer_than(local_value),
            None => true,
        };
        if adopt {
            state.states.insert(*key, remote_value.clone());
            changed.push(*key);
        }
    }

    let kind = if heartbeat_advanced || !changed.is_empty() {
        MergeKind::Updated
    } else {
        MergeKind::Unchanged
    };

    Merged {
        state,
        changed,
        kind,
        heartbeat_advanced,
    }
}
