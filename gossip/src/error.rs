//! Gossip error types.
//!
//! Only configuration and transport problems ever reach callers. Stale and
//! malformed gossip is absorbed inside the engine and shows up in logs and
//! metrics instead.

use thiserror::Error;

use crate::endpoint::Endpoint;

pub type GossipResult<T> = Result<T, GossipError>;

#[derive(Debug, Error)]
pub enum GossipError {
    #[error("Cluster name mismatch from {from}: expected '{expected}', got '{actual}'")]
    ClusterNameMismatch {
        from: Endpoint,
        expected: String,
        actual: String,
    },

    #[error("Partitioner mismatch from {from}: expected '{expected}', got '{actual}'")]
    PartitionerMismatch {
        from: Endpoint,
        expected: String,
        actual: String,
    },

    #[error("Peer unreachable: {0}")]
    Unreachable(Endpoint),

    #[error("Malformed gossip entry for {endpoint}: {reason}")]
    Malformed { endpoint: Endpoint, reason: String },

    #[error("Invalid endpoint address '{0}'")]
    InvalidEndpoint(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Gossiper has not been started")]
    NotStarted,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

impl GossipError {
    pub fn malformed(endpoint: Endpoint, reason: impl Into<String>) -> Self {
        Self::Malformed {
            endpoint,
            reason: reason.into(),
        }
    }
}
