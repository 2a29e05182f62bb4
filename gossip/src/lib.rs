//! Cluster Membership Gossip
//!
//! This crate provides epidemic membership for a cluster of nodes:
//! - Versioned per-endpoint state (heartbeat plus application states)
//! - Syn/Ack/Ack2 digest reconciliation between pairs of nodes
//! - Liveness tracking on top of heartbeat progress
//! - Ordered subscriber notifications for joins, changes, restarts and failures
//! - Cluster-wide feature negotiation over SUPPORTED_FEATURES

pub mod application_state;
pub mod config;
pub mod digest;
pub mod endpoint;
pub mod endpoint_state;
pub mod error;
pub mod failure_detector;
pub mod feature;
pub mod gossiper;
pub mod heartbeat;
pub mod messages;
pub mod metrics;
pub mod state_table;
pub mod subscriber;
pub mod transport;
pub mod version;
pub mod versioned_value;

#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use application_state::ApplicationState;
pub use config::GossipConfig;
pub use digest::GossipDigest;
pub use endpoint::Endpoint;
pub use endpoint_state::{merge, EndpointState, MergeKind, Merged};
pub use error::{GossipError, GossipResult};
pub use failure_detector::{FailureDetector, TimeoutFailureDetector};
pub use feature::FeatureService;
pub use gossiper::{Gossiper, RoundOutcome, RoundPhase};
pub use heartbeat::HeartBeatState;
pub use messages::{Ack, Ack2, Syn};
pub use state_table::EndpointStateTable;
pub use subscriber::{GossipEvent, Subscriber, SubscriberId, SubscriberRegistry};
pub use transport::{GossipTransport, LinkFault, LocalNetwork, LocalTransport};
pub use version::VersionGenerator;
pub use versioned_value::VersionedValue;
