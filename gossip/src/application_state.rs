//! Keys of the per-node metadata carried in gossip.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Closed set of application state keys.
///
/// Declaration order is the map order inside an endpoint state, which keeps
/// change notifications in the same order for every subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ApplicationState {
    Status,
    Load,
    Schema,
    Dc,
    Rack,
    ReleaseVersion,
    RemovalCoordinator,
    InternalIp,
    RpcAddress,
    Severity,
    NetVersion,
    HostId,
    Tokens,
    SupportedFeatures,
    CacheHitrates,
    SchemaTablesVersion,
    RpcReady,
    ViewBacklog,
    ShardCount,
    IgnoreMsbBits,
    CdcGenerationId,
    SnitchName,
}

impl ApplicationState {
    pub const ALL: [ApplicationState; 22] = [
        ApplicationState::Status,
        ApplicationState::Load,
        ApplicationState::Schema,
        ApplicationState::Dc,
        ApplicationState::Rack,
        ApplicationState::ReleaseVersion,
        ApplicationState::RemovalCoordinator,
        ApplicationState::InternalIp,
        ApplicationState::RpcAddress,
        ApplicationState::Severity,
        ApplicationState::NetVersion,
        ApplicationState::HostId,
        ApplicationState::Tokens,
        ApplicationState::SupportedFeatures,
        ApplicationState::CacheHitrates,
        ApplicationState::SchemaTablesVersion,
        ApplicationState::RpcReady,
        ApplicationState::ViewBacklog,
        ApplicationState::ShardCount,
        ApplicationState::IgnoreMsbBits,
        ApplicationState::CdcGenerationId,
        ApplicationState::SnitchName,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ApplicationState::Status => "STATUS",
            ApplicationState::Load => "LOAD",
            ApplicationState::Schema => "SCHEMA",
            ApplicationState::Dc => "DC",
            ApplicationState::Rack => "RACK",
            ApplicationState::ReleaseVersion => "RELEASE_VERSION",
            ApplicationState::RemovalCoordinator => "REMOVAL_COORDINATOR",
            ApplicationState::InternalIp => "INTERNAL_IP",
            ApplicationState::RpcAddress => "RPC_ADDRESS",
            ApplicationState::Severity => "SEVERITY",
            ApplicationState::NetVersion => "NET_VERSION",
            ApplicationState::HostId => "HOST_ID",
            ApplicationState::Tokens => "TOKENS",
            ApplicationState::SupportedFeatures => "SUPPORTED_FEATURES",
            ApplicationState::CacheHitrates => "CACHE_HITRATES",
            ApplicationState::SchemaTablesVersion => "SCHEMA_TABLES_VERSION",
            ApplicationState::RpcReady => "RPC_READY",
            ApplicationState::ViewBacklog => "VIEW_BACKLOG",
            ApplicationState::ShardCount => "SHARD_COUNT",
            // Historical spellings kept for wire compatibility.
            ApplicationState::IgnoreMsbBits => "IGNOR_MSB_BITS",
            ApplicationState::CdcGenerationId => "CDC_STREAMS_TIMESTAMP",
            ApplicationState::SnitchName => "SNITCH_NAME",
        }
    }
}

impl fmt::Display for ApplicationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    #[test]
    fn test_names_are_unique() {
        let names: HashSet<_> = ApplicationState::ALL.iter().map(|s| s.as_str()).collect();
        assert_eq!(names.len(), ApplicationState::ALL.len());
    }

    #[test]
    fn test_compat_names() {
        assert_eq!(
            ApplicationState::CdcGenerationId.to_string(),
            "CDC_STREAMS_TIMESTAMP"
        );
        assert_eq!(ApplicationState::IgnoreMsbBits.to_string(), "IGNOR_MSB_BITS");
        assert_eq!(ApplicationState::Status.to_string(), "STATUS");
    }
}
