//! Gossiper configuration.

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    endpoint::Endpoint,
    error::{GossipError, GossipResult},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GossipConfig {
    /// Peers from another cluster are refused.
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    /// Peers with a different partitioner are refused. Empty disables the check.
    #[serde(default)]
    pub partitioner: String,

    /// Contact points used to join and to heal partitions.
    #[serde(default)]
    pub seeds: Vec<Endpoint>,

    /// Gossip round period in milliseconds (default: 1000).
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Per-message timeout in milliseconds (default: 5000).
    #[serde(default = "default_rpc_timeout_ms")]
    pub rpc_timeout_ms: u64,

    /// Live peers contacted per round (default: 1).
    #[serde(default = "default_fanout")]
    pub fanout: usize,

    /// Heartbeat silence after which an endpoint is marked dead (default: 10000).
    #[serde(default = "default_failure_timeout_ms")]
    pub failure_timeout_ms: u64,

    /// How long a removed endpoint is ignored in gossip (default: 60000).
    #[serde(default = "default_quarantine_delay_ms")]
    pub quarantine_delay_ms: u64,

    /// Upper bound for the shutdown announcement round (default: 2000).
    #[serde(default = "default_shutdown_announce_ms")]
    pub shutdown_announce_ms: u64,
}

fn default_cluster_name() -> String {
    "Test Cluster".to_string()
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_rpc_timeout_ms() -> u64 {
    5000
}

fn default_fanout() -> usize {
    1
}

fn default_failure_timeout_ms() -> u64 {
    10_000
}

fn default_quarantine_delay_ms() -> u64 {
    60_000
}

fn default_shutdown_announce_ms() -> u64 {
    2000
}

impl Default for GossipConfig {
    fn default() -> Self {
        Self {
            cluster_name: default_cluster_name(),
            partitioner: String::new(),
            seeds: Vec::new(),
            interval_ms: default_interval_ms(),
            rpc_timeout_ms: default_rpc_timeout_ms(),
            fanout: default_fanout(),
            failure_timeout_ms: default_failure_timeout_ms(),
            quarantine_delay_ms: default_quarantine_delay_ms(),
            shutdown_announce_ms: default_shutdown_announce_ms(),
        }
    }
}

impl GossipConfig {
    /// Load configuration from a YAML file
    pub async fn from_file(path: impl AsRef<Path>) -> GossipResult<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> GossipResult<()> {
        if self.cluster_name.is_empty() {
            return Err(GossipError::Config("cluster_name must not be empty".into()));
        }
        for (name, value) in [
            ("interval_ms", self.interval_ms),
            ("rpc_timeout_ms", self.rpc_timeout_ms),
            ("failure_timeout_ms", self.failure_timeout_ms),
            ("shutdown_announce_ms", self.shutdown_announce_ms),
        ] {
            if value == 0 {
                return Err(GossipError::Config(format!("{} must be positive", name)));
            }
        }
        if self.fanout == 0 {
            return Err(GossipError::Config("fanout must be positive".into()));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn failure_timeout(&self) -> Duration {
        Duration::from_millis(self.failure_timeout_ms)
    }

    pub fn quarantine_delay(&self) -> Duration {
        Duration::from_millis(self.quarantine_delay_ms)
    }

    pub fn shutdown_announce(&self) -> Duration {
        Duration::from_millis(self.shutdown_announce_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = GossipConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.interval(), Duration::from_secs(1));
        assert_eq!(config.fanout, 1);
    }

    #[test]
    fn test_validate_rejects_zero() {
        let config = GossipConfig {
            rpc_timeout_ms: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(GossipError::Config(_))));

        let config = GossipConfig {
            cluster_name: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn test_from_file_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "cluster_name: prod\nseeds:\n  - 10.0.0.1\n  - 10.0.0.2\ninterval_ms: 250"
        )
        .unwrap();

        let config = GossipConfig::from_file(file.path()).await.unwrap();
        assert_eq!(config.cluster_name, "prod");
        assert_eq!(
            config.seeds,
            vec![Endpoint::v4(10, 0, 0, 1), Endpoint::v4(10, 0, 0, 2)]
        );
        assert_eq!(config.interval_ms, 250);
        assert_eq!(config.rpc_timeout_ms, 5000);
    }

    #[tokio::test]
    async fn test_from_file_rejects_invalid() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fanout: 0").unwrap();
        assert!(GossipConfig::from_file(file.path()).await.is_err());
    }
}
