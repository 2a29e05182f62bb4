//! Versioned application state values and the canonical value encodings.

use std::{collections::BTreeSet, fmt};

use serde::{Deserialize, Serialize};

/// One application state value at a point in its owner's local history.
///
/// Values are immutable once stamped; a change is a new value with a higher
/// version. Comparison between two values of the same key only looks at the
/// version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionedValue {
    pub value: String,
    pub version: i32,
}

impl VersionedValue {
    pub fn new(value: impl Into<String>, version: i32) -> Self {
        Self {
            value: value.into(),
            version,
        }
    }

    pub fn is_newer_than(&self, other: &VersionedValue) -> bool {
        self.version > other.version
    }
}

impl fmt::Display for VersionedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Value({},{})", self.value, self.version)
    }
}

/// Separator between the parts of a composite value such as a status.
pub const DELIMITER: char = ',';
/// Separator between tokens in a full token list.
pub const TOKEN_DELIMITER: char = ';';

pub const STATUS_UNKNOWN: &str = "UNKNOWN";
pub const STATUS_BOOTSTRAPPING: &str = "BOOT";
pub const STATUS_NORMAL: &str = "NORMAL";
pub const STATUS_LEAVING: &str = "LEAVING";
pub const STATUS_LEFT: &str = "LEFT";
pub const STATUS_MOVING: &str = "MOVING";
pub const REMOVING_TOKEN: &str = "removing";
pub const REMOVED_TOKEN: &str = "removed";
pub const HIBERNATE: &str = "hibernate";
pub const SHUTDOWN: &str = "shutdown";
pub const REMOVAL_COORDINATOR: &str = "REMOVER";

/// Builders for the string payloads of well-known application states.
///
/// These only produce the value text; the gossiper stamps the version when
/// the value is published, so a value built early can never carry a version
/// older than the local heartbeat.
pub mod values {
    use std::collections::BTreeSet;

    use uuid::Uuid;

    use super::*;

    fn first_token(tokens: &BTreeSet<String>) -> &str {
        tokens.iter().next().map(String::as_str).unwrap_or("")
    }

    pub fn bootstrapping(tokens: &BTreeSet<String>) -> String {
        format!("{STATUS_BOOTSTRAPPING}{DELIMITER}{}", first_token(tokens))
    }

    pub fn normal(tokens: &BTreeSet<String>) -> String {
        format!("{STATUS_NORMAL}{DELIMITER}{}", first_token(tokens))
    }

    pub fn leaving(tokens: &BTreeSet<String>) -> String {
        format!("{STATUS_LEAVING}{DELIMITER}{}", first_token(tokens))
    }

    pub fn left(tokens: &BTreeSet<String>, expire_time_ms: i64) -> String {
        format!(
            "{STATUS_LEFT}{DELIMITER}{}{DELIMITER}{expire_time_ms}",
            first_token(tokens)
        )
    }

    pub fn moving(token: &str) -> String {
        format!("{STATUS_MOVING}{DELIMITER}{token}")
    }

    pub fn removing_nonlocal(host_id: Uuid) -> String {
        format!("{REMOVING_TOKEN}{DELIMITER}{host_id}")
    }

    pub fn removed_nonlocal(host_id: Uuid, expire_time_ms: i64) -> String {
        format!("{REMOVED_TOKEN}{DELIMITER}{host_id}{DELIMITER}{expire_time_ms}")
    }

    pub fn removal_coordinator(host_id: Uuid) -> String {
        format!("{REMOVAL_COORDINATOR}{DELIMITER}{host_id}")
    }

    pub fn hibernate(value: bool) -> String {
        format!("{HIBERNATE}{DELIMITER}{value}")
    }

    pub fn shutdown(value: bool) -> String {
        format!("{SHUTDOWN}{DELIMITER}{value}")
    }

    pub fn tokens(tokens: &BTreeSet<String>) -> String {
        tokens
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(&TOKEN_DELIMITER.to_string())
    }

    pub fn supported_features<'a>(features: impl IntoIterator<Item = &'a str>) -> String {
        features
            .into_iter()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect::<Vec<_>>()
            .join(&DELIMITER.to_string())
    }

    pub fn load(load: f64) -> String {
        load.to_string()
    }

    pub fn rpc_ready(ready: bool) -> String {
        let flag = if ready { "1" } else { "0" };
        flag.to_string()
    }

    pub fn host_id(host_id: Uuid) -> String {
        host_id.to_string()
    }

    pub fn shard_count(count: u32) -> String {
        count.to_string()
    }

    pub fn cdc_generation_id(timestamp_ms: Option<i64>) -> String {
        timestamp_ms.map(|ts| ts.to_string()).unwrap_or_default()
    }
}

/// Parse a full token list. An empty string is an empty set.
pub fn tokens_from_string(s: &str) -> BTreeSet<String> {
    if s.is_empty() {
        return BTreeSet::new();
    }
    s.split(TOKEN_DELIMITER).map(str::to_string).collect()
}

/// Parse a comma separated feature list, dropping empty names.
pub fn to_feature_set(s: &str) -> BTreeSet<String> {
    s.split(DELIMITER)
        .filter(|f| !f.is_empty())
        .map(str::to_string)
        .collect()
}

/// Split a status value into its parts; the first part is the status name.
pub fn status_parts(s: &str) -> Vec<&str> {
    s.split(DELIMITER).collect()
}

/// Parse a cdc generation timestamp; empty means no generation.
pub fn cdc_generation_id_from_string(s: &str) -> Option<i64> {
    if s.is_empty() {
        return None;
    }
    s.parse().ok()
}
