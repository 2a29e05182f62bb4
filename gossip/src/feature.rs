//! Cluster features.
//!
//! A feature is enabled once every endpoint in the local view advertises it
//! in SUPPORTED_FEATURES. Enabling is one-way: a node that later joins
//! without the feature does not disable it again.

use std::collections::BTreeSet;

use parking_lot::RwLock;
use tokio::sync::watch;
use tracing::info;

use crate::{
    application_state::ApplicationState, state_table::EndpointStateTable,
    versioned_value::to_feature_set,
};

#[derive(Debug)]
pub struct FeatureService {
    known: BTreeSet<String>,
    enabled: RwLock<BTreeSet<String>>,
    tx: watch::Sender<BTreeSet<String>>,
}

impl FeatureService {
    pub fn new<I, S>(known: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (tx, _) = watch::channel(BTreeSet::new());
        Self {
            known: known.into_iter().map(Into::into).collect(),
            enabled: RwLock::new(BTreeSet::new()),
            tx,
        }
    }

    /// Features this node can run with, advertised in SUPPORTED_FEATURES.
    pub fn supported_feature_set(&self) -> &BTreeSet<String> {
        &self.known
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.enabled.read().contains(name)
    }

    pub fn enabled_features(&self) -> BTreeSet<String> {
        self.enabled.read().clone()
    }

    /// Receiver that observes the enabled set every time it grows.
    pub fn subscribe(&self) -> watch::Receiver<BTreeSet<String>> {
        self.tx.subscribe()
    }

    /// Features every endpoint in the table advertises. An endpoint without
    /// SUPPORTED_FEATURES supports nothing.
    pub fn cluster_supported_features(table: &EndpointStateTable) -> BTreeSet<String> {
        let mut common: Option<BTreeSet<String>> = None;
        for (_, state) in table.iter() {
            let features = state
                .get_application_state(ApplicationState::SupportedFeatures)
                .map(|v| to_feature_set(&v.value))
                .unwrap_or_default();
            common = Some(match common {
                None => features,
                Some(acc) => acc.intersection(&features).cloned().collect(),
            });
        }
        common.unwrap_or_default()
    }

    /// Enable every known feature the whole cluster supports. Returns the
    /// newly enabled names.
    pub fn check_features(&self, table: &EndpointStateTable) -> Vec<String> {
        if table.is_empty() {
            return Vec::new();
        }
        let cluster = Self::cluster_supported_features(table);

        let newly: Vec<String> = {
            let mut enabled = self.enabled.write();
            let newly: Vec<String> = self
                .known
                .iter()
                .filter(|f| cluster.contains(*f) && !enabled.contains(*f))
                .cloned()
                .collect();
            enabled.extend(newly.iter().cloned());
            newly
        };

        if !newly.is_empty() {
            for name in &newly {
                info!(feature = %name, "Feature is enabled");
            }
            let snapshot = self.enabled_features();
            self.tx.send_replace(snapshot);
        }
        newly
    }
}
