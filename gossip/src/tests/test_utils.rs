use std::{
    collections::BTreeMap,
    sync::{Arc, Once},
};

use parking_lot::Mutex;
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

use crate::{
    application_state::ApplicationState,
    config::GossipConfig,
    endpoint::Endpoint,
    endpoint_state::EndpointState,
    gossiper::Gossiper,
    heartbeat::HeartBeatState,
    subscriber::{GossipEvent, Subscriber},
    transport::LocalNetwork,
    versioned_value::VersionedValue,
};

static INIT: Once = Once::new();

/// Initialize test logging infrastructure
pub(crate) fn init_test_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::registry()
            .with(tracing_subscriber::fmt::layer())
            .with(
                EnvFilter::builder()
                    .with_default_directive(LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .try_init();
    });
}

pub(crate) fn ep(last: u8) -> Endpoint {
    Endpoint::v4(127, 0, 0, last)
}

pub(crate) fn test_config() -> GossipConfig {
    GossipConfig {
        cluster_name: "test".to_string(),
        partitioner: "murmur3".to_string(),
        interval_ms: 100,
        rpc_timeout_ms: 500,
        failure_timeout_ms: 1000,
        quarantine_delay_ms: 5000,
        shutdown_announce_ms: 1000,
        ..Default::default()
    }
}

/// Create a gossiper attached to `network` without starting it.
pub(crate) fn create_node(
    network: &Arc<LocalNetwork>,
    endpoint: Endpoint,
    config: GossipConfig,
) -> Arc<Gossiper> {
    let gossiper = Arc::new(
        Gossiper::new(config, endpoint, network.transport(endpoint)).unwrap(),
    );
    network.register(&gossiper);
    gossiper
}

/// Create and start a gossiper with a NORMAL status.
pub(crate) fn start_node(
    network: &Arc<LocalNetwork>,
    endpoint: Endpoint,
    config: GossipConfig,
) -> Arc<Gossiper> {
    let gossiper = create_node(network, endpoint, config);
    gossiper
        .start(
            None,
            [(ApplicationState::Status, "NORMAL,0".to_string())],
        )
        .unwrap();
    gossiper
}

pub(crate) fn state(
    generation: i32,
    heartbeat_version: i32,
    values: &[(ApplicationState, &str, i32)],
) -> EndpointState {
    EndpointState::with_states(
        HeartBeatState::with_version(generation, heartbeat_version),
        values
            .iter()
            .map(|(k, v, version)| (*k, VersionedValue::new(*v, *version))),
    )
}

/// Put a third-party endpoint state straight into a gossiper's table.
pub(crate) fn inject(gossiper: &Gossiper, endpoint: Endpoint, endpoint_state: EndpointState) {
    gossiper.apply_state_locally(BTreeMap::from([(endpoint, endpoint_state)]));
}

/// Full bidirectional exchange: `a` gossips to `b`, then `b` to `a`.
pub(crate) async fn exchange(a: &Gossiper, b: &Gossiper) {
    let outcome = a.gossip_with(b.local_endpoint(), a.make_syn(b.local_endpoint())).await;
    assert!(outcome.is_completed(), "{:?}", outcome);
    let outcome = b.gossip_with(a.local_endpoint(), b.make_syn(a.local_endpoint())).await;
    assert!(outcome.is_completed(), "{:?}", outcome);
}

/// Subscriber that records every event it sees.
#[derive(Default)]
pub(crate) struct EventLog {
    events: Mutex<Vec<GossipEvent>>,
}

impl EventLog {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn events(&self) -> Vec<GossipEvent> {
        self.events.lock().clone()
    }

    /// Event kinds for one endpoint, in delivery order.
    pub(crate) fn kinds_for(&self, endpoint: Endpoint) -> Vec<&'static str> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.endpoint() == endpoint)
            .map(GossipEvent::kind)
            .collect()
    }

    pub(crate) fn clear(&self) {
        self.events.lock().clear();
    }
}

impl Subscriber for EventLog {
    fn on_event(&self, event: &GossipEvent) {
        self.events.lock().push(event.clone());
    }
}

#[test]
fn test_infrastructure_utilities() {
    init_test_logging();
    let network = LocalNetwork::new();
    let node = start_node(&network, ep(1), test_config());
    assert!(node.is_started());
    assert_eq!(node.endpoints(), vec![ep(1)]);
    assert_eq!(
        node.get_application_state(ep(1), ApplicationState::Status).as_deref(),
        Some("NORMAL,0")
    );
}
