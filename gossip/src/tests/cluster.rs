//! Whole-cluster runs with the scheduler driving rounds on paused time.

use std::{sync::Arc, time::Duration};

use tokio::{sync::watch, task::JoinHandle};

use super::test_utils::{ep, init_test_logging, start_node, test_config};
use crate::{
    config::GossipConfig,
    gossiper::Gossiper,
    transport::{LinkFault, LocalNetwork},
};

struct Cluster {
    network: Arc<LocalNetwork>,
    nodes: Vec<Arc<Gossiper>>,
    signal: watch::Sender<()>,
    handles: Vec<JoinHandle<anyhow::Result<()>>>,
}

impl Cluster {
    fn start(size: u8) -> Self {
        let network = LocalNetwork::new();
        let config = GossipConfig {
            seeds: vec![ep(1)],
            failure_timeout_ms: 5000,
            ..test_config()
        };
        let nodes: Vec<_> = (1..=size)
            .map(|i| start_node(&network, ep(i), config.clone()))
            .collect();

        let (signal, rx) = watch::channel(());
        let handles = nodes
            .iter()
            .map(|node| tokio::spawn(node.clone().run(rx.clone())))
            .collect();

        Self {
            network,
            nodes,
            signal,
            handles,
        }
    }

    async fn shutdown(self) {
        self.signal.send(()).unwrap();
        for handle in self.handles {
            handle.await.unwrap().unwrap();
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_cluster_converges_through_seed() {
    init_test_logging();
    let cluster = Cluster::start(5);

    tokio::time::sleep(Duration::from_secs(3)).await;

    let everyone: Vec<_> = (1..=5).map(ep).collect();
    for node in &cluster.nodes {
        assert_eq!(node.endpoints(), everyone, "{:?}", node);
        assert_eq!(
            node.live_members().into_iter().collect::<Vec<_>>(),
            everyone,
            "{:?}",
            node
        );
        assert!(node.unreachable_members().is_empty());
    }

    // Every node holds the same view of every endpoint.
    let reference = cluster.nodes[0].snapshot();
    for node in &cluster.nodes[1..] {
        for (endpoint, state) in node.snapshot() {
            let seen = &reference[&endpoint];
            assert_eq!(seen.generation(), state.generation());
            assert_eq!(seen.application_states(), state.application_states());
        }
    }

    cluster.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_cluster_detects_partitioned_node_and_recovers() {
    init_test_logging();
    let cluster = Cluster::start(4);
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(cluster.nodes[0].is_alive(ep(4)));

    cluster.network.set_fault(ep(4), LinkFault::Partitioned);
    tokio::time::sleep(Duration::from_secs(8)).await;
    for node in &cluster.nodes[..3] {
        assert!(!node.is_alive(ep(4)), "{:?}", node);
        assert!(node.unreachable_members().contains(&ep(4)));
        assert!(node.is_alive(ep(1)));
    }

    cluster.network.heal(ep(4));
    tokio::time::sleep(Duration::from_secs(3)).await;
    for node in &cluster.nodes[..3] {
        assert!(node.is_alive(ep(4)), "{:?}", node);
    }

    cluster.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_stopped_node_announces_and_exits_loop() {
    init_test_logging();
    let cluster = Cluster::start(3);
    tokio::time::sleep(Duration::from_secs(2)).await;

    cluster.nodes[2].stop().await;
    assert!(!cluster.nodes[2].is_started());
    for node in &cluster.nodes[..2] {
        assert!(!node.is_alive(ep(3)), "{:?}", node);
        assert!(node.get_endpoint_state(ep(3)).unwrap().is_shutdown());
    }

    tokio::time::sleep(Duration::from_secs(2)).await;
    for node in &cluster.nodes[..2] {
        assert!(!node.is_alive(ep(3)), "{:?}", node);
    }

    cluster.shutdown().await;
}
