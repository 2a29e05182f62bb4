//! Message delivery between gossipers.
//!
//! The engine only needs request/response delivery of [`Syn`]/[`Ack`] and a
//! one-way [`Ack2`]; how the bytes travel is up to the implementation. The
//! engine bounds every call with its own timeout, so an implementation may
//! simply never return for an unresponsive peer.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use crate::{
    endpoint::Endpoint,
    error::{GossipError, GossipResult},
    gossiper::Gossiper,
    messages::{Ack, Ack2, Syn},
};

#[async_trait]
pub trait GossipTransport: Send + Sync {
    async fn send_syn(&self, to: Endpoint, syn: Syn) -> GossipResult<Ack>;

    async fn send_ack2(&self, to: Endpoint, ack2: Ack2) -> GossipResult<()>;
}

/// Injected misbehaviour for messages addressed to an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkFault {
    /// Messages to or from the endpoint fail immediately.
    Partitioned,
    /// The endpoint accepts Syn but never answers.
    NoResponse,
    /// The endpoint answers Syn but never acknowledges Ack2.
    NoAck2Response,
}

/// In-process network routing messages straight into registered gossipers.
#[derive(Debug, Default)]
pub struct LocalNetwork {
    nodes: DashMap<Endpoint, Weak<Gossiper>>,
    faults: DashMap<Endpoint, LinkFault>,
}

impl LocalNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Transport bound to `local` as the sender identity.
    pub fn transport(self: &Arc<Self>, local: Endpoint) -> Arc<LocalTransport> {
        Arc::new(LocalTransport {
            network: self.clone(),
            local,
        })
    }

    pub fn register(&self, gossiper: &Arc<Gossiper>) {
        self.nodes
            .insert(gossiper.local_endpoint(), Arc::downgrade(gossiper));
    }

    pub fn unregister(&self, endpoint: Endpoint) {
        self.nodes.remove(&endpoint);
    }

    pub fn set_fault(&self, endpoint: Endpoint, fault: LinkFault) {
        self.faults.insert(endpoint, fault);
    }

    pub fn heal(&self, endpoint: Endpoint) {
        self.faults.remove(&endpoint);
    }

    fn fault(&self, endpoint: Endpoint) -> Option<LinkFault> {
        self.faults.get(&endpoint).map(|f| *f.value())
    }

    async fn route(&self, from: Endpoint, to: Endpoint, ack2: bool) -> GossipResult<Arc<Gossiper>> {
        if self.fault(from) == Some(LinkFault::Partitioned) {
            return Err(GossipError::Unreachable(to));
        }
        match self.fault(to) {
            Some(LinkFault::Partitioned) => return Err(GossipError::Unreachable(to)),
            Some(LinkFault::NoResponse) => std::future::pending::<()>().await,
            Some(LinkFault::NoAck2Response) if ack2 => std::future::pending::<()>().await,
            _ => {}
        }
        // Let other tasks run, as a real network hop would.
        tokio::task::yield_now().await;
        self.nodes
            .get(&to)
            .and_then(|node| node.upgrade())
            .ok_or(GossipError::Unreachable(to))
    }
}

#[derive(Debug)]
pub struct LocalTransport {
    network: Arc<LocalNetwork>,
    local: Endpoint,
}

#[async_trait]
impl GossipTransport for LocalTransport {
    async fn send_syn(&self, to: Endpoint, syn: Syn) -> GossipResult<Ack> {
        trace!(from = %self.local, %to, digests = syn.digests.len(), "local send syn");
        let peer = self.network.route(self.local, to, false).await?;
        peer.handle_syn(self.local, syn)
    }

    async fn send_ack2(&self, to: Endpoint, ack2: Ack2) -> GossipResult<()> {
        trace!(from = %self.local, %to, states = ack2.endpoint_state_map.len(), "local send ack2");
        let peer = self.network.route(self.local, to, true).await?;
        peer.handle_ack2(self.local, ack2);
        Ok(())
    }
}
