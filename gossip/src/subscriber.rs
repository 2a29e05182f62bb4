//! Membership and state-change notifications.
//!
//! Subscribers see a closed set of events through one callback. Dispatch is
//! synchronous and in registration order; a slow subscriber delays the round
//! that produced the event.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use parking_lot::RwLock;
use tracing::debug;

use crate::{
    application_state::ApplicationState, endpoint::Endpoint, endpoint_state::EndpointState,
    versioned_value::VersionedValue,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GossipEvent {
    /// First state ever seen for this endpoint.
    Join {
        endpoint: Endpoint,
        state: EndpointState,
    },
    /// A key is about to change; `current` is the value still in place.
    BeforeChange {
        endpoint: Endpoint,
        current: EndpointState,
        key: ApplicationState,
        new_value: VersionedValue,
    },
    /// A key has changed and `value` is now visible.
    Change {
        endpoint: Endpoint,
        key: ApplicationState,
        value: VersionedValue,
    },
    Alive {
        endpoint: Endpoint,
        state: EndpointState,
    },
    Dead {
        endpoint: Endpoint,
        state: EndpointState,
    },
    /// The endpoint came back with a newer generation. Change events for
    /// each of its keys follow.
    Restart {
        endpoint: Endpoint,
        state: EndpointState,
    },
    /// The endpoint was removed from membership.
    Remove { endpoint: Endpoint },
}

impl GossipEvent {
    pub fn endpoint(&self) -> Endpoint {
        match self {
            GossipEvent::Join { endpoint, .. }
            | GossipEvent::BeforeChange { endpoint, .. }
            | GossipEvent::Change { endpoint, .. }
            | GossipEvent::Alive { endpoint, .. }
            | GossipEvent::Dead { endpoint, .. }
            | GossipEvent::Restart { endpoint, .. }
            | GossipEvent::Remove { endpoint } => *endpoint,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GossipEvent::Join { .. } => "join",
            GossipEvent::BeforeChange { .. } => "before_change",
            GossipEvent::Change { .. } => "change",
            GossipEvent::Alive { .. } => "alive",
            GossipEvent::Dead { .. } => "dead",
            GossipEvent::Restart { .. } => "restart",
            GossipEvent::Remove { .. } => "remove",
        }
    }
}

/// Anything that wants membership events.
pub trait Subscriber: Send + Sync {
    fn on_event(&self, event: &GossipEvent);
}

impl<F> Subscriber for F
where
    F: Fn(&GossipEvent) + Send + Sync,
{
    fn on_event(&self, event: &GossipEvent) {
        self(event)
    }
}

/// Handle returned at registration, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

/// Ordered list of subscribers.
#[derive(Default)]
pub struct SubscriberRegistry {
    subscribers: RwLock<Vec<(SubscriberId, Arc<dyn Subscriber>)>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for SubscriberRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriberRegistry")
            .field("subscribers", &self.len())
            .finish()
    }
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        let id = SubscriberId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers.write().push((id, subscriber));
        id
    }

    /// Returns false if the id was not registered.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deliver events in order, each to every subscriber.
    ///
    /// Works on a snapshot of the list so a subscriber may register or
    /// unregister from inside its callback; the change applies to the next
    /// dispatch.
    pub fn dispatch(&self, events: &[GossipEvent]) {
        if events.is_empty() {
            return;
        }
        let subscribers: Vec<Arc<dyn Subscriber>> = self
            .subscribers
            .read()
            .iter()
            .map(|(_, s)| s.clone())
            .collect();

        for event in events {
            debug!(
                endpoint = %event.endpoint(),
                event = event.kind(),
                subscribers = subscribers.len(),
                "Dispatching gossip event"
            );
            for subscriber in &subscribers {
                subscriber.on_event(event);
            }
        }
    }
}
