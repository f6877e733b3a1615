//! Publish/subscribe hub for fleet events

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use super::event::FleetEvent;

/// Handle returned by [`StateChangeNotifier::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionId(pub Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Callback invoked for every emitted event
pub type FleetObserver = Arc<dyn Fn(&FleetEvent) + Send + Sync>;

/// In-memory, synchronous event bus.
///
/// `emit` calls every observer in subscription order on the caller's thread
/// before returning, unless delivery is held (see [`StateChangeNotifier::hold`]).
/// Nothing is retried.
#[derive(Default)]
pub struct StateChangeNotifier {
    subscribers: Vec<(SubscriptionId, FleetObserver)>,
    held: Mutex<Option<Vec<FleetEvent>>>,
}

/// Events queued while delivery was held, with the observers to receive them
pub struct PendingEvents {
    events: Vec<FleetEvent>,
    observers: Vec<FleetObserver>,
}

impl PendingEvents {
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Hand every queued event to every observer, in emission order
    pub fn deliver(self) {
        for event in &self.events {
            for observer in &self.observers {
                observer(event);
            }
        }
    }
}

impl StateChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer; it receives events emitted from now on
    pub fn subscribe<F>(&mut self, observer: F) -> SubscriptionId
    where
        F: Fn(&FleetEvent) + Send + Sync + 'static,
    {
        let id = SubscriptionId::new();
        self.subscribers.push((id, Arc::new(observer)));
        debug!("Observer {} subscribed", id);
        id
    }

    /// Remove an observer. Returns false if the id was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sub_id, _)| *sub_id != id);
        let removed = self.subscribers.len() != before;
        if removed {
            debug!("Observer {} unsubscribed", id);
        }
        removed
    }

    /// Deliver an event to all current subscribers
    pub fn emit(&self, event: FleetEvent) {
        if let FleetEvent::Issue { error, .. } = &event {
            warn!("{}", error);
        } else {
            debug!("{}", event.message());
        }

        if let Some(queue) = self.held_queue().as_mut() {
            queue.push(event);
            return;
        }

        for (_, observer) in &self.subscribers {
            observer(&event);
        }
    }

    /// Queue emitted events instead of delivering them.
    ///
    /// Used while the owner is locked, so observers never run inside the lock.
    pub fn hold(&self) {
        let mut held = self.held_queue();
        if held.is_none() {
            *held = Some(Vec::new());
        }
    }

    /// Stop queueing and return what was queued, ready to deliver
    pub fn release(&self) -> PendingEvents {
        PendingEvents {
            events: self.held_queue().take().unwrap_or_default(),
            observers: self
                .subscribers
                .iter()
                .map(|(_, observer)| Arc::clone(observer))
                .collect(),
        }
    }

    fn held_queue(&self) -> MutexGuard<'_, Option<Vec<FleetEvent>>> {
        self.held.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}
