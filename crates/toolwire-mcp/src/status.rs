//! Connection status of every server plus the overall discovery state.

use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Connection state of one server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// Progress of a discovery run. Only moves forward.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryState {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

/// Handle returned by [`StatusRegistry::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Called with `(server_name, new_state)` on every status update.
pub type StatusListener = Arc<dyn Fn(&str, ConnectionState) + Send + Sync>;

/// Server name to connection state, with change notification.
#[derive(Default)]
pub struct StatusRegistry {
    states: RwLock<HashMap<String, ConnectionState>>,
    listeners: RwLock<Vec<(SubscriptionId, StatusListener)>>,
    next_id: AtomicU64,
    discovery: RwLock<DiscoveryState>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// State of `server_name`; servers never seen are `Disconnected`.
    pub fn get(&self, server_name: &str) -> ConnectionState {
        self.states
            .read()
            .get(server_name)
            .copied()
            .unwrap_or_default()
    }

    pub fn all(&self) -> HashMap<String, ConnectionState> {
        self.states.read().clone()
    }

    /// Register a listener. Listeners fire in subscription order.
    pub fn subscribe(&self, listener: StatusListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.listeners.write().push((id, listener));
        id
    }

    /// Remove a listener. Returns false if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(sid, _)| *sid != id);
        listeners.len() != before
    }

    /// Record a state and notify every listener, even if the state did not
    /// change.
    pub(crate) fn set_status(&self, server_name: &str, state: ConnectionState) {
        self.states.write().insert(server_name.to_string(), state);
        let listeners: Vec<StatusListener> = self
            .listeners
            .read()
            .iter()
            .map(|(_, l)| l.clone())
            .collect();
        for listener in listeners {
            listener(server_name, state);
        }
    }

    pub fn discovery_state(&self) -> DiscoveryState {
        *self.discovery.read()
    }

    /// Move the discovery state forward. Attempts to move it back are ignored.
    pub(crate) fn advance_discovery(&self, state: DiscoveryState) {
        let mut current = self.discovery.write();
        if state > *current {
            *current = state;
        }
    }
}

impl fmt::Debug for StatusRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusRegistry")
            .field("states", &*self.states.read())
            .field("listeners", &self.listeners.read().len())
            .field("discovery", &self.discovery_state())
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[test]
    fn test_unknown_server_is_disconnected() {
        let registry = StatusRegistry::new();
        assert_eq!(registry.get("nobody"), ConnectionState::Disconnected);
        assert!(registry.all().is_empty());
    }

    #[test]
    fn test_listeners_fire_in_order_including_redundant_updates() {
        let registry = StatusRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let first = seen.clone();
        registry.subscribe(Arc::new(move |name, state| {
            first.lock().push(format!("1:{name}:{state}"));
        }));
        let second = seen.clone();
        registry.subscribe(Arc::new(move |name, state| {
            second.lock().push(format!("2:{name}:{state}"));
        }));

        registry.set_status("a", ConnectionState::Connected);
        registry.set_status("a", ConnectionState::Connected);

        assert_eq!(
            *seen.lock(),
            vec!["1:a:connected", "2:a:connected", "1:a:connected", "2:a:connected"]
        );
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let registry = StatusRegistry::new();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = hits.clone();
        let id = registry.subscribe(Arc::new(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        registry.set_status("a", ConnectionState::Connecting);
        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        registry.set_status("a", ConnectionState::Connected);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_may_read_registry() {
        let registry = Arc::new(StatusRegistry::new());
        let observed = Arc::new(Mutex::new(None));
        let (reader, sink) = (registry.clone(), observed.clone());
        registry.subscribe(Arc::new(move |name, _| {
            *sink.lock() = Some(reader.get(name));
        }));
        registry.set_status("srv", ConnectionState::Connecting);
        assert_eq!(*observed.lock(), Some(ConnectionState::Connecting));
    }

    #[test]
    fn test_discovery_state_only_advances() {
        let registry = StatusRegistry::new();
        assert_eq!(registry.discovery_state(), DiscoveryState::NotStarted);
        registry.advance_discovery(DiscoveryState::Completed);
        registry.advance_discovery(DiscoveryState::InProgress);
        assert_eq!(registry.discovery_state(), DiscoveryState::Completed);
    }
}
