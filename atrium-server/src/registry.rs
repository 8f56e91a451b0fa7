//! Connected-viewer registry and broadcast router
//!
//! Every live connection is registered here together with the tab it is
//! currently watching. Outgoing traffic is routed by that binding: a tab's
//! event stream reaches only its watchers, while registry-wide facts (the
//! tab list, UI requests) go to every connection. This scoping is what keeps
//! one tab's token stream out of another tab's transcript.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use atrium_protocol::ServerMessage;

/// Unique identifier for one connection, valid for its lifetime only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    /// Create a ClientId from a raw value (mainly for testing)
    #[cfg(test)]
    pub fn new(value: u64) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Client({})", self.0)
    }
}

/// One live connection: its outgoing queue and current binding
struct Connection {
    tx: mpsc::Sender<ServerMessage>,
    watching: Option<Uuid>,
}

/// Client binding table plus broadcast router
///
/// Internally synchronized; connection tasks call into it concurrently.
/// The watcher index is kept as a reverse map so scoped broadcast does not
/// walk every connection.
pub struct ClientRegistry {
    connections: DashMap<ClientId, Connection>,
    /// Tab ID -> IDs of the connections bound to it
    watchers: DashMap<Uuid, HashSet<ClientId>>,
    next_id: AtomicU64,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            watchers: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a freshly accepted connection and return its identifier
    ///
    /// The connection starts with no binding; the connection task binds it
    /// once its initial tab is known.
    pub fn register_client(&self, tx: mpsc::Sender<ServerMessage>) -> ClientId {
        let id = ClientId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.connections.insert(id, Connection { tx, watching: None });
        debug!("Registered client {}", id);
        id
    }

    /// Drop a connection and its binding; called on disconnect
    pub fn unregister_client(&self, id: ClientId) {
        if let Some((_, conn)) = self.connections.remove(&id) {
            if let Some(tab) = conn.watching {
                self.forget_watcher(id, tab);
            }
            debug!("Unregistered client {}", id);
        }
    }

    pub fn client_count(&self) -> usize {
        self.connections.len()
    }

    /// Point a connection at a tab, replacing any previous binding
    ///
    /// Returns false when the connection is no longer registered. Tab
    /// existence is not checked here: binds only originate from operations
    /// that just created or confirmed the tab, and a binding gone stale
    /// through a later close is corrected by the close flow.
    pub fn bind(&self, id: ClientId, tab: Uuid) -> bool {
        let Some(mut conn) = self.connections.get_mut(&id) else {
            return false;
        };

        match conn.watching.replace(tab) {
            Some(previous) if previous != tab => self.forget_watcher(id, previous),
            _ => {}
        }
        self.watchers.entry(tab).or_default().insert(id);

        debug!("Client {} bound to tab {}", id, tab);
        true
    }

    /// Clear a connection's binding
    pub fn unbind(&self, id: ClientId) -> bool {
        let Some(mut conn) = self.connections.get_mut(&id) else {
            return false;
        };
        let Some(tab) = conn.watching.take() else {
            return false;
        };
        drop(conn);

        self.forget_watcher(id, tab);
        debug!("Client {} unbound from tab {}", id, tab);
        true
    }

    /// The tab a connection is currently watching, if any
    pub fn watched_tab(&self, id: ClientId) -> Option<Uuid> {
        self.connections.get(&id)?.watching
    }

    /// All connections currently bound to a tab
    pub fn watchers_of(&self, tab: Uuid) -> Vec<ClientId> {
        self.watchers
            .get(&tab)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default()
    }

    /// How many connections are bound to a tab
    pub fn watcher_count(&self, tab: Uuid) -> usize {
        self.watchers.get(&tab).map_or(0, |set| set.len())
    }

    fn forget_watcher(&self, id: ClientId, tab: Uuid) {
        let emptied = match self.watchers.get_mut(&tab) {
            Some(mut set) => {
                set.remove(&id);
                set.is_empty()
            }
            None => false,
        };
        // remove() on the same shard would deadlock under the guard above
        if emptied {
            self.watchers.remove(&tab);
        }
    }

    /// Queue a message for one connection without blocking
    ///
    /// A connection that has begun closing is a silent no-op: its channel
    /// reports closed and the entry is reaped here. A full queue means the
    /// viewer is consuming too slowly; the message is dropped with a warning
    /// rather than stalling the server.
    pub fn try_send_to_client(&self, id: ClientId, message: ServerMessage) -> bool {
        let Some(tx) = self.connections.get(&id).map(|c| c.tx.clone()) else {
            return false;
        };

        match tx.try_send(message) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("Client {} channel closed, reaping entry", id);
                self.unregister_client(id);
                false
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Client {} queue full, message dropped", id);
                false
            }
        }
    }

    /// Deliver a message to every connection bound to `tab`, and no others
    ///
    /// Returns how many connections accepted it.
    pub fn broadcast_to_tab(&self, tab: Uuid, message: ServerMessage) -> usize {
        let targets = self.watchers_of(tab);
        if !targets.is_empty() {
            debug!("Broadcasting to {} watchers of tab {}", targets.len(), tab);
        }
        self.deliver(targets, message)
    }

    /// Deliver a message to every open connection regardless of binding
    ///
    /// Reserved for registry-wide facts; tab-scoped traffic must go through
    /// [`Self::broadcast_to_tab`].
    pub fn broadcast_to_all(&self, message: ServerMessage) -> usize {
        let targets: Vec<ClientId> = self.connections.iter().map(|c| *c.key()).collect();
        self.deliver(targets, message)
    }

    fn deliver(&self, targets: Vec<ClientId>, message: ServerMessage) -> usize {
        targets
            .into_iter()
            .filter(|id| self.try_send_to_client(*id, message.clone()))
            .count()
    }
}

impl std::fmt::Debug for ClientRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("connections", &self.connections.len())
            .field("watched_tabs", &self.watchers.len())
            .finish()
    }
}
