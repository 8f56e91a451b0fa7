//! The tab registry: insertion-ordered collection of session handles

use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

use atrium_protocol::TabInfo;

use super::SessionHandle;

/// Outcome of a close request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseTab {
    /// The tab id is not in the registry; nothing changed
    NotFound,
    /// The tab is the sole remaining one; nothing changed
    Refused,
    /// The tab was disposed and removed; viewers that were watching it
    /// should be rebound to `replacement`
    Closed { replacement: Uuid },
}

/// Owns all open tabs
///
/// Invariant: the mapping's key set always equals the order sequence's
/// element set. The registry never goes empty through `close`: closing
/// the sole remaining tab is refused.
#[derive(Debug, Default)]
pub struct TabRegistry {
    /// Tab IDs in creation order
    order: Vec<Uuid>,
    /// Tab ID -> session handle
    tabs: HashMap<Uuid, SessionHandle>,
    /// Next creation ordinal (feeds "Session N" default names)
    next_ordinal: u64,
}

impl TabRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            tabs: HashMap::new(),
            next_ordinal: 0,
        }
    }

    /// Allocate the next creation ordinal
    pub fn next_ordinal(&mut self) -> u64 {
        self.next_ordinal += 1;
        self.next_ordinal
    }

    /// Register a newly constructed handle
    ///
    /// Callers construct the runtime first; a handle only reaches the
    /// registry once construction has succeeded.
    pub fn insert(&mut self, handle: SessionHandle) {
        let id = handle.id();
        debug_assert!(!self.tabs.contains_key(&id));
        self.order.push(id);
        self.tabs.insert(id, handle);
        debug!("Registered tab {} ({} open)", id, self.order.len());
    }

    /// Close a tab
    ///
    /// Refused when `id` is the only remaining tab. Otherwise the handle's
    /// runtime is disposed, the tab is removed from both the order and the
    /// mapping, and the replacement for displaced viewers is returned: the
    /// tab immediately before the closed one in creation order, else the
    /// first remaining tab.
    pub fn close(&mut self, id: Uuid) -> CloseTab {
        let Some(pos) = self.order.iter().position(|t| *t == id) else {
            return CloseTab::NotFound;
        };

        if self.order.len() == 1 {
            debug!("Refusing to close sole remaining tab {}", id);
            return CloseTab::Refused;
        }

        let replacement = if pos > 0 {
            self.order[pos - 1]
        } else {
            self.order[1]
        };

        self.order.remove(pos);
        if let Some(handle) = self.tabs.remove(&id) {
            handle.dispose();
        }

        info!("Closed tab {}, replacement {}", id, replacement);
        CloseTab::Closed { replacement }
    }

    /// Read-only snapshot of all tabs in registry order
    pub fn list(&self) -> Vec<TabInfo> {
        self.order
            .iter()
            .filter_map(|id| self.tabs.get(id))
            .map(SessionHandle::info)
            .collect()
    }

    /// Get a handle by tab ID
    pub fn get(&self, id: Uuid) -> Option<&SessionHandle> {
        self.tabs.get(&id)
    }

    /// Whether a tab exists
    pub fn contains(&self, id: Uuid) -> bool {
        self.tabs.contains_key(&id)
    }

    /// First tab in creation order
    pub fn first(&self) -> Option<Uuid> {
        self.order.first().copied()
    }

    /// Number of open tabs
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the registry has no tabs
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Runtime session IDs of all open tabs
    ///
    /// Used to exclude already-open sessions from "available to open"
    /// listings.
    pub fn open_session_ids(&self) -> std::collections::HashSet<String> {
        self.tabs
            .values()
            .filter_map(|h| h.runtime().session_id())
            .collect()
    }

    /// Find the tab whose runtime session ID matches, if it is open
    pub fn find_by_session_id(&self, session_id: &str) -> Option<Uuid> {
        self.order
            .iter()
            .filter_map(|id| self.tabs.get(id))
            .find(|h| h.runtime().session_id().as_deref() == Some(session_id))
            .map(|h| h.id())
    }

    /// Dispose every tab; used at shutdown
    pub fn dispose_all(&mut self) {
        for handle in self.tabs.values() {
            handle.dispose();
        }
        self.tabs.clear();
        self.order.clear();
    }
}
