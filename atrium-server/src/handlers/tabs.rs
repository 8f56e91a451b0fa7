//! Tab lifecycle handlers
//!
//! Handles: NewSession, SwitchSession, CloseTab

use std::path::Path;
use std::sync::Arc;

use tracing::{error, info};
use uuid::Uuid;

use atrium_protocol::{ErrorCode, ServerMessage};
use atrium_utils::Result;

use crate::registry::{ClientId, ClientRegistry};
use crate::runtime::RuntimeSpawn;
use crate::session::{self, CloseTab, SessionHandle, TabRegistry};
use crate::sync::build_sync;

use super::{HandlerContext, HandlerResult};

impl HandlerContext {
    /// Construct a runtime and register it as a new tab
    ///
    /// The runtime is built before the registry is touched: a construction
    /// failure registers nothing.
    pub(crate) async fn open_tab(
        &self,
        name_hint: Option<String>,
        resume_from: Option<&Path>,
    ) -> Result<Uuid> {
        let spawn = self.factory.spawn(Arc::clone(&self.ui), resume_from)?;
        let mut tabs = self.tabs.write().await;
        Ok(register_tab(&mut tabs, &self.registry, spawn, name_hint))
    }

    /// Handle NewSession - open a fresh tab and switch the requester to it
    pub async fn handle_new_session(&self) -> HandlerResult {
        match self.open_tab(None, None).await {
            Ok(tab_id) => {
                info!("Client {} opened new tab {}", self.client_id, tab_id);
                self.registry.bind(self.client_id, tab_id);
                self.broadcast_tabs().await;
                self.sync_response(tab_id).await
            }
            Err(e) => {
                error!("Failed to create tab: {}", e);
                Self::error(ErrorCode::RuntimeSpawnFailed, e.to_string())
            }
        }
    }

    /// Handle SwitchSession - rebind the requester if the tab exists
    pub async fn handle_switch_session(&self, tab_id: Uuid) -> HandlerResult {
        if !self.tabs.read().await.contains(tab_id) {
            return Self::error(ErrorCode::TabNotFound, format!("Tab {} not found", tab_id));
        }

        self.registry.bind(self.client_id, tab_id);
        self.sync_response(tab_id).await
    }

    /// Handle CloseTab
    ///
    /// On success, every connection watching the closed tab is rebound to
    /// the replacement and individually state-synced; the updated tab list
    /// goes to all connections.
    pub async fn handle_close_tab(&self, tab_id: Uuid) -> HandlerResult {
        let outcome = self.tabs.write().await.close(tab_id);

        match outcome {
            CloseTab::NotFound => {
                Self::error(ErrorCode::TabNotFound, format!("Tab {} not found", tab_id))
            }
            CloseTab::Refused => Self::error(
                ErrorCode::LastTabProtected,
                "Cannot close the last remaining tab",
            ),
            CloseTab::Closed { replacement } => {
                self.broadcast_tabs().await;

                for client in self.registry.watchers_of(tab_id) {
                    self.registry.bind(client, replacement);
                    self.send_sync(client, replacement).await;
                }

                HandlerResult::NoResponse
            }
        }
    }

    /// Broadcast the current tab list to every connection
    pub(crate) async fn broadcast_tabs(&self) {
        let tabs = self.tabs.read().await.list();
        self.registry
            .broadcast_to_all(ServerMessage::TabsUpdate { tabs });
    }

    /// State-sync the requester against a tab, as this handler's response
    pub(crate) async fn sync_response(&self, tab_id: Uuid) -> HandlerResult {
        let tabs = self.tabs.read().await;
        match tabs.get(tab_id) {
            Some(handle) => HandlerResult::Response(build_sync(handle)),
            None => Self::error(ErrorCode::TabNotFound, format!("Tab {} not found", tab_id)),
        }
    }

    /// State-sync an arbitrary connection against a tab
    pub(crate) async fn send_sync(&self, client: ClientId, tab_id: Uuid) {
        let tabs = self.tabs.read().await;
        if let Some(handle) = tabs.get(tab_id) {
            self.registry.try_send_to_client(client, build_sync(handle));
        }
    }
}

/// Register a constructed runtime under a fresh tab ID
///
/// Display name priority: explicit hint, then the resumed session's stored
/// name, then the incrementing "Session N" default. Also wires the
/// runtime's event stream into tab-scoped broadcast.
pub(crate) fn register_tab(
    tabs: &mut TabRegistry,
    registry: &Arc<ClientRegistry>,
    spawn: RuntimeSpawn,
    name_hint: Option<String>,
) -> Uuid {
    let id = Uuid::new_v4();
    let ordinal = tabs.next_ordinal();
    let name = name_hint
        .or(spawn.stored_name)
        .unwrap_or_else(|| format!("Session {}", ordinal));

    tabs.insert(SessionHandle::new(id, name, spawn.runtime, ordinal));
    session::spawn_event_forwarder(Arc::clone(registry), id, spawn.events);
    id
}

#[cfg(test)]
mod tests {
    use super::super::test_support::create_test_harness;
    use super::*;
    use atrium_protocol::TabInfo;

    fn expect_sync_tab(result: HandlerResult) -> Uuid {
        match result {
            HandlerResult::Response(ServerMessage::StateSync { tab_id, .. }) => tab_id,
            HandlerResult::Response(other) => panic!("Expected StateSync, got {:?}", other),
            HandlerResult::NoResponse => panic!("Expected StateSync, got no response"),
        }
    }

    #[tokio::test]
    async fn test_new_session_binds_and_syncs() {
        let mut harness = create_test_harness();

        let result = harness.ctx.handle_new_session().await;
        let tab_id = expect_sync_tab(result);

        assert_eq!(
            harness.ctx.registry.watched_tab(harness.ctx.client_id),
            Some(tab_id)
        );

        // The tab list went out to every connection, named by default
        match harness.rx.recv().await.unwrap() {
            ServerMessage::TabsUpdate { tabs } => {
                assert_eq!(
                    tabs,
                    vec![TabInfo {
                        id: tab_id,
                        name: "Session 1".to_string()
                    }]
                );
            }
            other => panic!("Expected TabsUpdate, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_new_session_spawn_failure_registers_nothing() {
        let mut harness = create_test_harness();
        harness.factory.set_fail(true);

        let result = harness.ctx.handle_new_session().await;

        match result {
            HandlerResult::Response(ServerMessage::Error { code, .. }) => {
                assert_eq!(code, ErrorCode::RuntimeSpawnFailed);
            }
            _ => panic!("Expected RuntimeSpawnFailed error"),
        }

        assert!(harness.ctx.tabs.read().await.is_empty());
        // No tab list update, no sync
        assert!(harness.rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_switch_session() {
        let harness = create_test_harness();
        let first = harness.ctx.open_tab(None, None).await.unwrap();
        let second = harness.ctx.open_tab(None, None).await.unwrap();
        harness.ctx.registry.bind(harness.ctx.client_id, first);

        let result = harness.ctx.handle_switch_session(second).await;

        assert_eq!(expect_sync_tab(result), second);
        assert_eq!(
            harness.ctx.registry.watched_tab(harness.ctx.client_id),
            Some(second)
        );
    }

    #[tokio::test]
    async fn test_switch_to_nonexistent_tab_rejected() {
        let harness = create_test_harness();
        let first = harness.ctx.open_tab(None, None).await.unwrap();
        harness.ctx.registry.bind(harness.ctx.client_id, first);

        let result = harness.ctx.handle_switch_session(Uuid::new_v4()).await;

        match result {
            HandlerResult::Response(ServerMessage::Error { code, .. }) => {
                assert_eq!(code, ErrorCode::TabNotFound);
            }
            _ => panic!("Expected TabNotFound error"),
        }
        // Binding unchanged
        assert_eq!(
            harness.ctx.registry.watched_tab(harness.ctx.client_id),
            Some(first)
        );
    }

    #[tokio::test]
    async fn test_close_sole_tab_refused() {
        let harness = create_test_harness();
        let only = harness.ctx.open_tab(None, None).await.unwrap();

        let result = harness.ctx.handle_close_tab(only).await;

        match result {
            HandlerResult::Response(ServerMessage::Error { code, .. }) => {
                assert_eq!(code, ErrorCode::LastTabProtected);
            }
            _ => panic!("Expected LastTabProtected error"),
        }
        assert_eq!(harness.ctx.tabs.read().await.len(), 1);
    }

    #[tokio::test]
    async fn test_close_rebinds_watchers_to_replacement() {
        let mut harness = create_test_harness();
        let first = harness.ctx.open_tab(None, None).await.unwrap();
        let second = harness.ctx.open_tab(None, None).await.unwrap();

        // Requester watches the first tab; a second viewer watches it too
        harness.ctx.registry.bind(harness.ctx.client_id, first);
        let (other_ctx, mut other_rx) = harness.connect_client();
        harness.ctx.registry.bind(other_ctx.client_id, first);

        let result = harness.ctx.handle_close_tab(first).await;
        assert!(matches!(result, HandlerResult::NoResponse));

        // Both watchers were rebound to the remaining tab
        assert_eq!(
            harness.ctx.registry.watched_tab(harness.ctx.client_id),
            Some(second)
        );
        assert_eq!(
            harness.ctx.registry.watched_tab(other_ctx.client_id),
            Some(second)
        );

        // Each received the updated tab list, then a fresh sync
        match harness.rx.recv().await.unwrap() {
            ServerMessage::TabsUpdate { tabs } => assert_eq!(tabs.len(), 1),
            other => panic!("Expected TabsUpdate, got {:?}", other),
        }
        match harness.rx.recv().await.unwrap() {
            ServerMessage::StateSync { tab_id, .. } => assert_eq!(tab_id, second),
            other => panic!("Expected StateSync, got {:?}", other),
        }

        other_rx.recv().await.unwrap(); // TabsUpdate
        match other_rx.recv().await.unwrap() {
            ServerMessage::StateSync { tab_id, .. } => assert_eq!(tab_id, second),
            other => panic!("Expected StateSync, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_close_leaves_other_bindings_alone() {
        let harness = create_test_harness();
        let _first = harness.ctx.open_tab(None, None).await.unwrap();
        let second = harness.ctx.open_tab(None, None).await.unwrap();
        let third = harness.ctx.open_tab(None, None).await.unwrap();

        harness.ctx.registry.bind(harness.ctx.client_id, third);

        harness.ctx.handle_close_tab(second).await;

        assert_eq!(
            harness.ctx.registry.watched_tab(harness.ctx.client_id),
            Some(third)
        );
    }

    /// Full lifecycle: create, protected close, second tab, close first
    #[tokio::test]
    async fn test_tab_lifecycle_scenario() {
        let mut harness = create_test_harness();

        // Create tab: registry has one entry named "Session 1"
        let first = expect_sync_tab(harness.ctx.handle_new_session().await);
        {
            let tabs = harness.ctx.tabs.read().await;
            assert_eq!(tabs.len(), 1);
            assert_eq!(tabs.list()[0].name, "Session 1");
        }

        // Closing it is refused: still one entry
        harness.ctx.handle_close_tab(first).await;
        assert_eq!(harness.ctx.tabs.read().await.len(), 1);

        // Second tab: two entries, in creation order
        let second = expect_sync_tab(harness.ctx.handle_new_session().await);
        {
            let tabs = harness.ctx.tabs.read().await;
            let ids: Vec<Uuid> = tabs.list().iter().map(|t| t.id).collect();
            assert_eq!(ids, vec![first, second]);
        }

        // Close the first: one entry remains (the second), and the
        // requester, previously bound to the first, gets a fresh sync
        harness.ctx.registry.bind(harness.ctx.client_id, first);
        harness.ctx.handle_close_tab(first).await;

        {
            let tabs = harness.ctx.tabs.read().await;
            assert_eq!(tabs.len(), 1);
            assert_eq!(tabs.first(), Some(second));
        }

        let mut synced = None;
        while let Ok(msg) = harness.rx.try_recv() {
            if let ServerMessage::StateSync { tab_id, .. } = msg {
                synced = Some(tab_id);
            }
        }
        assert_eq!(synced, Some(second));
    }
}
