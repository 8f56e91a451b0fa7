//! Message handlers for viewer commands
//!
//! This module provides the complete dispatch layer that routes incoming
//! `ClientMessage` types to appropriate handlers and responds with
//! `ServerMessage` types.

mod prompt;
mod saved;
mod tabs;
mod ui;

pub(crate) use tabs::register_tab;

use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;

use atrium_protocol::{ClientMessage, ErrorCode, ServerMessage};

use crate::correlator::Correlator;
use crate::registry::{ClientId, ClientRegistry};
use crate::runtime::{RuntimeFactory, UiGateway};
use crate::session::TabRegistry;
use crate::storage::SessionStore;

/// Context for message handlers
///
/// Provides access to all server state needed to handle one connection's
/// commands. Commands from the same connection are dispatched in arrival
/// order by the connection task; tab mutations are serialized by the
/// registry lock.
pub struct HandlerContext {
    /// The open tabs
    pub tabs: Arc<RwLock<TabRegistry>>,
    /// Client connection registry for bindings and broadcasting
    pub registry: Arc<ClientRegistry>,
    /// Outstanding runtime-initiated UI requests
    pub correlator: Arc<Correlator>,
    /// Saved-session storage
    pub store: Arc<SessionStore>,
    /// Constructs agent runtimes for new tabs
    pub factory: Arc<dyn RuntimeFactory>,
    /// Extension-facing surface handed to new runtimes
    pub ui: Arc<UiGateway>,
    /// The client making this request
    pub client_id: ClientId,
}

/// Result of handling a message
pub enum HandlerResult {
    /// Single response to send back to the requesting client
    Response(ServerMessage),
    /// No response needed (fire-and-forget commands)
    NoResponse,
}

impl HandlerContext {
    /// Create a new handler context
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        tabs: Arc<RwLock<TabRegistry>>,
        registry: Arc<ClientRegistry>,
        correlator: Arc<Correlator>,
        store: Arc<SessionStore>,
        factory: Arc<dyn RuntimeFactory>,
        ui: Arc<UiGateway>,
        client_id: ClientId,
    ) -> Self {
        Self {
            tabs,
            registry,
            correlator,
            store,
            factory,
            ui,
            client_id,
        }
    }

    /// Route a client message to the appropriate handler
    pub async fn route_message(&self, msg: ClientMessage) -> HandlerResult {
        match msg {
            // Prompt handlers
            ClientMessage::Prompt { message, behavior } => {
                self.handle_prompt(message, behavior).await
            }

            ClientMessage::Abort => self.handle_abort().await,

            // Tab handlers
            ClientMessage::NewSession => self.handle_new_session().await,

            ClientMessage::SwitchSession { tab_id } => self.handle_switch_session(tab_id).await,

            ClientMessage::CloseTab { tab_id } => self.handle_close_tab(tab_id).await,

            // Saved-session handlers
            ClientMessage::ListSessions => self.handle_list_sessions().await,

            ClientMessage::OpenSession { session_path } => {
                self.handle_open_session(session_path).await
            }

            ClientMessage::DeleteSession { session_path } => {
                self.handle_delete_session(session_path).await
            }

            // UI reply handler
            ClientMessage::UiResponse { id, body } => self.handle_ui_response(id, body),

            ClientMessage::Ping => self.handle_ping(),
        }
    }

    /// Create an error response
    pub fn error(code: ErrorCode, message: impl Into<String>) -> HandlerResult {
        HandlerResult::Response(ServerMessage::Error {
            code,
            message: message.into(),
        })
    }

    /// Resolve the tab this connection is bound to
    ///
    /// Falls back to the first tab in registry order (repairing the
    /// binding) when the connection has no binding or a stale one.
    /// Returns `None` only when the registry is empty.
    pub(crate) async fn resolved_tab(&self) -> Option<Uuid> {
        let bound = self.registry.watched_tab(self.client_id);
        let tabs = self.tabs.read().await;

        match bound {
            Some(id) if tabs.contains(id) => Some(id),
            _ => {
                let first = tabs.first()?;
                drop(tabs);
                self.registry.bind(self.client_id, first);
                Some(first)
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::create_test_harness;
    use super::*;

    #[tokio::test]
    async fn test_route_ping() {
        let harness = create_test_harness();
        let result = harness.ctx.route_message(ClientMessage::Ping).await;

        match result {
            HandlerResult::Response(ServerMessage::Pong) => {}
            _ => panic!("Expected Pong response"),
        }
    }

    #[tokio::test]
    async fn test_resolved_tab_empty_registry() {
        let harness = create_test_harness();
        assert!(harness.ctx.resolved_tab().await.is_none());
    }

    #[tokio::test]
    async fn test_resolved_tab_falls_back_to_first_and_repairs_binding() {
        let harness = create_test_harness();
        let tab_id = harness.ctx.open_tab(None, None).await.unwrap();

        // No binding yet: falls back to the first tab and binds
        assert_eq!(harness.ctx.resolved_tab().await, Some(tab_id));
        assert_eq!(
            harness.ctx.registry.watched_tab(harness.ctx.client_id),
            Some(tab_id)
        );
    }

    #[tokio::test]
    async fn test_resolved_tab_stale_binding_repaired() {
        let harness = create_test_harness();
        let tab_id = harness.ctx.open_tab(None, None).await.unwrap();

        // Bind to a tab that no longer exists
        harness
            .ctx
            .registry
            .bind(harness.ctx.client_id, Uuid::new_v4());

        assert_eq!(harness.ctx.resolved_tab().await, Some(tab_id));
    }

    #[tokio::test]
    async fn test_error_helper() {
        let result = HandlerContext::error(ErrorCode::TabNotFound, "Tab not found");

        match result {
            HandlerResult::Response(ServerMessage::Error { code, message }) => {
                assert_eq!(code, ErrorCode::TabNotFound);
                assert_eq!(message, "Tab not found");
            }
            _ => panic!("Expected Error response"),
        }
    }
}
