//! UI reply and keepalive handlers
//!
//! Handles: UiResponse, Ping

use tracing::debug;
use uuid::Uuid;

use atrium_protocol::ServerMessage;

use super::{HandlerContext, HandlerResult};

impl HandlerContext {
    /// Handle UiResponse - route a viewer's answer to the pending request
    ///
    /// Unmatched request IDs (already resolved, timed out, or cancelled)
    /// are dropped silently.
    pub fn handle_ui_response(&self, id: Uuid, body: String) -> HandlerResult {
        if self.correlator.resolve(id, body) {
            debug!("Client {} answered UI request {}", self.client_id, id);
        }
        HandlerResult::NoResponse
    }

    /// Handle Ping - simple keepalive response
    pub fn handle_ping(&self) -> HandlerResult {
        debug!("Received Ping from {}, sending Pong", self.client_id);
        HandlerResult::Response(ServerMessage::Pong)
    }
}
