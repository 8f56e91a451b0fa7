//! Prompt handlers
//!
//! Handles: Prompt, Abort

use tracing::{debug, error};

use atrium_protocol::{ErrorCode, StreamingBehavior};

use super::{HandlerContext, HandlerResult};

impl HandlerContext {
    /// Handle Prompt - forward to the bound tab's runtime
    ///
    /// Never waits for the response to complete: the dispatcher only hands
    /// the prompt off, and progress flows back through the tab's event
    /// stream.
    pub async fn handle_prompt(
        &self,
        message: String,
        behavior: Option<StreamingBehavior>,
    ) -> HandlerResult {
        let Some(tab_id) = self.resolved_tab().await else {
            return Self::error(ErrorCode::InvalidOperation, "No tab available");
        };

        let tabs = self.tabs.read().await;
        let Some(handle) = tabs.get(tab_id) else {
            return Self::error(ErrorCode::TabNotFound, format!("Tab {} not found", tab_id));
        };

        debug!(
            "Client {} prompting tab {} ({} chars)",
            self.client_id,
            tab_id,
            message.len()
        );

        match handle.submit(&message, behavior.unwrap_or_default()) {
            Ok(()) => HandlerResult::NoResponse,
            Err(e) => {
                error!("Prompt submission to tab {} failed: {}", tab_id, e);
                Self::error(ErrorCode::InternalError, e.to_string())
            }
        }
    }

    /// Handle Abort - stop the bound tab's in-flight response
    ///
    /// Idempotent: aborting an idle tab does nothing.
    pub async fn handle_abort(&self) -> HandlerResult {
        if let Some(tab_id) = self.resolved_tab().await {
            let tabs = self.tabs.read().await;
            if let Some(handle) = tabs.get(tab_id) {
                debug!("Client {} aborting tab {}", self.client_id, tab_id);
                handle.abort();
            }
        }
        HandlerResult::NoResponse
    }
}
