//! Saved-session handlers
//!
//! Handles: ListSessions, OpenSession, DeleteSession

use std::path::PathBuf;

use tracing::{error, info};

use atrium_protocol::{ErrorCode, ServerMessage};

use super::{HandlerContext, HandlerResult};

impl HandlerContext {
    /// Handle ListSessions - saved sessions available to open
    ///
    /// Sessions whose identifier matches a currently open tab are excluded:
    /// they are already on screen.
    pub async fn handle_list_sessions(&self) -> HandlerResult {
        let open_ids = self.tabs.read().await.open_session_ids();

        match self.store.list() {
            Ok(sessions) => {
                let sessions = sessions
                    .into_iter()
                    .filter(|s| !open_ids.contains(&s.id))
                    .collect();
                HandlerResult::Response(ServerMessage::SessionsList { sessions })
            }
            Err(e) => {
                error!("Failed to list saved sessions: {}", e);
                Self::error(ErrorCode::StorageFailure, e.to_string())
            }
        }
    }

    /// Handle OpenSession - resume a saved session as a new tab
    pub async fn handle_open_session(&self, session_path: PathBuf) -> HandlerResult {
        let path = match self.store.resolve(&session_path) {
            Ok(path) => path,
            Err(e) => return Self::error(ErrorCode::StorageFailure, e.to_string()),
        };

        match self.open_tab(None, Some(&path)).await {
            Ok(tab_id) => {
                info!(
                    "Client {} opened saved session {} as tab {}",
                    self.client_id,
                    path.display(),
                    tab_id
                );
                self.registry.bind(self.client_id, tab_id);
                self.broadcast_tabs().await;
                self.sync_response(tab_id).await
            }
            Err(e) => {
                error!("Failed to resume session {}: {}", path.display(), e);
                Self::error(ErrorCode::RuntimeSpawnFailed, e.to_string())
            }
        }
    }

    /// Handle DeleteSession
    ///
    /// Deleting a session that is currently open first runs the close-tab
    /// flow for its tab (last-tab protection still applies; the transcript
    /// is deleted either way), then deletes and returns the refreshed list.
    pub async fn handle_delete_session(&self, session_path: PathBuf) -> HandlerResult {
        let path = match self.store.resolve(&session_path) {
            Ok(path) => path,
            Err(e) => return Self::error(ErrorCode::StorageFailure, e.to_string()),
        };

        let session_id = path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(String::from);

        if let Some(session_id) = session_id {
            let open_tab = self.tabs.read().await.find_by_session_id(&session_id);
            if let Some(tab_id) = open_tab {
                // Close flow first; a sole-tab refusal leaves it running
                let _ = self.handle_close_tab(tab_id).await;
            }
        }

        match self.store.delete(&path) {
            Ok(()) => self.handle_list_sessions().await,
            Err(e) => {
                error!("Failed to delete session {}: {}", path.display(), e);
                Self::error(ErrorCode::StorageFailure, e.to_string())
            }
        }
    }
}
