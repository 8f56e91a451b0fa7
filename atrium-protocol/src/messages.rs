//! Viewer-server message types

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

use crate::types::*;

/// Messages sent from a viewer to the server
///
/// The command surface is a closed enum: anything that does not decode into
/// one of these cases is rejected at the framing boundary, never dispatched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    /// Submit a prompt to the tab this connection is watching
    Prompt {
        message: String,
        behavior: Option<StreamingBehavior>,
    },

    /// Abort the watched tab's in-flight response
    Abort,

    /// Open a fresh tab and switch this connection to it
    NewSession,

    /// Switch this connection to an existing tab
    SwitchSession { tab_id: Uuid },

    /// Close a tab
    CloseTab { tab_id: Uuid },

    /// List saved sessions available to open
    ListSessions,

    /// Open a saved session as a new tab and switch to it
    OpenSession { session_path: PathBuf },

    /// Delete a saved session from storage
    DeleteSession { session_path: PathBuf },

    /// Answer an outstanding UI request from a runtime
    ///
    /// `body` is the reply payload as raw JSON text.
    UiResponse { id: Uuid, body: String },

    /// Ping for keepalive
    Ping,
}

/// Messages sent from the server to viewers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    /// The current tab list, in creation order (sent to every connection)
    TabsUpdate { tabs: Vec<TabInfo> },

    /// Full state of one tab, for the receiving connection to rebuild its
    /// view from scratch (sent only to the connection being synced)
    ///
    /// A receiver must discard a sync whose `tab_id` is not the tab it
    /// currently intends to watch.
    StateSync {
        tab_id: Uuid,
        messages: Vec<TranscriptEntry>,
        streaming: bool,
        model_id: Option<String>,
        session_id: Option<String>,
    },

    /// Saved sessions available to open (sent only to the requester)
    SessionsList { sessions: Vec<SavedSessionInfo> },

    /// A runtime-initiated question for a human; any viewer may answer
    /// (sent to every connection)
    UiRequest {
        id: Uuid,
        method: String,
        params_json: String,
    },

    /// A runtime event, delivered only to connections watching `tab_id`
    Event { tab_id: Uuid, event: RuntimeEvent },

    /// Error response
    Error { code: ErrorCode, message: String },

    /// Pong response to ping
    Pong,
}

/// Error codes for protocol errors
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    TabNotFound,
    LastTabProtected,
    RuntimeSpawnFailed,
    StorageFailure,
    InvalidOperation,
    InternalError,
}
