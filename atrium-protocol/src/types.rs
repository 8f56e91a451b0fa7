//! Shared data types for the atrium protocol

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// Summary of one open tab, as shown in viewer tab bars
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabInfo {
    pub id: Uuid,
    pub name: String,
}

/// Metadata for a saved session transcript on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedSessionInfo {
    /// Session identifier (the transcript's file stem)
    pub id: String,
    /// Absolute path to the transcript file
    pub path: PathBuf,
    /// Display name stored in the transcript, if any
    pub name: Option<String>,
    /// Working directory the session ran in, if recorded
    pub cwd: Option<String>,
    /// Creation time (unix seconds)
    pub created_at: i64,
    /// Last modification time (unix seconds)
    pub modified_at: i64,
    /// Number of conversation messages in the transcript
    pub message_count: usize,
    /// First user message, for listing previews
    pub first_message: Option<String>,
}

/// One entry in a tab's ordered conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TranscriptEntry {
    /// A prompt submitted by a human
    User { text: String },
    /// An assistant turn, as ordered content segments
    Assistant { segments: Vec<ContentSegment> },
    /// The result of a tool invocation
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
}

/// One content segment within an assistant turn
///
/// Tool arguments travel as raw JSON text (`input_json`) so the bincode
/// frame never needs self-describing deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ContentSegment {
    Text { text: String },
    Thinking { text: String },
    ToolUse {
        id: String,
        name: String,
        input_json: String,
    },
}

/// Typed event emitted by an agent runtime while processing a turn
///
/// Forwarded to viewers verbatim, scoped to the tab that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RuntimeEvent {
    /// The runtime started processing a turn
    TurnStarted,
    /// Incremental assistant text
    TextDelta { text: String },
    /// Incremental reasoning text
    ThinkingDelta { text: String },
    /// The runtime began a tool invocation
    ToolUseStarted {
        id: String,
        name: String,
        input_json: String,
    },
    /// A tool invocation produced its result
    ToolResult {
        tool_use_id: String,
        content: String,
        is_error: bool,
    },
    /// The turn finished normally
    TurnCompleted { stop_reason: Option<String> },
    /// The turn was aborted before completion
    TurnAborted,
    /// The runtime reported an error
    RuntimeError { message: String },
}

/// What to do with a prompt submitted while a response is still streaming
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StreamingBehavior {
    /// Abort the in-flight response and start over with the new prompt
    Interrupt,
    /// Queue the prompt as a follow-up turn
    #[default]
    FollowUp,
}
