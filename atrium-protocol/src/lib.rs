//! atrium-protocol: Shared IPC definitions for viewer-server communication
//!
//! This crate defines all message types and data structures used for
//! communication between atrium viewers and the server over Unix sockets
//! or TCP.

pub mod codec;
pub mod messages;
pub mod types;

// Re-export main types at crate root
pub use codec::{ClientCodec, CodecError, ServerCodec};
pub use messages::{ClientMessage, ErrorCode, ServerMessage};
pub use types::{
    ContentSegment, RuntimeEvent, SavedSessionInfo, StreamingBehavior, TabInfo, TranscriptEntry,
};

/// Current protocol version
pub const PROTOCOL_VERSION: u32 = 1;
