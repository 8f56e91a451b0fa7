//! The unified error type shared by all atrium crates

use std::path::PathBuf;

/// Failures surfaced by atrium operations
///
/// Tab and runtime variants cover the session-multiplexing core; the rest
/// cover the collaborators (storage, config) and plain IO.
#[derive(Debug, thiserror::Error)]
pub enum AtriumError {
    #[error("Tab not found: {0}")]
    TabNotFound(String),

    #[error("Cannot close the last remaining tab")]
    LastTabProtected,

    #[error("Agent runtime error: {0}")]
    Runtime(String),

    #[error("Failed to spawn agent runtime: {0}")]
    RuntimeSpawn(String),

    #[error("Session storage error: {0}")]
    Storage(String),

    #[error("Path escapes session directory: {0}")]
    StoragePathOutsideBase(PathBuf),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write file {path}: {source}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AtriumError {
    pub fn runtime(msg: impl Into<String>) -> Self {
        Self::Runtime(msg.into())
    }

    pub fn runtime_spawn(msg: impl Into<String>) -> Self {
        Self::RuntimeSpawn(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, AtriumError>;
