//! Saved-session storage
//!
//! Transcripts live as JSONL files under a base directory. Listing recovers
//! per-file metadata with a lenient line scan: unparsable lines are skipped,
//! never fatal, so a partially written transcript still lists.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{info, warn};

use atrium_protocol::SavedSessionInfo;
use atrium_utils::{AtriumError, Result};

/// File-system-backed saved-session store
pub struct SessionStore {
    base_dir: PathBuf,
}

impl SessionStore {
    /// Create a store backed by the given directory
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    /// The directory transcripts live under
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// List saved sessions, most recently modified first
    ///
    /// Files whose metadata cannot be read are skipped with a warning.
    pub fn list(&self) -> Result<Vec<SavedSessionInfo>> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }

        let mut sessions = Vec::new();
        for entry in std::fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("jsonl") {
                continue;
            }
            match scan_metadata(&path) {
                Ok(info) => sessions.push(info),
                Err(e) => warn!("Skipping unreadable transcript {}: {}", path.display(), e),
            }
        }

        sessions.sort_by_key(|s| std::cmp::Reverse(s.modified_at));
        Ok(sessions)
    }

    /// Resolve a caller-supplied path to a transcript inside the base dir
    ///
    /// Relative paths are taken relative to the base dir. Paths that
    /// resolve outside it are rejected.
    pub fn resolve(&self, path: &Path) -> Result<PathBuf> {
        let candidate = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        };

        let resolved = candidate.canonicalize().map_err(|source| AtriumError::FileRead {
            path: candidate.clone(),
            source,
        })?;
        let base = self.base_dir.canonicalize().map_err(|source| AtriumError::FileRead {
            path: self.base_dir.clone(),
            source,
        })?;

        if !resolved.starts_with(&base) {
            return Err(AtriumError::StoragePathOutsideBase(path.to_path_buf()));
        }
        Ok(resolved)
    }

    /// Delete a saved transcript
    pub fn delete(&self, path: &Path) -> Result<()> {
        let resolved = self.resolve(path)?;
        std::fs::remove_file(&resolved)?;
        info!("Deleted saved session {}", resolved.display());
        Ok(())
    }
}

/// Recover listing metadata from one transcript file
fn scan_metadata(path: &Path) -> Result<SavedSessionInfo> {
    let id = path
        .file_stem()
        .and_then(|s| s.to_str())
        .ok_or_else(|| AtriumError::storage(format!("bad transcript name: {}", path.display())))?
        .to_string();

    let file = File::open(path).map_err(|source| AtriumError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);

    let mut message_count = 0;
    let mut first_message = None;
    let mut name = None;
    let mut cwd = None;

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let Ok(value) = serde_json::from_str::<serde_json::Value>(&line) else {
            continue;
        };

        // Header lines carry session metadata; message lines carry a role
        if name.is_none() {
            name = value
                .get("name")
                .and_then(|v| v.as_str())
                .map(String::from);
        }
        if cwd.is_none() {
            cwd = value.get("cwd").and_then(|v| v.as_str()).map(String::from);
        }

        let role = value.get("role").and_then(|v| v.as_str());
        if role.is_some() {
            message_count += 1;
        }
        if first_message.is_none() && role == Some("user") {
            first_message = value
                .get("text")
                .and_then(|v| v.as_str())
                .map(String::from);
        }
    }

    let meta = std::fs::metadata(path)?;
    let modified_at = meta.modified().map(unix_secs).unwrap_or(0);
    // Creation time is unavailable on some filesystems; fall back to mtime
    let created_at = meta.created().map(unix_secs).unwrap_or(modified_at);

    Ok(SavedSessionInfo {
        id,
        path: path.to_path_buf(),
        name,
        cwd,
        created_at,
        modified_at,
        message_count,
        first_message,
    })
}

fn unix_secs(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
