//! Configuration for the atrium server
//!
//! Loaded from `config.toml` in the XDG config dir; every field has a
//! default so a missing or partial file still yields a working config.

use std::path::PathBuf;

use serde::Deserialize;
use tracing::warn;

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Optional TCP listen address for remote viewers; the Unix socket is
    /// always bound
    pub listen_tcp: Option<String>,
    /// Directory holding saved session transcripts
    pub sessions_dir: Option<PathBuf>,
    /// How long a runtime-initiated UI request waits for a viewer reply
    /// before resolving to its default outcome
    pub ui_request_timeout_ms: u64,
    /// Agent runtime process settings
    pub agent: AgentConfig,
}

/// How to launch the agent runtime backing each tab
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Command to launch
    pub command: String,
    /// Arguments passed before any `--resume`
    pub args: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listen_tcp: None,
            sessions_dir: None,
            ui_request_timeout_ms: 60_000,
            agent: AgentConfig::default(),
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: "atrium-agent".to_string(),
            args: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load from the default config file, falling back to defaults
    ///
    /// A missing file is normal; an unparsable one is reported and
    /// ignored.
    pub fn load() -> Self {
        let path = atrium_utils::config_file();
        match std::fs::read_to_string(&path) {
            Ok(text) => Self::parse(&text, &path),
            Err(_) => Self::default(),
        }
    }

    fn parse(text: &str, path: &std::path::Path) -> Self {
        match toml::from_str(text) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Ignoring invalid config at {}: {}",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// The effective sessions directory
    pub fn sessions_dir(&self) -> PathBuf {
        self.sessions_dir
            .clone()
            .unwrap_or_else(atrium_utils::sessions_dir)
    }
}
