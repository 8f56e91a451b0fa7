//! XDG base-directory helpers
//!
//! All atrium state lives under the standard per-user directories: runtime
//! (socket), config, state (logs), and data (saved session transcripts).

use directories::ProjectDirs;
use std::path::PathBuf;

const APP_NAME: &str = "atrium";

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", APP_NAME)
}

/// Runtime directory: `$XDG_RUNTIME_DIR/atrium`, else a uid-scoped tmp dir
pub fn runtime_dir() -> PathBuf {
    match std::env::var("XDG_RUNTIME_DIR") {
        Ok(base) => PathBuf::from(base).join(APP_NAME),
        Err(_) => {
            // SAFETY: getuid() is always safe to call
            let uid = unsafe { libc::getuid() };
            PathBuf::from(format!("/tmp/{APP_NAME}-{uid}"))
        }
    }
}

/// The daemon's Unix socket, under [`runtime_dir`]
pub fn socket_path() -> PathBuf {
    runtime_dir().join("atrium.sock")
}

/// Config directory: `$XDG_CONFIG_HOME/atrium`
pub fn config_dir() -> PathBuf {
    match project_dirs() {
        Some(dirs) => dirs.config_dir().to_path_buf(),
        None => PathBuf::from(".config").join(APP_NAME),
    }
}

/// The `config.toml` the server reads at startup
pub fn config_file() -> PathBuf {
    config_dir().join("config.toml")
}

/// State directory: `$XDG_STATE_HOME/atrium`
pub fn state_dir() -> PathBuf {
    project_dirs()
        .and_then(|dirs| dirs.state_dir().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(".local/state").join(APP_NAME))
}

/// Log directory, under [`state_dir`]
pub fn log_dir() -> PathBuf {
    state_dir().join("log")
}

/// Where saved session transcripts live: `$XDG_DATA_HOME/atrium/sessions`
pub fn sessions_dir() -> PathBuf {
    let data = match project_dirs() {
        Some(dirs) => dirs.data_local_dir().to_path_buf(),
        None => PathBuf::from(".local/share").join(APP_NAME),
    };
    data.join("sessions")
}
