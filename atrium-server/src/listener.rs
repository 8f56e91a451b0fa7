//! Socket accept loops
//!
//! The daemon always binds its Unix socket; a TCP listener is added when
//! configured. Both loops stop on the shutdown broadcast.

use std::path::PathBuf;

use tokio::net::{TcpListener, UnixListener};
use tracing::{debug, error, info};

use crate::connection::handle_client;
use crate::SharedState;

/// Run the Unix socket accept loop
pub async fn run_unix_accept_loop(path: PathBuf, shared_state: SharedState) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            error!("Failed to create runtime dir {}: {}", parent.display(), e);
            return;
        }
    }
    // A stale socket from a previous run blocks bind
    if path.exists() {
        let _ = std::fs::remove_file(&path);
    }

    let listener = match UnixListener::bind(&path) {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind Unix listener at {}: {}", path.display(), e);
            return;
        }
    };

    info!("Unix listener bound to {}", path.display());

    let mut shutdown_rx = shared_state.subscribe_shutdown();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, _addr)) => {
                        debug!("New Unix socket connection");
                        let state_clone = shared_state.clone();
                        tokio::spawn(async move {
                            handle_client(stream, state_clone).await;
                        });
                    }
                    Err(e) => {
                        error!("Unix accept error: {}", e);
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, stopping Unix accept loop");
                break;
            }
        }
    }

    let _ = std::fs::remove_file(&path);
}

/// Run the TCP accept loop
pub async fn run_tcp_accept_loop(addr: String, shared_state: SharedState) {
    let listener = match TcpListener::bind(&addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind TCP listener to {}: {}", addr, e);
            return;
        }
    };

    info!("TCP listener bound to {}", addr);

    let mut shutdown_rx = shared_state.subscribe_shutdown();

    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, peer_addr)) => {
                        debug!("New TCP connection from {}", peer_addr);
                        let state_clone = shared_state.clone();
                        tokio::spawn(async move {
                            handle_client(stream, state_clone).await;
                        });
                    }
                    Err(e) => {
                        error!("TCP accept error: {}", e);
                    }
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received, stopping TCP accept loop");
                break;
            }
        }
    }
}
