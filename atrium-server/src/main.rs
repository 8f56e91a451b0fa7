//! atrium server - Background daemon
//!
//! Multiplexes long-running conversational-agent sessions ("tabs") to any
//! number of viewer connections, with per-viewer visibility scoping.

use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tracing::{error, info};

use atrium_utils::Result;

mod config;
mod connection;
mod correlator;
mod handlers;
mod listener;
mod registry;
mod runtime;
mod session;
mod storage;
mod sync;

use config::AppConfig;
use correlator::Correlator;
use handlers::HandlerContext;
use registry::{ClientId, ClientRegistry};
use runtime::process::ProcessRuntimeFactory;
use runtime::{RuntimeFactory, UiGateway};
use session::TabRegistry;
use storage::SessionStore;

/// Shared server state handed to every connection task
///
/// The tab registry, client registry, and pending-request table are the
/// only shared mutable state; the first is serialized by its lock, the
/// other two are internally synchronized.
#[derive(Clone)]
pub struct SharedState {
    /// The open tabs
    pub tabs: Arc<RwLock<TabRegistry>>,
    /// Connection registry and broadcast router
    pub registry: Arc<ClientRegistry>,
    /// Outstanding runtime-initiated UI requests
    pub correlator: Arc<Correlator>,
    /// Saved-session storage
    pub store: Arc<SessionStore>,
    /// Constructs agent runtimes
    pub factory: Arc<dyn RuntimeFactory>,
    /// Extension-facing surface for runtimes
    pub ui: Arc<UiGateway>,
    /// Shutdown broadcast
    pub shutdown_tx: broadcast::Sender<()>,
}

impl SharedState {
    /// Assemble fresh server state
    pub fn new(
        factory: Arc<dyn RuntimeFactory>,
        store: SessionStore,
        ui_request_timeout_ms: u64,
    ) -> Self {
        let registry = Arc::new(ClientRegistry::new());
        let correlator = Arc::new(Correlator::new());
        let ui = Arc::new(UiGateway::new(
            Arc::clone(&correlator),
            Arc::clone(&registry),
            ui_request_timeout_ms,
        ));
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            tabs: Arc::new(RwLock::new(TabRegistry::new())),
            registry,
            correlator,
            store: Arc::new(store),
            factory,
            ui,
            shutdown_tx,
        }
    }

    /// Subscribe to the shutdown broadcast
    pub fn subscribe_shutdown(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Build a handler context for one connection
    pub fn handler_for(&self, client_id: ClientId) -> HandlerContext {
        HandlerContext::new(
            Arc::clone(&self.tabs),
            Arc::clone(&self.registry),
            Arc::clone(&self.correlator),
            Arc::clone(&self.store),
            Arc::clone(&self.factory),
            Arc::clone(&self.ui),
            client_id,
        )
    }
}

/// Run the main server daemon
async fn run_daemon() -> Result<()> {
    info!("atrium server starting");

    let app_config = AppConfig::load();

    let factory: Arc<dyn RuntimeFactory> = Arc::new(ProcessRuntimeFactory::new(
        app_config.agent.command.clone(),
        app_config.agent.args.clone(),
    ));
    let store = SessionStore::new(app_config.sessions_dir());
    let state = SharedState::new(factory, store, app_config.ui_request_timeout_ms);

    let unix_loop = tokio::spawn(listener::run_unix_accept_loop(
        atrium_utils::socket_path(),
        state.clone(),
    ));

    let tcp_loop = app_config.listen_tcp.clone().map(|addr| {
        tokio::spawn(listener::run_tcp_accept_loop(addr, state.clone()))
    });

    // Run until interrupted
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Interrupt received, shutting down"),
        Err(e) => error!("Failed to listen for shutdown signal: {}", e),
    }

    let _ = state.shutdown_tx.send(());
    let _ = unix_loop.await;
    if let Some(tcp_loop) = tcp_loop {
        let _ = tcp_loop.await;
    }

    // Release every tab's runtime before exiting
    state.tabs.write().await.dispose_all();

    info!("atrium server stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    atrium_utils::init_logging()?;
    run_daemon().await
}
