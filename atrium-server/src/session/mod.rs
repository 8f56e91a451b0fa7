//! Session management: tab handles and the tab registry

mod handle;
mod tabs;

pub use handle::SessionHandle;
pub use tabs::{CloseTab, TabRegistry};

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use atrium_protocol::{RuntimeEvent, ServerMessage};

use crate::registry::ClientRegistry;

/// Forward a runtime's event stream to the connections watching its tab.
///
/// The task ends when the runtime closes its event channel, which happens
/// on dispose; events already queued at abort time are still delivered.
pub fn spawn_event_forwarder(
    registry: Arc<ClientRegistry>,
    tab_id: Uuid,
    mut events: mpsc::Receiver<RuntimeEvent>,
) {
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            registry.broadcast_to_tab(tab_id, ServerMessage::Event { tab_id, event });
        }
        debug!("Event stream for tab {} closed", tab_id);
    });
}
