//! Agent runtime interface
//!
//! The runtime itself is an external collaborator: atrium only depends on
//! this seam. A runtime accepts prompts, emits typed events while it works,
//! exposes its accumulated conversation, and can be aborted or disposed.
//! [`process`] ships the production adapter that drives an external agent
//! process over line-delimited JSON on stdio.

pub mod process;

#[cfg(test)]
pub mod mock;

use std::path::Path;
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use atrium_protocol::{RuntimeEvent, TranscriptEntry};
use atrium_utils::Result;

use crate::correlator::{ask, AskOptions, Correlator};
use crate::registry::ClientRegistry;

/// One conversational agent engine, driving a single tab
///
/// All methods are non-blocking: `submit` returns once the prompt is
/// accepted (queued as a follow-up if a turn is already streaming), and
/// progress is observed purely through the event stream handed out at
/// construction time.
pub trait AgentRuntime: Send + Sync {
    /// Submit a prompt; starts a turn, or queues it behind the current one
    fn submit(&self, text: &str) -> Result<()>;

    /// Cooperatively stop the in-flight turn; idempotent when idle
    fn abort(&self);

    /// The full ordered conversation accumulated so far
    fn current_messages(&self) -> Vec<TranscriptEntry>;

    /// Whether a turn is currently streaming
    fn is_streaming(&self) -> bool;

    /// Model identifier, once known
    fn model_id(&self) -> Option<String>;

    /// Stable session identifier, once known
    fn session_id(&self) -> Option<String>;

    /// Release all resources and close the event stream
    fn dispose(&self);
}

/// A freshly constructed runtime plus its event stream
pub struct RuntimeSpawn {
    pub runtime: Arc<dyn AgentRuntime>,
    /// Receiving end of the runtime's typed event channel
    pub events: mpsc::Receiver<RuntimeEvent>,
    /// Display name recovered from a resumed transcript, if any
    pub stored_name: Option<String>,
}

/// Constructs agent runtimes, fresh or resumed from a saved transcript
pub trait RuntimeFactory: Send + Sync {
    fn spawn(&self, ui: Arc<UiGateway>, resume_from: Option<&Path>) -> Result<RuntimeSpawn>;
}

/// The extension-facing surface handed to every runtime
///
/// Lets a runtime put a question to the connected humans; requests go to
/// every viewer (never tab-scoped) and resolve to the reply, or to the
/// default outcome on timeout or cancellation.
pub struct UiGateway {
    correlator: Arc<Correlator>,
    registry: Arc<ClientRegistry>,
    /// Applied when the caller does not bound the wait itself
    default_timeout_ms: u64,
}

impl UiGateway {
    pub fn new(
        correlator: Arc<Correlator>,
        registry: Arc<ClientRegistry>,
        default_timeout_ms: u64,
    ) -> Self {
        Self {
            correlator,
            registry,
            default_timeout_ms,
        }
    }

    /// Ask a question whose reply is raw JSON text
    ///
    /// Resolves to `default` if no viewer answers within the default
    /// timeout or if `cancel` fires first.
    pub async fn ask_json(
        &self,
        method: &str,
        params_json: String,
        default: String,
        cancel: Option<CancellationToken>,
    ) -> String {
        ask(
            &self.correlator,
            &self.registry,
            method,
            params_json,
            AskOptions {
                timeout_ms: Some(self.default_timeout_ms),
                cancel,
            },
            default,
            |body| Some(body.to_string()),
        )
        .await
    }
}

impl std::fmt::Debug for UiGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UiGateway")
            .field("default_timeout_ms", &self.default_timeout_ms)
            .field("pending", &self.correlator.pending_count())
            .finish()
    }
}
