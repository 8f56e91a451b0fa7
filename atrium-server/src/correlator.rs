//! Request/response correlation for runtime-initiated UI questions
//!
//! An agent runtime sometimes needs a human answer mid-turn (confirmations,
//! selections, free-form prompts). Requests are broadcast to every
//! connection (never tab-scoped, any viewer may answer) and the asking
//! task suspends until exactly one of: a matching reply, the configured
//! timeout, or upstream cancellation.

use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

use atrium_protocol::ServerMessage;

use crate::registry::ClientRegistry;

/// Table of outstanding UI requests awaiting a reply
#[derive(Debug, Default)]
pub struct Correlator {
    /// Request ID -> reply channel
    pending: DashMap<Uuid, oneshot::Sender<String>>,
}

impl Correlator {
    /// Create an empty correlator
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh pending request
    pub fn register(&self) -> (Uuid, oneshot::Receiver<String>) {
        let id = Uuid::new_v4();
        let (tx, rx) = oneshot::channel();
        self.pending.insert(id, tx);
        (id, rx)
    }

    /// Deliver a reply to the pending request with this ID
    ///
    /// The entry is removed before the reply is sent, so a request resolves
    /// at most once: duplicate or late replies find no entry and are
    /// dropped silently.
    pub fn resolve(&self, id: Uuid, body: String) -> bool {
        match self.pending.remove(&id) {
            Some((_, tx)) => tx.send(body).is_ok(),
            None => {
                debug!("Dropping reply for unknown request {}", id);
                false
            }
        }
    }

    /// Discard a pending request without resolving it
    pub fn discard(&self, id: Uuid) {
        self.pending.remove(&id);
    }

    /// Number of outstanding requests
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

/// Bounds on how long an ask may stay outstanding
#[derive(Debug, Default, Clone)]
pub struct AskOptions {
    /// Resolve to the default outcome after this long with no reply
    pub timeout_ms: Option<u64>,
    /// Resolve to the default outcome when this fires
    pub cancel: Option<CancellationToken>,
}

/// Ask the connected viewers a question and suspend until it resolves
///
/// Resolution sources, exactly one wins: a reply bearing the matching
/// request ID (run through `parse`), the timeout, or the cancellation
/// signal. The losing sources are disarmed: the pending entry is removed on
/// every path, so a late reply or a timer firing after cancellation has no
/// further effect. A reply that `parse` rejects yields the default outcome.
pub async fn ask<T, F>(
    correlator: &Correlator,
    registry: &ClientRegistry,
    method: &str,
    params_json: String,
    opts: AskOptions,
    default: T,
    parse: F,
) -> T
where
    F: FnOnce(&str) -> Option<T>,
{
    // Already-cancelled upstream: resolve immediately, broadcast nothing
    if opts.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
        return default;
    }

    let (id, rx) = correlator.register();
    registry.broadcast_to_all(ServerMessage::UiRequest {
        id,
        method: method.to_string(),
        params_json,
    });

    tokio::select! {
        reply = rx => match reply {
            Ok(body) => parse(&body).unwrap_or(default),
            Err(_) => default,
        },
        _ = sleep_or_pending(opts.timeout_ms) => {
            debug!("UI request {} timed out", id);
            correlator.discard(id);
            default
        }
        _ = cancelled_or_pending(opts.cancel.as_ref()) => {
            debug!("UI request {} cancelled", id);
            correlator.discard(id);
            default
        }
    }
}

async fn sleep_or_pending(timeout_ms: Option<u64>) {
    match timeout_ms {
        Some(ms) => tokio::time::sleep(Duration::from_millis(ms)).await,
        None => std::future::pending().await,
    }
}

async fn cancelled_or_pending(token: Option<&CancellationToken>) {
    match token {
        Some(t) => t.cancelled().await,
        None => std::future::pending().await,
    }
}
