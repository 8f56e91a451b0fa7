//! Scripted runtime for tests

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use atrium_protocol::{RuntimeEvent, TranscriptEntry};
use atrium_utils::{AtriumError, Result};

use super::{AgentRuntime, RuntimeFactory, RuntimeSpawn, UiGateway};

/// A runtime whose behavior is driven entirely by the test
pub struct MockRuntime {
    submitted: Mutex<Vec<String>>,
    messages: Mutex<Vec<TranscriptEntry>>,
    streaming: AtomicBool,
    aborts: AtomicUsize,
    disposed: AtomicBool,
    session_id: Mutex<Option<String>>,
    model_id: Mutex<Option<String>>,
    events_tx: Mutex<Option<mpsc::Sender<RuntimeEvent>>>,
}

impl MockRuntime {
    /// Create a runtime together with the receiving end of its event stream
    pub fn spawn_pair() -> (Arc<MockRuntime>, mpsc::Receiver<RuntimeEvent>) {
        let (tx, rx) = mpsc::channel(64);
        let runtime = Arc::new(MockRuntime {
            submitted: Mutex::new(Vec::new()),
            messages: Mutex::new(Vec::new()),
            streaming: AtomicBool::new(false),
            aborts: AtomicUsize::new(0),
            disposed: AtomicBool::new(false),
            session_id: Mutex::new(None),
            model_id: Mutex::new(None),
            events_tx: Mutex::new(Some(tx)),
        });
        (runtime, rx)
    }

    /// Emit an event into the stream, as the real runtime would
    pub fn emit(&self, event: RuntimeEvent) {
        if let Some(tx) = self.events_tx.lock().unwrap().as_ref() {
            let _ = tx.try_send(event);
        }
    }

    /// Close the event stream without going through dispose
    pub fn dispose_now(&self) {
        self.events_tx.lock().unwrap().take();
    }

    pub fn set_streaming(&self, streaming: bool) {
        self.streaming.store(streaming, Ordering::SeqCst);
    }

    pub fn set_session_id(&self, id: impl Into<String>) {
        *self.session_id.lock().unwrap() = Some(id.into());
    }

    pub fn set_model_id(&self, id: impl Into<String>) {
        *self.model_id.lock().unwrap() = Some(id.into());
    }

    pub fn push_message(&self, entry: TranscriptEntry) {
        self.messages.lock().unwrap().push(entry);
    }

    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn abort_count(&self) -> usize {
        self.aborts.load(Ordering::SeqCst)
    }

    pub fn disposed(&self) -> bool {
        self.disposed.load(Ordering::SeqCst)
    }
}

impl AgentRuntime for MockRuntime {
    fn submit(&self, text: &str) -> Result<()> {
        self.submitted.lock().unwrap().push(text.to_string());
        self.messages.lock().unwrap().push(TranscriptEntry::User {
            text: text.to_string(),
        });
        Ok(())
    }

    fn abort(&self) {
        self.aborts.fetch_add(1, Ordering::SeqCst);
        self.streaming.store(false, Ordering::SeqCst);
    }

    fn current_messages(&self) -> Vec<TranscriptEntry> {
        self.messages.lock().unwrap().clone()
    }

    fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::SeqCst)
    }

    fn model_id(&self) -> Option<String> {
        self.model_id.lock().unwrap().clone()
    }

    fn session_id(&self) -> Option<String> {
        self.session_id.lock().unwrap().clone()
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::SeqCst);
        self.events_tx.lock().unwrap().take();
    }
}

/// Factory producing [`MockRuntime`]s, optionally failing on demand
#[derive(Default)]
pub struct MockRuntimeFactory {
    /// When set, every spawn fails (collaborator-failure scenarios)
    pub fail: AtomicBool,
    /// Name reported as stored in a "resumed" transcript
    pub stored_name: Mutex<Option<String>>,
    /// Every runtime handed out, for later inspection
    pub spawned: Mutex<Vec<Arc<MockRuntime>>>,
    counter: AtomicUsize,
}

impl MockRuntimeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn last_spawned(&self) -> Option<Arc<MockRuntime>> {
        self.spawned.lock().unwrap().last().cloned()
    }
}

impl RuntimeFactory for MockRuntimeFactory {
    fn spawn(&self, _ui: Arc<UiGateway>, resume_from: Option<&Path>) -> Result<RuntimeSpawn> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(AtriumError::runtime_spawn("mock factory refused"));
        }

        let (runtime, events) = MockRuntime::spawn_pair();

        // Resumed sessions report the saved transcript's id; fresh ones get
        // a generated one
        let session_id = match resume_from {
            Some(path) => path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("resumed")
                .to_string(),
            None => format!("mock-{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1),
        };
        runtime.set_session_id(session_id);

        let stored_name = match resume_from {
            Some(_) => self.stored_name.lock().unwrap().clone(),
            None => None,
        };

        self.spawned.lock().unwrap().push(Arc::clone(&runtime));
        Ok(RuntimeSpawn {
            runtime,
            events,
            stored_name,
        })
    }
}
