//! External agent process adapter
//!
//! Drives a coding-agent process over line-delimited JSON on stdio. The
//! process emits one JSON object per stdout line; prompts, aborts, and UI
//! replies are written to its stdin the same way. Resumed sessions get the
//! saved transcript path via `--resume`; the transcript file itself is
//! owned and written by the agent process.

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use atrium_protocol::{ContentSegment, RuntimeEvent, TranscriptEntry};
use atrium_utils::{AtriumError, Result};

use super::{AgentRuntime, RuntimeFactory, RuntimeSpawn, UiGateway};

/// Factory launching one agent process per tab
pub struct ProcessRuntimeFactory {
    command: String,
    args: Vec<String>,
}

impl ProcessRuntimeFactory {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }
}

impl RuntimeFactory for ProcessRuntimeFactory {
    fn spawn(&self, ui: Arc<UiGateway>, resume_from: Option<&Path>) -> Result<RuntimeSpawn> {
        ProcessRuntime::launch(&self.command, &self.args, ui, resume_from)
    }
}

/// One JSON line from the agent process
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum AgentLine {
    Init {
        #[serde(default)]
        model_id: Option<String>,
        #[serde(default)]
        session_id: Option<String>,
    },
    TurnStarted,
    Text {
        text: String,
    },
    Thinking {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
    TurnCompleted {
        #[serde(default)]
        stop_reason: Option<String>,
    },
    TurnAborted,
    Error {
        message: String,
    },
    UiRequest {
        request_id: String,
        method: String,
        #[serde(default)]
        params: serde_json::Value,
    },
}

/// One line of a saved transcript, as the agent process writes it
#[derive(Debug, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
enum SavedLine {
    User {
        text: String,
    },
    Assistant {
        #[serde(default)]
        segments: Vec<ContentSegment>,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

impl From<SavedLine> for TranscriptEntry {
    fn from(line: SavedLine) -> Self {
        match line {
            SavedLine::User { text } => TranscriptEntry::User { text },
            SavedLine::Assistant { segments } => TranscriptEntry::Assistant { segments },
            SavedLine::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => TranscriptEntry::ToolResult {
                tool_use_id,
                content,
                is_error,
            },
        }
    }
}

/// Agent runtime backed by an external process
pub struct ProcessRuntime {
    transcript: Mutex<Vec<TranscriptEntry>>,
    streaming: AtomicBool,
    model_id: Mutex<Option<String>>,
    session_id: Mutex<Option<String>>,
    /// Lines queued for the agent's stdin
    stdin_tx: mpsc::UnboundedSender<String>,
    child: Mutex<Option<Child>>,
    disposed: AtomicBool,
}

impl ProcessRuntime {
    fn launch(
        command: &str,
        args: &[String],
        ui: Arc<UiGateway>,
        resume_from: Option<&Path>,
    ) -> Result<RuntimeSpawn> {
        let mut cmd = Command::new(command);
        cmd.args(args);
        if let Some(path) = resume_from {
            cmd.arg("--resume").arg(path);
        }
        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| AtriumError::runtime_spawn(format!("{}: {}", command, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AtriumError::runtime_spawn("agent stdin unavailable"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AtriumError::runtime_spawn("agent stdout unavailable"))?;
        let stderr = child.stderr.take();

        let (events_tx, events_rx) = mpsc::channel(256);
        let (stdin_tx, stdin_rx) = mpsc::unbounded_channel();

        let (seed, stored_name) = match resume_from {
            Some(path) => read_saved_transcript(path),
            None => (Vec::new(), None),
        };
        let initial_session_id = resume_from
            .and_then(|p| p.file_stem())
            .and_then(|s| s.to_str())
            .map(String::from);

        let runtime = Arc::new(ProcessRuntime {
            transcript: Mutex::new(seed),
            streaming: AtomicBool::new(false),
            model_id: Mutex::new(None),
            session_id: Mutex::new(initial_session_id),
            stdin_tx,
            child: Mutex::new(Some(child)),
            disposed: AtomicBool::new(false),
        });

        tokio::spawn(write_stdin(stdin, stdin_rx));
        tokio::spawn(read_stdout(Arc::clone(&runtime), stdout, events_tx, ui));
        if let Some(stderr) = stderr {
            tokio::spawn(log_stderr(stderr));
        }

        info!(
            "Launched agent process '{}' (resume: {})",
            command,
            resume_from.is_some()
        );

        Ok(RuntimeSpawn {
            runtime,
            events: events_rx,
            stored_name,
        })
    }

    /// Apply one agent line to local state; returns the event to forward
    fn apply(&self, line: AgentLine, ui: &Arc<UiGateway>) -> Option<RuntimeEvent> {
        match line {
            AgentLine::Init {
                model_id,
                session_id,
            } => {
                if model_id.is_some() {
                    *self.model_id.lock().unwrap() = model_id;
                }
                if session_id.is_some() {
                    *self.session_id.lock().unwrap() = session_id;
                }
                None
            }
            AgentLine::TurnStarted => {
                self.streaming.store(true, Ordering::SeqCst);
                Some(RuntimeEvent::TurnStarted)
            }
            AgentLine::Text { text } => {
                self.append_segment(ContentSegment::Text { text: text.clone() });
                Some(RuntimeEvent::TextDelta { text })
            }
            AgentLine::Thinking { text } => {
                self.append_segment(ContentSegment::Thinking { text: text.clone() });
                Some(RuntimeEvent::ThinkingDelta { text })
            }
            AgentLine::ToolUse { id, name, input } => {
                let input_json = input.to_string();
                self.append_segment(ContentSegment::ToolUse {
                    id: id.clone(),
                    name: name.clone(),
                    input_json: input_json.clone(),
                });
                Some(RuntimeEvent::ToolUseStarted {
                    id,
                    name,
                    input_json,
                })
            }
            AgentLine::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => {
                self.transcript
                    .lock()
                    .unwrap()
                    .push(TranscriptEntry::ToolResult {
                        tool_use_id: tool_use_id.clone(),
                        content: content.clone(),
                        is_error,
                    });
                Some(RuntimeEvent::ToolResult {
                    tool_use_id,
                    content,
                    is_error,
                })
            }
            AgentLine::TurnCompleted { stop_reason } => {
                self.streaming.store(false, Ordering::SeqCst);
                Some(RuntimeEvent::TurnCompleted { stop_reason })
            }
            AgentLine::TurnAborted => {
                self.streaming.store(false, Ordering::SeqCst);
                Some(RuntimeEvent::TurnAborted)
            }
            AgentLine::Error { message } => Some(RuntimeEvent::RuntimeError { message }),
            AgentLine::UiRequest {
                request_id,
                method,
                params,
            } => {
                // Put the question to the humans; relay whichever outcome
                // wins back to the agent's stdin
                let ui = Arc::clone(ui);
                let stdin_tx = self.stdin_tx.clone();
                tokio::spawn(async move {
                    let body = ui
                        .ask_json(&method, params.to_string(), "{}".to_string(), None)
                        .await;
                    let reply = serde_json::json!({
                        "type": "ui_response",
                        "request_id": request_id,
                        "body": body,
                    });
                    let _ = stdin_tx.send(reply.to_string());
                });
                None
            }
        }
    }

    /// Append a content segment to the streaming assistant turn
    ///
    /// Consecutive text (or thinking) deltas coalesce into one segment.
    fn append_segment(&self, segment: ContentSegment) {
        let mut transcript = self.transcript.lock().unwrap();

        let continue_turn = self.streaming.load(Ordering::SeqCst)
            && matches!(transcript.last(), Some(TranscriptEntry::Assistant { .. }));
        if !continue_turn {
            transcript.push(TranscriptEntry::Assistant {
                segments: Vec::new(),
            });
        }

        let Some(TranscriptEntry::Assistant { segments }) = transcript.last_mut() else {
            return;
        };
        match (segments.last_mut(), segment) {
            (Some(ContentSegment::Text { text: last }), ContentSegment::Text { text }) => {
                last.push_str(&text);
            }
            (Some(ContentSegment::Thinking { text: last }), ContentSegment::Thinking { text }) => {
                last.push_str(&text);
            }
            (_, segment) => segments.push(segment),
        }
    }
}

impl AgentRuntime for ProcessRuntime {
    fn submit(&self, text: &str) -> Result<()> {
        if self.disposed.load(Ordering::SeqCst) {
            return Err(AtriumError::runtime("runtime disposed"));
        }
        self.transcript.lock().unwrap().push(TranscriptEntry::User {
            text: text.to_string(),
        });
        let line = serde_json::json!({ "type": "user", "text": text }).to_string();
        self.stdin_tx
            .send(line)
            .map_err(|_| AtriumError::runtime("agent process stdin closed"))
    }

    fn abort(&self) {
        // The agent ignores aborts when idle, keeping this idempotent
        let line = serde_json::json!({ "type": "abort" }).to_string();
        let _ = self.stdin_tx.send(line);
    }

    fn current_messages(&self) -> Vec<TranscriptEntry> {
        self.transcript.lock().unwrap().clone()
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
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(mut child) = self.child.lock().unwrap().take() {
            if let Err(e) = child.start_kill() {
                warn!("Failed to kill agent process: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for ProcessRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessRuntime")
            .field("streaming", &self.is_streaming())
            .field("disposed", &self.disposed.load(Ordering::SeqCst))
            .finish()
    }
}

/// Seed the in-memory transcript from a saved JSONL file
fn read_saved_transcript(path: &Path) -> (Vec<TranscriptEntry>, Option<String>) {
    use std::io::BufRead;

    let Ok(file) = std::fs::File::open(path) else {
        return (Vec::new(), None);
    };
    let reader = std::io::BufReader::new(file);

    let mut entries = Vec::new();
    let mut name = None;
    for line in reader.lines().map_while(|l| l.ok()) {
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(saved) = serde_json::from_str::<SavedLine>(&line) {
            entries.push(saved.into());
            continue;
        }
        // Not a message line; the header carries the stored display name
        if name.is_none() {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(&line) {
                name = value.get("name").and_then(|v| v.as_str()).map(String::from);
            }
        }
    }
    (entries, name)
}

async fn write_stdin(mut stdin: ChildStdin, mut rx: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = rx.recv().await {
        if stdin.write_all(line.as_bytes()).await.is_err()
            || stdin.write_all(b"\n").await.is_err()
            || stdin.flush().await.is_err()
        {
            break;
        }
    }
}

async fn read_stdout(
    runtime: Arc<ProcessRuntime>,
    stdout: ChildStdout,
    events_tx: mpsc::Sender<RuntimeEvent>,
    ui: Arc<UiGateway>,
) {
    let mut lines = BufReader::new(stdout).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }
        let parsed: AgentLine = match serde_json::from_str(&line) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Unrecognized agent output line: {}", e);
                continue;
            }
        };
        if let Some(event) = runtime.apply(parsed, &ui) {
            if events_tx.send(event).await.is_err() {
                break;
            }
        }
    }
    runtime.streaming.store(false, Ordering::SeqCst);
    debug!("Agent stdout closed");
    // Dropping events_tx here closes the tab's event stream
}

async fn log_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        debug!(target: "agent_stderr", "{}", line);
    }
}
