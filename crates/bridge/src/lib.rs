//! Streaming bridge (§4.I).
//!
//! One bridge per active session. Spawns the assistant backend as a child
//! process speaking newline-delimited JSON over stdin/stdout (§9 backend
//! transport resolution), translates each chunk to our wire format,
//! persists it, and fans it out through the hub.

pub mod chunk;

use std::process::Stdio;
use std::sync::Arc;

use chrono::Utc;
use conductor_domain::trace::TraceEvent;
use conductor_domain::Result;
use conductor_hub::Hub;
use conductor_storage::{AnalyticsFields, Storage};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;

pub use chunk::BridgeChunk;

const DRAIN_GRACE_PERIOD: std::time::Duration = std::time::Duration::from_secs(5);

/// Inbound events the session manager cares about as the bridge runs.
#[derive(Debug, Clone)]
pub enum BridgeOutcome {
    Idle,
    Error { message: String },
}

/// Per-session coroutine handle. `send_prompt` and `cancel` are the only
/// two operations the session manager drives; everything else happens on
/// the bridge's own background task.
pub struct Bridge {
    stdin: AsyncMutex<tokio::process::ChildStdin>,
    cancel: CancellationToken,
    outcome_rx: AsyncMutex<mpsc::Receiver<BridgeOutcome>>,
    task: AsyncMutex<Option<tokio::task::JoinHandle<()>>>,
    chunk_tx: tokio::sync::broadcast::Sender<BridgeChunk>,
}

impl Bridge {
    /// Spawns `backend_command` as a child process and starts the reader
    /// loop that persists and fans out each chunk it emits. `session_lock`
    /// serializes sequence allocation for this session across concurrent
    /// writers (there is only one: this bridge, but the same lock type is
    /// shared with whatever else touches the session's message stream).
    pub fn spawn(
        session_id: String,
        backend_command: Vec<String>,
        storage: Arc<Storage>,
        hub: Hub,
    ) -> Result<Self> {
        let mut command = Command::new(
            backend_command
                .first()
                .cloned()
                .unwrap_or_else(|| "true".to_string()),
        );
        command
            .args(backend_command.iter().skip(1))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        let mut child: Child = command
            .spawn()
            .map_err(|e| conductor_domain::Error::Other(format!("failed to spawn backend: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| conductor_domain::Error::Other("backend stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| conductor_domain::Error::Other("backend stdout unavailable".to_string()))?;

        let cancel = CancellationToken::new();
        let (outcome_tx, outcome_rx) = mpsc::channel(1);
        let (chunk_tx, _) = tokio::sync::broadcast::channel(256);

        let task_cancel = cancel.clone();
        let task_chunk_tx = chunk_tx.clone();
        let task = tokio::spawn(reader_loop(
            session_id,
            child,
            stdout,
            storage,
            hub,
            task_cancel,
            outcome_tx,
            task_chunk_tx,
        ));

        Ok(Bridge {
            stdin: AsyncMutex::new(stdin),
            cancel,
            outcome_rx: AsyncMutex::new(outcome_rx),
            task: AsyncMutex::new(Some(task)),
            chunk_tx,
        })
    }

    /// Subscribes to this bridge's chunk stream — the "subscription
    /// channel for reply chunks" `SendPrompt` hands back to its caller
    /// (§4.H). Independent of the hub broadcast, which fans the same
    /// chunks out to dashboard/other clients.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<BridgeChunk> {
        self.chunk_tx.subscribe()
    }

    /// Writes one newline-delimited JSON prompt frame to the backend.
    pub async fn send_prompt(&self, prompt: &str) -> Result<()> {
        let frame = serde_json::json!({"type": "prompt", "content": prompt}).to_string();
        let mut stdin = self.stdin.lock().await;
        stdin
            .write_all(frame.as_bytes())
            .await
            .map_err(conductor_domain::Error::from)?;
        stdin.write_all(b"\n").await.map_err(conductor_domain::Error::from)?;
        Ok(())
    }

    /// Awaits the reader loop's terminal outcome, used by `SendPrompt`'s
    /// caller to drive the processing→idle|error transition.
    pub async fn next_outcome(&self) -> Option<BridgeOutcome> {
        self.outcome_rx.lock().await.recv().await
    }

    /// Cancels the backend and waits up to the grace period for the reader
    /// loop to unwind; the session manager force-terminates past that.
    pub async fn cancel_and_drain(&self) -> bool {
        self.cancel.cancel();
        let handle = self.task.lock().await.take();
        match handle {
            Some(handle) => tokio::time::timeout(DRAIN_GRACE_PERIOD, handle).await.is_ok(),
            None => true,
        }
    }
}

async fn reader_loop(
    session_id: String,
    mut child: Child,
    stdout: tokio::process::ChildStdout,
    storage: Arc<Storage>,
    hub: Hub,
    cancel: CancellationToken,
    outcome_tx: mpsc::Sender<BridgeOutcome>,
    chunk_tx: tokio::sync::broadcast::Sender<BridgeChunk>,
) {
    let mut lines = BufReader::new(stdout).lines();
    let mut pending_tool_uses: std::collections::HashMap<String, (String, serde_json::Value)> =
        std::collections::HashMap::new();

    loop {
        let line = tokio::select! {
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };

        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                let message = "backend closed stdout unexpectedly".to_string();
                TraceEvent::BridgeError { session_id: session_id.clone(), message: message.clone() }.emit();
                let _ = outcome_tx.send(BridgeOutcome::Error { message }).await;
                break;
            }
            Err(e) => {
                TraceEvent::BridgeError { session_id: session_id.clone(), message: e.to_string() }.emit();
                let _ = outcome_tx
                    .send(BridgeOutcome::Error { message: e.to_string() })
                    .await;
                break;
            }
        };

        let chunk: BridgeChunk = match serde_json::from_str(&line) {
            Ok(chunk) => chunk,
            Err(_) => continue,
        };

        TraceEvent::BridgeChunkReceived {
            session_id: session_id.clone(),
            chunk_type: chunk.type_name().to_string(),
        }
        .emit();

        let now = Utc::now();
        let fields = AnalyticsFields {
            conversation_id: session_id.clone(),
            session_name: None,
            working_directory: None,
            git_branch: None,
            model_provider: None,
            model_name: None,
            executed_at: now,
        };

        match &chunk {
            BridgeChunk::ToolUse { id, name, input } => {
                pending_tool_uses.insert(id.clone(), (name.clone(), input.clone()));
            }
            BridgeChunk::ToolResult { tool_use_id, content, is_error } => {
                if let Some((name, input)) = pending_tool_uses.remove(tool_use_id) {
                    let output = content.as_str().map(|s| s.to_string()).unwrap_or_else(|| content.to_string());
                    let record_result = if name.eq_ignore_ascii_case("bash") {
                        let command = input.get("command").and_then(|v| v.as_str()).unwrap_or_default();
                        storage.record_shell_command(&fields, command, Some(output.as_str()), !is_error)
                    } else {
                        storage.record_claude_command(&fields, &name, &input, Some(output.as_str()), !is_error)
                    };
                    if let Err(e) = record_result {
                        tracing::warn!(session_id = %session_id, error = %e, "analytics write failed, continuing");
                    }
                }
            }
            BridgeChunk::Result { total_cost_usd, .. } => {
                if let Some(cost) = total_cost_usd {
                    if let Err(e) = bump_session_cost(&storage, &session_id, *cost) {
                        tracing::warn!(session_id = %session_id, error = %e, "session cost update failed, continuing");
                    }
                }
            }
            _ => {}
        }

        if let Err(e) = persist_chunk(&storage, &session_id, &chunk, now) {
            tracing::warn!(session_id = %session_id, error = %e, "message persist failed, continuing");
        }

        let _ = chunk_tx.send(chunk.clone());

        hub.broadcast(
            "agent_message",
            serde_json::json!({"session_id": session_id, "chunk": chunk}),
        )
        .await;

        if matches!(chunk, BridgeChunk::Result { .. }) {
            // One session keeps one bridge for its whole lifetime (§4.H):
            // a turn ending just means the backend is idle again, so keep
            // reading rather than tearing the child down.
            let _ = outcome_tx.send(BridgeOutcome::Idle).await;
        }
    }

    // Reached only via cancellation or a fatal read error/EOF above — a
    // normal end-of-turn loops back to read the next prompt instead.
    let _ = child.start_kill();
    let _ = child.wait().await;
}

fn bump_session_cost(storage: &Storage, session_id: &str, delta: f64) -> Result<()> {
    if let Some(mut record) = storage.get_session(session_id)? {
        record.cost_usd += delta;
        record.updated_at = Utc::now();
        storage.update_session(&record)?;
    }
    Ok(())
}

fn persist_chunk(
    storage: &Storage,
    session_id: &str,
    chunk: &BridgeChunk,
    now: chrono::DateTime<Utc>,
) -> Result<()> {
    let role = chunk.type_name();
    let content = serde_json::to_value(chunk).unwrap_or(serde_json::Value::Null);
    let sequence = storage.append_message(session_id, role, &content, &serde_json::Value::Null, now)?;
    TraceEvent::MessageAppended {
        session_id: session_id.to_string(),
        sequence: sequence as u64,
        role: role.to_string(),
    }
    .emit();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_storage::records::SessionRecord;

    fn fresh_storage() -> (tempfile::TempDir, Arc<Storage>) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Storage::open_for_test(dir.path()).unwrap();
        let now = Utc::now();
        storage
            .record_session(&SessionRecord {
                id: "s1".into(),
                created_at: now,
                updated_at: now,
                status: "processing".into(),
                options: serde_json::Value::Null,
                message_count: 0,
                cost_usd: 0.0,
                error_message: None,
                git_branch: None,
            })
            .unwrap();
        (dir, Arc::new(storage))
    }

    #[tokio::test]
    async fn bridge_against_cat_echoes_prompt_as_unparsed_line() {
        // `cat` isn't valid backend JSON, so this exercises the
        // malformed-line-skipped path rather than a full turn.
        let (_dir, storage) = fresh_storage();
        let hub = Hub::spawn();
        let bridge =
            Bridge::spawn("s1".to_string(), vec!["cat".to_string()], storage, hub).unwrap();
        bridge.send_prompt("hello").await.unwrap();
        let finished = bridge.cancel_and_drain().await;
        assert!(finished);
    }

    #[tokio::test]
    async fn result_chunk_against_a_scripted_backend_reaches_idle_outcome() {
        let (_dir, storage) = fresh_storage();
        let hub = Hub::spawn();
        let script = r#"{"type":"result","num_turns":1,"duration_ms":5,"is_error":false}"#;
        let bridge = Bridge::spawn(
            "s1".to_string(),
            vec!["echo".to_string(), script.to_string()],
            storage,
            hub,
        )
        .unwrap();

        let outcome = bridge.next_outcome().await;
        assert!(matches!(outcome, Some(BridgeOutcome::Idle)));
    }
}
