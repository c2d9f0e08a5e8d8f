use serde::Serialize;

/// Structured trace events emitted across Conductor crates.
///
/// Each variant is serialized once to JSON and logged through a single
/// `tracing::info!` call, so a log pipeline can index on `trace_event`
/// without re-parsing free text.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum TraceEvent {
    SessionCreated {
        session_id: String,
    },
    SessionStatusChanged {
        session_id: String,
        from: String,
        to: String,
    },
    SessionEnded {
        session_id: String,
    },
    MessageAppended {
        session_id: String,
        sequence: u64,
        role: String,
    },
    BridgeChunkReceived {
        session_id: String,
        chunk_type: String,
    },
    BridgeError {
        session_id: String,
        message: String,
    },
    TranscriptIngested {
        path: String,
        shell_commands: usize,
        claude_commands: usize,
        skipped_lines: usize,
    },
    ToolMapBoundsEvicted {
        path: String,
        evicted_tool_id: String,
    },
    ResetPointSet {
        token_delta: i64,
        conversation_delta: i64,
        reason: String,
    },
    ResetPointCleared,
    HubClientRegistered {
        total_clients: usize,
    },
    HubClientUnregistered {
        total_clients: usize,
    },
    CleanupTickCompleted {
        sessions_deleted: usize,
        messages_deleted: usize,
    },
}

impl TraceEvent {
    pub fn emit(&self) {
        let json = serde_json::to_string(self).unwrap_or_default();
        tracing::info!(trace_event = %json, "conductor_event");
    }
}
