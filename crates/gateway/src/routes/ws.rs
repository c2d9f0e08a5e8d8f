//! WebSocket endpoints (§4.J): `/ws` fans out hub broadcasts to dashboard
//! clients; `/agent/ws` drives session lifecycle and prompt delivery over a
//! per-connection message protocol.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;
use tokio::sync::mpsc;

use crate::state::AppState;

const AUTH_GRACE_PERIOD: Duration = Duration::from_secs(10);

// ─── /ws — dashboard fan-out ───────────────────────────────────────────

pub async fn dashboard_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_dashboard_socket(socket, state))
}

async fn handle_dashboard_socket(socket: WebSocket, state: AppState) {
    let (mut sink, mut stream) = socket.split();
    let (client_id, mut outbound_rx) = state.hub.register().await;

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound_rx.recv().await {
            if sink.send(Message::Text(frame)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Close(_) => break,
            Message::Text(_) | Message::Ping(_) | Message::Pong(_) => {}
            _ => {}
        }
    }

    writer.abort();
    state.hub.unregister(client_id).await;
}

// ─── /agent/ws — session control protocol ──────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Inbound {
    Auth { token: Option<String> },
    CreateSession {
        #[serde(default)]
        id: Option<String>,
        #[serde(default)]
        options: serde_json::Value,
    },
    SendPrompt { session_id: String, prompt: String },
    EndSession { session_id: String },
    ListSessions {
        #[serde(default = "default_status")]
        status: String,
    },
    KillAllAgents,
    Ping,
}

fn default_status() -> String {
    "active".to_string()
}

pub async fn agent_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_agent_socket(socket, state))
}

async fn handle_agent_socket(socket: WebSocket, state: AppState) {
    let (sink, mut stream) = socket.split();
    let (outbound_tx, outbound_rx) = mpsc::channel::<serde_json::Value>(64);

    let writer = tokio::spawn(write_loop(sink, outbound_rx));

    if !authenticate(&state, &mut stream, &outbound_tx).await {
        writer.abort();
        return;
    }

    while let Some(Ok(msg)) = stream.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
            _ => continue,
        };

        let inbound: Inbound = match serde_json::from_str(&text) {
            Ok(inbound) => inbound,
            Err(e) => {
                let _ = outbound_tx
                    .send(serde_json::json!({"type": "error", "message": e.to_string()}))
                    .await;
                continue;
            }
        };

        handle_inbound(&state, inbound, &outbound_tx).await;
    }

    writer.abort();
}

/// First message on the socket must be `auth` (§4.J: the HTTP auth
/// middleware bypasses GET/upgrade requests, so `/agent/ws` checks the
/// same token itself, once, at the protocol layer).
async fn authenticate(
    state: &AppState,
    stream: &mut (impl StreamExt<Item = Result<Message, axum::Error>> + Unpin),
    outbound_tx: &mpsc::Sender<serde_json::Value>,
) -> bool {
    let Some(expected_hash) = state.api_token_hash.as_ref() else {
        let _ = outbound_tx.send(serde_json::json!({"type": "auth_success"})).await;
        return true;
    };

    let first = tokio::time::timeout(AUTH_GRACE_PERIOD, async {
        while let Some(Ok(msg)) = stream.next().await {
            if let Message::Text(text) = msg {
                return serde_json::from_str::<Inbound>(&text).ok();
            }
        }
        None
    })
    .await;

    let token = match first {
        Ok(Some(Inbound::Auth { token })) => token.unwrap_or_default(),
        _ => {
            let _ = outbound_tx
                .send(serde_json::json!({"type": "error", "message": "expected auth message"}))
                .await;
            return false;
        }
    };

    let provided_hash = Sha256::digest(token.as_bytes());
    if bool::from(provided_hash.ct_eq(expected_hash.as_slice())) {
        let _ = outbound_tx.send(serde_json::json!({"type": "auth_success"})).await;
        true
    } else {
        let _ = outbound_tx
            .send(serde_json::json!({"type": "error", "message": "unauthorized"}))
            .await;
        false
    }
}

async fn write_loop(
    mut sink: impl SinkExt<Message> + Unpin,
    mut outbound_rx: mpsc::Receiver<serde_json::Value>,
) {
    while let Some(value) = outbound_rx.recv().await {
        let frame = value.to_string();
        if sink.send(Message::Text(frame)).await.is_err() {
            break;
        }
    }
}

async fn handle_inbound(state: &AppState, inbound: Inbound, outbound_tx: &mpsc::Sender<serde_json::Value>) {
    match inbound {
        Inbound::Auth { .. } => {
            let _ = outbound_tx.send(serde_json::json!({"type": "auth_success"})).await;
        }
        Inbound::CreateSession { id, options } => match state.sessions.create_session(id, options) {
            Ok(record) => {
                let _ = outbound_tx
                    .send(serde_json::json!({"type": "session_created", "session": record}))
                    .await;
            }
            Err(e) => {
                let _ = outbound_tx
                    .send(serde_json::json!({"type": "agent_error", "message": e.to_string()}))
                    .await;
            }
        },
        Inbound::SendPrompt { session_id, prompt } => {
            spawn_prompt_forwarder(state.clone(), session_id, prompt, outbound_tx.clone()).await;
        }
        Inbound::EndSession { session_id } => match state.sessions.end_session(&session_id).await {
            Ok(()) => {
                let _ = outbound_tx
                    .send(serde_json::json!({"type": "session_ended", "session_id": session_id}))
                    .await;
            }
            Err(e) => {
                let _ = outbound_tx
                    .send(serde_json::json!({"type": "agent_error", "message": e.to_string()}))
                    .await;
            }
        },
        Inbound::ListSessions { status } => match state.sessions.list_all_sessions(&status) {
            Ok(sessions) => {
                let _ = outbound_tx
                    .send(serde_json::json!({"type": "sessions_list", "sessions": sessions}))
                    .await;
            }
            Err(e) => {
                let _ = outbound_tx
                    .send(serde_json::json!({"type": "agent_error", "message": e.to_string()}))
                    .await;
            }
        },
        Inbound::KillAllAgents => {
            let mut killed = Vec::new();
            if let Ok(sessions) = state.sessions.list_all_sessions("active") {
                for session in sessions {
                    if state.sessions.end_session(&session.id).await.is_ok() {
                        killed.push(session.id);
                    }
                }
            }
            let _ = outbound_tx
                .send(serde_json::json!({"type": "agents_killed", "session_ids": killed}))
                .await;
        }
        Inbound::Ping => {
            let _ = outbound_tx.send(serde_json::json!({"type": "pong"})).await;
        }
    }
}

/// Delivers one turn's reply chunks as they arrive, translating
/// `BridgeChunk` variants to the outbound message-type set (§4.J), and
/// stops forwarding once the turn reaches its terminal `result` chunk.
async fn spawn_prompt_forwarder(
    state: AppState,
    session_id: String,
    prompt: String,
    outbound_tx: mpsc::Sender<serde_json::Value>,
) {
    let mut receiver = match state.sessions.send_prompt(&session_id, &prompt).await {
        Ok(receiver) => receiver,
        Err(e) => {
            let _ = outbound_tx
                .send(serde_json::json!({"type": "agent_error", "session_id": session_id, "message": e.to_string()}))
                .await;
            return;
        }
    };

    tokio::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(chunk) => {
                    let frame = translate_chunk(&session_id, &chunk);
                    if outbound_tx.send(frame).await.is_err() {
                        break;
                    }
                    if matches!(chunk, conductor_bridge::BridgeChunk::Result { .. }) {
                        break;
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            }
        }
    });
}

fn translate_chunk(session_id: &str, chunk: &conductor_bridge::BridgeChunk) -> serde_json::Value {
    use conductor_bridge::BridgeChunk;

    match chunk {
        BridgeChunk::Assistant { text, content_blocks } => serde_json::json!({
            "type": "agent_message",
            "session_id": session_id,
            "text": text,
            "content_blocks": content_blocks,
        }),
        BridgeChunk::ToolUse { id, name, input } => serde_json::json!({
            "type": "agent_tool_use",
            "session_id": session_id,
            "id": id,
            "name": name,
            "input": input,
        }),
        BridgeChunk::System { subtype, data } if subtype == "thinking" => serde_json::json!({
            "type": "agent_thinking",
            "session_id": session_id,
            "data": data,
        }),
        BridgeChunk::Result { is_error, total_cost_usd, usage, .. } if *is_error => serde_json::json!({
            "type": "agent_error",
            "session_id": session_id,
            "total_cost_usd": total_cost_usd,
            "usage": usage,
        }),
        other => serde_json::json!({
            "type": "agent_message",
            "session_id": session_id,
            "chunk": other,
        }),
    }
}
