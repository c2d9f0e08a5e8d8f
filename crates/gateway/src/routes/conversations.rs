//! `/data`, `/conversations`, `/processes`, `/shells`, `/stats`, `/refresh`.
//!
//! "Conversation" here means a transcript-derived `conversation_id` (§4.C),
//! distinct from an agent session (§4.H) — a conversation is a view over
//! the analytics tables a transcript file feeds, not a live managed
//! process. Its state is derived through the state calculator (§4.F).

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use conductor_state::{compute_state, state_class, MessageSummary, Role};
use conductor_storage::Query;
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct ConversationView {
    pub conversation_id: String,
    pub state: String,
    pub state_class: String,
    pub last_activity: DateTime<Utc>,
    pub working_directory: Option<String>,
    pub git_branch: Option<String>,
}

async fn build_conversations(state: &AppState) -> Vec<ConversationView> {
    let Ok(ids) = state.storage.get_unique_sessions() else {
        return Vec::new();
    };
    let now = Utc::now();
    let processes = state.detector.processes().await;

    let mut out = Vec::with_capacity(ids.len());
    for conversation_id in ids {
        let mut query = Query::new();
        query.conversation_id = Some(conversation_id.clone());
        query.limit = 1;

        let claude = state.storage.get_claude_commands(&query).unwrap_or_default();
        let shell = state.storage.get_shell_commands(&query).unwrap_or_default();

        let (last_activity, working_directory, git_branch) = match (claude.first(), shell.first()) {
            (Some(c), Some(s)) if c.fields.executed_at >= s.fields.executed_at => {
                (c.fields.executed_at, c.fields.working_directory.clone(), c.fields.git_branch.clone())
            }
            (Some(c), None) => (c.fields.executed_at, c.fields.working_directory.clone(), c.fields.git_branch.clone()),
            (_, Some(s)) => (s.fields.executed_at, s.fields.working_directory.clone(), s.fields.git_branch.clone()),
            (None, None) => continue,
        };

        let process_present = working_directory
            .as_deref()
            .map(|cwd| processes.iter().any(|p| p.cwd.as_deref() == Some(cwd)));

        let messages = vec![MessageSummary { role: Role::Assistant, timestamp: last_activity }];
        let computed_state = compute_state(&messages, last_activity, process_present, now);

        out.push(ConversationView {
            conversation_id,
            state: computed_state.to_string(),
            state_class: state_class(computed_state).to_string(),
            last_activity,
            working_directory,
            git_branch,
        });
    }

    out.sort_by(|a, b| b.last_activity.cmp(&a.last_activity));
    out
}

pub async fn conversations(State(state): State<AppState>) -> Json<Vec<ConversationView>> {
    Json(build_conversations(&state).await)
}

pub async fn data(State(state): State<AppState>) -> Json<serde_json::Value> {
    let conversations = build_conversations(&state).await;
    let active_process_count = state.detector.processes().await.len();
    Json(serde_json::json!({
        "conversations": conversations,
        "active_process_count": active_process_count,
    }))
}

pub async fn processes(State(state): State<AppState>) -> Json<Vec<conductor_detect::ProcessInfo>> {
    Json(state.detector.processes().await)
}

pub async fn shells(State(state): State<AppState>) -> Json<Vec<conductor_detect::ProcessInfo>> {
    Json(state.detector.shells().await)
}

/// Aggregated counters with the reset delta applied (§4.G ApplyDelta).
/// "Tokens" here is approximated by total command volume (shell +
/// claude), since persisted per-message token accounting is outside the
/// storage schema this repo carries — see DESIGN.md.
pub async fn stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    let command_stats = state.storage.get_command_stats(None, i64::MAX).unwrap_or_default();
    let raw_tokens: i64 = command_stats.iter().map(|c| c.count).sum();
    let raw_conversations = state.storage.get_unique_sessions().map(|v| v.len() as i64).unwrap_or(0);

    let (tokens, conversations) = state.reset.apply_delta(raw_tokens, raw_conversations);

    Json(serde_json::json!({
        "tokens": tokens,
        "conversations": conversations,
        "reset_active": state.reset.has_reset_point(),
    }))
}

/// Clears the detector's cached process/shell enumeration (§4.D ClearCache).
pub async fn refresh(State(state): State<AppState>) -> Json<serde_json::Value> {
    state.detector.clear_cache();
    Json(serde_json::json!({ "refreshed": true }))
}
