//! Soft-reset endpoints (§4.G).

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

use crate::state::AppState;

async fn raw_totals(state: &AppState) -> (i64, i64) {
    let command_stats = state.storage.get_command_stats(None, i64::MAX).unwrap_or_default();
    let raw_tokens: i64 = command_stats.iter().map(|c| c.count).sum();
    let raw_conversations = state.storage.get_unique_sessions().map(|v| v.len() as i64).unwrap_or(0);
    (raw_tokens, raw_conversations)
}

fn reset_response(e: conductor_domain::Error) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
}

/// Baselines the current raw totals as the new reset point, so `/stats`
/// reads zero going forward without touching stored rows.
pub async fn soft_reset(State(state): State<AppState>) -> Response {
    let (tokens, conversations) = raw_totals(&state).await;
    match state.reset.set_reset_point(tokens, conversations, "soft reset".to_string()) {
        Ok(()) => Json(serde_json::json!({ "reset_active": true })).into_response(),
        Err(e) => reset_response(e),
    }
}

/// Same effect as a soft reset but records the reason as an archival
/// boundary — the spec's `§9` is silent on any difference in mechanism
/// beyond the `reason` string; see DESIGN.md.
pub async fn archive_reset(State(state): State<AppState>) -> Response {
    let (tokens, conversations) = raw_totals(&state).await;
    match state.reset.set_reset_point(tokens, conversations, "archived".to_string()) {
        Ok(()) => Json(serde_json::json!({ "reset_active": true })).into_response(),
        Err(e) => reset_response(e),
    }
}

pub async fn clear_reset(State(state): State<AppState>) -> Response {
    match state.reset.clear_reset_point() {
        Ok(()) => Json(serde_json::json!({ "reset_active": false })).into_response(),
        Err(e) => reset_response(e),
    }
}

pub async fn status(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "reset_active": state.reset.has_reset_point(),
        "reset_point": state.reset.get_reset_point(),
    }))
}
