//! Agent session REST surface (§4.H), layered over `SessionManager`.

use axum::extract::{Path, Query as AxumQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use conductor_domain::Error;
use serde::Deserialize;

use crate::state::AppState;

fn map_error(e: Error) -> Response {
    let status = match e {
        Error::NotFound(_) => StatusCode::NOT_FOUND,
        Error::Conflict(_) => StatusCode::CONFLICT,
        Error::Validation(_) => StatusCode::BAD_REQUEST,
        Error::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
}

#[derive(Debug, Deserialize)]
pub struct ListParams {
    #[serde(default = "default_filter")]
    pub status: String,
}

fn default_filter() -> String {
    "all".to_string()
}

pub async fn list_sessions(State(state): State<AppState>, AxumQuery(params): AxumQuery<ListParams>) -> Response {
    match state.sessions.list_all_sessions(&params.status) {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => map_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateSession {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub options: serde_json::Value,
}

pub async fn create_session(State(state): State<AppState>, Json(body): Json<CreateSession>) -> Response {
    match state.sessions.create_session(body.id, body.options) {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(e) => map_error(e),
    }
}

pub async fn end_session(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.sessions.end_session(&id).await {
        Ok(()) => Json(serde_json::json!({ "ended": true })).into_response(),
        Err(e) => map_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct MessagesParams {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    100
}

pub async fn get_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
    AxumQuery(params): AxumQuery<MessagesParams>,
) -> Response {
    match state.sessions.get_messages(&id, params.limit, params.offset) {
        Ok((messages, has_more)) => {
            Json(serde_json::json!({ "messages": messages, "has_more": has_more })).into_response()
        }
        Err(e) => map_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct SendPrompt {
    pub prompt: String,
}

/// Accepted delivery (§4.H `SendPrompt`): the HTTP caller gets back an
/// acknowledgement once the bridge accepts the turn. The resulting chunk
/// stream itself is only observable over `/agent/ws`, matching the
/// message-type set the spec enumerates for that socket — see DESIGN.md.
pub async fn send_prompt(State(state): State<AppState>, Path(id): Path<String>, Json(body): Json<SendPrompt>) -> Response {
    match state.sessions.send_prompt(&id, &body.prompt).await {
        Ok(_subscription) => Json(serde_json::json!({ "accepted": true })).into_response(),
        Err(e) => map_error(e),
    }
}
