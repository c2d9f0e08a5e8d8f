//! Paginated history, prompts, and notifications (§4.A analytics tables).

use axum::extract::{Query as AxumQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use conductor_storage::records::AnalyticsFields;
use conductor_storage::Query;
use serde::Deserialize;

use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct PageParams {
    pub conversation_id: Option<String>,
    pub tool_name: Option<String>,
    #[serde(default)]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

impl PageParams {
    fn into_query(self) -> Query {
        Query {
            conversation_id: self.conversation_id,
            tool_name: self.tool_name,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

fn storage_error(e: conductor_domain::Error) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "error": e.to_string() }))).into_response()
}

pub async fn all(State(state): State<AppState>, AxumQuery(params): AxumQuery<PageParams>) -> Response {
    let query = params.into_query();
    let shell = state.storage.get_shell_commands(&query).unwrap_or_default();
    let claude = state.storage.get_claude_commands(&query).unwrap_or_default();
    Json(serde_json::json!({ "shell_commands": shell, "claude_commands": claude })).into_response()
}

pub async fn shell(State(state): State<AppState>, AxumQuery(params): AxumQuery<PageParams>) -> Response {
    match state.storage.get_shell_commands(&params.into_query()) {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => storage_error(e),
    }
}

pub async fn claude(State(state): State<AppState>, AxumQuery(params): AxumQuery<PageParams>) -> Response {
    match state.storage.get_claude_commands(&params.into_query()) {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => storage_error(e),
    }
}

/// Per-tool counts (§4.A GetCommandStats).
pub async fn stats(State(state): State<AppState>, AxumQuery(params): AxumQuery<PageParams>) -> Response {
    let limit = if params.limit <= 0 { i64::MAX } else { params.limit };
    match state.storage.get_command_stats(params.tool_name.as_deref(), limit) {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => storage_error(e),
    }
}

pub async fn delete_all(State(state): State<AppState>) -> Response {
    if let Err(e) = state.storage.delete_all_history() {
        return storage_error(e);
    }
    if let Err(e) = state.storage.vacuum() {
        return storage_error(e);
    }
    Json(serde_json::json!({ "deleted": true })).into_response()
}

#[derive(Debug, Deserialize)]
pub struct CreatePrompt {
    pub conversation_id: String,
    pub prompt: String,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub git_branch: Option<String>,
}

pub async fn list_prompts(State(state): State<AppState>, AxumQuery(params): AxumQuery<PageParams>) -> Response {
    match state.storage.get_user_messages(&params.into_query()) {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => storage_error(e),
    }
}

/// Records a user prompt and fans it out to dashboard clients as
/// `prompt_recorded` (§8 property 6 fan-out ordering).
pub async fn create_prompt(State(state): State<AppState>, Json(body): Json<CreatePrompt>) -> Response {
    let fields = AnalyticsFields {
        conversation_id: body.conversation_id.clone(),
        session_name: None,
        working_directory: body.working_directory,
        git_branch: body.git_branch,
        model_provider: None,
        model_name: None,
        executed_at: Utc::now(),
    };

    let id = match state.storage.record_user_message(&fields, &body.prompt) {
        Ok(id) => id,
        Err(e) => return storage_error(e),
    };

    state
        .hub
        .broadcast("prompt_recorded", serde_json::json!({ "id": id, "conversation_id": body.conversation_id }))
        .await;

    Json(serde_json::json!({ "id": id })).into_response()
}

#[derive(Debug, Deserialize)]
pub struct CreateNotification {
    pub conversation_id: String,
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub working_directory: Option<String>,
    #[serde(default)]
    pub git_branch: Option<String>,
}

pub async fn list_notifications(State(state): State<AppState>, AxumQuery(params): AxumQuery<PageParams>) -> Response {
    match state.storage.get_notifications(&params.into_query()) {
        Ok(rows) => Json(rows).into_response(),
        Err(e) => storage_error(e),
    }
}

pub async fn create_notification(State(state): State<AppState>, Json(body): Json<CreateNotification>) -> Response {
    let fields = AnalyticsFields {
        conversation_id: body.conversation_id.clone(),
        session_name: None,
        working_directory: body.working_directory,
        git_branch: body.git_branch,
        model_provider: None,
        model_name: None,
        executed_at: Utc::now(),
    };

    let id = match state.storage.record_notification(&fields, &body.title, &body.body) {
        Ok(id) => id,
        Err(e) => return storage_error(e),
    };

    state
        .hub
        .broadcast("notification_recorded", serde_json::json!({ "id": id, "conversation_id": body.conversation_id }))
        .await;

    Json(serde_json::json!({ "id": id })).into_response()
}

pub async fn delete_notifications(State(state): State<AppState>) -> Response {
    if let Err(e) = state.storage.delete_all_notifications() {
        return storage_error(e);
    }
    if let Err(e) = state.storage.vacuum() {
        return storage_error(e);
    }
    Json(serde_json::json!({ "deleted": true })).into_response()
}
