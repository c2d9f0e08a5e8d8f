//! REST/WS route assembly (§6 External Interfaces).

mod agent;
mod conversations;
mod health;
mod history;
mod reset;
mod ws;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::state::AppState;

/// Build the full `/api`-prefixed REST surface plus the two top-level
/// WebSocket endpoints.
pub fn router() -> Router<AppState> {
    let api = Router::new()
        .route("/health", get(health::health))
        .route("/version", get(health::version))
        .route("/data", get(conversations::data))
        .route("/conversations", get(conversations::conversations))
        .route("/processes", get(conversations::processes))
        .route("/shells", get(conversations::shells))
        .route("/stats", get(conversations::stats))
        .route("/refresh", post(conversations::refresh))
        .route("/reset/soft", post(reset::soft_reset))
        .route("/reset/archive", post(reset::archive_reset))
        .route("/reset/clear", post(reset::clear_reset))
        .route("/reset", delete(reset::clear_reset))
        .route("/reset/status", get(reset::status))
        .route("/history/all", get(history::all))
        .route("/history/shell", get(history::shell))
        .route("/history/claude", get(history::claude))
        .route("/history/stats", get(history::stats))
        .route("/history", delete(history::delete_all))
        .route("/prompts", get(history::list_prompts).post(history::create_prompt))
        .route(
            "/notifications",
            get(history::list_notifications)
                .post(history::create_notification)
                .delete(history::delete_notifications),
        )
        .route("/agent/sessions", get(agent::list_sessions).post(agent::create_session))
        .route("/agent/sessions/:id", delete(agent::end_session))
        .route("/agent/sessions/:id/messages", get(agent::get_messages))
        .route("/agent/sessions/:id/prompt", post(agent::send_prompt));

    Router::new()
        .nest("/api", api)
        .route("/ws", get(ws::dashboard_ws))
        .route("/agent/ws", get(ws::agent_ws))
}
