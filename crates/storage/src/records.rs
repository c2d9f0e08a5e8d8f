//! Typed record structs returned by the repository operations (§3, §4.A).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub status: String,
    pub options: serde_json::Value,
    pub message_count: i64,
    pub cost_usd: f64,
    pub error_message: Option<String>,
    pub git_branch: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub id: i64,
    pub session_id: String,
    pub sequence: i64,
    pub role: String,
    pub content: serde_json::Value,
    pub metadata: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

/// Shared fields carried by every analytics record (§3 ShellCommand etc.).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsFields {
    pub conversation_id: String,
    pub session_name: Option<String>,
    pub working_directory: Option<String>,
    pub git_branch: Option<String>,
    pub model_provider: Option<String>,
    pub model_name: Option<String>,
    pub executed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellCommand {
    pub id: i64,
    #[serde(flatten)]
    pub fields: AnalyticsFields,
    pub command: String,
    pub output: Option<String>,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaudeCommand {
    pub id: i64,
    #[serde(flatten)]
    pub fields: AnalyticsFields,
    pub tool_name: String,
    pub input: serde_json::Value,
    pub output: Option<String>,
    pub success: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserMessage {
    pub id: i64,
    #[serde(flatten)]
    pub fields: AnalyticsFields,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    #[serde(flatten)]
    pub fields: AnalyticsFields,
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationStats {
    pub total: i64,
    pub by_conversation: Vec<(String, i64)>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommandStat {
    pub tool_name: String,
    pub count: i64,
}
