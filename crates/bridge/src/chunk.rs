//! Wire chunk variants streamed back from the assistant backend (§4.I).

use conductor_domain::message::{ContentBlock, TokenUsage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeChunk {
    Assistant {
        #[serde(default)]
        text: Vec<String>,
        #[serde(default)]
        content_blocks: Vec<ContentBlock>,
    },
    User {
        content: serde_json::Value,
    },
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
    },
    ToolResult {
        tool_use_id: String,
        content: serde_json::Value,
        #[serde(default)]
        is_error: bool,
    },
    Result {
        num_turns: u32,
        duration_ms: u64,
        is_error: bool,
        #[serde(default)]
        total_cost_usd: Option<f64>,
        #[serde(default)]
        usage: Option<TokenUsage>,
    },
    System {
        subtype: String,
        #[serde(default)]
        data: serde_json::Value,
    },
}

impl BridgeChunk {
    pub fn type_name(&self) -> &'static str {
        match self {
            BridgeChunk::Assistant { .. } => "assistant",
            BridgeChunk::User { .. } => "user",
            BridgeChunk::ToolUse { .. } => "tool_use",
            BridgeChunk::ToolResult { .. } => "tool_result",
            BridgeChunk::Result { .. } => "result",
            BridgeChunk::System { .. } => "system",
        }
    }
}
