use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "d_model")]
    pub model: String,
    #[serde(default = "d_max_concurrent")]
    pub max_concurrent_sessions: usize,
    #[serde(default = "d_retention_days")]
    pub retention_days: i64,
    #[serde(default = "d_true")]
    pub cleanup_enabled: bool,
    #[serde(default = "d_cleanup_interval")]
    pub cleanup_interval_hours: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: d_model(),
            max_concurrent_sessions: d_max_concurrent(),
            retention_days: d_retention_days(),
            cleanup_enabled: true,
            cleanup_interval_hours: d_cleanup_interval(),
        }
    }
}

fn d_model() -> String {
    "default".into()
}
fn d_max_concurrent() -> usize {
    5
}
fn d_retention_days() -> i64 {
    30
}
fn d_true() -> bool {
    true
}
fn d_cleanup_interval() -> u64 {
    6
}
