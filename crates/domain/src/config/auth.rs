use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "d_true")]
    pub enabled: bool,
    #[serde(default = "d_api_key_path")]
    pub api_key_path: PathBuf,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            api_key_path: d_api_key_path(),
        }
    }
}

fn d_true() -> bool {
    true
}
fn d_api_key_path() -> PathBuf {
    PathBuf::from(".secret")
}
