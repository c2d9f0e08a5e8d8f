use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "d_cert_path")]
    pub cert_path: PathBuf,
    #[serde(default = "d_key_path")]
    pub key_path: PathBuf,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            cert_path: d_cert_path(),
            key_path: d_key_path(),
        }
    }
}

fn d_cert_path() -> PathBuf {
    PathBuf::from("certs/server.crt")
}
fn d_key_path() -> PathBuf {
    PathBuf::from("certs/server.key")
}
