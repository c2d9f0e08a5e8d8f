mod agent;
mod auth;
mod server;
mod tls;

pub use agent::AgentConfig;
pub use auth::AuthConfig;
pub use server::{CorsConfig, ServerConfig};
pub use tls::TlsConfig;

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Top-level configuration (§2 Config, §4.K, §6 `config.json`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default)]
    pub agent: AgentConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigSeverity {
    Warning,
    Error,
}

pub struct ConfigIssue {
    pub severity: ConfigSeverity,
    pub message: String,
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Config {
    /// Load `config.toml` (the primary, human-edited file) from `dir`, or
    /// write and return the defaults if absent (§4.K "If config absent,
    /// write defaults"). `config.json` is kept as a read-only snapshot for
    /// tooling that expects the JSON shape named in §6 and is never itself
    /// read back.
    pub fn load_or_default(dir: &Path) -> crate::error::Result<Self> {
        let path = dir.join("config.toml");
        if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&raw)
                .map_err(|e| crate::error::Error::Config(format!("parsing config.toml: {e}")))?;
            config.write_snapshot(dir)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.write_to(dir)?;
            Ok(config)
        }
    }

    /// Persist this config as `config.toml` under `dir`, refreshing the
    /// `config.json` snapshot alongside it.
    pub fn write_to(&self, dir: &Path) -> crate::error::Result<()> {
        std::fs::create_dir_all(dir)?;
        let toml_str = toml::to_string_pretty(self)
            .map_err(|e| crate::error::Error::Config(format!("serializing config: {e}")))?;
        std::fs::write(dir.join("config.toml"), toml_str)?;
        self.write_snapshot(dir)?;
        Ok(())
    }

    /// Refresh the `config.json` snapshot without touching `config.toml`.
    fn write_snapshot(&self, dir: &Path) -> crate::error::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| crate::error::Error::Config(format!("serializing config: {e}")))?;
        std::fs::write(dir.join("config.json"), json)?;
        Ok(())
    }

    /// Sanity-check the loaded configuration, mirroring the teacher's
    /// `Config::validate` -> `Vec<ConfigIssue>` pattern.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.agent.max_concurrent_sessions == 0 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "agent.max_concurrent_sessions must be >= 1".into(),
            });
        }

        if self.agent.retention_days < 1 {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "agent.retention_days < 1 — cleanup will run on every tick".into(),
            });
        }

        if !self.auth.enabled {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Warning,
                message: "auth.enabled=false — all endpoints are unauthenticated".into(),
            });
        }

        if self.tls.enabled && (self.tls.cert_path.as_os_str().is_empty()
            || self.tls.key_path.as_os_str().is_empty())
        {
            issues.push(ConfigIssue {
                severity: ConfigSeverity::Error,
                message: "tls.enabled=true but cert_path/key_path is empty".into(),
            });
        }

        issues
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_clean_except_auth_warning() {
        let config = Config::default();
        let issues = config.validate();
        assert!(issues
            .iter()
            .all(|i| i.severity == ConfigSeverity::Warning || i.message.is_empty()));
    }

    #[test]
    fn zero_concurrency_is_an_error() {
        let mut config = Config::default();
        config.agent.max_concurrent_sessions = 0;
        let issues = config.validate();
        assert!(issues
            .iter()
            .any(|i| i.severity == ConfigSeverity::Error));
    }

    #[test]
    fn load_or_default_writes_toml_and_json_on_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_default(dir.path()).unwrap();
        assert!(dir.path().join("config.toml").exists());
        assert!(dir.path().join("config.json").exists());
        assert_eq!(config.server.port, 4317);
    }

    #[test]
    fn default_host_is_localhost() {
        let config = Config::default();
        assert_eq!(config.server.host, "127.0.0.1");
    }

    #[test]
    fn explicit_host_parses_from_toml() {
        let toml_str = r#"
[server]
host = "0.0.0.0"
port = 3210
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3210);
    }

    #[test]
    fn load_or_default_reads_back_a_hand_edited_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("config.toml"),
            "[server]\nhost = \"0.0.0.0\"\nport = 9999\n",
        )
        .unwrap();

        let config = Config::load_or_default(dir.path()).unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 9999);

        // The json snapshot is refreshed to match, not left stale.
        let json = std::fs::read_to_string(dir.path().join("config.json")).unwrap();
        assert!(json.contains("9999"));
    }
}
