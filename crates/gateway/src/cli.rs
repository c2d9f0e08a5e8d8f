//! Command-line surface (scoped down from the teacher's to what §4.J/§4.K
//! actually need: start the server, sanity-check config, inspect it).

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use conductor_domain::config::Config;

#[derive(Debug, Parser)]
#[command(name = "conductor", version, about = "Conductor agent gateway")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Start the HTTP/WS gateway (default when no subcommand is given).
    Serve,
    /// Validate configuration and exit non-zero on error.
    Doctor,
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    Validate,
    Show,
}

/// Loads `config.toml` from `${claude_dir}/analytics`, writing defaults (and
/// a `config.json` snapshot) on first run (§4.K), and returns it alongside
/// the resolved `claude_dir`.
pub fn load_config() -> anyhow::Result<(Config, PathBuf)> {
    let claude_dir = crate::bootstrap::claude_dir_from_env();
    let analytics_dir = claude_dir.join("analytics");
    std::fs::create_dir_all(&analytics_dir)?;
    let config = Config::load_or_default(&analytics_dir)?;
    Ok((config, claude_dir))
}

pub fn show(config: &Config) {
    match serde_json::to_string_pretty(config) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("failed to serialize config: {e}"),
    }
}

/// Returns `true` when the config passed validation (no error-severity
/// issues); prints every issue regardless of severity.
pub fn validate(config: &Config) -> bool {
    let issues = config.validate();
    for issue in &issues {
        println!("{:?}: {issue}", issue.severity);
    }
    !issues
        .iter()
        .any(|i| i.severity == conductor_domain::config::ConfigSeverity::Error)
}
