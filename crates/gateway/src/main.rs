use std::sync::Arc;

use anyhow::Context;
use axum::middleware;
use clap::Parser;
use conductor_domain::config::ConfigSeverity;
use conductor_gateway::cli::{self, Cli, Command, ConfigCommand};
use conductor_gateway::{auth, bootstrap, cors, routes};
use tower_http::services::{ServeDir, ServeFile};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parsed = Cli::parse();

    match parsed.command {
        None | Some(Command::Serve) => {
            init_tracing();
            let (config, claude_dir) = cli::load_config()?;
            run_server(Arc::new(config), claude_dir).await
        }
        Some(Command::Doctor) => {
            let (config, _claude_dir) = cli::load_config()?;
            if !cli::validate(&config) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let (config, _claude_dir) = cli::load_config()?;
            if !cli::validate(&config) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let (config, _claude_dir) = cli::load_config()?;
            cli::show(&config);
            Ok(())
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,conductor_gateway=debug")),
        )
        .json()
        .init();
}

/// The backend launch command is not part of `config.json` (§6 only names
/// the shape's tls/auth/server/cors/agent sections); it is resolved from
/// the environment so deployments can point at whatever binary speaks the
/// bridge's newline-delimited JSON protocol (§4.I) without a config schema
/// change. See DESIGN.md.
fn backend_command() -> Vec<String> {
    std::env::var("CONDUCTOR_BACKEND_COMMAND")
        .ok()
        .map(|raw| raw.split_whitespace().map(str::to_string).collect::<Vec<_>>())
        .filter(|parts| !parts.is_empty())
        .unwrap_or_else(|| vec!["claude".to_string(), "--output-format".to_string(), "stream-json".to_string()])
}

async fn run_server(config: Arc<conductor_domain::config::Config>, claude_dir: std::path::PathBuf) -> anyhow::Result<()> {
    tracing::info!("conductor gateway starting");

    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues.iter().filter(|i| i.severity == ConfigSeverity::Error).count()
        );
    }

    let state = bootstrap::build_app_state(config.clone(), claude_dir, backend_command())
        .context("building application state")?;
    bootstrap::spawn_background_tasks(&state);

    let cors_layer = cors::build_cors_layer(&config.cors);

    let max_concurrent = std::env::var("CONDUCTOR_MAX_CONCURRENT_REQUESTS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(256);
    tracing::info!(max_concurrent, "concurrency limit set");

    let router = routes::router()
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_api_token))
        .layer(cors_layer)
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent));

    // Serves the dashboard's static build if present; the dashboard is a
    // separate, out-of-scope frontend project (§9 Non-goals).
    let dashboard_dist = std::path::Path::new("apps/dashboard/dist");
    let router = if dashboard_dist.exists() {
        let index_html = dashboard_dist.join("index.html");
        let spa = ServeDir::new(dashboard_dist).not_found_service(ServeFile::new(index_html));
        router.nest_service("/app", spa)
    } else {
        tracing::info!("apps/dashboard/dist not found — static dashboard not served");
        router
    };

    let app = router.with_state(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await.with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "conductor gateway listening");

    axum::serve(listener, app).await.context("axum server error")?;

    Ok(())
}
