//! Shared boot path: wires every subsystem into one [`AppState`] and
//! starts the background tasks that keep it current (transcript walking,
//! the cleanup scheduler).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use conductor_detect::Detector;
use conductor_domain::config::Config;
use conductor_hub::Hub;
use conductor_reset::ResetTracker;
use conductor_sessions::SessionManager;
use conductor_storage::Storage;
use conductor_watch::TranscriptWatcher;
use parking_lot::Mutex;

use crate::keys;
use crate::state::AppState;

/// Build every subsystem handle the gateway needs, performing the
/// first-start key material setup (§4.K) along the way.
pub fn build_app_state(config: Arc<Config>, claude_dir: PathBuf, backend_command: Vec<String>) -> anyhow::Result<AppState> {
    let analytics_dir = keys::ensure_analytics_dir(&claude_dir).context("preparing analytics directory")?;

    let api_token_hash = if config.auth.enabled {
        Some(
            keys::load_or_generate_api_key_hash(&analytics_dir, &config.auth.api_key_path)
                .context("loading API key")?,
        )
    } else {
        tracing::warn!("auth.enabled=false — all non-GET endpoints are unauthenticated");
        None
    };

    if config.tls.enabled {
        keys::ensure_tls_cert(&config.tls.cert_path, &config.tls.key_path).context("preparing TLS certificate")?;
    }

    let storage = Arc::new(Storage::open(&analytics_dir).context("opening storage")?);
    let hub = Hub::spawn();
    let sessions = Arc::new(SessionManager::new(
        storage.clone(),
        hub.clone(),
        config.agent.max_concurrent_sessions,
        backend_command,
    ));
    let detector = Arc::new(Detector::new());
    // §6: the reset file lives at `${claude_dir}/.analytics_reset`, a
    // level up from the analytics directory that holds the DB and secret.
    let reset = Arc::new(ResetTracker::load(&claude_dir));

    Ok(AppState {
        config,
        storage,
        hub,
        sessions,
        detector,
        reset,
        watcher: Arc::new(Mutex::new(None)),
        claude_dir,
        api_token_hash,
    })
}

/// Start the transcript watcher and the cleanup ticker. Both run for the
/// lifetime of the process; neither holds up server startup.
pub fn spawn_background_tasks(state: &AppState) {
    spawn_transcript_watcher(state);
    spawn_cleanup_ticker(state);
}

fn spawn_transcript_watcher(state: &AppState) {
    let storage = state.storage.clone();
    let root = state.claude_dir.clone();
    let walk_root = root.clone();

    conductor_transcript::walk_conversations(&walk_root, &storage);

    let watch_storage = storage.clone();
    let watch_root = root.clone();
    match TranscriptWatcher::start(root, move || {
        conductor_transcript::walk_conversations(&watch_root, &watch_storage);
    }) {
        Ok(watcher) => {
            *state.watcher.lock() = Some(watcher);
            tracing::info!("transcript watcher started");
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to start transcript watcher, falling back to periodic re-walk");
            spawn_periodic_walk(state.clone());
        }
    }
}

fn spawn_periodic_walk(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(5));
        loop {
            interval.tick().await;
            conductor_transcript::walk_conversations(&state.claude_dir, &state.storage);
        }
    });
}

/// Cleanup scheduler (§4.L): on each tick, end and delete sessions past
/// retention. Bounded per tick by `cleanup_once`'s own bulk-delete query;
/// partial progress across ticks is safe since each tick re-derives the
/// stale set from storage.
fn spawn_cleanup_ticker(state: &AppState) {
    if !state.config.agent.cleanup_enabled {
        tracing::info!("cleanup scheduler disabled (agent.cleanup_enabled=false)");
        return;
    }

    let sessions = state.sessions.clone();
    let retention_days = state.config.agent.retention_days;
    let interval_hours = state.config.agent.cleanup_interval_hours.max(1);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_hours * 3600));
        loop {
            interval.tick().await;
            match sessions.cleanup_once(retention_days).await {
                Ok((sessions_deleted, messages_deleted)) => {
                    if sessions_deleted > 0 {
                        tracing::info!(sessions_deleted, messages_deleted, "cleanup tick completed");
                    }
                }
                Err(e) => tracing::warn!(error = %e, "cleanup tick failed, will retry next tick"),
            }
        }
    });
}

pub fn claude_dir_from_env() -> PathBuf {
    std::env::var_os("CLAUDE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| dirs_home().join(".claude"))
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}
