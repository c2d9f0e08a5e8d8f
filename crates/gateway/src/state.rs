//! Shared application state passed to every handler (§4.J).

use std::sync::Arc;

use conductor_detect::Detector;
use conductor_domain::config::Config;
use conductor_hub::Hub;
use conductor_reset::ResetTracker;
use conductor_sessions::SessionManager;
use conductor_storage::Storage;
use conductor_watch::TranscriptWatcher;
use parking_lot::Mutex;

/// Dependency container handed to every route and WS handler. Cheap to
/// clone — everything behind `Arc` or an internal handle.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Arc<Storage>,
    pub hub: Hub,
    pub sessions: Arc<SessionManager>,
    pub detector: Arc<Detector>,
    pub reset: Arc<ResetTracker>,
    pub watcher: Arc<Mutex<Option<TranscriptWatcher>>>,
    pub claude_dir: std::path::PathBuf,

    /// SHA-256 hash of the API bearer token, computed once at startup.
    /// `None` means dev mode — auth is not enforced.
    pub api_token_hash: Option<Vec<u8>>,
}
