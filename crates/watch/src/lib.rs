//! File watcher (§4.E).
//!
//! Watches the transcript root for new or growing `.jsonl` files and
//! invokes a refresh callback after a short debounce window, so a burst
//! of writes from one turn collapses into a single re-walk.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, RecvTimeoutError};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::RwLock;

pub const TRANSCRIPT_EXTENSION: &str = "jsonl";
pub const DEBOUNCE: Duration = Duration::from_millis(100);
const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(25);

pub struct TranscriptWatcher {
    active: Arc<RwLock<bool>>,
    stop_flag: Arc<AtomicBool>,
    _watcher: Option<RecommendedWatcher>,
    join_handle: Option<std::thread::JoinHandle<()>>,
}

impl TranscriptWatcher {
    /// Starts watching `root` recursively; `on_change` is invoked (from the
    /// watcher's own thread) after `DEBOUNCE` of quiet following the last
    /// matching create/write event.
    pub fn start(
        root: PathBuf,
        on_change: impl Fn() + Send + Sync + 'static,
    ) -> conductor_domain::Result<Self> {
        let (tx, rx) = channel::<Event>();

        let mut watcher = RecommendedWatcher::new(
            move |res: Result<Event, notify::Error>| {
                if let Ok(event) = res {
                    let _ = tx.send(event);
                }
            },
            notify::Config::default(),
        )
        .map_err(|e| conductor_domain::Error::Other(e.to_string()))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| conductor_domain::Error::Other(e.to_string()))?;

        let active = Arc::new(RwLock::new(true));
        let stop_flag = Arc::new(AtomicBool::new(false));

        let thread_active = active.clone();
        let thread_stop = stop_flag.clone();
        let join_handle = std::thread::Builder::new()
            .name("transcript-watcher".to_string())
            .spawn(move || run_loop(rx, on_change, thread_stop, thread_active))
            .map_err(|e| conductor_domain::Error::Other(e.to_string()))?;

        Ok(TranscriptWatcher {
            active,
            stop_flag,
            _watcher: Some(watcher),
            join_handle: Some(join_handle),
        })
    }

    pub fn is_active(&self) -> bool {
        *self.active.read()
    }

    /// Idempotent: a second call observes `stop_flag` already set and
    /// returns immediately.
    pub fn stop(&mut self) {
        self.stop_flag.store(true, Ordering::SeqCst);
        if let Some(handle) = self.join_handle.take() {
            let started = Instant::now();
            while !handle.is_finished() && started.elapsed() < STOP_JOIN_TIMEOUT {
                std::thread::sleep(Duration::from_millis(10));
            }
            let _ = handle.join();
        }
        *self.active.write() = false;
    }
}

impl Drop for TranscriptWatcher {
    fn drop(&mut self) {
        if self.join_handle.is_some() {
            self.stop();
        }
    }
}

fn run_loop(
    rx: std::sync::mpsc::Receiver<Event>,
    on_change: impl Fn() + Send + Sync + 'static,
    stop_flag: Arc<AtomicBool>,
    active: Arc<RwLock<bool>>,
) {
    let on_change = Arc::new(on_change);
    let mut pending_since: Option<Instant> = None;

    loop {
        if stop_flag.load(Ordering::SeqCst) {
            break;
        }

        match rx.recv_timeout(POLL_INTERVAL) {
            Ok(event) => {
                if matches_transcript(&event) {
                    pending_since = Some(Instant::now());
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        if let Some(since) = pending_since {
            if since.elapsed() >= DEBOUNCE {
                // Run the callback on its own thread so a slow re-walk
                // never delays draining the next batch of fs events (§5).
                let callback = on_change.clone();
                let _ = std::thread::Builder::new()
                    .name("transcript-watcher-refresh".to_string())
                    .spawn(move || callback());
                pending_since = None;
            }
        }
    }

    *active.write() = false;
}

fn matches_transcript(event: &Event) -> bool {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return false;
    }
    event
        .paths
        .iter()
        .any(|p| is_transcript_path(p))
}

fn is_transcript_path(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some(TRANSCRIPT_EXTENSION)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration as StdDuration;

    #[test]
    fn fires_callback_after_debounce_on_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        let mut watcher =
            TranscriptWatcher::start(dir.path().to_path_buf(), move || {
                count_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        std::fs::write(dir.path().join("session.jsonl"), "{}").unwrap();
        std::thread::sleep(StdDuration::from_millis(400));

        assert!(count.load(Ordering::SeqCst) >= 1);
        watcher.stop();
        assert!(!watcher.is_active());
    }

    #[test]
    fn ignores_non_transcript_files() {
        let dir = tempfile::tempdir().unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        let mut watcher =
            TranscriptWatcher::start(dir.path().to_path_buf(), move || {
                count_clone.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        std::fs::write(dir.path().join("notes.txt"), "hello").unwrap();
        std::thread::sleep(StdDuration::from_millis(300));

        assert_eq!(count.load(Ordering::SeqCst), 0);
        watcher.stop();
    }

    #[test]
    fn stop_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut watcher = TranscriptWatcher::start(dir.path().to_path_buf(), || {}).unwrap();
        watcher.stop();
        watcher.stop();
        assert!(!watcher.is_active());
    }
}
