//! Process/shell detector (§4.D).
//!
//! Enumerates OS processes through `sysinfo`, filters to likely assistant
//! CLI invocations (or their backing shells) by command-line substring
//! match, and caches the last detection for a short TTL so frequent
//! callers (the stats endpoint, the state calculator) don't trigger a
//! syscall storm.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use sysinfo::System;

/// Guardrail against syscall storms, not a correctness requirement (§9).
pub const CACHE_TTL: Duration = Duration::from_millis(500);
pub const DETECTION_TIMEOUT: Duration = Duration::from_secs(5);

/// Command-line substrings that identify an assistant CLI invocation.
const ASSISTANT_MARKERS: &[&str] = &["claude", "assistant-cli"];

/// Known false positives to explicitly exclude (§4.D).
const EXCLUDED_MARKERS: &[&str] = &[
    "crashpad_handler",
    ".app/Contents",
    "grep",
    "conductor-gateway",
];

#[derive(Debug, Clone, Serialize)]
pub struct ProcessInfo {
    pub pid: u32,
    pub command: String,
    pub cwd: Option<String>,
}

struct Cache {
    fetched_at: Instant,
    processes: Vec<ProcessInfo>,
    shells: Vec<ProcessInfo>,
}

pub struct Detector {
    system: Mutex<System>,
    cache: Mutex<Option<Cache>>,
}

impl Default for Detector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector {
    pub fn new() -> Self {
        Detector {
            system: Mutex::new(System::new_all()),
            cache: Mutex::new(None),
        }
    }

    /// Cached accessor for likely assistant CLI processes (§4.D).
    pub async fn processes(&self) -> Vec<ProcessInfo> {
        self.cached(|c| c.processes.clone()).await
    }

    /// Cached accessor for assistant-spawned shell processes (§4.D).
    pub async fn shells(&self) -> Vec<ProcessInfo> {
        self.cached(|c| c.shells.clone()).await
    }

    /// Invalidate the cache so the next call re-enumerates (§4.D ClearCache).
    pub fn clear_cache(&self) {
        *self.cache.lock() = None;
    }

    async fn cached(&self, read: impl Fn(&Cache) -> Vec<ProcessInfo>) -> Vec<ProcessInfo> {
        if let Some(cache) = self.cache.lock().as_ref() {
            if cache.fetched_at.elapsed() < CACHE_TTL {
                return read(cache);
            }
        }

        let Some(all) = self.refresh_under_timeout().await else {
            // Transient failure (§7): return empty, never an error.
            return Vec::new();
        };

        let cache = Cache {
            fetched_at: Instant::now(),
            processes: filter(&all, ASSISTANT_MARKERS),
            shells: filter_shells(&all),
        };
        let result = read(&cache);
        *self.cache.lock() = Some(cache);

        result
    }

    /// Enumerate all processes, bounded by a 5s timeout (§4.D). On
    /// timeout, the caller falls back to an empty result rather than an
    /// error — detection failures are transient (§7).
    async fn refresh_under_timeout(&self) -> Option<Vec<ProcessInfo>> {
        tokio::time::timeout(DETECTION_TIMEOUT, async {
            let mut sys = self.system.lock();
            sys.refresh_all();
            enumerate(&sys)
        })
        .await
        .ok()
    }
}

fn enumerate(system: &System) -> Vec<ProcessInfo> {
    system
        .processes()
        .values()
        .map(|proc| {
            let command = proc
                .cmd()
                .iter()
                .map(|s| s.to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join(" ");
            let cwd = extract_cwd(&command);
            ProcessInfo {
                pid: proc.pid().as_u32(),
                command,
                cwd,
            }
        })
        .collect()
}

fn extract_cwd(command: &str) -> Option<String> {
    for token in command.split_whitespace() {
        if let Some(rest) = token.strip_prefix("--cwd=") {
            return Some(rest.to_string());
        }
        if token == "--cwd" {
            // Value is the following token; re-scan to find it.
            let mut parts = command.split_whitespace();
            while let Some(t) = parts.next() {
                if t == "--cwd" {
                    return parts.next().map(|s| s.to_string());
                }
            }
        }
    }
    None
}

fn is_excluded(command: &str) -> bool {
    EXCLUDED_MARKERS.iter().any(|marker| command.contains(marker))
}

fn filter(all: &[ProcessInfo], markers: &[&str]) -> Vec<ProcessInfo> {
    all.iter()
        .filter(|p| !is_excluded(&p.command))
        .filter(|p| markers.iter().any(|m| p.command.to_lowercase().contains(m)))
        .cloned()
        .collect()
}

fn filter_shells(all: &[ProcessInfo]) -> Vec<ProcessInfo> {
    all.iter()
        .filter(|p| !is_excluded(&p.command))
        .filter(|p| {
            let cmd = &p.command;
            (cmd.contains("bash -c") || cmd.contains("sh -c") || cmd.contains("shell-"))
                && !is_interactive_login(cmd)
        })
        .cloned()
        .collect()
}

fn is_interactive_login(command: &str) -> bool {
    command.contains("-l") || command.contains("--login") || command.ends_with("bash") || command.ends_with("sh")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_cwd_from_equals_form() {
        assert_eq!(
            extract_cwd("claude --cwd=/home/user/project"),
            Some("/home/user/project".to_string())
        );
    }

    #[test]
    fn extracts_cwd_from_space_form() {
        assert_eq!(
            extract_cwd("claude --cwd /home/user/project"),
            Some("/home/user/project".to_string())
        );
    }

    #[test]
    fn excludes_known_false_positives() {
        assert!(is_excluded("/Applications/Chrome.app/Contents/MacOS/crashpad_handler"));
        assert!(is_excluded("grep claude"));
    }

    #[test]
    fn shell_filter_excludes_interactive_login() {
        let procs = vec![
            ProcessInfo { pid: 1, command: "bash -c \"claude --cwd=/x\"".into(), cwd: None },
            ProcessInfo { pid: 2, command: "-bash --login".into(), cwd: None },
        ];
        let shells = filter_shells(&procs);
        assert_eq!(shells.len(), 1);
        assert_eq!(shells[0].pid, 1);
    }

    #[tokio::test]
    async fn clear_cache_forces_recompute() {
        let detector = Detector::new();
        let _ = detector.processes().await;
        detector.clear_cache();
        assert!(detector.cache.lock().is_none());
    }
}
