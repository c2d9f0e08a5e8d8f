//! Reset tracker (§4.G).
//!
//! A soft "reset" lets a user zero out analytics totals without deleting
//! history: the delta is subtracted from raw totals at read time rather
//! than mutating stored rows.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use conductor_domain::trace::TraceEvent;
use conductor_domain::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

const RESET_FILE_NAME: &str = ".analytics_reset";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetPoint {
    pub tokens: i64,
    pub conversations: i64,
    pub reason: String,
    pub set_at: DateTime<Utc>,
}

pub struct ResetTracker {
    path: PathBuf,
    point: RwLock<Option<ResetPoint>>,
}

impl ResetTracker {
    /// Loads the reset point from `${claude_dir}/.analytics_reset` if
    /// present. An absent or malformed file is treated as "no reset
    /// point"; a malformed file is logged, never fatal.
    pub fn load(claude_dir: &Path) -> Self {
        let path = claude_dir.join(RESET_FILE_NAME);
        let point = match std::fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<ResetPoint>(&contents) {
                Ok(point) => Some(point),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "malformed reset point file, ignoring");
                    None
                }
            },
            Err(_) => None,
        };

        ResetTracker {
            path,
            point: RwLock::new(point),
        }
    }

    pub fn has_reset_point(&self) -> bool {
        self.point.read().is_some()
    }

    pub fn get_reset_point(&self) -> Option<ResetPoint> {
        self.point.read().clone()
    }

    /// Writes the new reset point atomically (write-temp, then rename)
    /// and emits a trace event carrying the delta relative to the prior
    /// point, if any.
    pub fn set_reset_point(&self, tokens: i64, conversations: i64, reason: String) -> Result<()> {
        let previous = self.point.read().clone();
        let new_point = ResetPoint {
            tokens,
            conversations,
            reason: reason.clone(),
            set_at: Utc::now(),
        };

        let serialized = serde_json::to_string_pretty(&new_point)?;
        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, serialized)?;
        std::fs::rename(&tmp_path, &self.path)?;

        *self.point.write() = Some(new_point);

        let token_delta = tokens - previous.as_ref().map(|p| p.tokens).unwrap_or(0);
        let conversation_delta =
            conversations - previous.as_ref().map(|p| p.conversations).unwrap_or(0);
        TraceEvent::ResetPointSet {
            token_delta,
            conversation_delta,
            reason,
        }
        .emit();

        Ok(())
    }

    pub fn clear_reset_point(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        *self.point.write() = None;
        TraceEvent::ResetPointCleared.emit();
        Ok(())
    }

    /// `(max(0, raw_tokens - delta.tokens), max(0, raw_conversations - delta.conversations))`
    /// when a reset point exists, else passthrough.
    pub fn apply_delta(&self, raw_tokens: i64, raw_conversations: i64) -> (i64, i64) {
        match self.point.read().as_ref() {
            Some(point) => (
                (raw_tokens - point.tokens).max(0),
                (raw_conversations - point.conversations).max(0),
            ),
            None => (raw_tokens, raw_conversations),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_file_means_no_reset_point() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ResetTracker::load(dir.path());
        assert!(!tracker.has_reset_point());
        assert_eq!(tracker.apply_delta(100, 10), (100, 10));
    }

    #[test]
    fn malformed_file_is_ignored_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".analytics_reset"), "not json").unwrap();
        let tracker = ResetTracker::load(dir.path());
        assert!(!tracker.has_reset_point());
    }

    #[test]
    fn set_then_apply_delta_subtracts_and_floors_at_zero() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ResetTracker::load(dir.path());
        tracker.set_reset_point(500, 20, "manual reset".to_string()).unwrap();
        assert_eq!(tracker.apply_delta(600, 25), (100, 5));
        assert_eq!(tracker.apply_delta(100, 5), (0, 0));
    }

    #[test]
    fn clear_reset_point_removes_file_and_state() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ResetTracker::load(dir.path());
        tracker.set_reset_point(10, 1, "x".to_string()).unwrap();
        assert!(dir.path().join(".analytics_reset").exists());
        tracker.clear_reset_point().unwrap();
        assert!(!dir.path().join(".analytics_reset").exists());
        assert!(!tracker.has_reset_point());
    }

    #[test]
    fn two_trackers_on_same_directory_observe_identical_state_after_set() {
        let dir = tempfile::tempdir().unwrap();
        let first = ResetTracker::load(dir.path());
        first.set_reset_point(42, 7, "sync test".to_string()).unwrap();

        let second = ResetTracker::load(dir.path());
        let a = first.get_reset_point().unwrap();
        let b = second.get_reset_point().unwrap();
        assert_eq!(a.tokens, b.tokens);
        assert_eq!(a.conversations, b.conversations);
    }
}
