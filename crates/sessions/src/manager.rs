//! Session manager (§4.H) — the hardest subcomponent.
//!
//! Maintains an in-memory `{session_id → handle}` map, a process-wide
//! admission counter, and the per-session locks that keep prompt delivery
//! from pipelining within a single session.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use conductor_bridge::{Bridge, BridgeChunk, BridgeOutcome};
use conductor_domain::trace::TraceEvent;
use conductor_domain::{ids, Error, Result};
use conductor_hub::Hub;
use conductor_storage::records::{MessageRecord, SessionRecord};
use conductor_storage::Storage;
use parking_lot::{Mutex, RwLock};

use crate::lock::SessionLockMap;
use crate::session::{SessionHandle, SessionStatus};

pub struct SessionManager {
    storage: Arc<Storage>,
    hub: Hub,
    locks: SessionLockMap,
    sessions: RwLock<HashMap<String, Arc<SessionHandle>>>,
    /// Ids reserved by an in-flight `create_session` call that hasn't yet
    /// inserted its real handle into `sessions`. Checked together with
    /// `sessions` under one lock acquisition so two concurrent callers with
    /// the same id can't both pass the duplicate check.
    reserving: Mutex<HashSet<String>>,
    active: Mutex<usize>,
    max_concurrent_sessions: usize,
    backend_command: Vec<String>,
}

impl SessionManager {
    pub fn new(
        storage: Arc<Storage>,
        hub: Hub,
        max_concurrent_sessions: usize,
        backend_command: Vec<String>,
    ) -> Self {
        SessionManager {
            storage,
            hub,
            locks: SessionLockMap::new(),
            sessions: RwLock::new(HashMap::new()),
            reserving: Mutex::new(HashSet::new()),
            active: Mutex::new(0),
            max_concurrent_sessions,
            backend_command,
        }
    }

    pub fn active_count(&self) -> usize {
        *self.active.lock()
    }

    /// Session creation contract (§4.H): reject on id collision or
    /// admission overshoot before any side effect is committed.
    pub fn create_session(
        &self,
        session_id: Option<String>,
        options: serde_json::Value,
    ) -> Result<SessionRecord> {
        let id = session_id.unwrap_or_else(ids::new_id);

        // Reserve the id against both the live table and any other
        // in-flight creation under one `reserving` lock acquisition, so a
        // concurrent caller with the same id observes this one before
        // either reaches storage. Every error path below releases the
        // reservation again.
        {
            let mut reserving = self.reserving.lock();
            if self.sessions.read().contains_key(&id) || reserving.contains(&id) {
                return Err(Error::Conflict("session_exists".to_string()));
            }
            reserving.insert(id.clone());
        }

        let release_reservation = || {
            self.reserving.lock().remove(&id);
        };

        {
            let mut active = self.active.lock();
            if *active >= self.max_concurrent_sessions {
                drop(active);
                release_reservation();
                return Err(Error::Conflict("max_concurrent_sessions_reached".to_string()));
            }
            *active += 1;
        }

        let bridge = match Bridge::spawn(id.clone(), self.backend_command.clone(), self.storage.clone(), self.hub.clone()) {
            Ok(bridge) => Arc::new(bridge),
            Err(e) => {
                release_reservation();
                self.release_admission();
                return Err(e);
            }
        };

        let now = Utc::now();
        let record = SessionRecord {
            id: id.clone(),
            created_at: now,
            updated_at: now,
            status: "idle".to_string(),
            options,
            message_count: 0,
            cost_usd: 0.0,
            error_message: None,
            git_branch: None,
        };

        if let Err(e) = self.storage.record_session(&record) {
            release_reservation();
            self.release_admission();
            return Err(e);
        }

        let handle = Arc::new(SessionHandle::new(id.clone(), bridge));
        handle.set_status(SessionStatus::Idle);
        self.sessions.write().insert(id.clone(), handle);
        release_reservation();

        TraceEvent::SessionCreated { session_id: id }.emit();
        Ok(record)
    }

    /// Prompt delivery contract (§4.H `SendPrompt`). Returns a per-turn
    /// subscription of the bridge's chunk stream; completion is driven in
    /// the background and reflected in storage/status once the bridge
    /// reaches a terminal chunk.
    pub async fn send_prompt(
        &self,
        session_id: &str,
        prompt: &str,
    ) -> Result<tokio::sync::broadcast::Receiver<BridgeChunk>> {
        let handle = self
            .sessions
            .read()
            .get(session_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("session {session_id} not found")))?;

        let lock = self.locks.get(session_id);
        let _guard = lock.lock().await;

        if handle.status() == SessionStatus::Ended {
            return Err(Error::Conflict("session_ended".to_string()));
        }
        if !handle.status().accepts_prompt() {
            return Err(Error::Conflict("session_busy".to_string()));
        }

        let now = Utc::now();
        self.storage.append_message(
            session_id,
            "user",
            &serde_json::json!({"text": prompt}),
            &serde_json::Value::Null,
            now,
        )?;

        let from = handle.status().as_str().to_string();
        handle.set_status(SessionStatus::Processing);
        TraceEvent::SessionStatusChanged {
            session_id: session_id.to_string(),
            from,
            to: "processing".to_string(),
        }
        .emit();

        let subscription = handle.bridge.subscribe();
        handle.bridge.send_prompt(prompt).await?;

        self.spawn_completion_watcher(session_id.to_string(), handle);

        Ok(subscription)
    }

    fn spawn_completion_watcher(&self, session_id: String, handle: Arc<SessionHandle>) {
        let storage = self.storage.clone();
        tokio::spawn(async move {
            match handle.bridge.next_outcome().await {
                Some(BridgeOutcome::Idle) => {
                    handle.set_status(SessionStatus::Idle);
                    TraceEvent::SessionStatusChanged {
                        session_id: session_id.clone(),
                        from: "processing".to_string(),
                        to: "idle".to_string(),
                    }
                    .emit();
                }
                Some(BridgeOutcome::Error { message }) => {
                    handle.set_status(SessionStatus::Error);
                    if let Ok(Some(mut record)) = storage.get_session(&session_id) {
                        record.status = "error".to_string();
                        record.error_message = Some(message);
                        record.updated_at = Utc::now();
                        let _ = storage.update_session(&record);
                    }
                    TraceEvent::SessionStatusChanged {
                        session_id: session_id.clone(),
                        from: "processing".to_string(),
                        to: "error".to_string(),
                    }
                    .emit();
                }
                None => {}
            }
        });
    }

    /// End-session contract (§4.H): idempotent, cancels the bridge and
    /// awaits its drain before releasing admission.
    pub async fn end_session(&self, session_id: &str) -> Result<()> {
        let handle = self.sessions.read().get(session_id).cloned();
        let Some(handle) = handle else {
            return Ok(());
        };
        if handle.status() == SessionStatus::Ended {
            return Ok(());
        }

        let drained = handle.bridge.cancel_and_drain().await;
        if !drained {
            tracing::warn!(session_id, "bridge did not drain within grace period, force-terminating");
        }
        handle.set_status(SessionStatus::Ended);

        if let Ok(Some(mut record)) = self.storage.get_session(session_id) {
            record.status = "ended".to_string();
            record.updated_at = Utc::now();
            let _ = self.storage.update_session(&record);
        }

        self.sessions.write().remove(session_id);
        self.locks.remove(session_id);
        self.release_admission();

        TraceEvent::SessionEnded { session_id: session_id.to_string() }.emit();
        Ok(())
    }

    /// `filter` one of `{all, active, ended}` (§4.H Listing contract).
    pub fn list_all_sessions(&self, filter: &str) -> Result<Vec<SessionRecord>> {
        self.storage.list_sessions(filter)
    }

    pub fn get_messages(&self, session_id: &str, limit: i64, offset: i64) -> Result<(Vec<MessageRecord>, bool)> {
        self.storage.get_messages(session_id, limit, offset)
    }

    /// Cleanup job (§4.H/§4.L): ends any still-live handle past
    /// retention, then deletes its rows and messages. Bounded per call —
    /// the caller (a ticker) re-invokes this each tick, so partial
    /// progress on one tick is safe to resume on the next.
    pub async fn cleanup_once(&self, retention_days: i64) -> Result<(usize, usize)> {
        let cutoff = Utc::now() - chrono::Duration::days(retention_days);
        let stale: Vec<SessionRecord> = self
            .storage
            .list_sessions("all")?
            .into_iter()
            .filter(|s| s.updated_at < cutoff)
            .collect();

        let messages_deleted: usize = stale
            .iter()
            .map(|s| self.storage.message_count(&s.id).unwrap_or(0).max(0) as usize)
            .sum();

        for session in &stale {
            self.end_session(&session.id).await?;
        }

        let sessions_deleted = self.storage.delete_sessions_older_than(cutoff)?;
        TraceEvent::CleanupTickCompleted {
            sessions_deleted,
            messages_deleted,
        }
        .emit();

        Ok((sessions_deleted, messages_deleted))
    }

    fn release_admission(&self) {
        let mut active = self.active.lock();
        *active = active.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> (tempfile::TempDir, SessionManager) {
        let dir = tempfile::tempdir().unwrap();
        let storage = Arc::new(Storage::open_for_test(dir.path()).unwrap());
        let hub = Hub::spawn();
        let manager = SessionManager::new(storage, hub, 2, vec!["cat".to_string()]);
        (dir, manager)
    }

    #[test]
    fn create_session_rejects_duplicate_id() {
        let (_dir, manager) = manager();
        manager.create_session(Some("dup".to_string()), serde_json::Value::Null).unwrap();
        let err = manager.create_session(Some("dup".to_string()), serde_json::Value::Null).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn create_session_enforces_admission_cap() {
        let (_dir, manager) = manager();
        manager.create_session(Some("a".to_string()), serde_json::Value::Null).unwrap();
        manager.create_session(Some("b".to_string()), serde_json::Value::Null).unwrap();
        let err = manager.create_session(Some("c".to_string()), serde_json::Value::Null).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(manager.active_count(), 2);
    }

    #[tokio::test]
    async fn send_prompt_rejects_on_unknown_session() {
        let (_dir, manager) = manager();
        let err = manager.send_prompt("ghost", "hi").await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn end_session_is_idempotent() {
        let (_dir, manager) = manager();
        manager.create_session(Some("s1".to_string()), serde_json::Value::Null).unwrap();
        manager.end_session("s1").await.unwrap();
        manager.end_session("s1").await.unwrap();
        assert_eq!(manager.active_count(), 0);
    }

    #[test]
    fn list_all_sessions_filters_by_status() {
        let (_dir, manager) = manager();
        manager.create_session(Some("s1".to_string()), serde_json::Value::Null).unwrap();
        let active = manager.list_all_sessions("active").unwrap();
        assert_eq!(active.len(), 1);
    }
}
