//! Per-session serialization lock (§4.H concurrency model).
//!
//! Grounded on the teacher's `SessionLockMap` (`runtime/session_lock.rs`):
//! one `tokio::sync::Mutex` per session id, handed out on demand, so
//! operations on distinct sessions never contend while operations on the
//! same session queue behind each other.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex as SyncMutex;
use tokio::sync::Mutex as AsyncMutex;

#[derive(Default)]
pub struct SessionLockMap {
    locks: SyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SessionLockMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Arc<AsyncMutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    pub fn remove(&self, session_id: &str) {
        self.locks.lock().remove(session_id);
    }
}
