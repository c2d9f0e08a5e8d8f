//! In-process session handle (§4.H state machine).
//!
//! `created → idle ⇄ processing; idle → ended; processing → idle | error → ended`.
//! Any state → ended is terminal.

use std::sync::Arc;

use conductor_bridge::Bridge;
use parking_lot::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Created,
    Idle,
    Processing,
    Error,
    Ended,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Created => "created",
            SessionStatus::Idle => "idle",
            SessionStatus::Processing => "processing",
            SessionStatus::Error => "error",
            SessionStatus::Ended => "ended",
        }
    }

    /// Whether `SendPrompt` may be accepted in this state (§4.H: reject
    /// when missing, ended, or already processing).
    pub fn accepts_prompt(&self) -> bool {
        matches!(self, SessionStatus::Idle | SessionStatus::Created)
    }
}

pub struct SessionHandle {
    pub id: String,
    status: RwLock<SessionStatus>,
    pub bridge: Arc<Bridge>,
}

impl SessionHandle {
    pub fn new(id: String, bridge: Arc<Bridge>) -> Self {
        SessionHandle {
            id,
            status: RwLock::new(SessionStatus::Created),
            bridge,
        }
    }

    pub fn status(&self) -> SessionStatus {
        *self.status.read()
    }

    pub fn set_status(&self, status: SessionStatus) {
        *self.status.write() = status;
    }
}
