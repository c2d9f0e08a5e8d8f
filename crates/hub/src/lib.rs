//! Single-writer WebSocket fan-out hub (§4.B).
//!
//! One dedicated task owns the client registry and processes register /
//! unregister / broadcast commands off a single bounded queue, in order.
//! Each connected client gets its own bounded outbound channel; the
//! dashboard's WebSocket writer task drains that channel onto the socket.
//! Routing broadcasts through one queue, and pushing to each client's own
//! queue in the same order, is what gives the ordering guarantee in §8
//! property 6 without any lock held across a client write.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};

use conductor_domain::trace::TraceEvent;

/// Bounded capacity for both the command queue and each client's outbound
/// queue — §4.B requires capacity ≥ 256 with a blocking producer on
/// overflow, which is exactly what a bounded `tokio::sync::mpsc` gives.
pub const BROADCAST_CAPACITY: usize = 256;

pub type ClientId = String;

enum Command {
    Register {
        id: ClientId,
        sender: mpsc::Sender<String>,
    },
    Unregister {
        id: ClientId,
    },
    Broadcast {
        event_type: String,
        payload: serde_json::Value,
    },
    Shutdown {
        ack: oneshot::Sender<()>,
    },
}

/// Handle to the hub; cheap to clone, all clones share the same event loop.
#[derive(Clone)]
pub struct Hub {
    cmd_tx: mpsc::Sender<Command>,
    shut_down: std::sync::Arc<Mutex<bool>>,
}

impl Hub {
    /// Spawn the event loop and return a handle to it.
    pub fn spawn() -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(BROADCAST_CAPACITY);
        tokio::spawn(run_loop(cmd_rx));
        Hub {
            cmd_tx,
            shut_down: std::sync::Arc::new(Mutex::new(false)),
        }
    }

    /// Register a new client, returning its id and the receiving end of
    /// its dedicated outbound channel. The caller (WS handler) drains that
    /// receiver onto the socket.
    pub async fn register(&self) -> (ClientId, mpsc::Receiver<String>) {
        let id = conductor_domain::ids::new_id();
        let (tx, rx) = mpsc::channel(BROADCAST_CAPACITY);
        // Best-effort: if the loop has shut down, the client just gets a
        // channel that will never receive anything.
        let _ = self
            .cmd_tx
            .send(Command::Register {
                id: id.clone(),
                sender: tx,
            })
            .await;
        (id, rx)
    }

    pub async fn unregister(&self, id: ClientId) {
        let _ = self.cmd_tx.send(Command::Unregister { id }).await;
    }

    /// Marshal `payload` under `event_type` once and push it to every
    /// connected client (§4.B Broadcast). Blocks if the command queue is
    /// full — deliberately; see module docs and DESIGN.md.
    pub async fn broadcast(&self, event_type: &str, payload: serde_json::Value) {
        let _ = self
            .cmd_tx
            .send(Command::Broadcast {
                event_type: event_type.to_string(),
                payload,
            })
            .await;
    }

    /// Idempotent: a second call is a harmless no-op once the loop has
    /// already drained (§8 property 7).
    pub async fn shutdown(&self) {
        let already = {
            let mut guard = self.shut_down.lock();
            let was = *guard;
            *guard = true;
            was
        };
        if already {
            return;
        }
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.cmd_tx.send(Command::Shutdown { ack: ack_tx }).await.is_ok() {
            let _ = ack_rx.await;
        }
    }
}

async fn run_loop(mut cmd_rx: mpsc::Receiver<Command>) {
    let mut clients: HashMap<ClientId, mpsc::Sender<String>> = HashMap::new();

    while let Some(cmd) = cmd_rx.recv().await {
        match cmd {
            Command::Register { id, sender } => {
                let frame = serde_json::json!({"type": "connected"}).to_string();
                if sender.send(frame).await.is_ok() {
                    clients.insert(id, sender);
                    TraceEvent::HubClientRegistered { total_clients: clients.len() }.emit();
                }
            }
            Command::Unregister { id } => {
                if clients.remove(&id).is_some() {
                    TraceEvent::HubClientUnregistered { total_clients: clients.len() }.emit();
                }
            }
            Command::Broadcast { event_type, payload } => {
                let frame = serde_json::json!({"type": event_type, "payload": payload}).to_string();
                let mut dead = Vec::new();
                for (id, sender) in clients.iter() {
                    if sender.send(frame.clone()).await.is_err() {
                        dead.push(id.clone());
                    }
                }
                for id in dead {
                    clients.remove(&id);
                }
            }
            Command::Shutdown { ack } => {
                clients.clear();
                let _ = ack.send(());
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_receives_connected_frame() {
        let hub = Hub::spawn();
        let (_id, mut rx) = hub.register().await;
        let frame = rx.recv().await.unwrap();
        assert!(frame.contains("connected"));
    }

    #[tokio::test]
    async fn broadcast_preserves_enqueue_order_per_client() {
        let hub = Hub::spawn();
        let (_id, mut rx) = hub.register().await;
        let _ = rx.recv().await; // connected frame

        hub.broadcast("e1", serde_json::json!({"n": 1})).await;
        hub.broadcast("e2", serde_json::json!({"n": 2})).await;

        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(first.contains("\"e1\""));
        assert!(second.contains("\"e2\""));
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let hub = Hub::spawn();
        hub.shutdown().await;
        hub.shutdown().await;
    }

    #[tokio::test]
    async fn two_clients_both_observe_broadcast_order() {
        let hub = Hub::spawn();
        let (_id1, mut rx1) = hub.register().await;
        let (_id2, mut rx2) = hub.register().await;
        let _ = rx1.recv().await;
        let _ = rx2.recv().await;

        hub.broadcast("a", serde_json::json!(1)).await;
        hub.broadcast("b", serde_json::json!(2)).await;

        assert!(rx1.recv().await.unwrap().contains("\"a\""));
        assert!(rx1.recv().await.unwrap().contains("\"b\""));
        assert!(rx2.recv().await.unwrap().contains("\"a\""));
        assert!(rx2.recv().await.unwrap().contains("\"b\""));
    }
}
