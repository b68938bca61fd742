//! Pending-operation ledger.
//!
//! Bridges request/response semantics over the message socket: every
//! acknowledged send registers a one-shot reply slot keyed by its
//! correlation id, and the matching `sync:ack`, `sync:conflict` or `error`
//! envelope settles it. Entries leave the ledger on settlement or timeout,
//! whichever happens first.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::error::{ConflictInfo, SyncError};
use super::protocol::{generate_message_id, ServerMessage};

/// Successful acknowledgment of an operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ack {
    pub message_id: String,
    pub new_version: Option<u64>,
    /// Real id assigned by the server to a created slide.
    pub server_id: Option<String>,
}

pub type Reply = Result<Ack, SyncError>;

struct PendingEntry {
    reply: oneshot::Sender<Reply>,
    issued_at: Instant,
}

pub struct PendingLedger {
    entries: Mutex<HashMap<String, PendingEntry>>,
    timeout: Duration,
}

impl PendingLedger {
    pub fn new(timeout: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Registers a new pending operation under a fresh correlation id.
    pub fn register(&self) -> (String, oneshot::Receiver<Reply>) {
        let (tx, rx) = oneshot::channel();
        let mut entries = self.entries.lock();
        let mut id = generate_message_id();
        while entries.contains_key(&id) {
            id = generate_message_id();
        }
        entries.insert(
            id.clone(),
            PendingEntry {
                reply: tx,
                issued_at: Instant::now(),
            },
        );
        (id, rx)
    }

    /// Drops an entry whose frame never made it onto the socket.
    pub fn cancel(&self, id: &str) {
        self.entries.lock().remove(id);
    }

    /// Waits for the reply to `id`, removing the entry if the ack window
    /// expires first.
    pub async fn wait(&self, id: &str, reply: oneshot::Receiver<Reply>) -> Reply {
        match tokio::time::timeout(self.timeout, reply).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(SyncError::Protocol(format!(
                "pending operation {} was dropped",
                id
            ))),
            Err(_) => {
                self.entries.lock().remove(id);
                tracing::warn!("Operation {} timed out after {:?}", id, self.timeout);
                Err(SyncError::Timeout)
            }
        }
    }

    /// Settles the pending operation named by an inbound ack, conflict or
    /// error. Returns `true` if an entry matched. Replies for unknown or
    /// expired ids are dropped.
    pub fn settle(&self, message: &ServerMessage) -> bool {
        let (id, result) = match message {
            ServerMessage::SyncAck {
                original_message_id: Some(id),
                success,
                new_version,
                server_id,
            } => {
                let result = if *success {
                    Ok(Ack {
                        message_id: id.clone(),
                        new_version: *new_version,
                        server_id: server_id.clone(),
                    })
                } else {
                    Err(SyncError::OperationFailed)
                };
                (id, result)
            }
            ServerMessage::SyncConflict {
                original_message_id: Some(id),
                conflict_type,
                server_state,
                server_version,
            } => (
                id,
                Err(SyncError::Conflict(ConflictInfo {
                    kind: *conflict_type,
                    server_state: server_state.clone(),
                    server_version: *server_version,
                })),
            ),
            ServerMessage::Error {
                original_message_id: Some(id),
                error_code,
                error_message,
            } => (
                id,
                Err(SyncError::Server {
                    code: error_code.clone(),
                    message: error_message.clone(),
                }),
            ),
            _ => return false,
        };

        let Some(entry) = self.entries.lock().remove(id) else {
            tracing::debug!("Dropping {} for unknown or expired operation {}", message.kind(), id);
            return false;
        };

        tracing::debug!(
            "Settled operation {} with {} after {:?}",
            id,
            message.kind(),
            entry.issued_at.elapsed()
        );
        // The caller may have stopped waiting; nothing to do then.
        let _ = entry.reply.send(result);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ack(id: &str, version: Option<u64>) -> ServerMessage {
        ServerMessage::SyncAck {
            original_message_id: Some(id.to_string()),
            success: true,
            new_version: version,
            server_id: None,
        }
    }

    #[tokio::test]
    async fn test_ack_resolves_exactly_one_entry() {
        let ledger = PendingLedger::new(Duration::from_secs(10));
        let (id1, rx1) = ledger.register();
        let (_id2, _rx2) = ledger.register();
        assert_eq!(ledger.len(), 2);

        assert!(ledger.settle(&ack(&id1, Some(5))));
        // a duplicate ack finds nothing
        assert!(!ledger.settle(&ack(&id1, Some(5))));
        assert_eq!(ledger.len(), 1);

        let result = ledger.wait(&id1, rx1).await.unwrap();
        assert_eq!(result.new_version, Some(5));
        assert_eq!(result.message_id, id1);
    }

    #[tokio::test]
    async fn test_unsuccessful_ack_rejects() {
        let ledger = PendingLedger::new(Duration::from_secs(10));
        let (id, rx) = ledger.register();
        ledger.settle(&ServerMessage::SyncAck {
            original_message_id: Some(id.clone()),
            success: false,
            new_version: None,
            server_id: None,
        });
        assert!(matches!(
            ledger.wait(&id, rx).await,
            Err(SyncError::OperationFailed)
        ));
    }

    #[tokio::test]
    async fn test_conflict_rejects_with_server_state() {
        let ledger = PendingLedger::new(Duration::from_secs(10));
        let (id, rx) = ledger.register();
        ledger.settle(&ServerMessage::SyncConflict {
            original_message_id: Some(id.clone()),
            conflict_type: super::super::error::ConflictKind::VersionMismatch,
            server_state: serde_json::json!({"id": "s1", "title": "Server"}),
            server_version: 4,
        });
        let err = ledger.wait(&id, rx).await.unwrap_err();
        let conflict = err.conflict().unwrap();
        assert_eq!(conflict.server_version, 4);
        assert_eq!(conflict.server_state["title"], "Server");
    }

    #[tokio::test]
    async fn test_error_envelope_rejects() {
        let ledger = PendingLedger::new(Duration::from_secs(10));
        let (id, rx) = ledger.register();
        ledger.settle(&ServerMessage::Error {
            original_message_id: Some(id.clone()),
            error_code: "slide_not_found".into(),
            error_message: "Slide not found".into(),
        });
        match ledger.wait(&id, rx).await {
            Err(SyncError::Server { code, .. }) => assert_eq!(code, "slide_not_found"),
            other => panic!("Expected server error, got {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_removes_entry_and_ignores_late_ack() {
        let ledger = PendingLedger::new(Duration::from_secs(10));
        let (id, rx) = ledger.register();

        let result = ledger.wait(&id, rx).await;
        assert!(matches!(result, Err(SyncError::Timeout)));
        assert!(ledger.is_empty());

        assert!(!ledger.settle(&ack(&id, Some(2))));
    }

    #[test]
    fn test_unrelated_messages_are_ignored() {
        let ledger = PendingLedger::new(Duration::from_secs(10));
        let (_id, _rx) = ledger.register();
        assert!(!ledger.settle(&ServerMessage::SlideDelete {
            slide_id: "s1".into(),
            deleted_by: None,
        }));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_cancel() {
        let ledger = PendingLedger::new(Duration::from_secs(10));
        let (id, _rx) = ledger.register();
        ledger.cancel(&id);
        assert!(ledger.is_empty());
    }
}
