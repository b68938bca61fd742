//! Sync error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why the server refused to apply an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    VersionMismatch,
    ConcurrentEdit,
    Deleted,
    PermissionDenied,
    /// A category this client does not know; still a conflict.
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConflictKind::VersionMismatch => "version mismatch",
            ConflictKind::ConcurrentEdit => "concurrent edit",
            ConflictKind::Deleted => "deleted",
            ConflictKind::PermissionDenied => "permission denied",
            ConflictKind::Unknown => "unknown",
        };
        write!(f, "{}", name)
    }
}

/// The server's authoritative state reported with a conflict. Resolution is
/// up to the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictInfo {
    pub kind: ConflictKind,
    /// Raw server representation of the conflicting slide or presentation.
    pub server_state: serde_json::Value,
    pub server_version: u64,
}

/// Errors that can occur during sync client operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// No bearer credential is available for the socket handshake
    #[error("Not authenticated")]
    NotAuthenticated,

    /// An operation was issued while the connection is not established
    #[error("WebSocket not connected")]
    NotConnected,

    #[error("Connection error: {0}")]
    ConnectionFailed(String),

    #[error("Handshake timed out")]
    HandshakeTimeout,

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Sync protocol error: {0}")]
    Protocol(String),

    /// No acknowledgment arrived within the ack window
    #[error("Operation timed out")]
    Timeout,

    #[error("Conflict ({}) at server version {}", .0.kind, .0.server_version)]
    Conflict(ConflictInfo),

    #[error("Server error [{code}]: {message}")]
    Server { code: String, message: String },

    /// The server acknowledged the operation with `success: false`
    #[error("Operation failed")]
    OperationFailed,

    /// The attach was replaced by a newer attach or a detach before the
    /// handshake finished
    #[error("Connection superseded")]
    Superseded,

    #[error("HTTP error: {0}")]
    Http(String),
}

impl SyncError {
    /// Returns the conflict details if this is a conflict rejection.
    pub fn conflict(&self) -> Option<&ConflictInfo> {
        match self {
            SyncError::Conflict(info) => Some(info),
            _ => None,
        }
    }
}
