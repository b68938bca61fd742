use decksync_core::SyncError;

/// Errors from deck commands
#[derive(Debug)]
pub enum CommandError {
    Sync(SyncError),
    NotConfigured(&'static str),
    InvalidArgument(String),
    Timeout(&'static str),
    RuntimeError(String),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::Sync(SyncError::Conflict(info)) => write!(
                f,
                "Rejected: {} (server is at version {})",
                info.kind, info.server_version
            ),
            CommandError::Sync(e) => write!(f, "{}", e),
            CommandError::NotConfigured(what) => write!(
                f,
                "No {} configured. Set it in the config file or the environment (see 'deck config show')",
                what
            ),
            CommandError::InvalidArgument(msg) => write!(f, "{}", msg),
            CommandError::Timeout(what) => write!(f, "Timed out waiting for {}", what),
            CommandError::RuntimeError(e) => write!(f, "Runtime error: {}", e),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::Sync(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SyncError> for CommandError {
    fn from(e: SyncError) -> Self {
        CommandError::Sync(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use decksync_core::{ConflictInfo, ConflictKind};

    #[test]
    fn test_conflict_message() {
        let err = CommandError::from(SyncError::Conflict(ConflictInfo {
            kind: ConflictKind::VersionMismatch,
            server_state: serde_json::Value::Null,
            server_version: 7,
        }));
        let message = err.to_string();
        assert!(message.contains("version mismatch"));
        assert!(message.contains("version 7"));
    }

    #[test]
    fn test_not_configured_message() {
        let err = CommandError::NotConfigured("token");
        assert!(err.to_string().starts_with("No token configured"));
    }
}
