//! DeckSync Core Library
//!
//! Presentation model and real-time sync client shared by DeckSync
//! applications.

pub mod models;
pub mod sync;

pub use models::{
    ActiveUser, Alignment, FontScale, LayoutType, LayoutVariant, Presentation, PresentationPatch,
    Slide, SlidePatch, DEFAULT_THEME_ID,
};
pub use sync::{
    check_server, Ack, ConflictInfo, ConflictKind, ConnectionConfig, ConnectionManager,
    ConnectionStatus, DocumentCache, PresentationSubscription, SharedToken, SyncError,
    TokenProvider,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
