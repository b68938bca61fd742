//! Applies one client message to the store and decides who hears about it.

use decksync_core::sync::{ClientEnvelope, ClientMessage, ServerMessage};
use decksync_core::ActiveUser;

use super::store::{PresentationStore, StoreError};

/// Result of handling one client message.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Outcome {
    /// Sent back to the originating connection only.
    pub reply: Option<ServerMessage>,
    /// Sent to every other connection in the room.
    pub broadcast: Option<ServerMessage>,
}

impl Outcome {
    fn acked(reply: ServerMessage, broadcast: ServerMessage) -> Self {
        Self {
            reply: Some(reply),
            broadcast: Some(broadcast),
        }
    }

    fn relayed(broadcast: ServerMessage) -> Self {
        Self {
            reply: None,
            broadcast: Some(broadcast),
        }
    }

    fn rejected(message_id: &str, error: StoreError) -> Self {
        Self {
            reply: Some(rejection(message_id, error)),
            broadcast: None,
        }
    }
}

fn ack(message_id: &str, new_version: Option<u64>, server_id: Option<String>) -> ServerMessage {
    ServerMessage::SyncAck {
        original_message_id: Some(message_id.to_string()),
        success: true,
        new_version,
        server_id,
    }
}

fn rejection(message_id: &str, error: StoreError) -> ServerMessage {
    match error {
        StoreError::Conflict {
            kind,
            server_state,
            server_version,
        } => ServerMessage::SyncConflict {
            original_message_id: Some(message_id.to_string()),
            conflict_type: kind,
            server_state,
            server_version,
        },
        other => ServerMessage::Error {
            original_message_id: Some(message_id.to_string()),
            error_code: other.code().to_string(),
            error_message: other.to_string(),
        },
    }
}

/// Error reply for a frame that could not be decoded.
pub fn invalid_message(detail: &str) -> ServerMessage {
    ServerMessage::Error {
        original_message_id: None,
        error_code: "invalid_message".to_string(),
        error_message: detail.to_string(),
    }
}

pub fn handle_message(
    store: &mut PresentationStore,
    presentation_id: &str,
    user: &ActiveUser,
    envelope: ClientEnvelope,
) -> Outcome {
    let message_id = envelope.message_id.as_str();
    let user_id = Some(user.user_id.clone());

    match envelope.message {
        ClientMessage::SlideUpdate {
            slide_id,
            changes,
            base_version,
        } => match store.update_slide(presentation_id, &slide_id, &changes, base_version) {
            Ok(version) => Outcome::acked(
                ack(message_id, Some(version), None),
                ServerMessage::SlideUpdate {
                    slide_id,
                    changes,
                    version: Some(version),
                    updated_by: user_id,
                },
            ),
            Err(e) => Outcome::rejected(message_id, e),
        },
        ClientMessage::SlideCreate {
            position,
            slide_data,
            temp_id,
        } => match store.create_slide(presentation_id, position, &slide_data) {
            Ok(slide) => Outcome::acked(
                ack(message_id, slide.version, slide.id.clone()),
                ServerMessage::SlideCreate {
                    slide,
                    temp_id: Some(temp_id),
                    created_by: user_id,
                },
            ),
            Err(e) => Outcome::rejected(message_id, e),
        },
        ClientMessage::SlideDelete {
            slide_id,
            base_version,
        } => match store.delete_slide(presentation_id, &slide_id, base_version) {
            Ok(()) => Outcome::acked(
                ack(message_id, None, None),
                ServerMessage::SlideDelete {
                    slide_id,
                    deleted_by: user_id,
                },
            ),
            Err(e) => Outcome::rejected(message_id, e),
        },
        ClientMessage::SlideReorder { slide_orders } => {
            match store.reorder_slides(presentation_id, &slide_orders) {
                Ok(()) => Outcome::acked(
                    ack(message_id, None, None),
                    ServerMessage::SlideReorder {
                        slide_orders,
                        reordered_by: user_id,
                    },
                ),
                Err(e) => Outcome::rejected(message_id, e),
            }
        }
        ClientMessage::PresentationUpdate {
            changes,
            base_version,
        } => match store.update_presentation(presentation_id, &changes, base_version) {
            Ok(version) => Outcome::acked(
                ack(message_id, Some(version), None),
                ServerMessage::PresentationUpdate {
                    changes,
                    version: Some(version),
                    updated_by: user_id,
                },
            ),
            Err(e) => Outcome::rejected(message_id, e),
        },
        ClientMessage::CursorMove { slide_id, x, y } => {
            Outcome::relayed(ServerMessage::CursorMove {
                user_id: user.user_id.clone(),
                slide_id,
                x,
                y,
            })
        }
        ClientMessage::SelectionChange {
            slide_id,
            element_id,
        } => Outcome::relayed(ServerMessage::SelectionChange {
            user_id: user.user_id.clone(),
            slide_id,
            element_id,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use decksync_core::sync::{ConflictKind, WireSlide, WireSlideChanges};

    fn user() -> ActiveUser {
        ActiveUser::new("u1")
    }

    fn envelope(id: &str, message: ClientMessage) -> ClientEnvelope {
        ClientEnvelope::new(id, message)
    }

    fn create(store: &mut PresentationStore) -> String {
        let outcome = handle_message(
            store,
            "d1",
            &user(),
            envelope(
                "m0",
                ClientMessage::SlideCreate {
                    position: 0,
                    slide_data: WireSlide::default(),
                    temp_id: "tmp-1".into(),
                },
            ),
        );
        match outcome.reply {
            Some(ServerMessage::SyncAck {
                server_id: Some(id),
                ..
            }) => id,
            other => panic!("Expected ack with server id, got {:?}", other),
        }
    }

    #[test]
    fn test_create_acks_with_server_id_and_broadcasts_temp_id() {
        let mut store = PresentationStore::new();
        let outcome = handle_message(
            &mut store,
            "d1",
            &user(),
            envelope(
                "m1",
                ClientMessage::SlideCreate {
                    position: 0,
                    slide_data: WireSlide::default(),
                    temp_id: "tmp-1".into(),
                },
            ),
        );
        match outcome.broadcast {
            Some(ServerMessage::SlideCreate {
                temp_id, created_by, ..
            }) => {
                assert_eq!(temp_id.as_deref(), Some("tmp-1"));
                assert_eq!(created_by.as_deref(), Some("u1"));
            }
            other => panic!("Expected slide:create broadcast, got {:?}", other),
        }
    }

    #[test]
    fn test_update_acks_origin_and_broadcasts_change() {
        let mut store = PresentationStore::new();
        let slide_id = create(&mut store);
        let changes = WireSlideChanges {
            title: Some("New".into()),
            ..Default::default()
        };

        let outcome = handle_message(
            &mut store,
            "d1",
            &user(),
            envelope(
                "m1",
                ClientMessage::SlideUpdate {
                    slide_id: slide_id.clone(),
                    changes: changes.clone(),
                    base_version: 1,
                },
            ),
        );

        assert_eq!(
            outcome.reply,
            Some(ServerMessage::SyncAck {
                original_message_id: Some("m1".into()),
                success: true,
                new_version: Some(2),
                server_id: None,
            })
        );
        assert_eq!(
            outcome.broadcast,
            Some(ServerMessage::SlideUpdate {
                slide_id,
                changes,
                version: Some(2),
                updated_by: Some("u1".into()),
            })
        );
    }

    #[test]
    fn test_stale_update_is_a_conflict_without_broadcast() {
        let mut store = PresentationStore::new();
        let slide_id = create(&mut store);
        let message = ClientMessage::SlideDelete {
            slide_id,
            base_version: 7,
        };

        let outcome = handle_message(&mut store, "d1", &user(), envelope("m2", message));
        assert!(outcome.broadcast.is_none());
        match outcome.reply {
            Some(ServerMessage::SyncConflict {
                original_message_id,
                conflict_type,
                server_version,
                ..
            }) => {
                assert_eq!(original_message_id.as_deref(), Some("m2"));
                assert_eq!(conflict_type, ConflictKind::VersionMismatch);
                assert_eq!(server_version, 1);
            }
            other => panic!("Expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_slide_is_an_error_reply() {
        let mut store = PresentationStore::new();
        let outcome = handle_message(
            &mut store,
            "d1",
            &user(),
            envelope(
                "m3",
                ClientMessage::SlideDelete {
                    slide_id: "ghost".into(),
                    base_version: 1,
                },
            ),
        );
        match outcome.reply {
            Some(ServerMessage::Error {
                original_message_id,
                error_code,
                ..
            }) => {
                assert_eq!(original_message_id.as_deref(), Some("m3"));
                assert_eq!(error_code, "slide_not_found");
            }
            other => panic!("Expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_cursor_is_relayed_without_reply() {
        let mut store = PresentationStore::new();
        let outcome = handle_message(
            &mut store,
            "d1",
            &user(),
            envelope(
                "m4",
                ClientMessage::CursorMove {
                    slide_id: Some("s1".into()),
                    x: 1.0,
                    y: 2.0,
                },
            ),
        );
        assert!(outcome.reply.is_none());
        assert!(matches!(
            outcome.broadcast,
            Some(ServerMessage::CursorMove { ref user_id, .. }) if user_id == "u1"
        ));
    }
}
