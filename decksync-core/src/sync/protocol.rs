//! Wire types for the presentation sync WebSocket protocol.
//!
//! Every frame is a JSON text frame with a `type` discriminator. Field names
//! on the wire are snake_case; translation into the cached document shape
//! lives in the codec module.

use serde::{Deserialize, Deserializer, Serialize};

use super::error::ConflictKind;
use crate::models::{ActiveUser, LayoutVariant};

/// Deserializes a field that may be absent, `null`, or a value into
/// `None`, `Some(None)`, or `Some(Some(value))`. Pair with
/// `#[serde(default)]`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn default_true() -> bool {
    true
}

/// Per-slide style overrides. The inner keys are camelCase on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct StyleOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_styles: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_styles: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_item_styles: Option<serde_json::Value>,
}

/// A slide as represented on the wire. Every field is optional so partial
/// server payloads still decode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WireSlide {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presentation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Sent in place of `image_url` by full-state syncs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub has_image: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub font_scale: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_variant: Option<LayoutVariant>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style_overrides: Option<StyleOverrides>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

/// Changed slide fields. Absent fields are untouched by the receiver;
/// nullable fields sent as `null` are cleared.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WireSlideChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub speaker_notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_prompt: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub image_url: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alignment: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub font_scale: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub layout_variant: Option<Option<LayoutVariant>>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub style_overrides: Option<Option<StyleOverrides>>,
}

/// Presentation metadata as represented on the wire.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WirePresentation {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wabi_sabi_layout: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// ISO-8601 timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WirePresentationChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_style: Option<String>,
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub wabi_sabi_layout: Option<Option<String>>,
}

/// One entry of a reorder instruction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SlideOrder {
    pub slide_id: String,
    pub new_position: u32,
}

impl SlideOrder {
    pub fn new(slide_id: impl Into<String>, new_position: u32) -> Self {
        Self {
            slide_id: slide_id.into(),
            new_position,
        }
    }

    /// Builds a complete ordering from a list of slide ids.
    pub fn from_ids<S: AsRef<str>>(ids: &[S]) -> Vec<Self> {
        ids.iter()
            .enumerate()
            .map(|(position, id)| SlideOrder::new(id.as_ref(), position as u32))
            .collect()
    }
}

/// Messages sent by the client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "slide:update")]
    SlideUpdate {
        slide_id: String,
        changes: WireSlideChanges,
        base_version: u64,
    },
    #[serde(rename = "slide:create")]
    SlideCreate {
        position: u32,
        slide_data: WireSlide,
        temp_id: String,
    },
    #[serde(rename = "slide:delete")]
    SlideDelete { slide_id: String, base_version: u64 },
    #[serde(rename = "slide:reorder")]
    SlideReorder { slide_orders: Vec<SlideOrder> },
    #[serde(rename = "presentation:update")]
    PresentationUpdate {
        changes: WirePresentationChanges,
        base_version: u64,
    },
    #[serde(rename = "cursor:move")]
    CursorMove {
        slide_id: Option<String>,
        x: f64,
        y: f64,
    },
    #[serde(rename = "selection:change")]
    SelectionChange {
        slide_id: Option<String>,
        element_id: Option<String>,
    },
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::SlideUpdate { .. } => "slide:update",
            ClientMessage::SlideCreate { .. } => "slide:create",
            ClientMessage::SlideDelete { .. } => "slide:delete",
            ClientMessage::SlideReorder { .. } => "slide:reorder",
            ClientMessage::PresentationUpdate { .. } => "presentation:update",
            ClientMessage::CursorMove { .. } => "cursor:move",
            ClientMessage::SelectionChange { .. } => "selection:change",
        }
    }
}

/// A client message with its correlation id attached.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientEnvelope {
    pub message_id: String,
    #[serde(flatten)]
    pub message: ClientMessage,
}

impl ClientEnvelope {
    pub fn new(message_id: impl Into<String>, message: ClientMessage) -> Self {
        Self {
            message_id: message_id.into(),
            message,
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Messages sent by the server, both replies and room broadcasts.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "sync:state")]
    SyncState {
        presentation: WirePresentation,
        #[serde(default)]
        slides: Vec<WireSlide>,
        #[serde(default)]
        active_users: Vec<ActiveUser>,
        #[serde(default)]
        version: u64,
    },
    #[serde(rename = "sync:ack")]
    SyncAck {
        #[serde(default)]
        original_message_id: Option<String>,
        #[serde(default = "default_true")]
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        new_version: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server_id: Option<String>,
    },
    #[serde(rename = "sync:conflict")]
    SyncConflict {
        #[serde(default)]
        original_message_id: Option<String>,
        conflict_type: ConflictKind,
        #[serde(default)]
        server_state: serde_json::Value,
        #[serde(default)]
        server_version: u64,
    },
    #[serde(rename = "user:joined")]
    UserJoined {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user: Option<ActiveUser>,
        #[serde(default)]
        active_users: Vec<ActiveUser>,
    },
    #[serde(rename = "user:left")]
    UserLeft {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<String>,
        #[serde(default)]
        active_users: Vec<ActiveUser>,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        original_message_id: Option<String>,
        #[serde(default)]
        error_code: String,
        #[serde(default)]
        error_message: String,
    },
    #[serde(rename = "image:generating")]
    ImageGenerating {
        slide_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        task_id: Option<String>,
    },
    #[serde(rename = "image:completed")]
    ImageCompleted { slide_id: String, image_url: String },
    #[serde(rename = "image:failed")]
    ImageFailed {
        slide_id: String,
        #[serde(default)]
        error: String,
    },
    #[serde(rename = "slide:update")]
    SlideUpdate {
        slide_id: String,
        changes: WireSlideChanges,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        updated_by: Option<String>,
    },
    #[serde(rename = "slide:create")]
    SlideCreate {
        slide: WireSlide,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        temp_id: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        created_by: Option<String>,
    },
    #[serde(rename = "slide:delete")]
    SlideDelete {
        slide_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        deleted_by: Option<String>,
    },
    #[serde(rename = "slide:reorder")]
    SlideReorder {
        slide_orders: Vec<SlideOrder>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reordered_by: Option<String>,
    },
    #[serde(rename = "presentation:update")]
    PresentationUpdate {
        changes: WirePresentationChanges,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        version: Option<u64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        updated_by: Option<String>,
    },
    #[serde(rename = "cursor:move")]
    CursorMove {
        user_id: String,
        #[serde(default)]
        slide_id: Option<String>,
        x: f64,
        y: f64,
    },
    #[serde(rename = "selection:change")]
    SelectionChange {
        user_id: String,
        #[serde(default)]
        slide_id: Option<String>,
        #[serde(default)]
        element_id: Option<String>,
    },
    /// Any `type` this client does not know about.
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::SyncState { .. } => "sync:state",
            ServerMessage::SyncAck { .. } => "sync:ack",
            ServerMessage::SyncConflict { .. } => "sync:conflict",
            ServerMessage::UserJoined { .. } => "user:joined",
            ServerMessage::UserLeft { .. } => "user:left",
            ServerMessage::Error { .. } => "error",
            ServerMessage::ImageGenerating { .. } => "image:generating",
            ServerMessage::ImageCompleted { .. } => "image:completed",
            ServerMessage::ImageFailed { .. } => "image:failed",
            ServerMessage::SlideUpdate { .. } => "slide:update",
            ServerMessage::SlideCreate { .. } => "slide:create",
            ServerMessage::SlideDelete { .. } => "slide:delete",
            ServerMessage::SlideReorder { .. } => "slide:reorder",
            ServerMessage::PresentationUpdate { .. } => "presentation:update",
            ServerMessage::CursorMove { .. } => "cursor:move",
            ServerMessage::SelectionChange { .. } => "selection:change",
            ServerMessage::Unknown => "unknown",
        }
    }

    /// Returns the active-users roster for presence-affecting messages.
    pub fn active_users(&self) -> Option<&[ActiveUser]> {
        match self {
            ServerMessage::SyncState { active_users, .. }
            | ServerMessage::UserJoined { active_users, .. }
            | ServerMessage::UserLeft { active_users, .. } => Some(active_users),
            _ => None,
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

/// Generates a correlation id for an outgoing message.
pub fn generate_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_generate_message_id() {
        let id1 = generate_message_id();
        let id2 = generate_message_id();
        assert_ne!(id1, id2);
        assert!(uuid::Uuid::parse_str(&id1).is_ok());
    }

    #[test]
    fn test_envelope_carries_type_and_message_id() {
        let envelope = ClientEnvelope::new(
            "m1",
            ClientMessage::SlideDelete {
                slide_id: "s1".into(),
                base_version: 3,
            },
        );
        let value: serde_json::Value = serde_json::from_str(&envelope.encode().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "slide:delete",
                "message_id": "m1",
                "slide_id": "s1",
                "base_version": 3
            })
        );
    }

    #[test]
    fn test_slide_update_only_sends_changed_fields() {
        let message = ClientMessage::SlideUpdate {
            slide_id: "s1".into(),
            changes: WireSlideChanges {
                title: Some("New".into()),
                image_url: Some(None),
                ..Default::default()
            },
            base_version: 1,
        };
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["changes"], json!({"title": "New", "image_url": null}));
    }

    #[test]
    fn test_decode_sync_ack() {
        let msg = ServerMessage::decode(
            r#"{"type":"sync:ack","original_message_id":"m1","success":true,"new_version":5}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            ServerMessage::SyncAck {
                original_message_id: Some("m1".into()),
                success: true,
                new_version: Some(5),
                server_id: None,
            }
        );
    }

    #[test]
    fn test_decode_ack_defaults_to_success() {
        let msg =
            ServerMessage::decode(r#"{"type":"sync:ack","original_message_id":"m1"}"#).unwrap();
        assert!(matches!(msg, ServerMessage::SyncAck { success: true, .. }));
    }

    #[test]
    fn test_decode_partial_slide_changes() {
        let msg = ServerMessage::decode(
            r#"{"type":"slide:update","slide_id":"s1","changes":{"title":"New"},"version":4}"#,
        )
        .unwrap();
        match msg {
            ServerMessage::SlideUpdate {
                slide_id,
                changes,
                version,
                ..
            } => {
                assert_eq!(slide_id, "s1");
                assert_eq!(changes.title.as_deref(), Some("New"));
                assert_eq!(changes.image_url, None);
                assert_eq!(version, Some(4));
            }
            other => panic!("Expected SlideUpdate, got {:?}", other),
        }
    }

    #[test]
    fn test_explicit_null_is_distinguished_from_absent() {
        let changes: WireSlideChanges =
            serde_json::from_value(json!({"image_url": null, "layout_variant": 12})).unwrap();
        assert_eq!(changes.image_url, Some(None));
        assert_eq!(changes.layout_variant, Some(Some(LayoutVariant::Seed(12))));
        assert_eq!(changes.font_scale, None);
    }

    #[test]
    fn test_decode_unknown_type() {
        let msg = ServerMessage::decode(r#"{"type":"comment:added","body":"hi"}"#).unwrap();
        assert_eq!(msg, ServerMessage::Unknown);
    }

    #[test]
    fn test_decode_malformed_is_error() {
        assert!(ServerMessage::decode("{not json").is_err());
        assert!(ServerMessage::decode(r#"{"no_type":true}"#).is_err());
    }

    #[test]
    fn test_decode_conflict() {
        let msg = ServerMessage::decode(
            r#"{"type":"sync:conflict","original_message_id":"m2","conflict_type":"version_mismatch","server_state":{"id":"s1","title":"Server"},"server_version":9}"#,
        )
        .unwrap();
        match msg {
            ServerMessage::SyncConflict {
                conflict_type,
                server_state,
                server_version,
                ..
            } => {
                assert_eq!(conflict_type, ConflictKind::VersionMismatch);
                assert_eq!(server_state["title"], "Server");
                assert_eq!(server_version, 9);
            }
            other => panic!("Expected SyncConflict, got {:?}", other),
        }
    }

    #[test]
    fn test_active_users_projection() {
        let msg = ServerMessage::decode(
            r#"{"type":"user:left","user_id":"u2","active_users":[{"user_id":"u1","name":"Ada","avatar_url":null}]}"#,
        )
        .unwrap();
        let users = msg.active_users().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].display_name(), "Ada");
        assert!(ServerMessage::Unknown.active_users().is_none());
    }

    #[test]
    fn test_reorder_from_ids() {
        let orders = SlideOrder::from_ids(&["b", "a"]);
        assert_eq!(
            orders,
            vec![SlideOrder::new("b", 0), SlideOrder::new("a", 1)]
        );
    }
}
