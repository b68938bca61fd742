//! Translation between wire payloads and the cached document shape.
//!
//! This is the only place that knows wire field names (`speaker_notes`,
//! `wabi_sabi_layout`, `style_overrides.textStyles`, ...) and wire defaults.
//! Full-state syncs never carry image data, so decoding a slide keeps the
//! image already cached for the same id unless the payload brings its own.

use chrono::{DateTime, NaiveDateTime};

use super::protocol::{
    ServerMessage, StyleOverrides, WirePresentation, WirePresentationChanges, WireSlide,
    WireSlideChanges,
};
use crate::models::{
    Alignment, FontScale, LayoutType, Presentation, PresentationPatch, Slide, SlidePatch,
    DEFAULT_THEME_ID,
};

/// Decodes an inbound text frame. Malformed frames are logged and dropped.
pub fn decode_frame(text: &str) -> Option<ServerMessage> {
    match ServerMessage::decode(text) {
        Ok(ServerMessage::Unknown) => {
            tracing::debug!("Ignoring message with unknown type: {}", truncate(text));
            None
        }
        Ok(message) => Some(message),
        Err(e) => {
            tracing::warn!("Failed to parse WebSocket message: {} ({})", e, truncate(text));
            None
        }
    }
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(120) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn layout_type(value: &str) -> LayoutType {
    LayoutType::parse(value).unwrap_or_else(|| {
        tracing::debug!("Unknown layout type '{}', using default", value);
        LayoutType::default()
    })
}

fn alignment(value: &str) -> Alignment {
    Alignment::parse(value).unwrap_or_else(|| {
        tracing::debug!("Unknown alignment '{}', using default", value);
        Alignment::default()
    })
}

fn font_scale(value: &str) -> Option<FontScale> {
    let scale = FontScale::parse(value);
    if scale.is_none() {
        tracing::debug!("Unknown font scale '{}', ignoring", value);
    }
    scale
}

/// Parses a server timestamp into epoch milliseconds. Accepts RFC 3339 and
/// naive ISO-8601 (treated as UTC).
pub fn parse_timestamp(value: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp_millis());
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.and_utc().timestamp_millis())
}

/// Converts an inbound slide, keeping `existing`'s image when the payload
/// has none.
pub fn slide_from_wire(wire: &WireSlide, existing: Option<&Slide>) -> Slide {
    let styles = wire.style_overrides.clone().unwrap_or_default();
    Slide {
        id: wire.id.clone().unwrap_or_default(),
        title: wire.title.clone().unwrap_or_default(),
        content: wire.content.clone().unwrap_or_default(),
        speaker_notes: wire.speaker_notes.clone().unwrap_or_default(),
        image_prompt: wire.image_prompt.clone().unwrap_or_default(),
        image_url: wire
            .image_url
            .clone()
            .or_else(|| existing.and_then(|s| s.image_url.clone())),
        is_image_loading: false,
        image_error: None,
        layout_type: wire.layout_type.as_deref().map(layout_type).unwrap_or_default(),
        alignment: wire.alignment.as_deref().map(alignment).unwrap_or_default(),
        font_scale: wire.font_scale.as_deref().and_then(font_scale),
        layout_variant: wire.layout_variant.clone(),
        text_styles: styles.text_styles,
        image_styles: styles.image_styles,
        content_item_styles: styles.content_item_styles,
        position: wire.position,
        version: wire.version,
    }
}

/// Converts a full-state payload, matching each inbound slide against
/// `previous` by id for image preservation.
pub fn presentation_from_wire(
    wire: &WirePresentation,
    slides: &[WireSlide],
    version: u64,
    previous: Option<&Presentation>,
) -> Presentation {
    let slides = slides
        .iter()
        .map(|s| {
            let existing = s
                .id
                .as_deref()
                .and_then(|id| previous.and_then(|p| p.slide(id)));
            slide_from_wire(s, existing)
        })
        .collect();

    Presentation {
        id: wire.id.clone(),
        topic: wire.topic.clone().unwrap_or_default(),
        theme_id: wire
            .theme_id
            .clone()
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| DEFAULT_THEME_ID.to_string()),
        visual_style: wire.visual_style.clone().unwrap_or_default(),
        layout_preset: wire.wabi_sabi_layout.clone(),
        last_modified: wire
            .updated_at
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_default(),
        version: wire.version.unwrap_or(version),
        slides,
    }
}

pub fn slide_patch_from_wire(changes: &WireSlideChanges) -> SlidePatch {
    let (text_styles, image_styles, content_item_styles) = match &changes.style_overrides {
        Some(Some(styles)) => (
            Some(styles.text_styles.clone()),
            Some(styles.image_styles.clone()),
            Some(styles.content_item_styles.clone()),
        ),
        Some(None) => (Some(None), Some(None), Some(None)),
        None => (None, None, None),
    };

    SlidePatch {
        title: changes.title.clone(),
        content: changes.content.clone(),
        speaker_notes: changes.speaker_notes.clone(),
        image_prompt: changes.image_prompt.clone(),
        image_url: changes.image_url.clone(),
        layout_type: changes.layout_type.as_deref().map(layout_type),
        alignment: changes.alignment.as_deref().map(alignment),
        font_scale: changes
            .font_scale
            .as_ref()
            .map(|s| s.as_deref().and_then(font_scale)),
        layout_variant: changes.layout_variant.clone(),
        text_styles,
        image_styles,
        content_item_styles,
    }
}

/// Converts an outbound slide change. The server replaces style overrides as
/// a whole, so style fields the patch leaves out are filled from `current`.
pub fn slide_patch_to_wire(patch: &SlidePatch, current: Option<&Slide>) -> WireSlideChanges {
    let touches_styles = patch.text_styles.is_some()
        || patch.image_styles.is_some()
        || patch.content_item_styles.is_some();
    let style_overrides = touches_styles.then(|| {
        let pick = |patched: &Option<Option<serde_json::Value>>,
                    cached: Option<&Option<serde_json::Value>>| {
            match patched {
                Some(value) => value.clone(),
                None => cached.cloned().flatten(),
            }
        };
        Some(StyleOverrides {
            text_styles: pick(&patch.text_styles, current.map(|s| &s.text_styles)),
            image_styles: pick(&patch.image_styles, current.map(|s| &s.image_styles)),
            content_item_styles: pick(
                &patch.content_item_styles,
                current.map(|s| &s.content_item_styles),
            ),
        })
    });

    WireSlideChanges {
        title: patch.title.clone(),
        content: patch.content.clone(),
        speaker_notes: patch.speaker_notes.clone(),
        image_prompt: patch.image_prompt.clone(),
        image_url: patch.image_url.clone(),
        layout_type: patch.layout_type.map(|l| l.as_str().to_string()),
        alignment: patch.alignment.map(|a| a.as_str().to_string()),
        font_scale: patch
            .font_scale
            .map(|s| s.map(|s| s.as_str().to_string())),
        layout_variant: patch.layout_variant.clone(),
        style_overrides,
    }
}

/// Builds the `slide_data` payload for a create. Image data is never sent.
pub fn slide_to_wire(slide: &Slide) -> WireSlide {
    let has_styles = slide.text_styles.is_some()
        || slide.image_styles.is_some()
        || slide.content_item_styles.is_some();
    WireSlide {
        title: Some(slide.title.clone()),
        content: Some(slide.content.clone()),
        speaker_notes: Some(slide.speaker_notes.clone()),
        image_prompt: Some(slide.image_prompt.clone()),
        layout_type: Some(slide.layout_type.as_str().to_string()),
        alignment: Some(slide.alignment.as_str().to_string()),
        font_scale: slide.font_scale.map(|s| s.as_str().to_string()),
        layout_variant: slide.layout_variant.clone(),
        style_overrides: has_styles.then(|| StyleOverrides {
            text_styles: slide.text_styles.clone(),
            image_styles: slide.image_styles.clone(),
            content_item_styles: slide.content_item_styles.clone(),
        }),
        ..Default::default()
    }
}

pub fn presentation_patch_from_wire(changes: &WirePresentationChanges) -> PresentationPatch {
    PresentationPatch {
        topic: changes.topic.clone(),
        theme_id: changes.theme_id.clone(),
        visual_style: changes.visual_style.clone(),
        layout_preset: changes.wabi_sabi_layout.clone(),
    }
}

pub fn presentation_patch_to_wire(patch: &PresentationPatch) -> WirePresentationChanges {
    WirePresentationChanges {
        topic: patch.topic.clone(),
        theme_id: patch.theme_id.clone(),
        visual_style: patch.visual_style.clone(),
        wabi_sabi_layout: patch.layout_preset.clone(),
    }
}
