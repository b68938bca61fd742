//! In-memory authoritative presentation store.
//!
//! One record per presentation id, created empty on first access. Every
//! slide carries its own version; mutations that name a stale
//! `base_version` are refused with the server's current copy.

use std::collections::{HashMap, HashSet};

use chrono::Utc;
use decksync_core::sync::{
    ConflictKind, SlideOrder, WirePresentation, WirePresentationChanges, WireSlide,
    WireSlideChanges,
};
use decksync_core::{Alignment, LayoutType};
use serde_json::Value;

/// Errors returned by store mutations.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// The caller's base version is stale.
    Conflict {
        kind: ConflictKind,
        server_state: Value,
        server_version: u64,
    },
    SlideNotFound(String),
    InvalidReorder(String),
    InvalidField { field: &'static str, value: String },
}

impl StoreError {
    /// Error code sent in `error` envelopes.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Conflict { .. } => "conflict",
            StoreError::SlideNotFound(_) => "slide_not_found",
            StoreError::InvalidReorder(_) => "invalid_reorder",
            StoreError::InvalidField { .. } => "invalid_field",
        }
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Conflict {
                kind,
                server_version,
                ..
            } => write!(f, "Conflict ({}) at version {}", kind, server_version),
            StoreError::SlideNotFound(id) => write!(f, "Slide not found: {}", id),
            StoreError::InvalidReorder(msg) => write!(f, "Invalid reorder: {}", msg),
            StoreError::InvalidField { field, value } => {
                write!(f, "Invalid value for {}: {}", field, value)
            }
        }
    }
}

impl std::error::Error for StoreError {}

/// Full state of one presentation, ready for a `sync:state` frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub presentation: WirePresentation,
    pub slides: Vec<WireSlide>,
    pub version: u64,
}

#[derive(Debug, Clone)]
struct StoredPresentation {
    meta: WirePresentation,
    slides: Vec<WireSlide>,
    version: u64,
}

impl StoredPresentation {
    fn new(presentation_id: &str) -> Self {
        Self {
            meta: WirePresentation {
                id: presentation_id.to_string(),
                topic: Some(String::new()),
                updated_at: Some(now()),
                ..Default::default()
            },
            slides: Vec::new(),
            version: 1,
        }
    }

    fn slide_index(&self, slide_id: &str) -> Option<usize> {
        self.slides
            .iter()
            .position(|s| s.id.as_deref() == Some(slide_id))
    }

    fn touch(&mut self) {
        self.version += 1;
        self.meta.version = Some(self.version);
        self.meta.updated_at = Some(now());
    }

    fn renumber(&mut self) {
        for (position, slide) in self.slides.iter_mut().enumerate() {
            slide.position = Some(position as u32);
        }
    }

    /// Checks `base_version` against the slide's current version.
    fn check_slide_version(&self, index: usize, base_version: u64) -> Result<(), StoreError> {
        let slide = &self.slides[index];
        let current = slide.version.unwrap_or(1);
        if current != base_version {
            return Err(StoreError::Conflict {
                kind: ConflictKind::VersionMismatch,
                server_state: serde_json::to_value(slide).unwrap_or(Value::Null),
                server_version: current,
            });
        }
        Ok(())
    }
}

fn now() -> String {
    Utc::now().to_rfc3339()
}

fn validate_layout(changes_layout: Option<&str>, changes_alignment: Option<&str>) -> Result<(), StoreError> {
    if let Some(layout) = changes_layout {
        if LayoutType::parse(layout).is_none() {
            return Err(StoreError::InvalidField {
                field: "layout_type",
                value: layout.to_string(),
            });
        }
    }
    if let Some(alignment) = changes_alignment {
        if Alignment::parse(alignment).is_none() {
            return Err(StoreError::InvalidField {
                field: "alignment",
                value: alignment.to_string(),
            });
        }
    }
    Ok(())
}

fn apply_changes(slide: &mut WireSlide, changes: &WireSlideChanges) {
    if let Some(title) = &changes.title {
        slide.title = Some(title.clone());
    }
    if let Some(content) = &changes.content {
        slide.content = Some(content.clone());
    }
    if let Some(notes) = &changes.speaker_notes {
        slide.speaker_notes = Some(notes.clone());
    }
    if let Some(prompt) = &changes.image_prompt {
        slide.image_prompt = Some(prompt.clone());
    }
    if let Some(url) = &changes.image_url {
        slide.image_url = url.clone();
    }
    if let Some(layout) = &changes.layout_type {
        slide.layout_type = Some(layout.clone());
    }
    if let Some(alignment) = &changes.alignment {
        slide.alignment = Some(alignment.clone());
    }
    if let Some(scale) = &changes.font_scale {
        slide.font_scale = scale.clone();
    }
    if let Some(variant) = &changes.layout_variant {
        slide.layout_variant = variant.clone();
    }
    if let Some(styles) = &changes.style_overrides {
        slide.style_overrides = styles.clone();
    }
}

/// Authoritative copies of every presentation the server has seen.
#[derive(Debug, Default)]
pub struct PresentationStore {
    presentations: HashMap<String, StoredPresentation>,
}

impl PresentationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, presentation_id: &str) -> &mut StoredPresentation {
        self.presentations
            .entry(presentation_id.to_string())
            .or_insert_with(|| {
                tracing::info!("Creating presentation {}", presentation_id);
                StoredPresentation::new(presentation_id)
            })
    }

    /// Returns the full state. Slides carry `has_image` instead of their
    /// image reference.
    pub fn snapshot(&mut self, presentation_id: &str) -> Snapshot {
        let stored = self.entry(presentation_id);
        let slides = stored
            .slides
            .iter()
            .map(|s| WireSlide {
                has_image: Some(s.image_url.is_some()),
                image_url: None,
                ..s.clone()
            })
            .collect();
        let mut presentation = stored.meta.clone();
        presentation.version = Some(stored.version);
        Snapshot {
            presentation,
            slides,
            version: stored.version,
        }
    }

    /// Applies a slide change. Returns the slide's new version.
    pub fn update_slide(
        &mut self,
        presentation_id: &str,
        slide_id: &str,
        changes: &WireSlideChanges,
        base_version: u64,
    ) -> Result<u64, StoreError> {
        validate_layout(changes.layout_type.as_deref(), changes.alignment.as_deref())?;
        let stored = self.entry(presentation_id);
        let index = stored
            .slide_index(slide_id)
            .ok_or_else(|| StoreError::SlideNotFound(slide_id.to_string()))?;
        stored.check_slide_version(index, base_version)?;

        let slide = &mut stored.slides[index];
        apply_changes(slide, changes);
        let version = slide.version.unwrap_or(1) + 1;
        slide.version = Some(version);
        stored.touch();
        Ok(version)
    }

    /// Inserts a new slide at `position` (clamped) and returns it with its
    /// assigned id.
    pub fn create_slide(
        &mut self,
        presentation_id: &str,
        position: u32,
        slide_data: &WireSlide,
    ) -> Result<WireSlide, StoreError> {
        validate_layout(slide_data.layout_type.as_deref(), slide_data.alignment.as_deref())?;
        let stored = self.entry(presentation_id);

        let slide = WireSlide {
            id: Some(uuid::Uuid::new_v4().to_string()),
            presentation_id: Some(presentation_id.to_string()),
            has_image: None,
            version: Some(1),
            ..slide_data.clone()
        };
        let index = (position as usize).min(stored.slides.len());
        stored.slides.insert(index, slide);
        stored.renumber();
        stored.touch();
        Ok(stored.slides[index].clone())
    }

    pub fn delete_slide(
        &mut self,
        presentation_id: &str,
        slide_id: &str,
        base_version: u64,
    ) -> Result<(), StoreError> {
        let stored = self.entry(presentation_id);
        let index = stored
            .slide_index(slide_id)
            .ok_or_else(|| StoreError::SlideNotFound(slide_id.to_string()))?;
        stored.check_slide_version(index, base_version)?;

        stored.slides.remove(index);
        stored.renumber();
        stored.touch();
        Ok(())
    }

    /// Reorders slides. Every id must exist and no id may repeat; slides
    /// not named keep their relative order after the named ones.
    pub fn reorder_slides(
        &mut self,
        presentation_id: &str,
        orders: &[SlideOrder],
    ) -> Result<(), StoreError> {
        let stored = self.entry(presentation_id);

        let mut seen = HashSet::new();
        for order in orders {
            if stored.slide_index(&order.slide_id).is_none() {
                return Err(StoreError::InvalidReorder(format!(
                    "unknown slide {}",
                    order.slide_id
                )));
            }
            if !seen.insert(order.slide_id.as_str()) {
                return Err(StoreError::InvalidReorder(format!(
                    "slide {} listed twice",
                    order.slide_id
                )));
            }
        }

        let mut sorted: Vec<&SlideOrder> = orders.iter().collect();
        sorted.sort_by_key(|o| o.new_position);

        let mut remaining = std::mem::take(&mut stored.slides);
        let mut slides = Vec::with_capacity(remaining.len());
        for order in sorted {
            if let Some(index) = remaining
                .iter()
                .position(|s| s.id.as_deref() == Some(order.slide_id.as_str()))
            {
                slides.push(remaining.remove(index));
            }
        }
        slides.append(&mut remaining);
        stored.slides = slides;
        stored.renumber();
        stored.touch();
        Ok(())
    }

    /// Applies a metadata change. Returns the presentation's new version.
    pub fn update_presentation(
        &mut self,
        presentation_id: &str,
        changes: &WirePresentationChanges,
        base_version: u64,
    ) -> Result<u64, StoreError> {
        let stored = self.entry(presentation_id);
        if stored.version != base_version {
            let mut server_state = stored.meta.clone();
            server_state.version = Some(stored.version);
            return Err(StoreError::Conflict {
                kind: ConflictKind::VersionMismatch,
                server_state: serde_json::to_value(&server_state).unwrap_or(Value::Null),
                server_version: stored.version,
            });
        }

        if let Some(topic) = &changes.topic {
            stored.meta.topic = Some(topic.clone());
        }
        if let Some(theme_id) = &changes.theme_id {
            stored.meta.theme_id = Some(theme_id.clone());
        }
        if let Some(style) = &changes.visual_style {
            stored.meta.visual_style = Some(style.clone());
        }
        if let Some(layout) = &changes.wabi_sabi_layout {
            stored.meta.wabi_sabi_layout = layout.clone();
        }
        stored.touch();
        Ok(stored.version)
    }

    pub fn len(&self) -> usize {
        self.presentations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presentations.is_empty()
    }
}
