use serde::{Deserialize, Serialize};
use std::fmt;

use super::slide::{Slide, SlidePatch};

pub const DEFAULT_THEME_ID: &str = "neoBrutalist";

/// The synchronized presentation document as held in the client cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Presentation {
    pub id: String,
    pub topic: String,
    pub theme_id: String,
    pub visual_style: String,
    pub layout_preset: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub last_modified: i64,
    pub version: u64,
    pub slides: Vec<Slide>,
}

impl Presentation {
    pub fn new(id: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            theme_id: DEFAULT_THEME_ID.to_string(),
            visual_style: String::new(),
            layout_preset: None,
            last_modified: 0,
            version: 0,
            slides: Vec::new(),
        }
    }

    pub fn with_slides(mut self, slides: Vec<Slide>) -> Self {
        self.slides = slides;
        self
    }

    pub fn slide(&self, slide_id: &str) -> Option<&Slide> {
        self.slides.iter().find(|s| s.id == slide_id)
    }

    pub fn slide_index(&self, slide_id: &str) -> Option<usize> {
        self.slides.iter().position(|s| s.id == slide_id)
    }

    pub fn slide_ids(&self) -> Vec<&str> {
        self.slides.iter().map(|s| s.id.as_str()).collect()
    }

    /// Returns a copy with `patch` merged into the matching slide. Other
    /// slides are cloned untouched.
    pub fn with_slide_patch(&self, slide_id: &str, patch: &SlidePatch) -> Self {
        let mut next = self.clone();
        for slide in next.slides.iter_mut().filter(|s| s.id == slide_id) {
            *slide = slide.patched(patch);
        }
        next
    }

    /// Returns a copy with the metadata fields present in `patch` replaced.
    pub fn patched(&self, patch: &PresentationPatch) -> Self {
        let mut next = self.clone();
        if let Some(topic) = &patch.topic {
            next.topic = topic.clone();
        }
        if let Some(theme_id) = &patch.theme_id {
            next.theme_id = theme_id.clone();
        }
        if let Some(style) = &patch.visual_style {
            next.visual_style = style.clone();
        }
        if let Some(preset) = &patch.layout_preset {
            next.layout_preset = preset.clone();
        }
        next
    }
}

/// A partial document metadata change.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PresentationPatch {
    pub topic: Option<String>,
    pub theme_id: Option<String>,
    pub visual_style: Option<String>,
    pub layout_preset: Option<Option<String>>,
}

impl PresentationPatch {
    pub fn is_empty(&self) -> bool {
        *self == PresentationPatch::default()
    }
}

impl fmt::Display for Presentation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.topic)?;
        writeln!(f, "{}", "=".repeat(self.topic.chars().count()))?;
        writeln!(f, "Theme: {}  Version: {}", self.theme_id, self.version)?;
        if !self.visual_style.is_empty() {
            writeln!(f, "Style: {}", self.visual_style)?;
        }
        if self.slides.is_empty() {
            writeln!(f, "\n(no slides)")?;
        } else {
            writeln!(f)?;
            for (index, slide) in self.slides.iter().enumerate() {
                writeln!(f, "{:>3}. {}  <{}>", index + 1, slide, slide.id)?;
            }
        }
        Ok(())
    }
}
