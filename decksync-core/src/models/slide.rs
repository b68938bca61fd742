use serde::{Deserialize, Serialize};
use std::fmt;

/// Visual layout of a slide.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutType {
    #[default]
    Split,
    FullBleed,
    Statement,
    Gallery,
    Card,
    Horizontal,
    Magazine,
}

impl LayoutType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutType::Split => "split",
            LayoutType::FullBleed => "full-bleed",
            LayoutType::Statement => "statement",
            LayoutType::Gallery => "gallery",
            LayoutType::Card => "card",
            LayoutType::Horizontal => "horizontal",
            LayoutType::Magazine => "magazine",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "split" => Some(LayoutType::Split),
            "full-bleed" => Some(LayoutType::FullBleed),
            "statement" => Some(LayoutType::Statement),
            "gallery" => Some(LayoutType::Gallery),
            "card" => Some(LayoutType::Card),
            "horizontal" => Some(LayoutType::Horizontal),
            "magazine" => Some(LayoutType::Magazine),
            _ => None,
        }
    }
}

impl fmt::Display for LayoutType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Text alignment of a slide.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
}

impl Alignment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "left" => Some(Alignment::Left),
            "center" => Some(Alignment::Center),
            "right" => Some(Alignment::Right),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FontScale {
    Compact,
    Auto,
    Hero,
}

impl FontScale {
    pub fn as_str(&self) -> &'static str {
        match self {
            FontScale::Compact => "compact",
            FontScale::Auto => "auto",
            FontScale::Hero => "hero",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "compact" => Some(FontScale::Compact),
            "auto" => Some(FontScale::Auto),
            "hero" => Some(FontScale::Hero),
            _ => None,
        }
    }
}

/// Layout variant seed: the client picks a random number, older decks may
/// carry a named variant instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum LayoutVariant {
    Seed(i64),
    Named(String),
}

/// A slide as held in the client cache.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Slide {
    pub id: String,
    pub title: String,
    pub content: Vec<String>,
    pub speaker_notes: String,
    pub image_prompt: String,
    /// May be present locally even though the server never echoes it.
    pub image_url: Option<String>,
    pub is_image_loading: bool,
    pub image_error: Option<String>,
    pub layout_type: LayoutType,
    pub alignment: Alignment,
    pub font_scale: Option<FontScale>,
    pub layout_variant: Option<LayoutVariant>,
    pub text_styles: Option<serde_json::Value>,
    pub image_styles: Option<serde_json::Value>,
    pub content_item_styles: Option<serde_json::Value>,
    /// Server-side position at the time of the last full sync.
    pub position: Option<u32>,
    /// Per-slide version used as the base version of updates and deletes.
    pub version: Option<u64>,
}

impl Slide {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            ..Default::default()
        }
    }

    pub fn with_content(mut self, content: Vec<String>) -> Self {
        self.content = content;
        self
    }

    pub fn with_image_url(mut self, url: impl Into<String>) -> Self {
        self.image_url = Some(url.into());
        self
    }

    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    /// Returns a copy with every field present in `patch` replaced.
    pub fn patched(&self, patch: &SlidePatch) -> Self {
        let mut slide = self.clone();
        if let Some(title) = &patch.title {
            slide.title = title.clone();
        }
        if let Some(content) = &patch.content {
            slide.content = content.clone();
        }
        if let Some(notes) = &patch.speaker_notes {
            slide.speaker_notes = notes.clone();
        }
        if let Some(prompt) = &patch.image_prompt {
            slide.image_prompt = prompt.clone();
        }
        if let Some(url) = &patch.image_url {
            slide.image_url = url.clone();
        }
        if let Some(layout) = patch.layout_type {
            slide.layout_type = layout;
        }
        if let Some(alignment) = patch.alignment {
            slide.alignment = alignment;
        }
        if let Some(scale) = patch.font_scale {
            slide.font_scale = scale;
        }
        if let Some(variant) = &patch.layout_variant {
            slide.layout_variant = variant.clone();
        }
        if let Some(styles) = &patch.text_styles {
            slide.text_styles = styles.clone();
        }
        if let Some(styles) = &patch.image_styles {
            slide.image_styles = styles.clone();
        }
        if let Some(styles) = &patch.content_item_styles {
            slide.content_item_styles = styles.clone();
        }
        slide
    }
}

/// A partial slide change. `None` means "not part of this change"; for
/// nullable fields `Some(None)` clears the value.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SlidePatch {
    pub title: Option<String>,
    pub content: Option<Vec<String>>,
    pub speaker_notes: Option<String>,
    pub image_prompt: Option<String>,
    pub image_url: Option<Option<String>>,
    pub layout_type: Option<LayoutType>,
    pub alignment: Option<Alignment>,
    pub font_scale: Option<Option<FontScale>>,
    pub layout_variant: Option<Option<LayoutVariant>>,
    pub text_styles: Option<Option<serde_json::Value>>,
    pub image_styles: Option<Option<serde_json::Value>>,
    pub content_item_styles: Option<Option<serde_json::Value>>,
}

impl SlidePatch {
    pub fn is_empty(&self) -> bool {
        *self == SlidePatch::default()
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn content(mut self, content: Vec<String>) -> Self {
        self.content = Some(content);
        self
    }

    pub fn speaker_notes(mut self, notes: impl Into<String>) -> Self {
        self.speaker_notes = Some(notes.into());
        self
    }

    pub fn image_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.image_prompt = Some(prompt.into());
        self
    }

    pub fn layout_type(mut self, layout: LayoutType) -> Self {
        self.layout_type = Some(layout);
        self
    }

    pub fn alignment(mut self, alignment: Alignment) -> Self {
        self.alignment = Some(alignment);
        self
    }
}

impl fmt::Display for Slide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let title = if self.title.is_empty() {
            "(untitled)"
        } else {
            &self.title
        };
        write!(f, "{} [{}, {}]", title, self.layout_type, self.alignment.as_str())?;
        if self.is_image_loading {
            write!(f, " (image generating)")?;
        } else if let Some(err) = &self.image_error {
            write!(f, " (image failed: {})", err)?;
        } else if self.image_url.is_some() {
            write!(f, " (image)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slide_defaults() {
        let slide = Slide::new("s1", "Intro");
        assert_eq!(slide.layout_type, LayoutType::Split);
        assert_eq!(slide.alignment, Alignment::Left);
        assert!(slide.content.is_empty());
        assert!(slide.image_url.is_none());
    }

    #[test]
    fn test_patched_only_touches_present_fields() {
        let slide = Slide::new("s1", "Old")
            .with_content(vec!["a".into()])
            .with_image_url("http://img/a.png");

        let patched = slide.patched(&SlidePatch::default().title("New"));
        assert_eq!(patched.title, "New");
        assert_eq!(patched.content, vec!["a".to_string()]);
        assert_eq!(patched.image_url.as_deref(), Some("http://img/a.png"));
        // original snapshot untouched
        assert_eq!(slide.title, "Old");
    }

    #[test]
    fn test_patched_can_clear_image() {
        let slide = Slide::new("s1", "T").with_image_url("http://img/a.png");
        let patch = SlidePatch {
            image_url: Some(None),
            ..Default::default()
        };
        assert!(slide.patched(&patch).image_url.is_none());
    }

    #[test]
    fn test_layout_type_parse() {
        assert_eq!(LayoutType::parse("full-bleed"), Some(LayoutType::FullBleed));
        assert_eq!(LayoutType::parse("magazine"), Some(LayoutType::Magazine));
        assert_eq!(LayoutType::parse("bogus"), None);
        assert_eq!(LayoutType::FullBleed.to_string(), "full-bleed");
    }

    #[test]
    fn test_font_scale_parse() {
        assert_eq!(FontScale::parse("hero"), Some(FontScale::Hero));
        assert_eq!(FontScale::parse("huge"), None);
        assert_eq!(FontScale::Compact.as_str(), "compact");
    }

    #[test]
    fn test_layout_variant_untagged() {
        let seed: LayoutVariant = serde_json::from_str("417").unwrap();
        assert_eq!(seed, LayoutVariant::Seed(417));
        let named: LayoutVariant = serde_json::from_str("\"mosaic\"").unwrap();
        assert_eq!(named, LayoutVariant::Named("mosaic".into()));
    }

    #[test]
    fn test_slide_display() {
        let mut slide = Slide::new("s1", "Agenda");
        slide.is_image_loading = true;
        let output = format!("{}", slide);
        assert!(output.contains("Agenda"));
        assert!(output.contains("image generating"));
    }
}
