use clap::{Args, Subcommand};

use decksync_core::sync::SlideOrder;
use decksync_core::{Alignment, LayoutType, Slide, SlidePatch};

use super::session::{close, current, open, runtime, slide_base_version};
use super::CommandError;
use crate::config::Config;

#[derive(Args)]
pub struct SlideCommand {
    #[command(subcommand)]
    pub command: SlideSubcommand,
}

/// Fields shared by `update` and `create`.
#[derive(Args, Debug, Default, Clone)]
pub struct SlideFields {
    /// Slide title
    #[arg(long)]
    pub title: Option<String>,

    /// Bullet point (repeat for several; replaces all existing bullets)
    #[arg(long = "content")]
    pub content: Vec<String>,

    /// Speaker notes
    #[arg(long)]
    pub notes: Option<String>,

    /// Prompt for the slide image
    #[arg(long)]
    pub image_prompt: Option<String>,

    /// Layout: split, full-bleed, statement, gallery, card, horizontal, magazine
    #[arg(long)]
    pub layout: Option<String>,

    /// Alignment: left, center, right
    #[arg(long)]
    pub alignment: Option<String>,
}

impl SlideFields {
    pub fn to_patch(&self) -> Result<SlidePatch, CommandError> {
        let mut patch = SlidePatch::default();
        if let Some(title) = &self.title {
            patch = patch.title(title.clone());
        }
        if !self.content.is_empty() {
            patch = patch.content(self.content.clone());
        }
        if let Some(notes) = &self.notes {
            patch = patch.speaker_notes(notes.clone());
        }
        if let Some(prompt) = &self.image_prompt {
            patch = patch.image_prompt(prompt.clone());
        }
        if let Some(layout) = &self.layout {
            patch = patch.layout_type(parse_layout(layout)?);
        }
        if let Some(alignment) = &self.alignment {
            patch = patch.alignment(parse_alignment(alignment)?);
        }
        Ok(patch)
    }
}

fn parse_layout(value: &str) -> Result<LayoutType, CommandError> {
    LayoutType::parse(value)
        .ok_or_else(|| CommandError::InvalidArgument(format!("Unknown layout '{}'", value)))
}

fn parse_alignment(value: &str) -> Result<Alignment, CommandError> {
    Alignment::parse(value)
        .ok_or_else(|| CommandError::InvalidArgument(format!("Unknown alignment '{}'", value)))
}

#[derive(Subcommand)]
pub enum SlideSubcommand {
    /// Change fields of a slide
    Update {
        /// Presentation ID
        presentation: String,

        /// Slide ID
        slide_id: String,

        #[command(flatten)]
        fields: SlideFields,

        /// Version the change is based on (default: the server's current one)
        #[arg(long)]
        base_version: Option<u64>,
    },

    /// Add a slide
    Create {
        /// Presentation ID
        presentation: String,

        #[command(flatten)]
        fields: SlideFields,

        /// Zero-based position (default: append)
        #[arg(long)]
        position: Option<u32>,
    },

    /// Remove a slide
    Delete {
        /// Presentation ID
        presentation: String,

        /// Slide ID
        slide_id: String,

        /// Version the deletion is based on (default: the server's current one)
        #[arg(long)]
        base_version: Option<u64>,
    },

    /// Put slides in the given order
    Reorder {
        /// Presentation ID
        presentation: String,

        /// Slide IDs in their new order
        #[arg(required = true)]
        slide_ids: Vec<String>,
    },
}

impl SlideCommand {
    pub fn run(&self, config: &Config) -> Result<(), CommandError> {
        runtime()?.block_on(self.execute(config))
    }

    async fn execute(&self, config: &Config) -> Result<(), CommandError> {
        match &self.command {
            SlideSubcommand::Update {
                presentation,
                slide_id,
                fields,
                base_version,
            } => {
                let patch = fields.to_patch()?;
                if patch.is_empty() {
                    return Err(CommandError::InvalidArgument(
                        "Nothing to update. Pass at least one field".to_string(),
                    ));
                }
                let subscription = open(config, presentation).await?;
                let deck = current(&subscription)?;
                let base = slide_base_version(&deck, slide_id, *base_version)?;
                let result = subscription.update_slide(slide_id, &patch, base).await;
                close(subscription).await;

                let ack = result?;
                match ack.new_version {
                    Some(version) => println!("Updated slide {} (version {})", slide_id, version),
                    None => println!("Updated slide {}", slide_id),
                }
            }

            SlideSubcommand::Create {
                presentation,
                fields,
                position,
            } => {
                let slide = new_slide(fields)?;
                let subscription = open(config, presentation).await?;
                let deck = current(&subscription)?;
                let position = position.unwrap_or(deck.slides.len() as u32);
                let result = subscription.create_slide(position, &slide).await;
                close(subscription).await;

                let ack = result?;
                println!(
                    "Created slide {} at position {}",
                    ack.server_id.as_deref().unwrap_or(&slide.id),
                    position
                );
            }

            SlideSubcommand::Delete {
                presentation,
                slide_id,
                base_version,
            } => {
                let subscription = open(config, presentation).await?;
                let deck = current(&subscription)?;
                let base = slide_base_version(&deck, slide_id, *base_version)?;
                let result = subscription.delete_slide(slide_id, base).await;
                close(subscription).await;

                result?;
                println!("Deleted slide {}", slide_id);
            }

            SlideSubcommand::Reorder {
                presentation,
                slide_ids,
            } => {
                let subscription = open(config, presentation).await?;
                let result = subscription
                    .reorder_slides(SlideOrder::from_ids(slide_ids))
                    .await;
                close(subscription).await;

                result?;
                println!("Reordered {} slide(s)", slide_ids.len());
            }
        }
        Ok(())
    }
}

/// Builds a slide with a temporary id for a create request.
fn new_slide(fields: &SlideFields) -> Result<Slide, CommandError> {
    let temp_id = format!("tmp-{}", uuid::Uuid::new_v4());
    Ok(Slide::new(temp_id, "").patched(&fields.to_patch()?))
}
