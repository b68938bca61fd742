//! One-shot cursor and selection broadcasts.

use clap::Args;

use super::session::{close, open, runtime};
use super::CommandError;
use crate::config::Config;

/// Broadcast a cursor position to other collaborators
#[derive(Args)]
pub struct CursorCommand {
    /// Presentation ID
    pub presentation: String,

    #[arg(long)]
    pub x: f64,

    #[arg(long)]
    pub y: f64,

    /// Slide the cursor is on
    #[arg(long)]
    pub slide: Option<String>,
}

impl CursorCommand {
    pub fn run(&self, config: &Config) -> Result<(), CommandError> {
        runtime()?.block_on(async {
            let subscription = open(config, &self.presentation).await?;
            let result = subscription.move_cursor(self.slide.as_deref(), self.x, self.y);
            close(subscription).await;
            Ok(result?)
        })
    }
}

/// Broadcast a selection to other collaborators
#[derive(Args)]
pub struct SelectCommand {
    /// Presentation ID
    pub presentation: String,

    /// Selected slide (omit to clear)
    #[arg(long)]
    pub slide: Option<String>,

    /// Selected element within the slide
    #[arg(long)]
    pub element: Option<String>,
}

impl SelectCommand {
    pub fn run(&self, config: &Config) -> Result<(), CommandError> {
        runtime()?.block_on(async {
            let subscription = open(config, &self.presentation).await?;
            let result =
                subscription.change_selection(self.slide.as_deref(), self.element.as_deref());
            close(subscription).await;
            Ok(result?)
        })
    }
}
