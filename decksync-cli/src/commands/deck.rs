use clap::Args;

use decksync_core::PresentationPatch;

use super::session::{close, current, open, runtime};
use super::CommandError;
use crate::config::Config;

/// Print the current state of a presentation
#[derive(Args)]
pub struct ShowCommand {
    /// Presentation ID
    pub presentation: String,

    /// Also list who is connected
    #[arg(long)]
    pub users: bool,
}

impl ShowCommand {
    pub fn run(&self, config: &Config) -> Result<(), CommandError> {
        runtime()?.block_on(async {
            let subscription = open(config, &self.presentation).await?;
            let deck = current(&subscription)?;
            print!("{}", deck);
            if self.users {
                println!();
                for user in subscription.active_users() {
                    println!("  * {} ({})", user.display_name(), user.user_id);
                }
            }
            close(subscription).await;
            Ok(())
        })
    }
}

/// Change presentation-level fields
#[derive(Args)]
pub struct UpdateCommand {
    /// Presentation ID
    pub presentation: String,

    #[arg(long)]
    pub topic: Option<String>,

    #[arg(long)]
    pub theme: Option<String>,

    #[arg(long)]
    pub visual_style: Option<String>,

    /// Layout preset; pass an empty string to clear it
    #[arg(long)]
    pub layout_preset: Option<String>,

    /// Version the change is based on (default: the server's current one)
    #[arg(long)]
    pub base_version: Option<u64>,
}

impl UpdateCommand {
    pub fn to_patch(&self) -> PresentationPatch {
        PresentationPatch {
            topic: self.topic.clone(),
            theme_id: self.theme.clone(),
            visual_style: self.visual_style.clone(),
            layout_preset: self
                .layout_preset
                .as_ref()
                .map(|preset| Some(preset.clone()).filter(|p| !p.is_empty())),
        }
    }

    pub fn run(&self, config: &Config) -> Result<(), CommandError> {
        let patch = self.to_patch();
        if patch.is_empty() {
            return Err(CommandError::InvalidArgument(
                "Nothing to update. Pass at least one field".to_string(),
            ));
        }

        runtime()?.block_on(async {
            let subscription = open(config, &self.presentation).await?;
            let base = match self.base_version {
                Some(version) => version,
                None => current(&subscription)?.version,
            };
            let result = subscription.update_presentation(&patch, base).await;
            close(subscription).await;

            let ack = result?;
            match ack.new_version {
                Some(version) => println!("Updated presentation (version {})", version),
                None => println!("Updated presentation"),
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn command() -> UpdateCommand {
        UpdateCommand {
            presentation: "d1".into(),
            topic: None,
            theme: None,
            visual_style: None,
            layout_preset: None,
            base_version: None,
        }
    }

    #[test]
    fn test_empty_update() {
        assert!(command().to_patch().is_empty());
    }

    #[test]
    fn test_update_patch() {
        let cmd = UpdateCommand {
            topic: Some("Roadmap".into()),
            layout_preset: Some("minimal".into()),
            ..command()
        };
        let patch = cmd.to_patch();
        assert_eq!(patch.topic.as_deref(), Some("Roadmap"));
        assert_eq!(patch.layout_preset, Some(Some("minimal".to_string())));
    }

    #[test]
    fn test_empty_layout_preset_clears() {
        let cmd = UpdateCommand {
            layout_preset: Some(String::new()),
            ..command()
        };
        assert_eq!(cmd.to_patch().layout_preset, Some(None));
    }
}
