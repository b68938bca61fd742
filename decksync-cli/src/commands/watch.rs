use clap::Args;

use decksync_core::sync::ServerMessage;
use decksync_core::{ConnectionStatus, SyncError};

use super::session::{close, current, open, runtime};
use super::CommandError;
use crate::config::Config;

/// Follow a presentation live until interrupted
#[derive(Args)]
pub struct WatchCommand {
    /// Presentation ID
    pub presentation: String,

    /// Also print cursor and selection traffic
    #[arg(long)]
    pub presence: bool,
}

impl WatchCommand {
    pub fn run(&self, config: &Config) -> Result<(), CommandError> {
        runtime()?.block_on(self.watch(config))
    }

    async fn watch(&self, config: &Config) -> Result<(), CommandError> {
        let subscription = open(config, &self.presentation).await?;
        print!("{}", current(&subscription)?);
        println!("\n{} online", subscription.active_users().len());

        let presence = self.presence;
        let _messages = subscription.manager().on_message(move |message| {
            if let Some(line) = describe(message, presence) {
                println!("{}", line);
            }
        });
        let _status = subscription
            .manager()
            .on_status_change(|status| eprintln!("[{}]", status));

        let mut status = subscription.manager().watch_status();
        let outcome = tokio::select! {
            _ = tokio::signal::ctrl_c() => Ok(()),
            _ = status.wait_for(|s| *s == ConnectionStatus::Disconnected) => {
                let error = subscription
                    .error()
                    .map(SyncError::ConnectionFailed)
                    .unwrap_or(SyncError::NotConnected);
                Err(CommandError::Sync(error))
            }
        };

        close(subscription).await;
        outcome
    }
}

fn by(user_id: &Option<String>) -> &str {
    user_id.as_deref().unwrap_or("someone")
}

/// One line per message worth showing; acks and unknown types print nothing.
pub fn describe(message: &ServerMessage, presence: bool) -> Option<String> {
    let line = match message {
        ServerMessage::SyncState { slides, version, .. } => {
            format!("Synced at version {} ({} slides)", version, slides.len())
        }
        ServerMessage::UserJoined { user, active_users } => format!(
            "{} joined ({} online)",
            user.as_ref().map(|u| u.display_name()).unwrap_or("someone"),
            active_users.len()
        ),
        ServerMessage::UserLeft {
            user_id,
            active_users,
        } => format!("{} left ({} online)", by(user_id), active_users.len()),
        ServerMessage::SlideUpdate {
            slide_id,
            version,
            updated_by,
            ..
        } => match version {
            Some(v) => format!("{} updated slide {} (version {})", by(updated_by), slide_id, v),
            None => format!("{} updated slide {}", by(updated_by), slide_id),
        },
        ServerMessage::SlideCreate {
            slide, created_by, ..
        } => format!(
            "{} created slide {}: {}",
            by(created_by),
            slide.id.as_deref().unwrap_or("?"),
            slide.title.as_deref().unwrap_or("(untitled)")
        ),
        ServerMessage::SlideDelete {
            slide_id,
            deleted_by,
        } => format!("{} deleted slide {}", by(deleted_by), slide_id),
        ServerMessage::SlideReorder {
            slide_orders,
            reordered_by,
        } => format!(
            "{} reordered {} slide(s)",
            by(reordered_by),
            slide_orders.len()
        ),
        ServerMessage::PresentationUpdate {
            version,
            updated_by,
            ..
        } => match version {
            Some(v) => format!("{} updated the presentation (version {})", by(updated_by), v),
            None => format!("{} updated the presentation", by(updated_by)),
        },
        ServerMessage::ImageGenerating { slide_id, .. } => {
            format!("Generating image for slide {}", slide_id)
        }
        ServerMessage::ImageCompleted { slide_id, .. } => {
            format!("Image ready for slide {}", slide_id)
        }
        ServerMessage::ImageFailed { slide_id, error } => {
            format!("Image failed for slide {}: {}", slide_id, error)
        }
        ServerMessage::Error {
            error_code,
            error_message,
            ..
        } => format!("Server error [{}]: {}", error_code, error_message),
        ServerMessage::CursorMove {
            user_id,
            slide_id,
            x,
            y,
        } if presence => format!(
            "{} cursor at ({:.0}, {:.0}) on {}",
            user_id,
            x,
            y,
            slide_id.as_deref().unwrap_or("-")
        ),
        ServerMessage::SelectionChange {
            user_id,
            slide_id,
            element_id,
        } if presence => format!(
            "{} selected {}/{}",
            user_id,
            slide_id.as_deref().unwrap_or("-"),
            element_id.as_deref().unwrap_or("-")
        ),
        _ => return None,
    };
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use decksync_core::ActiveUser;

    #[test]
    fn test_describe_join() {
        let message = ServerMessage::UserJoined {
            user: Some(ActiveUser::new("u2").with_name("Bob")),
            active_users: vec![ActiveUser::new("u1"), ActiveUser::new("u2")],
        };
        assert_eq!(
            describe(&message, false).as_deref(),
            Some("Bob joined (2 online)")
        );
    }

    #[test]
    fn test_describe_update() {
        let message = ServerMessage::SlideDelete {
            slide_id: "s1".into(),
            deleted_by: Some("u1".into()),
        };
        assert_eq!(
            describe(&message, false).as_deref(),
            Some("u1 deleted slide s1")
        );
    }

    #[test]
    fn test_presence_hidden_by_default() {
        let message = ServerMessage::CursorMove {
            user_id: "u1".into(),
            slide_id: Some("s1".into()),
            x: 10.0,
            y: 20.0,
        };
        assert!(describe(&message, false).is_none());
        assert_eq!(
            describe(&message, true).as_deref(),
            Some("u1 cursor at (10, 20) on s1")
        );
    }

    #[test]
    fn test_acks_are_silent() {
        let message = ServerMessage::SyncAck {
            original_message_id: Some("m1".into()),
            success: true,
            new_version: None,
            server_id: None,
        };
        assert!(describe(&message, false).is_none());
    }
}
