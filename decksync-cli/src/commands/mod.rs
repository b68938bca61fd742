mod config_cmd;
mod deck;
mod error;
mod presence;
mod session;
mod slide;
mod status;
mod watch;

pub use config_cmd::ConfigCommand;
pub use deck::{ShowCommand, UpdateCommand};
pub use error::CommandError;
pub use presence::{CursorCommand, SelectCommand};
pub use slide::SlideCommand;
pub use status::StatusCommand;
pub use watch::WatchCommand;
