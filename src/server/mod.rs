//! Reference server for the DeckSync socket protocol.

pub mod app;
pub mod auth;
pub mod config;
pub mod hub;
pub mod session;
pub mod store;
pub mod ws;

pub use app::{router, AppState};
pub use auth::{TokenStore, CLOSE_UNAUTHORIZED};
pub use config::{ConfigFile, ServerConfig, TokenEntry, DEFAULT_PORT};
pub use hub::{RoomEvent, RoomHub};
pub use store::{PresentationStore, Snapshot, StoreError};
