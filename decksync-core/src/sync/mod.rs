//! Real-time presentation sync client.
//!
//! ## Protocol
//!
//! The client talks to the sync server over one WebSocket per presentation:
//! 1. Connect to `/api/v1/ws/presentations/{id}?token=...`
//! 2. Receive `sync:state` with the full presentation
//! 3. Send mutations tagged with a `message_id`; the server answers each
//!    with `sync:ack`, `sync:conflict` or `error`
//! 4. Receive broadcasts of other clients' changes and presence
//!
//! Messages are JSON text frames discriminated by `type`.

mod cache;
mod codec;
mod connection;
mod error;
mod health;
mod ledger;
mod listeners;
mod protocol;
mod reducer;
mod subscription;
mod token;
mod transport;

#[cfg(test)]
mod testing;

pub use cache::{CacheUpdate, DocumentCache};
pub use codec::{
    decode_frame, parse_timestamp, presentation_from_wire, presentation_patch_from_wire,
    presentation_patch_to_wire, slide_from_wire, slide_patch_from_wire, slide_patch_to_wire,
    slide_to_wire,
};
pub use connection::{
    ConnectionConfig, ConnectionManager, ConnectionStatus, InboundMessage, DEFAULT_ACK_TIMEOUT,
    DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_MAX_RECONNECT_ATTEMPTS, DEFAULT_RECONNECT_BASE_DELAY,
};
pub use error::{ConflictInfo, ConflictKind, SyncError};
pub use health::{check_server, server_health, HealthStatus};
pub use ledger::{Ack, PendingLedger};
pub use listeners::{ListenerSet, Subscription};
pub use protocol::{
    generate_message_id, ClientEnvelope, ClientMessage, ServerMessage, SlideOrder, StyleOverrides,
    WirePresentation, WirePresentationChanges, WireSlide, WireSlideChanges,
};
pub use reducer::{
    adopt_conflict_state, apply_local_slide_patch, confirm_created_slide, insert_local_slide,
    reduce,
};
pub use subscription::PresentationSubscription;
pub use token::{SharedToken, TokenProvider};
pub use transport::{
    build_http_url, build_ws_url, Connector, FrameSink, FrameStream, WsConnector,
};
