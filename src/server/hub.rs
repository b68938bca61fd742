//! Presentation rooms.
//!
//! Every presentation with at least one connected client has a room: a
//! broadcast channel plus the roster of connected users. Events carry the
//! id of the connection that caused them so the origin can skip its own
//! broadcasts.

use std::collections::HashMap;
use std::sync::Arc;

use decksync_core::sync::ServerMessage;
use decksync_core::ActiveUser;
use tokio::sync::{broadcast, RwLock};

/// Buffer size for each room's broadcast channel.
const ROOM_CAPACITY: usize = 64;

/// A message broadcast to a room.
#[derive(Debug, Clone)]
pub struct RoomEvent {
    /// Connection that caused the event, if any.
    pub origin: Option<u64>,
    pub message: Arc<ServerMessage>,
}

impl RoomEvent {
    /// True if the connection `connection_id` should receive this event.
    pub fn is_for(&self, connection_id: u64) -> bool {
        self.origin != Some(connection_id)
    }
}

struct Room {
    sender: broadcast::Sender<RoomEvent>,
    members: Vec<(u64, ActiveUser)>,
}

impl Room {
    /// One entry per user, in join order.
    fn roster(&self) -> Vec<ActiveUser> {
        let mut users: Vec<ActiveUser> = Vec::new();
        for (_, user) in &self.members {
            if !users.iter().any(|u| u.user_id == user.user_id) {
                users.push(user.clone());
            }
        }
        users
    }
}

/// Tracks all rooms for broadcasting updates.
pub struct RoomHub {
    rooms: RwLock<HashMap<String, Room>>,
}

impl RoomHub {
    pub fn new() -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
        }
    }

    /// Adds a connection to a room, creating the room if needed. Returns the
    /// event receiver and the roster including the new member.
    pub async fn join(
        &self,
        presentation_id: &str,
        connection_id: u64,
        user: ActiveUser,
    ) -> (broadcast::Receiver<RoomEvent>, Vec<ActiveUser>) {
        let mut rooms = self.rooms.write().await;
        let room = rooms
            .entry(presentation_id.to_string())
            .or_insert_with(|| Room {
                sender: broadcast::channel(ROOM_CAPACITY).0,
                members: Vec::new(),
            });
        room.members.push((connection_id, user));
        (room.sender.subscribe(), room.roster())
    }

    /// Removes a connection. Returns the remaining roster; the room is
    /// dropped once empty.
    pub async fn leave(&self, presentation_id: &str, connection_id: u64) -> Vec<ActiveUser> {
        let mut rooms = self.rooms.write().await;
        let Some(room) = rooms.get_mut(presentation_id) else {
            return Vec::new();
        };
        room.members.retain(|(id, _)| *id != connection_id);
        let roster = room.roster();
        if room.members.is_empty() {
            rooms.remove(presentation_id);
            tracing::debug!("Closed room {}", presentation_id);
        }
        roster
    }

    /// Broadcasts a message to everyone in the room except `origin`.
    pub async fn broadcast(&self, presentation_id: &str, origin: Option<u64>, message: ServerMessage) {
        let rooms = self.rooms.read().await;
        if let Some(room) = rooms.get(presentation_id) {
            // Ignore send errors (no subscribers)
            let _ = room.sender.send(RoomEvent {
                origin,
                message: Arc::new(message),
            });
        }
    }

    pub async fn roster(&self, presentation_id: &str) -> Vec<ActiveUser> {
        let rooms = self.rooms.read().await;
        rooms
            .get(presentation_id)
            .map(|room| room.roster())
            .unwrap_or_default()
    }

    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

impl Default for RoomHub {
    fn default() -> Self {
        Self::new()
    }
}
