//! WebSocket endpoint for a single presentation.
//!
//! `GET /api/v1/ws/presentations/{id}?token=...` upgrades to a socket. The
//! first frame sent is always `sync:state`. Client messages are applied to
//! the store under its write lock and the resulting broadcast is published
//! before the lock is released, so every member sees changes in store order.

use std::sync::atomic::{AtomicU64, Ordering};

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    response::Response,
};
use decksync_core::sync::{ClientEnvelope, ServerMessage};
use decksync_core::ActiveUser;
use futures::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;

use super::app::AppState;
use super::auth::CLOSE_UNAUTHORIZED;
use super::session::{handle_message, invalid_message, Outcome};

static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

type SocketSink = SplitSink<WebSocket, Message>;

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub token: Option<String>,
}

pub async fn presentation_socket(
    ws: WebSocketUpgrade,
    Path(presentation_id): Path<String>,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> Response {
    let user = params
        .token
        .as_deref()
        .and_then(|token| state.tokens.validate(token));

    ws.on_upgrade(move |socket| async move {
        match user {
            Some(user) => handle_socket(socket, presentation_id, user, state).await,
            None => reject(socket).await,
        }
    })
}

async fn reject(mut socket: WebSocket) {
    tracing::info!("Refusing socket with missing or unknown token");
    let frame = CloseFrame {
        code: CLOSE_UNAUTHORIZED,
        reason: "Unauthorized".into(),
    };
    if let Err(e) = socket.send(Message::Close(Some(frame))).await {
        tracing::debug!("Failed to send close frame: {}", e);
    }
}

async fn send_message(sink: &mut SocketSink, message: &ServerMessage) -> Result<(), axum::Error> {
    let text = match message.encode() {
        Ok(text) => text,
        Err(e) => {
            tracing::error!("Failed to encode {}: {}", message.kind(), e);
            return Ok(());
        }
    };
    sink.send(Message::Text(text.into())).await
}

async fn sync_state(state: &AppState, presentation_id: &str) -> ServerMessage {
    let snapshot = state.store.write().await.snapshot(presentation_id);
    ServerMessage::SyncState {
        presentation: snapshot.presentation,
        slides: snapshot.slides,
        active_users: state.hub.roster(presentation_id).await,
        version: snapshot.version,
    }
}

async fn apply_frame(
    state: &AppState,
    presentation_id: &str,
    connection_id: u64,
    user: &ActiveUser,
    text: &str,
) -> Option<ServerMessage> {
    let envelope = match ClientEnvelope::decode(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::debug!("Invalid frame from {}: {}", user.user_id, e);
            return Some(invalid_message(&e.to_string()));
        }
    };

    tracing::debug!(
        "{} from {} on {}",
        envelope.message.kind(),
        user.user_id,
        presentation_id
    );

    let mut store = state.store.write().await;
    let Outcome { reply, broadcast } = handle_message(&mut store, presentation_id, user, envelope);
    if let Some(message) = broadcast {
        state
            .hub
            .broadcast(presentation_id, Some(connection_id), message)
            .await;
    }
    reply
}

async fn handle_socket(socket: WebSocket, presentation_id: String, user: ActiveUser, state: AppState) {
    let connection_id = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
    tracing::info!(
        "{} joined presentation {} (connection {})",
        user.user_id,
        presentation_id,
        connection_id
    );

    let (mut socket_tx, mut socket_rx) = socket.split();
    let (mut events, roster) = state
        .hub
        .join(&presentation_id, connection_id, user.clone())
        .await;

    let initial = sync_state(&state, &presentation_id).await;
    if send_message(&mut socket_tx, &initial).await.is_ok() {
        state
            .hub
            .broadcast(
                &presentation_id,
                Some(connection_id),
                ServerMessage::UserJoined {
                    user: Some(user.clone()),
                    active_users: roster,
                },
            )
            .await;

        loop {
            tokio::select! {
                frame = socket_rx.next() => {
                    match frame {
                        Some(Ok(Message::Text(text))) => {
                            let reply = apply_frame(
                                &state,
                                &presentation_id,
                                connection_id,
                                &user,
                                text.as_str(),
                            )
                            .await;
                            if let Some(reply) = reply {
                                if send_message(&mut socket_tx, &reply).await.is_err() {
                                    break;
                                }
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => break,
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            tracing::debug!("Socket error on connection {}: {}", connection_id, e);
                            break;
                        }
                    }
                }
                event = events.recv() => {
                    match event {
                        Ok(event) => {
                            if event.is_for(connection_id)
                                && send_message(&mut socket_tx, &event.message).await.is_err()
                            {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            tracing::warn!(
                                "Connection {} lagged by {} event(s), resending state",
                                connection_id,
                                skipped
                            );
                            let state_message = sync_state(&state, &presentation_id).await;
                            if send_message(&mut socket_tx, &state_message).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        }
    }

    let roster = state.hub.leave(&presentation_id, connection_id).await;
    state
        .hub
        .broadcast(
            &presentation_id,
            Some(connection_id),
            ServerMessage::UserLeft {
                user_id: Some(user.user_id.clone()),
                active_users: roster,
            },
        )
        .await;
    tracing::info!(
        "{} left presentation {} (connection {})",
        user.user_id,
        presentation_id,
        connection_id
    );
}
