//! In-memory connector used by the sync tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::channel::mpsc as fmpsc;
use futures::future::BoxFuture;
use futures::{FutureExt, SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, Semaphore};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use super::error::SyncError;
use super::transport::{Connector, FrameSink, FrameStream};

/// Server side of one accepted mock socket.
pub(crate) struct MockSocket {
    pub url: String,
    to_client: Option<fmpsc::UnboundedSender<Result<Message, SyncError>>>,
    from_client: fmpsc::UnboundedReceiver<Message>,
}

impl MockSocket {
    pub fn send_json(&self, value: Value) {
        self.send_text(&value.to_string());
    }

    pub fn send_text(&self, text: &str) {
        if let Some(tx) = &self.to_client {
            let _ = tx.unbounded_send(Ok(Message::text(text.to_string())));
        }
    }

    /// Closes the socket with a close frame carrying `code`.
    pub fn close(&mut self, code: u16) {
        if let Some(tx) = self.to_client.take() {
            let _ = tx.unbounded_send(Ok(Message::Close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: "".into(),
            }))));
        }
    }

    /// Ends the stream without a close frame.
    pub fn drop_connection(&mut self) {
        self.to_client.take();
    }

    /// Next frame the client wrote, if any.
    pub async fn next_frame(&mut self) -> Option<Message> {
        self.from_client.next().await
    }

    /// Next text frame the client wrote, parsed as JSON.
    pub async fn next_json(&mut self) -> Value {
        loop {
            match self.from_client.next().await {
                Some(Message::Text(text)) => {
                    return serde_json::from_str(text.as_str()).expect("client sent invalid JSON")
                }
                Some(_) => continue,
                None => panic!("client closed the socket"),
            }
        }
    }
}

struct MockState {
    attempts: Vec<(String, Instant)>,
    outcomes: VecDeque<bool>,
}

/// Connector handing each accepted socket to the test through a channel.
#[derive(Clone)]
pub(crate) struct MockConnector {
    state: Arc<Mutex<MockState>>,
    refuse: Arc<AtomicBool>,
    gate: Option<Arc<Semaphore>>,
    sockets: mpsc::UnboundedSender<MockSocket>,
}

impl MockConnector {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockSocket>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let connector = Self {
            state: Arc::new(Mutex::new(MockState {
                attempts: Vec::new(),
                outcomes: VecDeque::new(),
            })),
            refuse: Arc::new(AtomicBool::new(false)),
            gate: None,
            sockets: tx,
        };
        (connector, rx)
    }

    /// Handshakes block until [`MockConnector::release`] is called.
    pub fn gated() -> (Self, mpsc::UnboundedReceiver<MockSocket>) {
        let (mut connector, rx) = Self::new();
        connector.gate = Some(Arc::new(Semaphore::new(0)));
        (connector, rx)
    }

    pub fn release(&self, handshakes: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(handshakes);
        }
    }

    /// Refuses every handshake from now on.
    pub fn refuse_all(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Queues one-shot outcomes (`true` accepts, `false` refuses) consumed
    /// before the `refuse_all` flag applies.
    pub fn script(&self, outcomes: &[bool]) {
        self.state.lock().outcomes.extend(outcomes.iter().copied());
    }

    pub fn attempts(&self) -> Vec<(String, Instant)> {
        self.state.lock().attempts.clone()
    }

    pub fn attempt_count(&self) -> usize {
        self.state.lock().attempts.len()
    }
}

impl Connector for MockConnector {
    fn connect(&self, url: String) -> BoxFuture<'static, Result<(FrameSink, FrameStream), SyncError>> {
        let this = self.clone();
        async move {
            if let Some(gate) = &this.gate {
                if let Ok(permit) = gate.acquire().await {
                    permit.forget();
                }
            }

            let accept = {
                let mut state = this.state.lock();
                state.attempts.push((url.clone(), Instant::now()));
                state
                    .outcomes
                    .pop_front()
                    .unwrap_or(!this.refuse.load(Ordering::SeqCst))
            };
            if !accept {
                return Err(SyncError::ConnectionFailed("connection refused".into()));
            }

            let (to_client, client_rx) = fmpsc::unbounded();
            let (client_tx, from_client) = fmpsc::unbounded::<Message>();
            let _ = this.sockets.send(MockSocket {
                url,
                to_client: Some(to_client),
                from_client,
            });

            let sink: FrameSink =
                Box::pin(client_tx.sink_map_err(|e| SyncError::WebSocket(e.to_string())));
            let stream: FrameStream = Box::pin(client_rx);
            Ok((sink, stream))
        }
        .boxed()
    }
}

/// Full-state payload for a deck with the given slide ids.
pub(crate) fn sync_state(document_id: &str, slide_ids: &[&str], version: u64) -> Value {
    let slides: Vec<Value> = slide_ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            serde_json::json!({
                "id": id,
                "position": i,
                "title": format!("Slide {}", id),
                "content": [],
                "version": 1,
                "has_image": false
            })
        })
        .collect();
    serde_json::json!({
        "type": "sync:state",
        "presentation": {"id": document_id, "topic": "Deck", "version": version},
        "slides": slides,
        "active_users": [{"user_id": "u1", "name": "Ada"}],
        "version": version
    })
}
