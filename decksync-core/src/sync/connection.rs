//! Connection manager for presentation sync sockets.
//!
//! Owns at most one socket at a time, bound to one presentation. The
//! connection moves through `Disconnected -> Connecting -> Connected`, falls
//! back to `Reconnecting` on abnormal closure and retries with exponential
//! backoff until the attempt cap is reached.
//!
//! Every connect attempt carries a marker. A socket whose marker is no longer
//! the intended one is stale: its handshake result is closed and discarded,
//! and its close event never drives a reconnect.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use super::codec::decode_frame;
use super::error::SyncError;
use super::ledger::{Ack, PendingLedger};
use super::listeners::{ListenerSet, Subscription};
use super::protocol::{ClientEnvelope, ClientMessage, ServerMessage};
use super::token::TokenProvider;
use super::transport::{build_ws_url, redact_url, Connector, FrameSink, FrameStream, WsConnector};

/// Default handshake timeout (10 seconds)
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default acknowledgment window (10 seconds)
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(10);

pub const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

const NORMAL_CLOSURE: u16 = 1000;
const NO_STATUS_RECEIVED: u16 = 1005;
const ABNORMAL_CLOSURE: u16 = 1006;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
}

impl ConnectionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionStatus::Disconnected => "disconnected",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Reconnecting => "reconnecting",
        }
    }
}

impl std::fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub server_url: String,
    pub reconnect_base_delay: Duration,
    pub max_reconnect_attempts: u32,
    pub ack_timeout: Duration,
    pub handshake_timeout: Duration,
}

impl ConnectionConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            reconnect_base_delay: DEFAULT_RECONNECT_BASE_DELAY,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
            ack_timeout: DEFAULT_ACK_TIMEOUT,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
        }
    }

    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Delay before reconnect attempt `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.reconnect_base_delay.saturating_mul(factor)
    }
}

/// A decoded frame and the presentation whose socket delivered it.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub document_id: String,
    pub message: ServerMessage,
}

#[derive(Default)]
struct Session {
    status: ConnectionStatus,
    document_id: Option<String>,
    next_marker: u64,
    /// Marker of the connect attempt whose result should be kept.
    intended: Option<u64>,
    reconnect_attempts: u32,
    outbound: Option<mpsc::UnboundedSender<Message>>,
    reader: Option<JoinHandle<()>>,
    retry: Option<JoinHandle<()>>,
    last_error: Option<String>,
}

impl Session {
    fn new_marker(&mut self) -> u64 {
        self.next_marker += 1;
        self.intended = Some(self.next_marker);
        self.next_marker
    }

    fn is_current(&self, marker: u64) -> bool {
        self.intended == Some(marker)
    }
}

/// Status transitions collected under the session lock and published after
/// it is released.
type Transitions = Vec<ConnectionStatus>;

struct Inner {
    config: ConnectionConfig,
    tokens: Arc<dyn TokenProvider>,
    connector: Arc<dyn Connector>,
    session: Mutex<Session>,
    ledger: PendingLedger,
    status_listeners: ListenerSet<ConnectionStatus>,
    message_listeners: ListenerSet<InboundMessage>,
    status_tx: watch::Sender<ConnectionStatus>,
}

/// Handle to the sync connection. Cloning is cheap and every clone drives
/// the same socket.
#[derive(Clone)]
pub struct ConnectionManager {
    inner: Arc<Inner>,
}

enum AttachStep {
    Ready,
    Wait,
    Connect { marker: u64, token: String },
}

impl ConnectionManager {
    /// Creates a manager that opens real WebSocket connections.
    pub fn new(config: ConnectionConfig, tokens: impl TokenProvider + 'static) -> Self {
        Self::with_connector(config, Arc::new(tokens), Arc::new(WsConnector))
    }

    pub fn with_connector(
        config: ConnectionConfig,
        tokens: Arc<dyn TokenProvider>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (status_tx, _) = watch::channel(ConnectionStatus::Disconnected);
        Self {
            inner: Arc::new(Inner {
                ledger: PendingLedger::new(config.ack_timeout),
                config,
                tokens,
                connector,
                session: Mutex::new(Session::default()),
                status_listeners: ListenerSet::new(),
                message_listeners: ListenerSet::new(),
                status_tx,
            }),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.session.lock().status
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// The presentation the manager is attached to, if any.
    pub fn document_id(&self) -> Option<String> {
        self.inner.session.lock().document_id.clone()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.session.lock().reconnect_attempts
    }

    /// The error that last ended a connection attempt.
    pub fn last_error(&self) -> Option<String> {
        self.inner.session.lock().last_error.clone()
    }

    pub fn pending_operations(&self) -> usize {
        self.inner.ledger.len()
    }

    /// Registers a status listener. It is called immediately with the
    /// current status, then on every transition.
    pub fn on_status_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(ConnectionStatus) + Send + Sync + 'static,
    {
        let callback = Arc::new(callback);
        let registered = callback.clone();
        let subscription = self
            .inner
            .status_listeners
            .subscribe(move |status: &ConnectionStatus| registered(*status));
        callback(self.status());
        subscription
    }

    /// Registers a listener for every decoded inbound message, in arrival
    /// order.
    pub fn on_message<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&ServerMessage) + Send + Sync + 'static,
    {
        self.inner
            .message_listeners
            .subscribe(move |inbound: &InboundMessage| callback(&inbound.message))
    }

    /// Like [`on_message`](Self::on_message), but each message carries the
    /// presentation it arrived for. A frame from a socket that has already
    /// been replaced is never reported under the new presentation.
    pub fn on_inbound<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        self.inner.message_listeners.subscribe(callback)
    }

    /// A watch receiver tracking the connection status.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Attaches to a presentation and resolves once the connection is
    /// established.
    ///
    /// Attaching to the presentation that is already connected resolves
    /// immediately. Attaching while a connect for the same presentation is
    /// in flight waits for that attempt instead of opening a second socket.
    /// Attaching to a different presentation tears down the current one
    /// first.
    pub async fn attach(&self, document_id: &str) -> Result<(), SyncError> {
        let mut transitions = Transitions::new();
        let step = {
            let mut session = self.inner.session.lock();
            self.plan_attach(&mut session, document_id, &mut transitions)
        };
        self.publish(transitions);

        match step? {
            AttachStep::Ready => Ok(()),
            AttachStep::Wait => self.wait_until_settled().await,
            AttachStep::Connect { marker, token } => {
                match self.open(marker, document_id, &token).await {
                    Ok(()) => Ok(()),
                    Err(SyncError::Superseded) => Err(SyncError::Superseded),
                    Err(e) => {
                        self.fail_initial(marker, &e);
                        Err(e)
                    }
                }
            }
        }
    }

    fn plan_attach(
        &self,
        session: &mut Session,
        document_id: &str,
        transitions: &mut Transitions,
    ) -> Result<AttachStep, SyncError> {
        if session.document_id.as_deref() == Some(document_id) {
            match session.status {
                ConnectionStatus::Connected => return Ok(AttachStep::Ready),
                ConnectionStatus::Connecting | ConnectionStatus::Reconnecting => {
                    tracing::debug!("Attach to {} already in progress", document_id);
                    return Ok(AttachStep::Wait);
                }
                ConnectionStatus::Disconnected => {}
            }
        } else if session.document_id.is_some() {
            self.teardown(session, transitions);
        }

        let Some(token) = self.inner.tokens.access_token() else {
            tracing::warn!("Cannot attach to {}: not authenticated", document_id);
            return Err(SyncError::NotAuthenticated);
        };

        session.document_id = Some(document_id.to_string());
        session.reconnect_attempts = 0;
        session.last_error = None;
        let marker = session.new_marker();
        self.set_status(session, ConnectionStatus::Connecting, transitions);
        Ok(AttachStep::Connect { marker, token })
    }

    async fn wait_until_settled(&self) -> Result<(), SyncError> {
        let mut status = self.watch_status();
        let settled = status
            .wait_for(|s| {
                matches!(
                    s,
                    ConnectionStatus::Connected | ConnectionStatus::Disconnected
                )
            })
            .await
            .map(|s| *s)
            .unwrap_or(ConnectionStatus::Disconnected);

        if settled == ConnectionStatus::Connected {
            Ok(())
        } else {
            Err(SyncError::ConnectionFailed(
                self.last_error()
                    .unwrap_or_else(|| "connection closed".to_string()),
            ))
        }
    }

    /// Performs the handshake for `marker` and adopts the socket if the
    /// marker is still the intended one.
    async fn open(&self, marker: u64, document_id: &str, token: &str) -> Result<(), SyncError> {
        let url = build_ws_url(&self.inner.config.server_url, document_id, token);
        tracing::info!("Connecting to {}", redact_url(&url));

        let connect = self.inner.connector.connect(url);
        let (sink, stream) =
            match tokio::time::timeout(self.inner.config.handshake_timeout, connect).await {
                Ok(result) => result?,
                Err(_) => return Err(SyncError::HandshakeTimeout),
            };

        self.adopt(marker, sink, stream).await
    }

    async fn adopt(&self, marker: u64, sink: FrameSink, stream: FrameStream) -> Result<(), SyncError> {
        let mut transitions = Transitions::new();
        let superseded = {
            let mut session = self.inner.session.lock();
            if session.is_current(marker) {
                let (tx, rx) = mpsc::unbounded_channel();
                tokio::spawn(write_frames(sink, rx));

                let manager = self.clone();
                session.reader = Some(tokio::spawn(async move {
                    manager.read_frames(marker, stream).await;
                }));
                session.outbound = Some(tx);
                session.reconnect_attempts = 0;
                session.last_error = None;
                tracing::info!(
                    "Connected to presentation {}",
                    session.document_id.as_deref().unwrap_or_default()
                );
                self.set_status(&mut session, ConnectionStatus::Connected, &mut transitions);
                None
            } else {
                Some(sink)
            }
        };

        if let Some(mut sink) = superseded {
            tracing::debug!("Discarding superseded connection");
            let _ = sink.send(close_frame("Connection superseded")).await;
            let _ = sink.close().await;
            return Err(SyncError::Superseded);
        }
        self.publish(transitions);
        Ok(())
    }

    fn fail_initial(&self, marker: u64, error: &SyncError) {
        let mut transitions = Transitions::new();
        {
            let mut session = self.inner.session.lock();
            if !session.is_current(marker) {
                return;
            }
            tracing::warn!("Failed to connect: {}", error);
            session.intended = None;
            session.document_id = None;
            session.last_error = Some(error.to_string());
            self.set_status(&mut session, ConnectionStatus::Disconnected, &mut transitions);
        }
        self.publish(transitions);
    }

    async fn read_frames(&self, marker: u64, mut stream: FrameStream) {
        let close_code = loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => self.dispatch(marker, text.as_str()),
                Some(Ok(Message::Close(frame))) => {
                    break frame
                        .map(|f| u16::from(f.code))
                        .unwrap_or(NO_STATUS_RECEIVED)
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    tracing::warn!("WebSocket error: {}", e);
                    break ABNORMAL_CLOSURE;
                }
                None => break ABNORMAL_CLOSURE,
            }
        };
        self.handle_close(marker, close_code);
    }

    fn dispatch(&self, marker: u64, text: &str) {
        let document_id = {
            let session = self.inner.session.lock();
            match (session.is_current(marker), &session.document_id) {
                (true, Some(document_id)) => document_id.clone(),
                _ => return,
            }
        };
        let Some(message) = decode_frame(text) else {
            return;
        };
        self.inner.ledger.settle(&message);
        self.inner
            .message_listeners
            .emit(&InboundMessage { document_id, message });
    }

    fn handle_close(&self, marker: u64, code: u16) {
        let mut transitions = Transitions::new();
        {
            let mut session = self.inner.session.lock();
            if !session.is_current(marker) {
                return;
            }
            tracing::info!("WebSocket closed with code {}", code);
            session.outbound = None;
            session.reader = None;

            if code == NORMAL_CLOSURE || session.document_id.is_none() {
                session.intended = None;
                session.reconnect_attempts = 0;
                self.set_status(&mut session, ConnectionStatus::Disconnected, &mut transitions);
            } else {
                self.schedule_reconnect(&mut session, &mut transitions);
            }
        }
        self.publish(transitions);
    }

    fn schedule_reconnect(&self, session: &mut Session, transitions: &mut Transitions) {
        if session.reconnect_attempts >= self.inner.config.max_reconnect_attempts {
            tracing::warn!(
                "Max reconnection attempts ({}) reached",
                self.inner.config.max_reconnect_attempts
            );
            session.intended = None;
            session.last_error = Some("Max reconnection attempts reached".to_string());
            self.set_status(session, ConnectionStatus::Disconnected, transitions);
            return;
        }

        session.reconnect_attempts += 1;
        let attempt = session.reconnect_attempts;
        let delay = self.inner.config.backoff_delay(attempt);
        let marker = session.new_marker();
        self.set_status(session, ConnectionStatus::Reconnecting, transitions);
        tracing::info!("Reconnecting in {:?} (attempt {})", delay, attempt);

        let manager = self.clone();
        session.retry = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            manager.retry(marker).await;
        }));
    }

    async fn retry(&self, marker: u64) {
        let mut transitions = Transitions::new();
        let target = {
            let mut session = self.inner.session.lock();
            match (session.is_current(marker), session.document_id.clone()) {
                (true, Some(document_id)) => match self.inner.tokens.access_token() {
                    Some(token) => {
                        self.set_status(&mut session, ConnectionStatus::Connecting, &mut transitions);
                        Some((document_id, token))
                    }
                    None => {
                        tracing::warn!("Giving up reconnect: not authenticated");
                        session.intended = None;
                        session.last_error = Some(SyncError::NotAuthenticated.to_string());
                        self.set_status(&mut session, ConnectionStatus::Disconnected, &mut transitions);
                        None
                    }
                },
                _ => None,
            }
        };
        self.publish(transitions);

        let Some((document_id, token)) = target else {
            return;
        };
        match self.open(marker, &document_id, &token).await {
            Ok(()) | Err(SyncError::Superseded) => {}
            Err(e) => {
                let mut transitions = Transitions::new();
                {
                    let mut session = self.inner.session.lock();
                    if session.is_current(marker) {
                        tracing::warn!("Reconnect attempt failed: {}", e);
                        session.last_error = Some(e.to_string());
                        self.schedule_reconnect(&mut session, &mut transitions);
                    }
                }
                self.publish(transitions);
            }
        }
    }

    /// Detaches from the current presentation. Cancels any scheduled
    /// reconnect, closes the socket with a normal closure and resets the
    /// attempt counter.
    pub fn detach(&self) {
        let mut transitions = Transitions::new();
        {
            let mut session = self.inner.session.lock();
            self.teardown(&mut session, &mut transitions);
        }
        self.publish(transitions);
    }

    fn teardown(&self, session: &mut Session, transitions: &mut Transitions) {
        if let Some(retry) = session.retry.take() {
            retry.abort();
        }
        if let Some(reader) = session.reader.take() {
            reader.abort();
        }
        if let Some(outbound) = session.outbound.take() {
            let _ = outbound.send(close_frame("Client disconnected"));
        }
        if let Some(document_id) = session.document_id.take() {
            tracing::info!("Detached from presentation {}", document_id);
        }
        session.intended = None;
        session.reconnect_attempts = 0;
        self.set_status(session, ConnectionStatus::Disconnected, transitions);
    }

    /// Sends an acknowledged operation and waits for the server's verdict.
    pub async fn send(&self, message: ClientMessage) -> Result<Ack, SyncError> {
        let outbound = self.connected_outbound()?;
        let (message_id, reply) = self.inner.ledger.register();
        let kind = message.kind();

        let frame = match ClientEnvelope::new(message_id.clone(), message).encode() {
            Ok(frame) => frame,
            Err(e) => {
                self.inner.ledger.cancel(&message_id);
                return Err(SyncError::Protocol(e.to_string()));
            }
        };
        if outbound.send(Message::text(frame)).is_err() {
            self.inner.ledger.cancel(&message_id);
            return Err(SyncError::NotConnected);
        }
        tracing::debug!("Sent {} ({})", kind, message_id);

        self.inner.ledger.wait(&message_id, reply).await
    }

    /// Sends an ephemeral message (cursor, selection) without waiting for
    /// an acknowledgment.
    pub fn send_no_ack(&self, message: ClientMessage) -> Result<(), SyncError> {
        let outbound = self.connected_outbound()?;
        let envelope = ClientEnvelope::new(super::protocol::generate_message_id(), message);
        let frame = envelope
            .encode()
            .map_err(|e| SyncError::Protocol(e.to_string()))?;
        outbound
            .send(Message::text(frame))
            .map_err(|_| SyncError::NotConnected)
    }

    fn connected_outbound(&self) -> Result<mpsc::UnboundedSender<Message>, SyncError> {
        let session = self.inner.session.lock();
        match (&session.status, &session.outbound) {
            (ConnectionStatus::Connected, Some(outbound)) => Ok(outbound.clone()),
            _ => Err(SyncError::NotConnected),
        }
    }

    fn set_status(
        &self,
        session: &mut Session,
        status: ConnectionStatus,
        transitions: &mut Transitions,
    ) {
        session.status = status;
        self.inner.status_tx.send_replace(status);
        transitions.push(status);
    }

    fn publish(&self, transitions: Transitions) {
        for status in transitions {
            tracing::debug!("Connection status: {}", status);
            self.inner.status_listeners.emit(&status);
        }
    }
}

fn close_frame(reason: &'static str) -> Message {
    Message::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: reason.into(),
    }))
}

/// Drains the outbound queue into the socket. A close frame ends the task.
async fn write_frames(mut sink: FrameSink, mut rx: mpsc::UnboundedReceiver<Message>) {
    while let Some(message) = rx.recv().await {
        let closing = matches!(message, Message::Close(_));
        if let Err(e) = sink.send(message).await {
            tracing::debug!("Failed to write frame: {}", e);
            break;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
}
