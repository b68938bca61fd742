//! Presentation subscription: the entry point for application code.
//!
//! Wires one [`ConnectionManager`] to a [`DocumentCache`]. Inbound messages
//! are folded into the cache through the reducer, presence messages replace
//! the active-users roster, and mutations go out through send-and-await
//! helpers.
//!
//! ```ignore
//! let manager = ConnectionManager::new(ConnectionConfig::new(url), token);
//! let subscription = PresentationSubscription::new(manager, DocumentCache::new());
//! subscription.attach("deck-id").await?;
//! let ack = subscription.update_slide("s1", &SlidePatch::default().title("Intro"), 3).await?;
//! ```

use std::sync::Arc;

use parking_lot::Mutex;

use super::cache::{CacheUpdate, DocumentCache};
use super::codec::{presentation_patch_to_wire, slide_patch_to_wire, slide_to_wire};
use super::connection::{ConnectionManager, ConnectionStatus, InboundMessage};
use super::error::SyncError;
use super::ledger::Ack;
use super::listeners::Subscription;
use super::protocol::{ClientMessage, SlideOrder};
use super::reducer::reduce;
use crate::models::{ActiveUser, Presentation, PresentationPatch, Slide, SlidePatch};

#[derive(Default)]
struct SubscriptionState {
    /// The presentation the consumer currently wants to be attached to.
    intended: Option<String>,
    active_users: Vec<ActiveUser>,
    error: Option<String>,
}

pub struct PresentationSubscription {
    manager: ConnectionManager,
    cache: DocumentCache,
    state: Arc<Mutex<SubscriptionState>>,
    _messages: Subscription,
}

impl PresentationSubscription {
    pub fn new(manager: ConnectionManager, cache: DocumentCache) -> Self {
        let state = Arc::new(Mutex::new(SubscriptionState::default()));

        let message_state = state.clone();
        let message_cache = cache.clone();
        let messages = manager.on_inbound(move |inbound: &InboundMessage| {
            {
                let mut state = message_state.lock();
                if state.intended.as_deref() != Some(inbound.document_id.as_str()) {
                    return;
                }
                if let Some(users) = inbound.message.active_users() {
                    state.active_users = users.to_vec();
                }
            }
            message_cache.update(&inbound.document_id, |previous| {
                reduce(previous, &inbound.message)
            });
        });

        Self {
            manager,
            cache,
            state,
            _messages: messages,
        }
    }

    /// Attaches to `document_id`. Safe to call repeatedly; see
    /// [`ConnectionManager::attach`].
    pub async fn attach(&self, document_id: &str) -> Result<(), SyncError> {
        {
            let mut state = self.state.lock();
            if state.intended.as_deref() != Some(document_id) {
                state.active_users.clear();
            }
            state.intended = Some(document_id.to_string());
            state.error = None;
        }

        let result = self.manager.attach(document_id).await;
        if let Err(e) = &result {
            let mut state = self.state.lock();
            if state.intended.as_deref() == Some(document_id) {
                state.error = Some(e.to_string());
            }
        }
        result
    }

    /// Releases the current presentation. The socket is closed on the next
    /// scheduler turn unless an attach happens first, so a release followed
    /// immediately by a re-attach keeps the connection open.
    ///
    /// Must be called from within a tokio runtime.
    pub fn detach(&self) {
        let released = {
            let mut state = self.state.lock();
            state.active_users.clear();
            state.intended.take()
        };
        let Some(document_id) = released else {
            return;
        };

        let manager = self.manager.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            if state.lock().intended.is_none() {
                tracing::debug!("Releasing presentation {}", document_id);
                manager.detach();
            }
        });
    }

    /// Detaches right away, without the re-attach grace turn.
    pub fn detach_now(&self) {
        {
            let mut state = self.state.lock();
            state.active_users.clear();
            state.intended = None;
        }
        self.manager.detach();
    }

    pub fn manager(&self) -> &ConnectionManager {
        &self.manager
    }

    pub fn cache(&self) -> &DocumentCache {
        &self.cache
    }

    pub fn document_id(&self) -> Option<String> {
        self.state.lock().intended.clone()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.manager.status()
    }

    pub fn is_connected(&self) -> bool {
        self.status() == ConnectionStatus::Connected
    }

    /// True while a connect or reconnect is in progress.
    pub fn is_connecting(&self) -> bool {
        matches!(
            self.status(),
            ConnectionStatus::Connecting | ConnectionStatus::Reconnecting
        )
    }

    /// The last attach error, or the reason the connection gave up.
    pub fn error(&self) -> Option<String> {
        let attach_error = self.state.lock().error.clone();
        attach_error.or_else(|| {
            (self.status() == ConnectionStatus::Disconnected)
                .then(|| self.manager.last_error())
                .flatten()
        })
    }

    pub fn active_users(&self) -> Vec<ActiveUser> {
        self.state.lock().active_users.clone()
    }

    /// The cached presentation for the attached document.
    pub fn presentation(&self) -> Option<Arc<Presentation>> {
        let document_id = self.document_id()?;
        self.cache.get(&document_id)
    }

    /// Registers a callback for cache changes to the attached document.
    pub fn on_change<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&Arc<Presentation>) + Send + Sync + 'static,
    {
        let state = self.state.clone();
        self.cache.on_update(move |update: &CacheUpdate| {
            let attached = state.lock().intended.as_deref() == Some(update.document_id.as_str());
            if let (true, Some(presentation)) = (attached, &update.presentation) {
                callback(presentation);
            }
        })
    }

    pub async fn update_slide(
        &self,
        slide_id: &str,
        patch: &SlidePatch,
        base_version: u64,
    ) -> Result<Ack, SyncError> {
        let current = self.presentation();
        let changes = slide_patch_to_wire(patch, current.as_deref().and_then(|p| p.slide(slide_id)));
        self.manager
            .send(ClientMessage::SlideUpdate {
                slide_id: slide_id.to_string(),
                changes,
                base_version,
            })
            .await
    }

    /// Creates a slide. `slide.id` is sent as the temporary id; the ack's
    /// `server_id` carries the real one.
    pub async fn create_slide(&self, position: u32, slide: &Slide) -> Result<Ack, SyncError> {
        self.manager
            .send(ClientMessage::SlideCreate {
                position,
                slide_data: slide_to_wire(slide),
                temp_id: slide.id.clone(),
            })
            .await
    }

    pub async fn delete_slide(&self, slide_id: &str, base_version: u64) -> Result<Ack, SyncError> {
        self.manager
            .send(ClientMessage::SlideDelete {
                slide_id: slide_id.to_string(),
                base_version,
            })
            .await
    }

    pub async fn reorder_slides(&self, slide_orders: Vec<SlideOrder>) -> Result<Ack, SyncError> {
        self.manager
            .send(ClientMessage::SlideReorder { slide_orders })
            .await
    }

    pub async fn update_presentation(
        &self,
        patch: &PresentationPatch,
        base_version: u64,
    ) -> Result<Ack, SyncError> {
        self.manager
            .send(ClientMessage::PresentationUpdate {
                changes: presentation_patch_to_wire(patch),
                base_version,
            })
            .await
    }

    pub fn move_cursor(&self, slide_id: Option<&str>, x: f64, y: f64) -> Result<(), SyncError> {
        self.manager.send_no_ack(ClientMessage::CursorMove {
            slide_id: slide_id.map(String::from),
            x,
            y,
        })
    }

    pub fn change_selection(
        &self,
        slide_id: Option<&str>,
        element_id: Option<&str>,
    ) -> Result<(), SyncError> {
        self.manager.send_no_ack(ClientMessage::SelectionChange {
            slide_id: slide_id.map(String::from),
            element_id: element_id.map(String::from),
        })
    }
}

impl Drop for PresentationSubscription {
    fn drop(&mut self) {
        if self.state.lock().intended.is_some() {
            self.manager.detach();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::connection::ConnectionConfig;
    use crate::sync::testing::{sync_state, MockConnector, MockSocket};
    use crate::sync::token::SharedToken;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn subscription(connector: &MockConnector) -> PresentationSubscription {
        let manager = ConnectionManager::with_connector(
            ConnectionConfig::new("ws://sync.test"),
            Arc::new(SharedToken::new(Some("t".into()))),
            Arc::new(connector.clone()),
        );
        PresentationSubscription::new(manager, DocumentCache::new())
    }

    async fn wait_for(sub: &PresentationSubscription, status: ConnectionStatus) {
        let mut rx = sub.manager().watch_status();
        rx.wait_for(|s| *s == status).await.unwrap();
    }

    /// Waits until the cache for the attached deck satisfies `check`.
    async fn settle<F>(sub: &PresentationSubscription, check: F) -> Arc<Presentation>
    where
        F: Fn(&Presentation) -> bool,
    {
        loop {
            if let Some(p) = sub.presentation() {
                if check(&p) {
                    return p;
                }
            }
            tokio::task::yield_now().await;
        }
    }

    async fn attach(sub: &PresentationSubscription, sockets: &mut mpsc::UnboundedReceiver<MockSocket>) -> MockSocket {
        sub.attach("d1").await.unwrap();
        let socket = sockets.recv().await.unwrap();
        socket.send_json(sync_state("d1", &["s1", "s2"], 3));
        settle(sub, |p| p.version == 3).await;
        socket
    }

    #[tokio::test]
    async fn test_full_state_populates_cache_and_roster() {
        let (connector, mut sockets) = MockConnector::new();
        let sub = subscription(&connector);
        let _socket = attach(&sub, &mut sockets).await;

        assert!(sub.is_connected());
        assert!(!sub.is_connecting());
        let deck = sub.presentation().unwrap();
        assert_eq!(deck.slide_ids(), vec!["s1", "s2"]);
        assert_eq!(sub.active_users().len(), 1);
        assert_eq!(sub.active_users()[0].user_id, "u1");
    }

    #[tokio::test]
    async fn test_presence_replaces_roster_wholesale() {
        let (connector, mut sockets) = MockConnector::new();
        let sub = subscription(&connector);
        let socket = attach(&sub, &mut sockets).await;

        socket.send_json(json!({
            "type": "user:joined",
            "user": {"user_id": "u2"},
            "active_users": [{"user_id": "u2"}, {"user_id": "u3"}]
        }));
        socket.send_json(json!({"type": "slide:delete", "slide_id": "s2"}));
        settle(&sub, |p| p.slides.len() == 1).await;

        let ids: Vec<String> = sub.active_users().into_iter().map(|u| u.user_id).collect();
        assert_eq!(ids, vec!["u2", "u3"]);
    }

    #[tokio::test]
    async fn test_update_keeps_cached_image() {
        let (connector, mut sockets) = MockConnector::new();
        let sub = subscription(&connector);
        let socket = attach(&sub, &mut sockets).await;

        socket.send_json(json!({
            "type": "image:completed",
            "slide_id": "s1",
            "image_url": "http://img/a.png"
        }));
        socket.send_json(json!({
            "type": "slide:update",
            "slide_id": "s1",
            "changes": {"title": "New"},
            "version": 2
        }));

        let deck = settle(&sub, |p| p.slides[0].title == "New").await;
        assert_eq!(deck.slides[0].image_url.as_deref(), Some("http://img/a.png"));
    }

    #[tokio::test]
    async fn test_update_slide_sends_envelope_and_resolves() {
        let (connector, mut sockets) = MockConnector::new();
        let sub = subscription(&connector);
        let mut socket = attach(&sub, &mut sockets).await;

        let patch = SlidePatch::default().title("Intro");
        let (ack, _) = tokio::join!(
            sub.update_slide("s1", &patch, 1),
            async {
                let frame = socket.next_json().await;
                assert_eq!(frame["type"], "slide:update");
                assert_eq!(frame["slide_id"], "s1");
                assert_eq!(frame["changes"], json!({"title": "Intro"}));
                socket.send_json(json!({
                    "type": "sync:ack",
                    "original_message_id": frame["message_id"],
                    "new_version": 2
                }));
            }
        );
        assert_eq!(ack.unwrap().new_version, Some(2));
    }

    #[tokio::test]
    async fn test_create_slide_reports_server_id() {
        let (connector, mut sockets) = MockConnector::new();
        let sub = subscription(&connector);
        let mut socket = attach(&sub, &mut sockets).await;

        let draft = Slide::new("tmp-1", "Draft");
        let (ack, _) = tokio::join!(sub.create_slide(1, &draft), async {
            let frame = socket.next_json().await;
            assert_eq!(frame["type"], "slide:create");
            assert_eq!(frame["temp_id"], "tmp-1");
            assert_eq!(frame["position"], 1);
            assert_eq!(frame["slide_data"]["title"], "Draft");
            socket.send_json(json!({
                "type": "sync:ack",
                "original_message_id": frame["message_id"],
                "server_id": "s9"
            }));
        });
        assert_eq!(ack.unwrap().server_id.as_deref(), Some("s9"));
    }

    #[tokio::test]
    async fn test_cursor_and_selection_are_fire_and_forget() {
        let (connector, mut sockets) = MockConnector::new();
        let sub = subscription(&connector);
        let mut socket = attach(&sub, &mut sockets).await;

        sub.move_cursor(Some("s1"), 0.5, 0.25).unwrap();
        sub.change_selection(Some("s1"), None).unwrap();

        let cursor = socket.next_json().await;
        assert_eq!(cursor["type"], "cursor:move");
        assert_eq!(cursor["x"], 0.5);
        let selection = socket.next_json().await;
        assert_eq!(selection["type"], "selection:change");
        assert!(selection["element_id"].is_null());
        assert_eq!(sub.manager().pending_operations(), 0);
    }

    #[tokio::test]
    async fn test_detach_then_reattach_same_tick_keeps_socket() {
        let (connector, mut sockets) = MockConnector::new();
        let sub = subscription(&connector);
        let _socket = attach(&sub, &mut sockets).await;

        sub.detach();
        sub.attach("d1").await.unwrap();
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }

        assert!(sub.is_connected());
        assert_eq!(connector.attempt_count(), 1);
    }

    #[tokio::test]
    async fn test_detach_closes_after_grace_turn() {
        let (connector, mut sockets) = MockConnector::new();
        let sub = subscription(&connector);
        let _socket = attach(&sub, &mut sockets).await;

        sub.detach();
        wait_for(&sub, ConnectionStatus::Disconnected).await;
        assert!(sub.active_users().is_empty());
        assert!(sub.presentation().is_none());
    }

    #[tokio::test]
    async fn test_frames_for_a_replaced_deck_stay_out_of_the_new_one() {
        let (connector, mut sockets) = MockConnector::new();
        let sub = subscription(&connector);
        let socket = attach(&sub, &mut sockets).await;

        // An attach to d2 has started but the d1 socket is still open.
        sub.state.lock().intended = Some("d2".into());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let _seen = sub.manager().on_message(move |m| {
            let _ = tx.send(m.kind());
        });
        socket.send_json(json!({
            "type": "user:joined",
            "active_users": [{"user_id": "u9"}]
        }));
        socket.send_json(sync_state("d1", &["x1"], 8));
        assert_eq!(rx.recv().await, Some("user:joined"));
        assert_eq!(rx.recv().await, Some("sync:state"));

        assert!(sub.cache().get("d2").is_none());
        assert_eq!(sub.cache().get("d1").unwrap().slide_ids(), vec!["s1", "s2"]);
        assert_eq!(sub.active_users()[0].user_id, "u1");
    }

    #[tokio::test]
    async fn test_status_reads_the_connection() {
        let (connector, mut sockets) = MockConnector::new();
        let sub = subscription(&connector);
        assert_eq!(sub.status(), ConnectionStatus::Disconnected);

        let _socket = attach(&sub, &mut sockets).await;
        assert_eq!(sub.status(), sub.manager().status());
        assert!(sub.is_connected());

        sub.detach_now();
        assert_eq!(sub.status(), ConnectionStatus::Disconnected);
        assert!(!sub.is_connected());
    }

    #[tokio::test]
    async fn test_attach_error_is_projected() {
        let (connector, _sockets) = MockConnector::new();
        connector.refuse_all(true);
        let sub = subscription(&connector);

        assert!(sub.attach("d1").await.is_err());
        assert!(sub.error().unwrap().contains("connection refused"));
        assert_eq!(sub.status(), ConnectionStatus::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_receives_fresh_full_state() {
        let (connector, mut sockets) = MockConnector::new();
        let sub = subscription(&connector);
        let mut socket = attach(&sub, &mut sockets).await;

        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let _watch = sub.manager().on_status_change(move |s| recorder.lock().push(s));

        socket.close(1006);
        let second = sockets.recv().await.unwrap();
        wait_for(&sub, ConnectionStatus::Connected).await;
        second.send_json(sync_state("d1", &["s3"], 7));

        let deck = settle(&sub, |p| p.version == 7).await;
        assert_eq!(deck.slide_ids(), vec!["s3"]);
        assert_eq!(
            seen.lock()[..2],
            [ConnectionStatus::Connected, ConnectionStatus::Reconnecting]
        );
    }

    #[tokio::test]
    async fn test_on_change_fires_for_attached_document() {
        let (connector, mut sockets) = MockConnector::new();
        let sub = subscription(&connector);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let _sub = sub.on_change(move |p| {
            let _ = tx.send(p.version);
        });

        let _socket = attach(&sub, &mut sockets).await;
        assert_eq!(rx.recv().await, Some(3));
    }
}
