//! Router and shared state.

use std::sync::Arc;

use axum::{routing::get, Json, Router};
use serde::Serialize;
use tokio::sync::RwLock;
use tower_http::trace::TraceLayer;

use super::auth::TokenStore;
use super::hub::RoomHub;
use super::store::PresentationStore;
use super::ws::presentation_socket;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub tokens: Arc<TokenStore>,
    pub store: Arc<RwLock<PresentationStore>>,
    pub hub: Arc<RoomHub>,
}

impl AppState {
    pub fn new(tokens: TokenStore) -> Self {
        Self {
            tokens: Arc::new(tokens),
            store: Arc::new(RwLock::new(PresentationStore::new())),
            hub: Arc::new(RoomHub::new()),
        }
    }
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required)
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route(
            "/api/v1/ws/presentations/{presentation_id}",
            get(presentation_socket),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
