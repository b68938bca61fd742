//! DeckSync Server
//!
//! Keeps presentations in memory and relays edits, presence and cursor
//! traffic between connected clients.
//!
//! # Configuration
//!
//! Environment variables:
//! - `DECKSYNC_PORT`: Port to listen on (default: 8080)
//! - `DECKSYNC_CONFIG`: Path to config file (default: ~/.config/decksync-server/config.yaml)
//!
//! # Endpoints
//!
//! - `GET /health`: Health check endpoint (no auth required)
//! - `GET /api/v1/ws/presentations/{id}?token=...`: Presentation socket

use std::net::SocketAddr;

use decksync::server::{router, AppState, ServerConfig, TokenStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "decksync=info,decksync_server=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();
    tracing::info!("Config file: {}", config.config_path.display());

    let tokens = TokenStore::load(&config.config_path);
    let app = router(AppState::new(tokens));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Starting server on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
