//! Socket transport seam.
//!
//! The connection manager only sees a boxed frame sink and frame stream, so
//! the real tokio-tungstenite connector can be swapped for an in-memory one.

use std::pin::Pin;

use futures::future::BoxFuture;
use futures::{FutureExt, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::connect_async;

use super::error::SyncError;

pub type FrameSink = Pin<Box<dyn Sink<Message, Error = SyncError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Message, SyncError>> + Send>>;

/// Opens one socket to the given URL and completes the WebSocket handshake.
pub trait Connector: Send + Sync + 'static {
    fn connect(&self, url: String) -> BoxFuture<'static, Result<(FrameSink, FrameStream), SyncError>>;
}

/// Connector backed by `tokio_tungstenite::connect_async`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn connect(&self, url: String) -> BoxFuture<'static, Result<(FrameSink, FrameStream), SyncError>> {
        async move {
            let (ws_stream, _) = connect_async(url).await.map_err(|e| match e {
                tungstenite::Error::Http(resp) => SyncError::ConnectionFailed(format!(
                    "server rejected handshake with status {}",
                    resp.status()
                )),
                other => SyncError::ConnectionFailed(other.to_string()),
            })?;

            let (sender, receiver) = ws_stream.split();
            let sink: FrameSink =
                Box::pin(sender.sink_map_err(|e| SyncError::WebSocket(e.to_string())));
            let stream: FrameStream =
                Box::pin(receiver.map(|r| r.map_err(|e| SyncError::WebSocket(e.to_string()))));
            Ok((sink, stream))
        }
        .boxed()
    }
}

fn ws_base(server_url: &str) -> String {
    // Convert http(s) to ws(s) if needed
    let base_url = if let Some(rest) = server_url.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if let Some(rest) = server_url.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if !server_url.starts_with("ws://") && !server_url.starts_with("wss://") {
        format!("ws://{}", server_url)
    } else {
        server_url.to_string()
    };
    base_url.trim_end_matches('/').to_string()
}

/// Builds the socket URL for a presentation room. The credential travels as
/// the `token` query parameter.
pub fn build_ws_url(server_url: &str, presentation_id: &str, token: &str) -> String {
    format!(
        "{}/api/v1/ws/presentations/{}?token={}",
        ws_base(server_url),
        urlencoding::encode(presentation_id),
        urlencoding::encode(token)
    )
}

/// Builds an HTTP URL for a given path.
pub fn build_http_url(server_url: &str, path: &str) -> String {
    // Convert ws(s) to http(s) if needed
    let base_url = if let Some(rest) = server_url.strip_prefix("ws://") {
        format!("http://{}", rest)
    } else if let Some(rest) = server_url.strip_prefix("wss://") {
        format!("https://{}", rest)
    } else if !server_url.starts_with("http://") && !server_url.starts_with("https://") {
        format!("http://{}", server_url)
    } else {
        server_url.to_string()
    };

    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Strips the query string so credentials never reach the logs.
pub fn redact_url(url: &str) -> &str {
    url.split('?').next().unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_ws_url() {
        assert_eq!(
            build_ws_url("ws://localhost:8080", "d1", "test-key"),
            "ws://localhost:8080/api/v1/ws/presentations/d1?token=test-key"
        );
        assert_eq!(
            build_ws_url("http://localhost:8080/", "d1", "test-key"),
            "ws://localhost:8080/api/v1/ws/presentations/d1?token=test-key"
        );
        assert_eq!(
            build_ws_url("https://sync.example.com", "d1", "test-key"),
            "wss://sync.example.com/api/v1/ws/presentations/d1?token=test-key"
        );
        assert_eq!(
            build_ws_url("localhost:8080", "d1", "test-key"),
            "ws://localhost:8080/api/v1/ws/presentations/d1?token=test-key"
        );
    }

    #[test]
    fn test_build_ws_url_encodes_token() {
        let url = build_ws_url("ws://h", "d1", "a b/c=");
        assert!(url.ends_with("?token=a%20b%2Fc%3D"));
    }

    #[test]
    fn test_build_http_url() {
        assert_eq!(
            build_http_url("http://localhost:8080", "/health"),
            "http://localhost:8080/health"
        );
        assert_eq!(
            build_http_url("ws://localhost:8080", "/health"),
            "http://localhost:8080/health"
        );
        assert_eq!(
            build_http_url("wss://sync.example.com", "/health"),
            "https://sync.example.com/health"
        );
        assert_eq!(
            build_http_url("sync.example.com", "/health"),
            "http://sync.example.com/health"
        );
    }

    #[test]
    fn test_redact_url() {
        assert_eq!(
            redact_url("ws://h/api/v1/ws/presentations/d1?token=secret"),
            "ws://h/api/v1/ws/presentations/d1"
        );
        assert_eq!(redact_url("ws://h"), "ws://h");
    }
}
