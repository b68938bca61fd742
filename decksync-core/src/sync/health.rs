//! Server reachability probe.

use std::time::Duration;

use serde::Deserialize;

use super::error::SyncError;
use super::transport::build_http_url;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

/// Body of the server's `GET /health` response.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Fetches `/health` from the sync server.
pub async fn server_health(server_url: &str) -> Result<HealthStatus, SyncError> {
    let http_url = build_http_url(server_url, "/health");
    let client = reqwest::Client::builder()
        .timeout(HEALTH_TIMEOUT)
        .build()
        .map_err(|e| SyncError::Http(e.to_string()))?;

    let response = client
        .get(&http_url)
        .send()
        .await
        .map_err(|e| SyncError::Http(e.to_string()))?;

    if !response.status().is_success() {
        return Err(SyncError::Http(format!(
            "Server returned status {}",
            response.status()
        )));
    }

    response
        .json()
        .await
        .map_err(|e| SyncError::Http(e.to_string()))
}

/// Returns true if the server answers its health check.
pub async fn check_server(server_url: &str) -> bool {
    match server_health(server_url).await {
        Ok(health) => health.status == "ok",
        Err(e) => {
            tracing::debug!("Health check failed: {}", e);
            false
        }
    }
}
