//! Opening a live presentation session for one command.

use std::sync::Arc;
use std::time::Duration;

use decksync_core::{
    ConnectionManager, DocumentCache, Presentation, PresentationSubscription, SharedToken,
};
use tokio::sync::Notify;

use super::CommandError;
use crate::config::Config;

/// Time given to the writer task to flush queued frames before the runtime
/// shuts down.
const FLUSH_GRACE: Duration = Duration::from_millis(100);

pub fn runtime() -> Result<tokio::runtime::Runtime, CommandError> {
    tokio::runtime::Runtime::new().map_err(|e| CommandError::RuntimeError(e.to_string()))
}

/// Attaches to `presentation_id` and waits for its first full state.
pub async fn open(
    config: &Config,
    presentation_id: &str,
) -> Result<PresentationSubscription, CommandError> {
    let token = config
        .token
        .value
        .clone()
        .ok_or(CommandError::NotConfigured("token"))?;
    let connection = config.connection_config();
    let state_timeout = connection.handshake_timeout;

    let manager = ConnectionManager::new(connection, SharedToken::new(Some(token)));
    let subscription = PresentationSubscription::new(manager, DocumentCache::new());

    let loaded = Arc::new(Notify::new());
    let notify = loaded.clone();
    let _listener = subscription.on_change(move |_| notify.notify_one());

    tracing::debug!("Attaching to {}", presentation_id);
    subscription.attach(presentation_id).await?;

    if subscription.presentation().is_none() {
        tokio::time::timeout(state_timeout, loaded.notified())
            .await
            .map_err(|_| CommandError::Timeout("the presentation state"))?;
    }
    Ok(subscription)
}

/// Detaches and lets the close frame go out.
pub async fn close(subscription: PresentationSubscription) {
    subscription.detach_now();
    tokio::time::sleep(FLUSH_GRACE).await;
}

pub fn current(subscription: &PresentationSubscription) -> Result<Arc<Presentation>, CommandError> {
    subscription
        .presentation()
        .ok_or(CommandError::Timeout("the presentation state"))
}

/// Version to send as `base_version`: the explicit value, or the version of
/// the slide in the freshly synced state.
pub fn slide_base_version(
    presentation: &Presentation,
    slide_id: &str,
    explicit: Option<u64>,
) -> Result<u64, CommandError> {
    if let Some(version) = explicit {
        return Ok(version);
    }
    presentation
        .slide(slide_id)
        .map(|slide| slide.version.unwrap_or(1))
        .ok_or_else(|| CommandError::InvalidArgument(format!("Slide '{}' not found", slide_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use decksync_core::Slide;

    fn deck() -> Presentation {
        Presentation::new("d1", "Deck").with_slides(vec![
            Slide::new("s1", "One").with_version(4),
            Slide::new("s2", "Two"),
        ])
    }

    #[test]
    fn test_base_version_from_state() {
        assert_eq!(slide_base_version(&deck(), "s1", None).unwrap(), 4);
        assert_eq!(slide_base_version(&deck(), "s2", None).unwrap(), 1);
    }

    #[test]
    fn test_explicit_base_version_wins() {
        assert_eq!(slide_base_version(&deck(), "s1", Some(2)).unwrap(), 2);
        assert_eq!(slide_base_version(&deck(), "missing", Some(2)).unwrap(), 2);
    }

    #[test]
    fn test_unknown_slide() {
        let err = slide_base_version(&deck(), "missing", None).unwrap_err();
        assert!(err.to_string().contains("missing"));
    }
}
