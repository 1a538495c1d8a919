//! One-shot messages carried across a redirect.

use tower_sessions::Session;

use crate::models::session::{Flash, keys};

/// Queue a message for the next rendered page.
///
/// Failures are logged and otherwise ignored.
pub async fn push_flash(session: &Session, flash: Flash) {
    let mut pending: Vec<Flash> = session.get(keys::FLASH).await.ok().flatten().unwrap_or_default();
    pending.push(flash);
    if let Err(e) = session.insert(keys::FLASH, pending).await {
        tracing::warn!(error = %e, "Failed to store flash message");
    }
}

/// Take every queued message, leaving none behind.
pub async fn take_flashes(session: &Session) -> Vec<Flash> {
    session
        .remove::<Vec<Flash>>(keys::FLASH)
        .await
        .ok()
        .flatten()
        .unwrap_or_default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use tower_sessions::MemoryStore;

    use super::*;

    #[tokio::test]
    async fn test_flashes_are_shown_once_in_order() {
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);
        push_flash(&session, Flash::info("Added to cart")).await;
        push_flash(&session, Flash::error("Out of stock")).await;

        let shown = take_flashes(&session).await;
        assert_eq!(
            shown,
            vec![Flash::info("Added to cart"), Flash::error("Out of stock")]
        );
        assert!(take_flashes(&session).await.is_empty());
    }
}
