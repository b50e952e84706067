//! Family-scoped change notifications after a sync

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hearthsync_common::redact_identifier;
use hearthsync_domain::{ChangeNotification, Result, SyncOutcome};
use tracing::{debug, warn};
use uuid::Uuid;

/// Publish-to-group transport (websocket hub, SSE fan-out, message bus).
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn publish_to_family(
        &self,
        family_id: Uuid,
        notification: &ChangeNotification,
    ) -> Result<()>;
}

/// At-most-once publisher: one attempt, bounded by a timeout, never retried.
pub struct ChangeNotifier {
    transport: Arc<dyn NotificationTransport>,
    publish_timeout: Duration,
}

impl ChangeNotifier {
    pub fn new(transport: Arc<dyn NotificationTransport>, publish_timeout: Duration) -> Self {
        Self { transport, publish_timeout }
    }

    /// Returns whether a message was delivered to the transport.
    pub async fn notify(&self, family_id: Uuid, outcome: &SyncOutcome) -> bool {
        if !outcome.success || !outcome.has_changes() {
            return false;
        }

        let notification = ChangeNotification::from_outcome(family_id, outcome);
        match tokio::time::timeout(
            self.publish_timeout,
            self.transport.publish_to_family(family_id, &notification),
        )
        .await
        {
            Ok(Ok(())) => {
                debug!(
                    family = %redact_identifier(&family_id.to_string()),
                    connection_id = %outcome.connection_id,
                    changes = outcome.total_changes(),
                    "published calendar change"
                );
                true
            }
            Ok(Err(err)) => {
                warn!(
                    family = %redact_identifier(&family_id.to_string()),
                    error = %err,
                    "change notification failed; dropping"
                );
                false
            }
            Err(_) => {
                warn!(
                    family = %redact_identifier(&family_id.to_string()),
                    timeout_ms = self.publish_timeout.as_millis(),
                    "change notification timed out; dropping"
                );
                false
            }
        }
    }
}

impl std::fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeNotifier").field("publish_timeout", &self.publish_timeout).finish()
    }
}
