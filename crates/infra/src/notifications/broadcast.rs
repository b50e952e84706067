//! Per-family broadcast fan-out
//!
//! Every family with at least one subscriber owns a
//! [`tokio::sync::broadcast`] channel. Publishing to a family nobody listens
//! to is a no-op; slow subscribers lag and lose the oldest notifications.

use async_trait::async_trait;
use dashmap::DashMap;
use hearthsync_common::redact_identifier;
use hearthsync_core::NotificationTransport;
use hearthsync_domain::{ChangeNotification, NotifierConfig, Result};
use tokio::sync::broadcast;
use tracing::{debug, trace};
use uuid::Uuid;

#[derive(Debug)]
pub struct BroadcastTransport {
    channels: DashMap<Uuid, broadcast::Sender<ChangeNotification>>,
    capacity: usize,
}

impl BroadcastTransport {
    pub fn new(capacity: usize) -> Self {
        Self { channels: DashMap::new(), capacity: capacity.max(1) }
    }

    pub fn from_config(config: &NotifierConfig) -> Self {
        Self::new(config.channel_capacity)
    }

    /// Receive every notification published for `family_id` from now on.
    pub fn subscribe(&self, family_id: Uuid) -> broadcast::Receiver<ChangeNotification> {
        self.channels
            .entry(family_id)
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    pub fn subscriber_count(&self, family_id: Uuid) -> usize {
        self.channels.get(&family_id).map_or(0, |tx| tx.receiver_count())
    }
}

#[async_trait]
impl NotificationTransport for BroadcastTransport {
    async fn publish_to_family(
        &self,
        family_id: Uuid,
        notification: &ChangeNotification,
    ) -> Result<()> {
        let family = redact_identifier(&family_id.to_string());
        let Some(sender) = self.channels.get(&family_id).map(|tx| tx.clone()) else {
            trace!(%family, "no subscribers for family");
            return Ok(());
        };

        match sender.send(notification.clone()) {
            Ok(receivers) => {
                debug!(%family, receivers, "published change notification");
            }
            Err(_) => {
                // Every receiver hung up; drop the channel unless someone
                // subscribed again in the meantime.
                self.channels.remove_if(&family_id, |_, tx| tx.receiver_count() == 0);
                trace!(%family, "dropped idle family channel");
            }
        }
        Ok(())
    }
}
