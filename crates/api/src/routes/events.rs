//! Server-sent change notifications for one family

use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::Router;
use futures::stream::{self, Stream};
use hearthsync_common::redact_identifier;
use hearthsync_domain::constants::CHANGE_EVENT_NAME;
use hearthsync_domain::ChangeNotification;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::broadcast::Receiver;
use tracing::{debug, warn};
use uuid::Uuid;

use super::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/families/{family_id}/events", get(family_events))
}

/// GET /families/{family_id}/events
async fn family_events(
    State(context): State<AppState>,
    Path(family_id): Path<Uuid>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    debug!(family = %redact_identifier(&family_id.to_string()), "change stream opened");
    let receiver = context.notifications.subscribe(family_id);
    Sse::new(notification_stream(receiver))
        .keep_alive(KeepAlive::new().interval(Duration::from_secs(15)))
}

/// Ends when the family's channel closes; a lagging client skips ahead.
fn notification_stream(
    receiver: Receiver<ChangeNotification>,
) -> impl Stream<Item = Result<Event, axum::Error>> {
    stream::unfold(receiver, |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(notification) => {
                    let event = Event::default().event(CHANGE_EVENT_NAME).json_data(&notification);
                    return Some((event, receiver));
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "change stream subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    })
}
