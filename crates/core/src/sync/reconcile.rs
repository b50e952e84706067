//! Reconciliation of a fetched remote event set against the local mirror
//!
//! Pure computation: the caller fetches, this module decides, the caller
//! persists. Identity is always the provider `external_id`; titles and times
//! are never used to match events.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use hearthsync_domain::{CalendarConnection, EventContent, MirroredEvent, RemoteEvent};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

/// Stable hash over the fields that make an event "changed".
pub fn content_hash(content: EventContent<'_>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(content.title.as_bytes());
    hasher.update(&[0x1f]);
    hasher.update(content.start_time.to_rfc3339().as_bytes());
    hasher.update(&[0x1f]);
    hasher.update(content.end_time.to_rfc3339().as_bytes());
    hasher.update(&[0x1f, u8::from(content.is_all_day), 0x1f]);
    if let Some(location) = content.location {
        hasher.update(location.as_bytes());
    }
    hex::encode(hasher.finalize().as_bytes())
}

/// Writes needed to bring the mirror in line with the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventChangeSet {
    pub inserts: Vec<MirroredEvent>,
    /// Full replacement rows, matched by `id`.
    pub updates: Vec<MirroredEvent>,
    /// Rows removed outright.
    pub deletes: Vec<Uuid>,
    /// Rows kept but flagged `deleted_locally`.
    pub tombstones: Vec<Uuid>,
}

impl EventChangeSet {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty()
            && self.updates.is_empty()
            && self.deletes.is_empty()
            && self.tombstones.is_empty()
    }
}

/// Counts reported in the sync outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileCounts {
    pub added: u32,
    pub updated: u32,
    pub deleted: u32,
}

/// Output of one reconciliation pass.
#[derive(Debug, Clone, Default)]
pub struct ReconcilePlan {
    pub changes: EventChangeSet,
    pub counts: ReconcileCounts,
    /// Rows to create at the provider when two-way sync is on: local rows
    /// without an external id, and tombstones still carrying local edits.
    pub pending_push: Vec<MirroredEvent>,
    /// Remote events dropped by window or import filters.
    pub filtered_out: usize,
}

/// Diffs remote events against stored rows for one connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconciliationEngine;

impl ReconciliationEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn reconcile(
        &self,
        connection: &CalendarConnection,
        remote: &[RemoteEvent],
        existing: &[MirroredEvent],
        now: DateTime<Utc>,
    ) -> ReconcilePlan {
        let settings = &connection.sync_settings;
        let window = settings.window(now);
        let mut plan = ReconcilePlan::default();

        // First occurrence wins when a provider repeats an id.
        let mut accepted: Vec<&RemoteEvent> = Vec::with_capacity(remote.len());
        let mut seen: HashSet<&str> = HashSet::with_capacity(remote.len());
        for event in remote {
            let keep = window.overlaps(event.start_time, event.end_time)
                && (settings.import_declined_events || !event.is_declined)
                && (settings.import_all_day_events || !event.is_all_day);
            if !keep {
                plan.filtered_out += 1;
                continue;
            }
            if !seen.insert(event.external_id.as_str()) {
                debug!(external_id = %event.external_id, "duplicate remote event ignored");
                continue;
            }
            accepted.push(event);
        }

        let by_external_id: HashMap<&str, &MirroredEvent> = existing
            .iter()
            .filter_map(|row| row.external_id.as_deref().map(|id| (id, row)))
            .collect();

        for event in &accepted {
            let hash = content_hash(event.content());
            match by_external_id.get(event.external_id.as_str()) {
                None => {
                    plan.changes.inserts.push(new_row(connection, event, hash, now));
                    plan.counts.added += 1;
                }
                Some(row) if row.content_hash != hash || row.deleted_locally => {
                    plan.changes.updates.push(updated_row(row, event, hash, now));
                    plan.counts.updated += 1;
                }
                Some(_) => {}
            }
        }

        for row in existing {
            let Some(external_id) = row.external_id.as_deref() else {
                if connection.pushes_local_events() && !row.deleted_locally {
                    plan.pending_push.push(row.clone());
                }
                continue;
            };
            if seen.contains(external_id) {
                continue;
            }
            if row.deleted_locally {
                // Tombstoned on an earlier pass and already counted.
                if connection.pushes_local_events() && row.locally_modified {
                    plan.pending_push.push(row.clone());
                } else {
                    plan.changes.deletes.push(row.id);
                }
                continue;
            }
            if settings.two_way_sync && row.locally_modified {
                plan.changes.tombstones.push(row.id);
            } else {
                plan.changes.deletes.push(row.id);
            }
            plan.counts.deleted += 1;
        }

        plan
    }
}

fn new_row(
    connection: &CalendarConnection,
    event: &RemoteEvent,
    content_hash: String,
    now: DateTime<Utc>,
) -> MirroredEvent {
    MirroredEvent {
        id: Uuid::now_v7(),
        connection_id: connection.id,
        external_id: Some(event.external_id.clone()),
        title: event.title.clone(),
        start_time: event.start_time,
        end_time: event.end_time,
        is_all_day: event.is_all_day,
        location: event.location.clone(),
        assignee_ids: connection.assigned_member_ids.clone(),
        color: event.color.clone().or_else(|| connection.color.clone()),
        content_hash,
        deleted_locally: false,
        locally_modified: false,
        updated_at: now,
    }
}

/// Remote wins: provider fields overwrite the row and pending local edits
/// are dropped.
fn updated_row(
    row: &MirroredEvent,
    event: &RemoteEvent,
    content_hash: String,
    now: DateTime<Utc>,
) -> MirroredEvent {
    MirroredEvent {
        title: event.title.clone(),
        start_time: event.start_time,
        end_time: event.end_time,
        is_all_day: event.is_all_day,
        location: event.location.clone(),
        color: event.color.clone().or_else(|| row.color.clone()),
        content_hash,
        deleted_locally: false,
        locally_modified: false,
        updated_at: now,
        ..row.clone()
    }
}
