//! Sync invalidation channel: decoding server push frames.
//!
//! The server pushes one JSON text frame per change to a list:
//!
//! ```json
//! {"type": "item_checked", "list_id": 7, "timestamp": "2026-01-01T00:00:00Z", "data": {}}
//! ```
//!
//! Frames carry no state worth applying locally; each one only says which
//! keys are stale. Item events invalidate the list's items. Category events
//! and unrecognised events also invalidate its categories, since a category
//! change re-groups items.
//!
//! The server also sends `{"type": "ping"}` keep-alives, answered with
//! `{"type": "pong"}`.

use std::sync::Arc;

use larder_types::{CollectionKey, EntityId};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::cache::QueryCache;

/// Known list event types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum ListEventType {
    ItemCreated,
    ItemUpdated,
    ItemDeleted,
    ItemChecked,
    ItemUnchecked,
    ItemsBulkDeleted,
    CategoryCreated,
    CategoryUpdated,
    CategoryDeleted,
}

impl ListEventType {
    pub fn is_category_event(&self) -> bool {
        matches!(
            self,
            ListEventType::CategoryCreated | ListEventType::CategoryUpdated | ListEventType::CategoryDeleted
        )
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EventKind {
    Known(ListEventType),
    /// A type this client does not recognise. Still invalidates.
    Unknown(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ListEvent {
    pub kind: EventKind,
    pub list_id: EntityId,
    pub timestamp: Option<String>,
    pub data: serde_json::Value,
}

impl ListEvent {
    /// Keys made stale by this event.
    pub fn invalidates(&self) -> Vec<CollectionKey> {
        match &self.kind {
            EventKind::Known(event) if !event.is_category_event() => {
                vec![CollectionKey::items(self.list_id)]
            }
            _ => list_keys(self.list_id).to_vec(),
        }
    }
}

/// A decoded push frame.
#[derive(Clone, Debug, PartialEq)]
pub enum SyncMessage {
    Ping,
    Pong,
    Event(ListEvent),
    /// Unrecognised type with no list scope; nothing to invalidate.
    Unscoped(String),
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    list_id: Option<i64>,
    #[serde(default)]
    timestamp: Option<String>,
    #[serde(default)]
    data: serde_json::Value,
}

impl SyncMessage {
    pub fn decode(text: &str) -> Result<Self, SyncError> {
        let raw: RawFrame = serde_json::from_str(text)?;
        let message = match (raw.kind.as_str(), raw.list_id) {
            ("ping", _) => SyncMessage::Ping,
            ("pong", _) => SyncMessage::Pong,
            (_, Some(list_id)) => {
                let kind = match raw.kind.parse::<ListEventType>() {
                    Ok(event) => EventKind::Known(event),
                    Err(_) => EventKind::Unknown(raw.kind),
                };
                SyncMessage::Event(ListEvent {
                    kind,
                    list_id: EntityId::new(list_id),
                    timestamp: raw.timestamp,
                    data: raw.data,
                })
            }
            (_, None) => SyncMessage::Unscoped(raw.kind),
        };
        Ok(message)
    }

    /// The keep-alive reply frame.
    pub fn pong_frame() -> String {
        serde_json::json!({ "type": "pong" }).to_string()
    }
}

/// Every key scoped to a list.
pub fn list_keys(list_id: EntityId) -> [CollectionKey; 2] {
    [CollectionKey::categories(list_id), CollectionKey::items(list_id)]
}

/// What handling one frame did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Invalidated(Vec<CollectionKey>),
    /// Send this frame back to the server.
    Reply(String),
    Ignored,
    /// Could not be decoded; logged and dropped.
    Dropped,
}

/// Turns incoming frames into cache invalidations.
#[derive(Clone)]
pub struct SyncListener {
    cache: Arc<dyn QueryCache>,
}

impl SyncListener {
    pub fn new(cache: Arc<dyn QueryCache>) -> Self {
        Self { cache }
    }

    pub fn handle_frame(&self, text: &str) -> FrameOutcome {
        let message = match SyncMessage::decode(text) {
            Ok(message) => message,
            Err(error) => {
                warn!(%error, "dropping malformed sync frame");
                return FrameOutcome::Dropped;
            }
        };

        match message {
            SyncMessage::Ping => FrameOutcome::Reply(SyncMessage::pong_frame()),
            SyncMessage::Pong => FrameOutcome::Ignored,
            SyncMessage::Unscoped(kind) => {
                debug!(%kind, "ignoring unscoped sync frame");
                FrameOutcome::Ignored
            }
            SyncMessage::Event(event) => {
                let keys = event.invalidates();
                trace!(kind = ?event.kind, list = %event.list_id, "sync event");
                self.invalidate_all(&keys);
                FrameOutcome::Invalidated(keys)
            }
        }
    }

    /// Invalidate everything scoped to `list_id` (used after (re)connecting).
    pub fn invalidate_list(&self, list_id: EntityId) {
        self.invalidate_all(&list_keys(list_id));
    }

    fn invalidate_all(&self, keys: &[CollectionKey]) {
        for key in keys {
            self.cache.invalidate(key);
        }
    }
}
