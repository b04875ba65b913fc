//! Realtime channel messages.
//!
//! Serialized as `{"type": "...", "data": ...}` with the channel names clients
//! subscribe to (`item:moved`, `sessions:count`, ...).

use crate::domain::{Item, ItemId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity of a board-wide notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationLevel {
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub message: String,
    pub level: NotificationLevel,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    pub fn new(message: impl Into<String>, level: NotificationLevel) -> Self {
        Self {
            message: message.into(),
            level,
            timestamp: Utc::now(),
        }
    }
}

/// A message delivered to connected sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SyncMessage {
    #[serde(rename = "item:created")]
    ItemCreated(Item),

    #[serde(rename = "item:moved")]
    ItemMoved(Item),

    #[serde(rename = "item:updated")]
    ItemUpdated(Item),

    #[serde(rename = "item:deleted")]
    ItemDeleted { id: ItemId },

    /// Someone is editing an item; relayed, never stored
    #[serde(rename = "item:typing", rename_all = "camelCase")]
    ItemTyping { item_id: ItemId, username: String },

    #[serde(rename = "sessions:count")]
    SessionCount { n: usize },

    #[serde(rename = "notification")]
    Notification(Notification),
}

impl SyncMessage {
    /// Channel name on the wire
    pub fn channel(&self) -> &'static str {
        match self {
            Self::ItemCreated(_) => "item:created",
            Self::ItemMoved(_) => "item:moved",
            Self::ItemUpdated(_) => "item:updated",
            Self::ItemDeleted { .. } => "item:deleted",
            Self::ItemTyping { .. } => "item:typing",
            Self::SessionCount { .. } => "sessions:count",
            Self::Notification(_) => "notification",
        }
    }
}
