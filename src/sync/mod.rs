pub mod event;
pub mod hub;

pub use event::{Notification, NotificationLevel, SyncMessage};
pub use hub::{HubStats, RecvError, SessionId, SessionState, Subscription, SyncHub};
