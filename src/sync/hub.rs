//! Session registry and best-effort fan-out.
//!
//! All sessions share one tokio broadcast channel. Each envelope carries the
//! originating session so a subscriber can drop its own events; delivery is
//! at-most-once with no replay. A subscriber that falls more than the channel
//! capacity behind sees [`RecvError::Lagged`] and must refetch the board.

use crate::config::Config;
use crate::domain::ItemId;
use crate::error::{HlaviError, Result};
use crate::sync::event::{Notification, NotificationLevel, SyncMessage};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

/// Identity of one connected viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle of a session. `Disconnected` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Connecting,
    Connected,
    Disconnected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnected => write!(f, "Disconnected"),
        }
    }
}

#[derive(Debug)]
struct Envelope {
    origin: Option<SessionId>,
    message: SyncMessage,
}

struct SessionEntry {
    state: SessionState,
    active: Arc<AtomicBool>,
}

/// Counters for monitoring fan-out health
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub messages_published: u64,
    pub deliveries: u64,
    pub connected_sessions: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecvError {
    /// The subscriber missed `n` messages; its view must be rebuilt from a full fetch
    #[error("subscription lagged behind by {0} messages")]
    Lagged(u64),

    #[error("subscription closed")]
    Closed,
}

/// Process-wide registry of sessions plus the fan-out channel
pub struct SyncHub {
    sender: broadcast::Sender<Arc<Envelope>>,
    sessions: RwLock<HashMap<SessionId, SessionEntry>>,
    messages_published: AtomicU64,
    deliveries: AtomicU64,
}

impl SyncHub {
    /// Create a hub whose subscribers buffer up to `capacity` messages each
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            sessions: RwLock::new(HashMap::new()),
            messages_published: AtomicU64::new(0),
            deliveries: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.broadcast_capacity)
    }

    /// Registers a new session in the `Connecting` state
    pub async fn register(&self) -> SessionId {
        let id = SessionId::new();
        self.sessions.write().await.insert(
            id,
            SessionEntry {
                state: SessionState::Connecting,
                active: Arc::new(AtomicBool::new(false)),
            },
        );
        tracing::debug!(session = %id, "session registered");
        id
    }

    /// Moves a session to `Connected` and tells every session the new count.
    ///
    /// The returned subscription already sees that count message.
    pub async fn connect(&self, id: &SessionId) -> Result<Subscription> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(id)
            .ok_or_else(|| HlaviError::SessionNotFound(id.to_string()))?;

        if entry.state != SessionState::Connecting {
            return Err(HlaviError::InvalidSessionTransition {
                session: id.to_string(),
                from: entry.state.to_string(),
                to: SessionState::Connected.to_string(),
            });
        }

        entry.state = SessionState::Connected;
        entry.active.store(true, Ordering::SeqCst);
        let subscription = Subscription {
            session: *id,
            receiver: self.sender.subscribe(),
            active: Arc::clone(&entry.active),
        };

        let count = connected(&sessions);
        tracing::info!(session = %id, connected = count, "session connected");
        self.send(None, SyncMessage::SessionCount { n: count });

        Ok(subscription)
    }

    /// Ends a session. Remaining sessions get the new count if it was connected.
    ///
    /// In-flight board operations started by the session are not cancelled.
    pub async fn disconnect(&self, id: &SessionId) -> Result<()> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .remove(id)
            .ok_or_else(|| HlaviError::SessionNotFound(id.to_string()))?;
        entry.active.store(false, Ordering::SeqCst);

        if entry.state == SessionState::Connected {
            let count = connected(&sessions);
            tracing::info!(session = %id, connected = count, "session disconnected");
            self.send(None, SyncMessage::SessionCount { n: count });
        } else {
            tracing::debug!(session = %id, "session dropped before connecting");
        }
        Ok(())
    }

    /// Current state of a session; unknown ids read as `Disconnected`
    pub async fn session_state(&self, id: &SessionId) -> SessionState {
        self.sessions
            .read()
            .await
            .get(id)
            .map(|entry| entry.state)
            .unwrap_or(SessionState::Disconnected)
    }

    pub async fn connected_count(&self) -> usize {
        connected(&*self.sessions.read().await)
    }

    /// Fans a committed change out to every connected session except `origin`.
    ///
    /// Never blocks. Returns how many subscribers the message was queued for,
    /// the originator's own subscription included.
    pub fn publish(&self, origin: Option<&SessionId>, message: SyncMessage) -> usize {
        tracing::debug!(
            channel = message.channel(),
            origin = ?origin.map(|o| o.to_string()),
            "publishing board event"
        );
        self.send(origin.copied(), message)
    }

    /// Relays a typing indicator to everyone but the typist
    pub fn relay_typing(&self, origin: &SessionId, item_id: ItemId, username: String) -> usize {
        self.send(
            Some(*origin),
            SyncMessage::ItemTyping { item_id, username },
        )
    }

    /// Sends a notification to every session, the caller's included
    pub fn notify(&self, message: impl Into<String>, level: NotificationLevel) -> usize {
        self.send(
            None,
            SyncMessage::Notification(Notification::new(message, level)),
        )
    }

    pub async fn stats(&self) -> HubStats {
        HubStats {
            messages_published: self.messages_published.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            connected_sessions: self.connected_count().await,
        }
    }

    fn send(&self, origin: Option<SessionId>, message: SyncMessage) -> usize {
        let receivers = self
            .sender
            .send(Arc::new(Envelope { origin, message }))
            .unwrap_or(0);
        self.messages_published.fetch_add(1, Ordering::Relaxed);
        self.deliveries
            .fetch_add(receivers as u64, Ordering::Relaxed);
        receivers
    }
}

fn connected(sessions: &HashMap<SessionId, SessionEntry>) -> usize {
    sessions
        .values()
        .filter(|entry| entry.state == SessionState::Connected)
        .count()
}

/// One session's view of the fan-out channel
pub struct Subscription {
    session: SessionId,
    receiver: broadcast::Receiver<Arc<Envelope>>,
    active: Arc<AtomicBool>,
}

impl Subscription {
    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Waits for the next message not originated by this session
    pub async fn recv(&mut self) -> std::result::Result<SyncMessage, RecvError> {
        loop {
            if !self.active.load(Ordering::SeqCst) {
                return Err(RecvError::Closed);
            }
            match self.receiver.recv().await {
                Ok(envelope) => {
                    if let Some(message) = self.accept(&envelope) {
                        return Ok(message);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(session = %self.session, missed = n, "subscriber lagged");
                    return Err(RecvError::Lagged(n));
                }
                Err(broadcast::error::RecvError::Closed) => return Err(RecvError::Closed),
            }
        }
    }

    /// Returns the next pending message without waiting
    pub fn try_recv(&mut self) -> std::result::Result<Option<SyncMessage>, RecvError> {
        loop {
            if !self.active.load(Ordering::SeqCst) {
                return Err(RecvError::Closed);
            }
            match self.receiver.try_recv() {
                Ok(envelope) => {
                    if let Some(message) = self.accept(&envelope) {
                        return Ok(Some(message));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    tracing::warn!(session = %self.session, missed = n, "subscriber lagged");
                    return Err(RecvError::Lagged(n));
                }
                Err(broadcast::error::TryRecvError::Closed) => return Err(RecvError::Closed),
            }
        }
    }

    fn accept(&self, envelope: &Envelope) -> Option<SyncMessage> {
        if envelope.origin == Some(self.session) {
            return None;
        }
        Some(envelope.message.clone())
    }
}
