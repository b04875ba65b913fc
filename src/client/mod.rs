//! Per-client board state kept in step with the server.
//!
//! Local actions are applied optimistically, then replaced by the server's
//! canonical record. Peer events from the hub are merged by item id. A failed
//! move or a lagged subscription falls back to a full refetch.

pub mod cache;
pub mod transport;

use crate::{
    domain::{ColumnId, Item, ItemId},
    error::{HlaviError, Result},
    service::{CreateItem, MoveItem, UpdateItem},
    sync::{Notification, RecvError, Subscription, SyncMessage},
};
use std::collections::{BTreeMap, HashMap};

pub use cache::{Change, LocalBoard, MergeOutcome, Source};
pub use transport::{BoardApi, InProcessTransport};

pub struct ClientReconciler<A: BoardApi> {
    api: A,
    board: LocalBoard,
    connected_sessions: usize,
    typing: HashMap<ItemId, String>,
    notifications: Vec<Notification>,
}

impl<A: BoardApi> ClientReconciler<A> {
    pub fn new(api: A, board: LocalBoard) -> Self {
        Self {
            api,
            board,
            connected_sessions: 0,
            typing: HashMap::new(),
            notifications: Vec::new(),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    pub fn board(&self) -> &LocalBoard {
        &self.board
    }

    /// Items in canonical order
    pub fn items(&self) -> Vec<Item> {
        self.board.items()
    }

    pub fn columns(&self) -> BTreeMap<ColumnId, Vec<&Item>> {
        self.board.columns()
    }

    /// Last count announced through `sessions:count`
    pub fn connected_sessions(&self) -> usize {
        self.connected_sessions
    }

    /// Who last announced editing `id`, if anyone
    pub fn typing(&self, id: &ItemId) -> Option<&str> {
        self.typing.get(id).map(String::as_str)
    }

    /// Drains notifications received since the last call
    pub fn take_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notifications)
    }

    /// Replaces the cache with the server's ordered list
    pub async fn refresh(&mut self) -> Result<()> {
        let items = self.api.list_items().await?;
        tracing::debug!(board = %self.board.board_id(), items = items.len(), "board refreshed");
        self.board.replace_all(items);
        Ok(())
    }

    pub async fn create(&mut self, request: CreateItem) -> Result<Item> {
        let snapshot = self.board.clone();

        let mut placeholder = Item::new(
            ItemId::new(),
            request
                .board_id
                .clone()
                .unwrap_or_else(|| self.board.board_id().clone()),
            request.column.clone(),
            0,
            request.title.clone(),
        );
        if let Some(description) = &request.description {
            placeholder = placeholder.with_description(description.clone());
        }
        let requested = request.position.and_then(|p| u32::try_from(p).ok());
        let placeholder = self.board.insert_optimistic(placeholder, requested);

        match self.api.create_item(request).await {
            Ok(created) => {
                self.board
                    .merge(Change::Delete(placeholder.id), Source::SelfConfirmed);
                self.board
                    .merge(Change::Upsert(created.clone()), Source::SelfConfirmed);
                Ok(created)
            }
            Err(err) => {
                tracing::warn!(error = %err, "create failed, rolling back");
                self.board = snapshot;
                Err(err)
            }
        }
    }

    /// Moves an item. On failure the cache is refetched rather than patched.
    pub async fn move_item(&mut self, id: &ItemId, column: ColumnId, position: i64) -> Result<Item> {
        if let Ok(target) = u32::try_from(position) {
            self.board.move_optimistic(id, &column, target);
        }

        match self.api.move_item(id, MoveItem::new(column, position)).await {
            Ok(moved) => {
                self.board
                    .merge(Change::Upsert(moved.clone()), Source::SelfConfirmed);
                Ok(moved)
            }
            Err(err) => {
                tracing::warn!(item = %id, error = %err, "move failed, refetching board");
                if let Err(refresh_err) = self.refresh().await {
                    tracing::error!(error = %refresh_err, "refetch after failed move also failed");
                }
                Err(err)
            }
        }
    }

    pub async fn update(&mut self, id: &ItemId, request: UpdateItem) -> Result<Item> {
        let snapshot = self.board.clone();
        self.board
            .update_optimistic(id, request.title.clone(), request.description.clone());

        match self.api.update_item(id, request).await {
            Ok(updated) => {
                self.board
                    .merge(Change::Upsert(updated.clone()), Source::SelfConfirmed);
                Ok(updated)
            }
            Err(err) => {
                tracing::warn!(item = %id, error = %err, "update failed, rolling back");
                self.board = snapshot;
                Err(err)
            }
        }
    }

    pub async fn delete(&mut self, id: &ItemId) -> Result<()> {
        let snapshot = self.board.clone();
        self.board.delete_optimistic(id);

        match self.api.delete_item(id).await {
            Ok(()) => {
                self.typing.remove(id);
                Ok(())
            }
            Err(err) => {
                tracing::warn!(item = %id, error = %err, "delete failed, rolling back");
                self.board = snapshot;
                Err(err)
            }
        }
    }

    /// Applies one message from the hub
    pub fn handle(&mut self, message: SyncMessage) -> MergeOutcome {
        match message {
            SyncMessage::ItemCreated(item)
            | SyncMessage::ItemMoved(item)
            | SyncMessage::ItemUpdated(item) => {
                self.board.merge(Change::Upsert(item), Source::PeerBroadcast)
            }
            SyncMessage::ItemDeleted { id } => {
                self.typing.remove(&id);
                self.board.merge(Change::Delete(id), Source::PeerBroadcast)
            }
            SyncMessage::ItemTyping { item_id, username } => {
                self.typing.insert(item_id, username);
                MergeOutcome::Applied
            }
            SyncMessage::SessionCount { n } => {
                self.connected_sessions = n;
                MergeOutcome::Applied
            }
            SyncMessage::Notification(notification) => {
                self.notifications.push(notification);
                MergeOutcome::Applied
            }
        }
    }

    /// Applies every pending message on `subscription` and returns how many were handled.
    ///
    /// Missed messages trigger a full refetch. A closed subscription is an error; the
    /// caller reconnects and refreshes.
    pub async fn sync(&mut self, subscription: &mut Subscription) -> Result<usize> {
        let mut handled = 0;
        loop {
            match subscription.try_recv() {
                Ok(Some(message)) => {
                    self.handle(message);
                    handled += 1;
                }
                Ok(None) => return Ok(handled),
                Err(RecvError::Lagged(missed)) => {
                    handled += self.resync(subscription, missed).await?;
                }
                Err(RecvError::Closed) => return Err(closed(subscription)),
            }
        }
    }

    /// Waits for the next message on `subscription` and applies it
    pub async fn receive(&mut self, subscription: &mut Subscription) -> Result<MergeOutcome> {
        match subscription.recv().await {
            Ok(message) => Ok(self.handle(message)),
            Err(RecvError::Lagged(missed)) => {
                self.resync(subscription, missed).await?;
                Ok(MergeOutcome::Applied)
            }
            Err(RecvError::Closed) => Err(closed(subscription)),
        }
    }

    /// Discards the item events still buffered, then rebuilds the cache from the server.
    ///
    /// Buffered events predate the refetch and would replay old shifts on top of it.
    /// Session counts, typing and notifications still apply.
    async fn resync(&mut self, subscription: &mut Subscription, missed: u64) -> Result<usize> {
        tracing::warn!(missed, "missed peer events, refetching board");
        let mut handled = 0;
        let mut discarded = 0;
        loop {
            match subscription.try_recv() {
                Ok(Some(
                    message @ (SyncMessage::SessionCount { .. }
                    | SyncMessage::ItemTyping { .. }
                    | SyncMessage::Notification(_)),
                )) => {
                    self.handle(message);
                    handled += 1;
                }
                Ok(Some(_)) => discarded += 1,
                Err(RecvError::Lagged(_)) => {}
                Ok(None) | Err(RecvError::Closed) => break,
            }
        }
        tracing::debug!(discarded, "dropped buffered item events before refetch");
        self.refresh().await?;
        Ok(handled)
    }
}

fn closed(subscription: &Subscription) -> HlaviError {
    HlaviError::SessionNotFound(subscription.session().to_string())
}
