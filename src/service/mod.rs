//! Board operations over an [`OrderedStore`].
//!
//! Each mutation holds write locks on the partitions it touches for the whole
//! read-plan-verify-apply cycle, and fans the committed record out through the
//! [`SyncHub`] before releasing them.

pub mod export;
pub mod locks;

use crate::{
    config::Config,
    domain::{
        plan_delete, plan_insert, plan_move, sort_canonical, validate_position, validate_title,
        BoardId, ColumnId, Item, ItemId, PartitionKey, ReorderPlan, WriteBatch, WriteOp,
    },
    error::{HlaviError, Result},
    storage::OrderedStore,
    sync::{HubStats, SessionId, SyncHub, SyncMessage},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;

pub use export::{ExportPayload, ExportRow};
pub use locks::{PartitionGuard, PartitionLocks};

/// Body of a create request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateItem {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub column: ColumnId,
    #[serde(default)]
    pub board_id: Option<BoardId>,
    #[serde(default)]
    pub position: Option<i64>,
}

impl CreateItem {
    pub fn new(title: impl Into<String>, column: impl Into<ColumnId>) -> Self {
        Self {
            title: title.into(),
            column: column.into(),
            ..Self::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn on_board(mut self, board_id: impl Into<BoardId>) -> Self {
        self.board_id = Some(board_id.into());
        self
    }

    pub fn at_position(mut self, position: i64) -> Self {
        self.position = Some(position);
        self
    }
}

/// Body of a move request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveItem {
    pub column: ColumnId,
    pub position: i64,
}

impl MoveItem {
    pub fn new(column: impl Into<ColumnId>, position: i64) -> Self {
        Self {
            column: column.into(),
            position,
        }
    }
}

/// Body of an update request.
///
/// `column` and `position` are accepted on the wire only to be rejected;
/// placement changes go through [`BoardService::move_item`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateItem {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<ColumnId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
}

impl UpdateItem {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn description(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Self::default()
        }
    }
}

/// Item totals and hub counters
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Diagnostics {
    pub items_per_board: BTreeMap<BoardId, usize>,
    pub total_items: usize,
    pub hub: Option<HubStats>,
}

pub struct BoardService {
    store: Arc<dyn OrderedStore>,
    locks: PartitionLocks,
    hub: Option<Arc<SyncHub>>,
    config: Config,
}

impl BoardService {
    pub fn new(store: Arc<dyn OrderedStore>, config: Config) -> Self {
        Self {
            store,
            locks: PartitionLocks::new(config.lock_timeout()),
            hub: None,
            config,
        }
    }

    /// Publishes committed changes to `hub`
    pub fn with_hub(mut self, hub: Arc<SyncHub>) -> Self {
        self.hub = Some(hub);
        self
    }

    pub fn hub(&self) -> Option<&Arc<SyncHub>> {
        self.hub.as_ref()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Creates an item, appending to its column unless a position is given
    pub async fn create(&self, origin: Option<&SessionId>, request: CreateItem) -> Result<Item> {
        validate_title(&request.title)?;
        self.validate_column(&request.column)?;
        let requested = request.position.map(validate_position).transpose()?;
        let board_id = request
            .board_id
            .unwrap_or_else(|| self.config.default_board.clone());

        let key = PartitionKey::new(board_id.clone(), request.column.clone());
        let guard = self.locks.write([key]).await?;

        let partition = self
            .bounded(self.store.list_partition(&board_id, &request.column))
            .await?;
        let mut item = Item::new(
            ItemId::new(),
            board_id,
            request.column,
            0,
            request.title,
        );
        if let Some(description) = request.description {
            item = item.with_description(description);
        }

        let plan = plan_insert(&partition, item, requested);
        let created = self.commit(&plan, &partition).await?;
        self.publish(origin, SyncMessage::ItemCreated(created.clone()));
        drop(guard);
        Ok(created)
    }

    pub async fn read(&self, id: &ItemId) -> Result<Item> {
        self.bounded(self.store.load_item(id)).await
    }

    /// Updates title and description. Placement fields are rejected.
    pub async fn update(
        &self,
        origin: Option<&SessionId>,
        id: &ItemId,
        request: UpdateItem,
    ) -> Result<Item> {
        if request.column.is_some() || request.position.is_some() {
            return Err(HlaviError::invalid(
                "column/position",
                "placement changes must use the move operation",
            ));
        }
        if let Some(title) = &request.title {
            validate_title(title)?;
        }

        let (mut item, guard) = self.lock_item(id, None).await?;

        let mut changed = false;
        if let Some(title) = request.title {
            if title != item.title {
                item.set_title(title);
                changed = true;
            }
        }
        if let Some(description) = request.description {
            if description != item.description {
                item.set_description(description);
                changed = true;
            }
        }
        if !changed {
            return Ok(item);
        }

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::Put(item.clone()));
        self.apply_batch(batch).await?;

        tracing::debug!(item = %item.id, version = item.version, "item updated");
        self.publish(origin, SyncMessage::ItemUpdated(item.clone()));
        drop(guard);
        Ok(item)
    }

    /// Moves an item to `(column, position)` within its board
    pub async fn move_item(
        &self,
        origin: Option<&SessionId>,
        id: &ItemId,
        request: MoveItem,
    ) -> Result<Item> {
        self.validate_column(&request.column)?;
        let requested = validate_position(request.position)?;

        let (item, guard) = self.lock_item(id, Some(&request.column)).await?;

        let source = self
            .bounded(self.store.list_partition(&item.board_id, &item.column))
            .await?;
        let destination = if item.column == request.column {
            Vec::new()
        } else {
            self.bounded(self.store.list_partition(&item.board_id, &request.column))
                .await?
        };

        let plan = plan_move(&item, &source, &destination, &request.column, requested);
        if plan.is_noop() {
            return Ok(item);
        }

        let mut before = source;
        before.extend(destination);
        let moved = self.commit(&plan, &before).await?;
        self.publish(origin, SyncMessage::ItemMoved(moved.clone()));
        drop(guard);
        Ok(moved)
    }

    /// Deletes an item and closes the gap in its column
    pub async fn delete(&self, origin: Option<&SessionId>, id: &ItemId) -> Result<()> {
        let (item, guard) = self.lock_item(id, None).await?;

        let partition = self
            .bounded(self.store.list_partition(&item.board_id, &item.column))
            .await?;
        let plan = plan_delete(&item, &partition);
        self.verify_and_apply(&plan, &partition).await?;
        self.publish(origin, SyncMessage::ItemDeleted { id: *id });
        drop(guard);
        Ok(())
    }

    /// Every item of a board, sorted by `(column, position)`
    pub async fn list_ordered(&self, board_id: &BoardId) -> Result<Vec<Item>> {
        let columns: BTreeSet<ColumnId> = self
            .bounded(self.store.list_board(board_id))
            .await?
            .into_iter()
            .map(|item| item.column)
            .collect();
        let keys = columns
            .into_iter()
            .map(|column| PartitionKey::new(board_id.clone(), column));

        let _guard = self.locks.read(keys).await?;
        let mut items = self.bounded(self.store.list_board(board_id)).await?;
        sort_canonical(&mut items);
        Ok(items)
    }

    pub async fn diagnostics(&self) -> Result<Diagnostics> {
        let mut items_per_board = BTreeMap::new();
        for board_id in self.bounded(self.store.list_boards()).await? {
            let count = self.bounded(self.store.list_board(&board_id)).await?.len();
            items_per_board.insert(board_id, count);
        }

        let hub = match &self.hub {
            Some(hub) => Some(hub.stats().await),
            None => None,
        };

        Ok(Diagnostics {
            total_items: items_per_board.values().sum(),
            items_per_board,
            hub,
        })
    }

    fn validate_column(&self, column: &ColumnId) -> Result<()> {
        if column.is_empty() {
            return Err(HlaviError::invalid("column", "must not be empty"));
        }
        if !self.config.board.accepts_column(column) {
            return Err(HlaviError::invalid(
                "column",
                format!("'{}' is not a column of this board", column),
            ));
        }
        Ok(())
    }

    /// Loads an item and write-locks its partition plus `destination`.
    ///
    /// The item is reloaded under the lock; if it changed partition in between,
    /// the caller gets a retryable conflict.
    async fn lock_item(
        &self,
        id: &ItemId,
        destination: Option<&ColumnId>,
    ) -> Result<(Item, PartitionGuard)> {
        let seen = self.bounded(self.store.load_item(id)).await?;

        let mut keys = vec![seen.partition()];
        if let Some(column) = destination {
            keys.push(PartitionKey::new(seen.board_id.clone(), column.clone()));
        }
        let guard = self.locks.write(keys).await?;

        let current = self.bounded(self.store.load_item(id)).await?;
        if current.partition() != seen.partition() {
            return Err(HlaviError::ConcurrencyConflict(format!(
                "item {} moved to {} while waiting for locks",
                id,
                current.partition()
            )));
        }
        Ok((current, guard))
    }

    async fn commit(&self, plan: &ReorderPlan, before: &[Item]) -> Result<Item> {
        self.verify_and_apply(plan, before).await?;
        plan.resulting_item().cloned().ok_or_else(|| {
            HlaviError::InvariantViolation("committed plan left no resulting item".to_string())
        })
    }

    async fn verify_and_apply(&self, plan: &ReorderPlan, before: &[Item]) -> Result<()> {
        plan.verify(before)?;
        let batch = plan.to_batch();
        let ops = batch.ops().len();
        self.apply_batch(batch).await?;

        let partitions: Vec<String> = plan
            .touched_partitions()
            .iter()
            .map(|p| p.to_string())
            .collect();
        tracing::debug!(
            ops,
            shifts = plan.shifts.len(),
            partitions = ?partitions,
            "reorder plan committed"
        );
        Ok(())
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        let timeout = self.config.store_timeout();
        tokio::time::timeout(timeout, call).await.map_err(|_| {
            tracing::warn!(timeout = ?timeout, "store call timed out");
            HlaviError::ConcurrencyConflict(format!("store call exceeded {:?}", timeout))
        })?
    }

    /// Applies a batch on its own task so a commit that has started always finishes.
    ///
    /// The store timeout only abandons a commit that has not begun: on expiry the task
    /// is aborted and then awaited. If it completed anyway, that result stands; if it was
    /// cancelled, nothing was written and the caller may retry.
    async fn apply_batch(&self, batch: WriteBatch) -> Result<()> {
        let store = Arc::clone(&self.store);
        let mut commit = tokio::spawn(async move { store.apply(&batch).await });

        let timeout = self.config.store_timeout();
        let joined = match tokio::time::timeout(timeout, &mut commit).await {
            Ok(joined) => joined,
            Err(_) => {
                commit.abort();
                match commit.await {
                    Err(err) if err.is_cancelled() => {
                        tracing::warn!(timeout = ?timeout, "store commit timed out before starting");
                        return Err(HlaviError::ConcurrencyConflict(format!(
                            "store call exceeded {:?} before the commit started",
                            timeout
                        )));
                    }
                    joined => joined,
                }
            }
        };

        joined.map_err(|err| HlaviError::StoreUnavailable(format!("store commit failed: {}", err)))?
    }

    /// Sends a committed change to peers. Called while the partition guard is held so
    /// peers see events for one partition in commit order.
    fn publish(&self, origin: Option<&SessionId>, message: SyncMessage) {
        if let Some(hub) = &self.hub {
            hub.publish(origin, message);
        }
    }
}
