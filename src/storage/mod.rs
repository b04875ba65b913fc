use crate::{
    domain::{BoardId, ColumnId, Item, ItemId, WriteBatch},
    error::Result,
};
use async_trait::async_trait;

pub mod file_storage;
pub mod memory_storage;

pub use file_storage::FileStorage;
pub use memory_storage::MemoryStorage;

/// Durable record store keyed by item id, each record carrying `(column, position)`
#[async_trait]
pub trait OrderedStore: Send + Sync {
    /// Initializes the storage backend
    async fn initialize(&self) -> Result<()>;

    /// Loads an item by ID
    async fn load_item(&self, id: &ItemId) -> Result<Item>;

    /// Lists the items of one `(board, column)` partition in position order
    async fn list_partition(&self, board_id: &BoardId, column: &ColumnId) -> Result<Vec<Item>>;

    /// Lists every item of a board, in no particular order
    async fn list_board(&self, board_id: &BoardId) -> Result<Vec<Item>>;

    /// Lists the ids of every board holding at least one item
    async fn list_boards(&self) -> Result<Vec<BoardId>>;

    /// Applies a batch of shifts and point writes atomically.
    ///
    /// Either every op becomes visible or none does.
    async fn apply(&self, batch: &WriteBatch) -> Result<()>;
}
