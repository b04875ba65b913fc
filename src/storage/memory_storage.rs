use crate::{
    domain::{BoardId, ColumnId, Item, ItemId, WriteBatch},
    error::{HlaviError, Result},
    storage::OrderedStore,
};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;

/// Process-local storage, used for tests and single-node deployments
#[derive(Default)]
pub struct MemoryStorage {
    items: RwLock<HashMap<ItemId, Item>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with items
    pub fn with_items(items: impl IntoIterator<Item = Item>) -> Self {
        Self {
            items: RwLock::new(items.into_iter().map(|item| (item.id, item)).collect()),
        }
    }
}

#[async_trait]
impl OrderedStore for MemoryStorage {
    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn load_item(&self, id: &ItemId) -> Result<Item> {
        self.items
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or(HlaviError::ItemNotFound(*id))
    }

    async fn list_partition(&self, board_id: &BoardId, column: &ColumnId) -> Result<Vec<Item>> {
        let items = self.items.read().await;
        let mut partition: Vec<Item> = items
            .values()
            .filter(|item| &item.board_id == board_id && &item.column == column)
            .cloned()
            .collect();
        partition.sort_by_key(|item| item.position);
        Ok(partition)
    }

    async fn list_board(&self, board_id: &BoardId) -> Result<Vec<Item>> {
        let items = self.items.read().await;
        Ok(items
            .values()
            .filter(|item| &item.board_id == board_id)
            .cloned()
            .collect())
    }

    async fn list_boards(&self) -> Result<Vec<BoardId>> {
        let items = self.items.read().await;
        let boards: BTreeSet<BoardId> = items.values().map(|item| item.board_id.clone()).collect();
        Ok(boards.into_iter().collect())
    }

    async fn apply(&self, batch: &WriteBatch) -> Result<()> {
        let mut items = self.items.write().await;
        let mut next = items.clone();
        batch.apply_to(&mut next);
        *items = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{plan_delete, plan_insert, WriteOp};

    fn item(column: &str, position: u32, title: &str) -> Item {
        Item::new(
            ItemId::new(),
            BoardId::default(),
            column.into(),
            position,
            title.to_string(),
        )
    }

    #[tokio::test]
    async fn test_load_missing_item() {
        let storage = MemoryStorage::new();
        let id = ItemId::new();

        let err = storage.load_item(&id).await.unwrap_err();
        assert!(matches!(err, HlaviError::ItemNotFound(missing) if missing == id));
    }

    #[tokio::test]
    async fn test_apply_insert_batch() {
        let a = item("todo", 0, "A");
        let storage = MemoryStorage::with_items(vec![a.clone()]);

        let plan = plan_insert(&[a.clone()], item("todo", 0, "N"), Some(0));
        storage.apply(&plan.to_batch()).await.unwrap();

        let todo = storage
            .list_partition(&BoardId::default(), &"todo".into())
            .await
            .unwrap();
        let titles: Vec<&str> = todo.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["N", "A"]);
        assert_eq!(storage.load_item(&a.id).await.unwrap().position, 1);
    }

    #[tokio::test]
    async fn test_apply_delete_batch() {
        let a = item("todo", 0, "A");
        let b = item("todo", 1, "B");
        let storage = MemoryStorage::with_items(vec![a.clone(), b.clone()]);

        let plan = plan_delete(&a, &[a.clone(), b.clone()]);
        storage.apply(&plan.to_batch()).await.unwrap();

        assert!(storage.load_item(&a.id).await.is_err());
        assert_eq!(storage.load_item(&b.id).await.unwrap().position, 0);
        assert_eq!(
            storage
                .list_partition(&BoardId::default(), &"todo".into())
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_list_board_and_boards() {
        let mut other = item("todo", 0, "Other");
        other.board_id = BoardId::new("other");
        let storage = MemoryStorage::with_items(vec![item("todo", 0, "A"), other]);

        assert_eq!(storage.list_board(&BoardId::default()).await.unwrap().len(), 1);
        let boards = storage.list_boards().await.unwrap();
        assert_eq!(boards, vec![BoardId::default(), BoardId::new("other")]);
    }

    #[tokio::test]
    async fn test_remove_only_batch() {
        let a = item("todo", 0, "A");
        let storage = MemoryStorage::with_items(vec![a.clone()]);

        let mut batch = WriteBatch::new();
        batch.push(WriteOp::Remove(a.id));
        storage.apply(&batch).await.unwrap();

        assert!(storage.list_board(&BoardId::default()).await.unwrap().is_empty());
    }
}
