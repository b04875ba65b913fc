//! Client-local copy of one board and the merge rules that keep it current.
//!
//! Incoming records are positioned with the same planner the server uses, so a
//! peer's move shifts the local siblings exactly as it shifted them in the store.

use crate::domain::{
    group_by_column, plan_delete, plan_insert, plan_move, sort_canonical, BoardId, ColumnId, Item,
    ItemId, PartitionKey, ReorderPlan, Target, WriteBatch, WriteOp,
};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Where an incoming record came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    /// The server's answer to this client's own request
    SelfConfirmed,
    /// A change another session made, relayed by the hub
    PeerBroadcast,
}

/// A change to merge into the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Upsert(Item),
    Delete(ItemId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Applied,
    /// Older than the confirmed record already held
    Stale,
    /// Not for this board, or nothing to remove
    Ignored,
}

#[derive(Debug, Clone)]
pub struct LocalBoard {
    board_id: BoardId,
    items: HashMap<ItemId, Item>,
    optimistic: HashSet<ItemId>,
}

impl LocalBoard {
    pub fn new(board_id: BoardId) -> Self {
        Self {
            board_id,
            items: HashMap::new(),
            optimistic: HashSet::new(),
        }
    }

    pub fn board_id(&self) -> &BoardId {
        &self.board_id
    }

    pub fn get(&self, id: &ItemId) -> Option<&Item> {
        self.items.get(id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether the cached record is a local guess awaiting the server
    pub fn is_optimistic(&self, id: &ItemId) -> bool {
        self.optimistic.contains(id)
    }

    /// Items in canonical `(column, position)` order
    pub fn items(&self) -> Vec<Item> {
        let mut items: Vec<Item> = self.items.values().cloned().collect();
        sort_canonical(&mut items);
        items
    }

    pub fn columns(&self) -> BTreeMap<ColumnId, Vec<&Item>> {
        group_by_column(self.items.values())
    }

    /// Replaces the whole cache with a fresh server listing
    pub fn replace_all(&mut self, items: impl IntoIterator<Item = Item>) {
        self.optimistic.clear();
        self.items = items
            .into_iter()
            .filter(|item| item.board_id == self.board_id)
            .map(|item| (item.id, item))
            .collect();
    }

    /// Merges a server record or deletion into the cache.
    ///
    /// Server records always replace optimistic entries. Against a confirmed
    /// entry only a strictly higher version wins: every published write bumps the
    /// target's version, so an equal version is a duplicate of what is cached.
    pub fn merge(&mut self, change: Change, source: Source) -> MergeOutcome {
        match change {
            Change::Upsert(record) => self.merge_record(record, source),
            Change::Delete(id) => {
                let Some(existing) = self.items.get(&id).cloned() else {
                    return MergeOutcome::Ignored;
                };
                let plan = plan_delete(&existing, &self.partition(&existing.partition()));
                self.apply(&plan);
                self.optimistic.remove(&id);
                MergeOutcome::Applied
            }
        }
    }

    fn merge_record(&mut self, record: Item, source: Source) -> MergeOutcome {
        if record.board_id != self.board_id {
            return MergeOutcome::Ignored;
        }

        let existing = self.items.get(&record.id).cloned();
        if let Some(existing) = &existing {
            if !self.optimistic.contains(&existing.id) && record.version <= existing.version {
                tracing::debug!(
                    item = %record.id,
                    incoming = record.version,
                    cached = existing.version,
                    ?source,
                    "ignoring stale record"
                );
                return MergeOutcome::Stale;
            }
        }

        let destination = PartitionKey::new(record.board_id.clone(), record.column.clone());
        let plan = match &existing {
            Some(existing) => plan_move(
                existing,
                &self.partition(&existing.partition()),
                &self.partition(&destination),
                &record.column,
                record.position,
            ),
            None => plan_insert(
                &self.partition(&destination),
                record.clone(),
                Some(record.position),
            ),
        };

        // Shift siblings as the planner says, then store the canonical record as-is.
        self.apply_shifts(&plan);
        self.items.insert(record.id, record.clone());
        self.optimistic.remove(&record.id);
        MergeOutcome::Applied
    }

    /// Optimistically inserts a placeholder for a pending create
    pub fn insert_optimistic(&mut self, item: Item, position: Option<u32>) -> Item {
        let plan = plan_insert(&self.partition(&item.partition()), item, position);
        self.apply(&plan);
        let placed = match plan.target {
            Target::Put(item) | Target::Unchanged(item) | Target::Remove(item) => item,
        };
        self.optimistic.insert(placed.id);
        placed
    }

    /// Optimistically moves a cached item. Returns `None` if it is not cached.
    pub fn move_optimistic(&mut self, id: &ItemId, column: &ColumnId, position: u32) -> Option<Item> {
        let existing = self.items.get(id)?.clone();
        let destination = PartitionKey::new(existing.board_id.clone(), column.clone());
        let plan = plan_move(
            &existing,
            &self.partition(&existing.partition()),
            &self.partition(&destination),
            column,
            position,
        );
        if !plan.is_noop() {
            self.apply(&plan);
            self.optimistic.insert(*id);
        }
        self.items.get(id).cloned()
    }

    /// Optimistically rewrites title and description
    pub fn update_optimistic(
        &mut self,
        id: &ItemId,
        title: Option<String>,
        description: Option<String>,
    ) -> Option<Item> {
        let item = self.items.get_mut(id)?;
        if let Some(title) = title {
            item.set_title(title);
        }
        if let Some(description) = description {
            item.set_description(description);
        }
        let updated = item.clone();
        self.optimistic.insert(*id);
        Some(updated)
    }

    /// Optimistically removes a cached item, closing its gap
    pub fn delete_optimistic(&mut self, id: &ItemId) -> bool {
        matches!(
            self.merge(Change::Delete(*id), Source::SelfConfirmed),
            MergeOutcome::Applied
        )
    }

    fn partition(&self, key: &PartitionKey) -> Vec<Item> {
        self.items
            .values()
            .filter(|item| item.board_id == key.board_id && item.column == key.column)
            .cloned()
            .collect()
    }

    fn apply(&mut self, plan: &ReorderPlan) {
        plan.to_batch().apply_to(&mut self.items);
    }

    fn apply_shifts(&mut self, plan: &ReorderPlan) {
        let mut batch = WriteBatch::new();
        for shift in &plan.shifts {
            batch.push(WriteOp::Shift(shift.clone()));
        }
        batch.apply_to(&mut self.items);
    }
}
