//! Dense ordering engine.
//!
//! Every function here is pure: it takes the current contents of the affected
//! partitions and returns a [`ReorderPlan`] describing the range shifts and the
//! single target write that keep positions `0..k` gap-free. Plans are turned into
//! a [`WriteBatch`] and applied atomically by a store, or replayed against a
//! client's local cache.

use crate::domain::board::{ColumnId, PartitionKey};
use crate::domain::item::{Item, ItemId};
use crate::error::{HlaviError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Direction of a range shift
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increment,
    Decrement,
}

/// Shift every position in `[from, to)` of one partition by one slot.
///
/// `to == None` means the range is open-ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shift {
    pub partition: PartitionKey,
    pub from: u32,
    pub to: Option<u32>,
    pub direction: Direction,
}

impl Shift {
    fn open(partition: PartitionKey, from: u32, direction: Direction) -> Self {
        Self {
            partition,
            from,
            to: None,
            direction,
        }
    }

    fn bounded(partition: PartitionKey, from: u32, to: u32, direction: Direction) -> Self {
        Self {
            partition,
            from,
            to: Some(to),
            direction,
        }
    }

    /// Whether the item sits inside this shift's range
    pub fn covers(&self, item: &Item) -> bool {
        item.board_id == self.partition.board_id
            && item.column == self.partition.column
            && item.position >= self.from
            && self.to.map_or(true, |to| item.position < to)
    }

    fn shifted(&self, position: u32) -> u32 {
        match self.direction {
            Direction::Increment => position.saturating_add(1),
            Direction::Decrement => position.saturating_sub(1),
        }
    }
}

/// One write inside an atomic batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOp {
    Shift(Shift),
    Put(Item),
    Remove(ItemId),
}

/// Ordered writes that a store must apply all-or-nothing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, op: WriteOp) {
        self.ops.push(op);
    }

    pub fn ops(&self) -> &[WriteOp] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Applies every op, in order, to an id-keyed item map.
    ///
    /// Shifts adjust positions only; they never bump a sibling's version.
    pub fn apply_to(&self, items: &mut HashMap<ItemId, Item>) {
        for op in &self.ops {
            match op {
                WriteOp::Shift(shift) => {
                    for item in items.values_mut().filter(|item| shift.covers(item)) {
                        item.position = shift.shifted(item.position);
                    }
                }
                WriteOp::Put(item) => {
                    items.insert(item.id, item.clone());
                }
                WriteOp::Remove(id) => {
                    items.remove(id);
                }
            }
        }
    }
}

/// What happens to the item the operation is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Put(Item),
    Remove(Item),
    Unchanged(Item),
}

/// Range shifts plus the target write for one insert, move or delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReorderPlan {
    pub shifts: Vec<Shift>,
    pub target: Target,
}

impl ReorderPlan {
    pub fn is_noop(&self) -> bool {
        matches!(self.target, Target::Unchanged(_))
    }

    /// The record as it will exist after the plan, if it still exists
    pub fn resulting_item(&self) -> Option<&Item> {
        match &self.target {
            Target::Put(item) | Target::Unchanged(item) => Some(item),
            Target::Remove(_) => None,
        }
    }

    /// Partitions whose contents change when the plan is applied
    pub fn touched_partitions(&self) -> BTreeSet<PartitionKey> {
        let mut keys: BTreeSet<PartitionKey> =
            self.shifts.iter().map(|s| s.partition.clone()).collect();
        match &self.target {
            Target::Put(item) | Target::Remove(item) => {
                keys.insert(item.partition());
            }
            Target::Unchanged(_) => {}
        }
        keys
    }

    pub fn to_batch(&self) -> WriteBatch {
        let mut batch = WriteBatch::new();
        for shift in &self.shifts {
            batch.push(WriteOp::Shift(shift.clone()));
        }
        match &self.target {
            Target::Put(item) => batch.push(WriteOp::Put(item.clone())),
            Target::Remove(item) => batch.push(WriteOp::Remove(item.id)),
            Target::Unchanged(_) => {}
        }
        batch
    }

    /// Simulates the plan over `before` and checks every touched partition is dense.
    ///
    /// `before` must hold every item of the partitions the plan reads or writes.
    pub fn verify(&self, before: &[Item]) -> Result<()> {
        let mut touched = self.touched_partitions();
        let mut items: HashMap<ItemId, Item> =
            before.iter().map(|item| (item.id, item.clone())).collect();

        let target_id = match &self.target {
            Target::Put(item) | Target::Remove(item) | Target::Unchanged(item) => item.id,
        };
        if let Some(previous) = items.get(&target_id) {
            touched.insert(previous.partition());
        }

        self.to_batch().apply_to(&mut items);

        for key in &touched {
            let mut positions: Vec<u32> = items
                .values()
                .filter(|item| item.board_id == key.board_id && item.column == key.column)
                .map(|item| item.position)
                .collect();
            positions.sort_unstable();

            let dense = positions
                .iter()
                .enumerate()
                .all(|(expected, &actual)| actual as usize == expected);
            if !dense {
                tracing::error!(partition = %key, ?positions, "reorder plan breaks dense ordering");
                return Err(HlaviError::InvariantViolation(format!(
                    "partition {} would hold positions {:?}",
                    key, positions
                )));
            }
        }

        Ok(())
    }
}

fn count(partition: &[Item]) -> u32 {
    u32::try_from(partition.len()).unwrap_or(u32::MAX)
}

/// Plans inserting `item` into `partition` (the destination's current items).
///
/// The requested position is clamped to `[0, k]`; `None` appends.
pub fn plan_insert(partition: &[Item], mut item: Item, requested: Option<u32>) -> ReorderPlan {
    let k = count(partition);
    let position = requested.map_or(k, |p| p.min(k));
    item.position = position;

    let shifts = if position < k {
        vec![Shift::open(item.partition(), position, Direction::Increment)]
    } else {
        Vec::new()
    };

    ReorderPlan {
        shifts,
        target: Target::Put(item),
    }
}

/// Plans moving `item` to `(column, requested)` within its board.
///
/// `source` holds the items of the item's current partition. `destination` holds
/// the items of the target partition and is ignored for same-column moves.
/// Same-column targets clamp to `[0, k - 1]` since the item already occupies a slot;
/// cross-column targets clamp to `[0, k_dest]`.
pub fn plan_move(
    item: &Item,
    source: &[Item],
    destination: &[Item],
    column: &ColumnId,
    requested: u32,
) -> ReorderPlan {
    let from = item.position;
    let source_key = item.partition();

    if &item.column == column {
        let last = count(source).saturating_sub(1);
        let to = requested.min(last);

        if to == from {
            return ReorderPlan {
                shifts: Vec::new(),
                target: Target::Unchanged(item.clone()),
            };
        }

        let shift = if from < to {
            Shift::bounded(source_key, from + 1, to + 1, Direction::Decrement)
        } else {
            Shift::bounded(source_key, to, from, Direction::Increment)
        };

        let mut moved = item.clone();
        moved.place(column.clone(), to);
        return ReorderPlan {
            shifts: vec![shift],
            target: Target::Put(moved),
        };
    }

    let to = requested.min(count(destination));
    let destination_key = PartitionKey::new(item.board_id.clone(), column.clone());

    let mut shifts = Vec::with_capacity(2);
    if from + 1 < count(source) {
        shifts.push(Shift::open(source_key, from + 1, Direction::Decrement));
    }
    if to < count(destination) {
        shifts.push(Shift::open(destination_key, to, Direction::Increment));
    }

    let mut moved = item.clone();
    moved.place(column.clone(), to);
    ReorderPlan {
        shifts,
        target: Target::Put(moved),
    }
}

/// Plans removing `item` from `partition` and closing the gap it leaves
pub fn plan_delete(item: &Item, partition: &[Item]) -> ReorderPlan {
    let shifts = if item.position + 1 < count(partition) {
        vec![Shift::open(
            item.partition(),
            item.position + 1,
            Direction::Decrement,
        )]
    } else {
        Vec::new()
    };

    ReorderPlan {
        shifts,
        target: Target::Remove(item.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::board::BoardId;

    fn column(board: &mut Vec<Item>, name: &str, titles: &[&str]) -> Vec<Item> {
        let items: Vec<Item> = titles
            .iter()
            .enumerate()
            .map(|(pos, title)| {
                Item::new(
                    ItemId::new(),
                    BoardId::default(),
                    name.into(),
                    pos as u32,
                    title.to_string(),
                )
            })
            .collect();
        board.extend(items.iter().cloned());
        items
    }

    fn applied(board: &[Item], plan: &ReorderPlan) -> HashMap<ItemId, Item> {
        plan.verify(board).unwrap();
        let mut items: HashMap<ItemId, Item> = board.iter().map(|i| (i.id, i.clone())).collect();
        plan.to_batch().apply_to(&mut items);
        items
    }

    fn layout(items: &HashMap<ItemId, Item>, name: &str) -> Vec<(String, u32)> {
        let mut out: Vec<(String, u32)> = items
            .values()
            .filter(|i| i.column.as_str() == name)
            .map(|i| (i.title.clone(), i.position))
            .collect();
        out.sort_by_key(|(_, pos)| *pos);
        out
    }

    fn pairs(expected: &[(&str, u32)]) -> Vec<(String, u32)> {
        expected.iter().map(|(t, p)| (t.to_string(), *p)).collect()
    }

    #[test]
    fn test_move_up_within_column() {
        let mut board = Vec::new();
        let todo = column(&mut board, "todo", &["A", "B", "C"]);

        let plan = plan_move(&todo[2], &todo, &todo, &"todo".into(), 0);
        let items = applied(&board, &plan);

        assert_eq!(layout(&items, "todo"), pairs(&[("C", 0), ("A", 1), ("B", 2)]));
    }

    #[test]
    fn test_move_down_within_column() {
        let mut board = Vec::new();
        let todo = column(&mut board, "todo", &["A", "B", "C", "D"]);

        let plan = plan_move(&todo[0], &todo, &todo, &"todo".into(), 2);
        let items = applied(&board, &plan);

        assert_eq!(
            layout(&items, "todo"),
            pairs(&[("B", 0), ("C", 1), ("A", 2), ("D", 3)])
        );
    }

    #[test]
    fn test_same_position_is_noop() {
        let mut board = Vec::new();
        let todo = column(&mut board, "todo", &["A", "B"]);

        let plan = plan_move(&todo[1], &todo, &todo, &"todo".into(), 1);
        assert!(plan.is_noop());
        assert!(plan.to_batch().is_empty());
        assert_eq!(plan.resulting_item(), Some(&todo[1]));
    }

    #[test]
    fn test_single_item_column_move_past_end_is_noop() {
        let mut board = Vec::new();
        let todo = column(&mut board, "todo", &["A"]);

        let plan = plan_move(&todo[0], &todo, &todo, &"todo".into(), 9);
        assert!(plan.is_noop());
    }

    #[test]
    fn test_same_column_clamp_does_not_double_count() {
        let mut board = Vec::new();
        let todo = column(&mut board, "todo", &["A", "B", "C"]);

        let plan = plan_move(&todo[0], &todo, &todo, &"todo".into(), 3);
        assert_eq!(plan.resulting_item().unwrap().position, 2);
        let items = applied(&board, &plan);
        assert_eq!(layout(&items, "todo"), pairs(&[("B", 0), ("C", 1), ("A", 2)]));
    }

    #[test]
    fn test_cross_column_move() {
        let mut board = Vec::new();
        let todo = column(&mut board, "todo", &["A"]);
        let done = column(&mut board, "done", &["X", "Y"]);

        let plan = plan_move(&todo[0], &todo, &done, &"done".into(), 0);
        let items = applied(&board, &plan);

        assert!(layout(&items, "todo").is_empty());
        assert_eq!(layout(&items, "done"), pairs(&[("A", 0), ("X", 1), ("Y", 2)]));
    }

    #[test]
    fn test_cross_column_move_appends_at_count() {
        let mut board = Vec::new();
        let todo = column(&mut board, "todo", &["A", "B", "C"]);
        let done = column(&mut board, "done", &["X", "Y"]);

        let plan = plan_move(&todo[1], &todo, &done, &"done".into(), 2);
        assert!(plan
            .shifts
            .iter()
            .all(|s| s.partition.column.as_str() == "todo"));
        let items = applied(&board, &plan);

        assert_eq!(layout(&items, "todo"), pairs(&[("A", 0), ("C", 1)]));
        assert_eq!(layout(&items, "done"), pairs(&[("X", 0), ("Y", 1), ("B", 2)]));
    }

    #[test]
    fn test_cross_column_clamps_to_destination_count() {
        let mut board = Vec::new();
        let todo = column(&mut board, "todo", &["A"]);
        let done = column(&mut board, "done", &["X"]);

        let plan = plan_move(&todo[0], &todo, &done, &"done".into(), 40);
        assert_eq!(plan.resulting_item().unwrap().position, 1);
        applied(&board, &plan);
    }

    #[test]
    fn test_move_into_empty_column() {
        let mut board = Vec::new();
        let todo = column(&mut board, "todo", &["A", "B"]);

        let plan = plan_move(&todo[0], &todo, &[], &"review".into(), 5);
        let items = applied(&board, &plan);

        assert_eq!(layout(&items, "review"), pairs(&[("A", 0)]));
        assert_eq!(layout(&items, "todo"), pairs(&[("B", 0)]));
    }

    #[test]
    fn test_insert_defaults_to_end() {
        let mut board = Vec::new();
        let backlog = column(&mut board, "backlog", &["A"]);
        let item = Item::new(
            ItemId::new(),
            BoardId::default(),
            "backlog".into(),
            0,
            "N".to_string(),
        );

        let plan = plan_insert(&backlog, item, None);
        assert!(plan.shifts.is_empty());
        let items = applied(&board, &plan);
        assert_eq!(layout(&items, "backlog"), pairs(&[("A", 0), ("N", 1)]));
    }

    #[test]
    fn test_insert_in_middle_opens_gap() {
        let mut board = Vec::new();
        let backlog = column(&mut board, "backlog", &["A", "B"]);
        let item = Item::new(
            ItemId::new(),
            BoardId::default(),
            "backlog".into(),
            0,
            "N".to_string(),
        );

        let plan = plan_insert(&backlog, item, Some(1));
        let items = applied(&board, &plan);
        assert_eq!(
            layout(&items, "backlog"),
            pairs(&[("A", 0), ("N", 1), ("B", 2)])
        );
    }

    #[test]
    fn test_insert_into_empty_column_clamps_to_zero() {
        let item = Item::new(
            ItemId::new(),
            BoardId::default(),
            "backlog".into(),
            0,
            "N".to_string(),
        );
        let plan = plan_insert(&[], item, Some(12));
        assert_eq!(plan.resulting_item().unwrap().position, 0);
        plan.verify(&[]).unwrap();
    }

    #[test]
    fn test_delete_closes_gap() {
        let mut board = Vec::new();
        let todo = column(&mut board, "todo", &["A", "B", "C"]);

        let plan = plan_delete(&todo[1], &todo);
        let items = applied(&board, &plan);
        assert_eq!(layout(&items, "todo"), pairs(&[("A", 0), ("C", 1)]));
    }

    #[test]
    fn test_shifts_leave_other_boards_alone() {
        let mut board = Vec::new();
        let todo = column(&mut board, "todo", &["A", "B"]);
        let other = Item::new(
            ItemId::new(),
            BoardId::new("other"),
            "todo".into(),
            1,
            "Z".to_string(),
        );
        board.push(other.clone());

        let plan = plan_delete(&todo[0], &todo);
        let items = applied(&board, &plan);
        assert_eq!(items[&other.id].position, 1);
    }

    #[test]
    fn test_verify_rejects_broken_plan() {
        let mut board = Vec::new();
        let todo = column(&mut board, "todo", &["A", "B", "C"]);

        let mut plan = plan_delete(&todo[0], &todo);
        plan.shifts.clear();

        assert!(matches!(
            plan.verify(&board),
            Err(HlaviError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_verify_rejects_corrupt_input() {
        let mut board = Vec::new();
        let mut todo = column(&mut board, "todo", &["A", "B"]);
        todo[1].position = 5;
        board[1].position = 5;

        let plan = plan_move(&todo[0], &todo, &todo, &"todo".into(), 1);
        assert!(plan.verify(&board).is_err());
    }

    #[test]
    fn test_shifts_do_not_bump_sibling_versions() {
        let mut board = Vec::new();
        let todo = column(&mut board, "todo", &["A", "B", "C"]);

        let plan = plan_move(&todo[2], &todo, &todo, &"todo".into(), 0);
        let items = applied(&board, &plan);

        assert_eq!(items[&todo[0].id].version, 1);
        assert_eq!(items[&todo[1].id].version, 1);
        assert_eq!(items[&todo[2].id].version, 2);
    }
}
