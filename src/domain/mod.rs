pub mod board;
pub mod item;
pub mod reorder;
pub mod sorting;

pub use board::{BoardConfig, BoardId, ColumnConfig, ColumnId, PartitionKey};
pub use item::{validate_position, validate_title, Item, ItemId};
pub use reorder::{
    plan_delete, plan_insert, plan_move, Direction, ReorderPlan, Shift, Target, WriteBatch,
    WriteOp,
};
pub use sorting::{compare_canonical, group_by_column, sort_canonical};
