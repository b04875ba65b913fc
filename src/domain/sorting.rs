use crate::domain::board::ColumnId;
use crate::domain::item::Item;
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// Canonical board order: column id ascending, then position ascending.
///
/// Ties (which only appear if a partition is corrupt) fall back to creation time
/// and then id so the order stays deterministic.
pub fn compare_canonical(a: &Item, b: &Item) -> Ordering {
    a.column
        .cmp(&b.column)
        .then(a.position.cmp(&b.position))
        .then(a.created_at.cmp(&b.created_at))
        .then(a.id.cmp(&b.id))
}

/// Sorts items in place into canonical board order
///
/// # Examples
/// ```
/// use hlavi_board::domain::sorting::sort_canonical;
/// use hlavi_board::domain::{BoardId, Item, ItemId};
///
/// let mut items = vec![
///     Item::new(ItemId::new(), BoardId::default(), "todo".into(), 1, "B".to_string()),
///     Item::new(ItemId::new(), BoardId::default(), "done".into(), 0, "X".to_string()),
///     Item::new(ItemId::new(), BoardId::default(), "todo".into(), 0, "A".to_string()),
/// ];
///
/// sort_canonical(&mut items);
/// assert_eq!(items[0].title, "X");
/// assert_eq!(items[1].title, "A");
/// ```
pub fn sort_canonical(items: &mut [Item]) {
    items.sort_by(compare_canonical);
}

/// Groups items by column, each column in position order
pub fn group_by_column<'a>(
    items: impl IntoIterator<Item = &'a Item>,
) -> BTreeMap<ColumnId, Vec<&'a Item>> {
    let mut columns: BTreeMap<ColumnId, Vec<&'a Item>> = BTreeMap::new();
    for item in items {
        columns.entry(item.column.clone()).or_default().push(item);
    }
    for column in columns.values_mut() {
        column.sort_by(|a, b| compare_canonical(a, b));
    }
    columns
}
