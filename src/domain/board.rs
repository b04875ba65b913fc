use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier partitioning items into independent boards
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoardId(String);

impl BoardId {
    const DEFAULT: &'static str = "default";

    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for BoardId {
    fn default() -> Self {
        Self(Self::DEFAULT.to_string())
    }
}

impl fmt::Display for BoardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for BoardId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Column identifier. Opaque to the ordering engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnId(String);

impl ColumnId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for ColumnId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ColumnId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// A `(board, column)` pair. Positions are dense within a partition.
///
/// Ordering is board first, then column name; lock acquisition relies on it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionKey {
    pub board_id: BoardId,
    pub column: ColumnId,
}

impl PartitionKey {
    pub fn new(board_id: BoardId, column: ColumnId) -> Self {
        Self { board_id, column }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.board_id, self.column)
    }
}

/// Configuration for a board column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnConfig {
    pub id: ColumnId,
    pub name: String,
}

impl ColumnConfig {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: ColumnId::new(id),
            name: name.to_string(),
        }
    }
}

/// Board configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardConfig {
    pub name: String,
    pub columns: Vec<ColumnConfig>,
    /// Reject columns that are not listed in `columns`
    #[serde(default)]
    pub strict_columns: bool,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            name: "Default Board".to_string(),
            columns: vec![
                ColumnConfig::new("backlog", "Backlog"),
                ColumnConfig::new("todo", "To Do"),
                ColumnConfig::new("in-progress", "In Progress"),
                ColumnConfig::new("review", "Review"),
                ColumnConfig::new("done", "Done"),
            ],
            strict_columns: false,
        }
    }
}

impl BoardConfig {
    /// Gets the column configuration for an id
    pub fn find_column(&self, id: &ColumnId) -> Option<&ColumnConfig> {
        self.columns.iter().find(|col| &col.id == id)
    }

    /// Checks whether items may be placed in the column
    pub fn accepts_column(&self, id: &ColumnId) -> bool {
        !id.is_empty() && (!self.strict_columns || self.find_column(id).is_some())
    }
}
