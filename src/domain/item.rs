use crate::domain::board::{BoardId, ColumnId, PartitionKey};
use crate::error::HlaviError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use uuid::Uuid;

/// Unique identifier for a board item
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(Uuid);

impl ItemId {
    /// Generates a fresh random id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ItemId {
    fn default() -> Self {
        Self::new()
    }
}

impl FromStr for ItemId {
    type Err = HlaviError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| HlaviError::invalid("id", format!("'{}' is not a valid item id", s)))
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A card held in one column of a board
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub column: ColumnId,
    pub position: u32,
    #[serde(default)]
    pub board_id: BoardId,
    /// Count of writes that targeted this item. Sibling shifts do not bump it.
    #[serde(default = "initial_version")]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn initial_version() -> u64 {
    1
}

impl Item {
    /// Creates a new item at the given placement
    pub fn new(
        id: ItemId,
        board_id: BoardId,
        column: ColumnId,
        position: u32,
        title: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            title,
            description: String::new(),
            column,
            position,
            board_id,
            version: initial_version(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// The partition this item currently lives in
    pub fn partition(&self) -> PartitionKey {
        PartitionKey::new(self.board_id.clone(), self.column.clone())
    }

    /// Sets the title
    pub fn set_title(&mut self, title: String) {
        self.title = title;
        self.touch();
    }

    /// Sets the description
    pub fn set_description(&mut self, description: String) {
        self.description = description;
        self.touch();
    }

    /// Moves the item to a new placement within its board
    pub fn place(&mut self, column: ColumnId, position: u32) {
        self.column = column;
        self.position = position;
        self.touch();
    }

    fn touch(&mut self) {
        self.version += 1;
        self.updated_at = Utc::now();
    }
}

/// Rejects titles that are empty once trimmed
pub fn validate_title(title: &str) -> Result<(), HlaviError> {
    if title.trim().is_empty() {
        return Err(HlaviError::invalid("title", "must not be empty"));
    }
    Ok(())
}

/// Converts a caller-supplied position into a store position
pub fn validate_position(position: i64) -> Result<u32, HlaviError> {
    if position < 0 {
        return Err(HlaviError::invalid(
            "position",
            format!("must not be negative, got {}", position),
        ));
    }
    // Anything past u32::MAX is clamped to the end of the column anyway.
    Ok(u32::try_from(position).unwrap_or(u32::MAX))
}
