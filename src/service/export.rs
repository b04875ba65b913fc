//! Export projection consumed by the outbound export collaborator.
//!
//! Positions and board ids stay internal; rows keep canonical board order.

use crate::{
    domain::{BoardId, ColumnId, Item, ItemId},
    error::{HlaviError, Result},
    service::BoardService,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRow {
    pub id: ItemId,
    pub title: String,
    pub description: String,
    pub column: ColumnId,
    pub created_at: DateTime<Utc>,
}

impl From<Item> for ExportRow {
    fn from(item: Item) -> Self {
        Self {
            id: item.id,
            title: item.title,
            description: item.description,
            column: item.column,
            created_at: item.created_at,
        }
    }
}

/// Body handed to the export webhook
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportPayload {
    pub email: String,
    pub data: Vec<ExportRow>,
    pub timestamp: DateTime<Utc>,
    pub total_cards: usize,
}

impl BoardService {
    /// The board in canonical order, projected for export
    pub async fn export_snapshot(&self, board_id: &BoardId) -> Result<Vec<ExportRow>> {
        Ok(self
            .list_ordered(board_id)
            .await?
            .into_iter()
            .map(ExportRow::from)
            .collect())
    }

    /// Builds the payload sent to the export collaborator for `email`
    pub async fn export_payload(&self, email: &str, board_id: &BoardId) -> Result<ExportPayload> {
        validate_email(email)?;
        let data = self.export_snapshot(board_id).await?;
        tracing::info!(board = %board_id, rows = data.len(), "export payload built");

        Ok(ExportPayload {
            email: email.trim().to_string(),
            total_cards: data.len(),
            data,
            timestamp: Utc::now(),
        })
    }
}

fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(HlaviError::invalid(
            "email",
            format!("'{}' is not a valid address", email),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::service::CreateItem;
    use crate::storage::MemoryStorage;
    use std::sync::Arc;

    #[test]
    fn test_email_validation() {
        assert!(validate_email("ana@example.com").is_ok());
        assert!(validate_email("  ana@example.com ").is_ok());
        assert!(validate_email("ana").is_err());
        assert!(validate_email("@example.com").is_err());
        assert!(validate_email("ana@localhost").is_err());
        assert!(validate_email("ana@@example.com").is_err());
        assert!(validate_email("a na@example.com").is_err());
    }

    #[tokio::test]
    async fn test_export_hides_internal_fields() {
        let service = BoardService::new(Arc::new(MemoryStorage::new()), Config::default());
        service
            .create(None, CreateItem::new("B", "todo"))
            .await
            .unwrap();
        service
            .create(None, CreateItem::new("A", "backlog").with_description("first"))
            .await
            .unwrap();

        let payload = service
            .export_payload("ana@example.com", &BoardId::default())
            .await
            .unwrap();
        assert_eq!(payload.total_cards, 2);
        assert_eq!(payload.data[0].title, "A");
        assert_eq!(payload.data[0].description, "first");

        let json = serde_json::to_value(&payload).unwrap();
        assert!(json["data"][0].get("position").is_none());
        assert!(json["data"][0].get("boardId").is_none());
        assert!(json["data"][0].get("createdAt").is_some());
        assert_eq!(json["totalCards"], 2);
    }

    #[tokio::test]
    async fn test_export_rejects_bad_email() {
        let service = BoardService::new(Arc::new(MemoryStorage::new()), Config::default());
        let err = service
            .export_payload("nope", &BoardId::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HlaviError::InvalidArgument { .. }));
    }
}
