use crate::{
    domain::{BoardId, Item, ItemId},
    error::Result,
    service::{BoardService, CreateItem, MoveItem, UpdateItem},
    sync::SessionId,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Request/response surface a client talks to
#[async_trait]
pub trait BoardApi: Send + Sync {
    /// Every item of the client's board in canonical order
    async fn list_items(&self) -> Result<Vec<Item>>;

    async fn create_item(&self, request: CreateItem) -> Result<Item>;

    async fn move_item(&self, id: &ItemId, request: MoveItem) -> Result<Item>;

    async fn update_item(&self, id: &ItemId, request: UpdateItem) -> Result<Item>;

    async fn delete_item(&self, id: &ItemId) -> Result<()>;
}

/// Calls a [`BoardService`] directly, tagging every mutation with the session
/// so the hub does not echo it back
pub struct InProcessTransport {
    service: Arc<BoardService>,
    session: SessionId,
    board: BoardId,
}

impl InProcessTransport {
    pub fn new(service: Arc<BoardService>, session: SessionId, board: BoardId) -> Self {
        Self {
            service,
            session,
            board,
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }
}

#[async_trait]
impl BoardApi for InProcessTransport {
    async fn list_items(&self) -> Result<Vec<Item>> {
        self.service.list_ordered(&self.board).await
    }

    async fn create_item(&self, mut request: CreateItem) -> Result<Item> {
        if request.board_id.is_none() {
            request.board_id = Some(self.board.clone());
        }
        self.service.create(Some(&self.session), request).await
    }

    async fn move_item(&self, id: &ItemId, request: MoveItem) -> Result<Item> {
        self.service.move_item(Some(&self.session), id, request).await
    }

    async fn update_item(&self, id: &ItemId, request: UpdateItem) -> Result<Item> {
        self.service.update(Some(&self.session), id, request).await
    }

    async fn delete_item(&self, id: &ItemId) -> Result<()> {
        self.service.delete(Some(&self.session), id).await
    }
}
