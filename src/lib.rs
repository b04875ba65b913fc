//! # Hlavi Board
//!
//! Ordered columns and real-time synchronization for Hlavi kanban boards.
//!
//! Items live in `(board, column)` partitions whose positions are always the
//! dense range `0..k`. [`service::BoardService`] serializes mutations per
//! partition, persists them through an [`storage::OrderedStore`] and fans the
//! committed records out through a [`sync::SyncHub`]. Each connected viewer keeps
//! a [`client::ClientReconciler`] that applies its own changes optimistically and
//! merges everyone else's as they arrive.

pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod service;
pub mod storage;
pub mod sync;

// Re-export commonly used types
pub use client::{BoardApi, ClientReconciler, InProcessTransport, LocalBoard};
pub use config::Config;
pub use domain::{BoardConfig, BoardId, ColumnId, Item, ItemId, PartitionKey};
pub use error::{HlaviError, Result};
pub use service::{BoardService, CreateItem, MoveItem, UpdateItem};
pub use storage::{FileStorage, MemoryStorage, OrderedStore};
pub use sync::{SessionId, Subscription, SyncHub, SyncMessage};
