//! Conversation storage: documents and their append-only message logs.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryStore;
pub use sqlite::SqliteStore;

use async_trait::async_trait;

use crate::error::EngineError;
use crate::types::{Document, Message, MessageAuthor, MessagePage};

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a document record (called by the upload pipeline).
    async fn insert(&self, document: Document) -> Result<(), EngineError>;

    /// Resolve a document only if it exists AND belongs to `user_id`.
    /// Missing and not-owned are indistinguishable by design.
    async fn find_owned(
        &self,
        document_id: &str,
        user_id: &str,
    ) -> Result<Option<Document>, EngineError>;

    /// Remove the document row. Message and namespace cleanup is the
    /// caller's cascade.
    async fn delete(&self, document_id: &str) -> Result<(), EngineError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Append one turn to the document's log.
    async fn append(
        &self,
        document_id: &str,
        author: MessageAuthor,
        text: &str,
    ) -> Result<Message, EngineError>;

    /// The `limit` most recent messages, returned oldest-first.
    async fn list_recent(
        &self,
        document_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, EngineError>;

    /// Reverse-chronological page; `cursor` is a `seq` from a prior page and
    /// the page contains messages strictly older than it.
    async fn list_page(
        &self,
        document_id: &str,
        limit: usize,
        cursor: Option<i64>,
    ) -> Result<MessagePage, EngineError>;

    /// Drop every message for a document (deletion cascade).
    async fn delete_for_document(&self, document_id: &str) -> Result<(), EngineError>;
}
