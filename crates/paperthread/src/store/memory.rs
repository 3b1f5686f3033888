//! In-memory store for tests and ephemeral deployments.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use uuid::Uuid;

use super::{DocumentStore, MessageStore};
use crate::error::EngineError;
use crate::types::{Document, Message, MessageAuthor, MessagePage};

#[derive(Default)]
pub struct InMemoryStore {
    documents: RwLock<HashMap<String, Document>>,
    /// Per-document logs; vec order equals insertion order.
    messages: RwLock<HashMap<String, Vec<Message>>>,
    next_seq: AtomicI64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn insert(&self, document: Document) -> Result<(), EngineError> {
        self.documents
            .write()
            .insert(document.id.clone(), document);
        Ok(())
    }

    async fn find_owned(
        &self,
        document_id: &str,
        user_id: &str,
    ) -> Result<Option<Document>, EngineError> {
        Ok(self
            .documents
            .read()
            .get(document_id)
            .filter(|d| d.user_id == user_id)
            .cloned())
    }

    async fn delete(&self, document_id: &str) -> Result<(), EngineError> {
        self.documents.write().remove(document_id);
        Ok(())
    }
}

#[async_trait]
impl MessageStore for InMemoryStore {
    async fn append(
        &self,
        document_id: &str,
        author: MessageAuthor,
        text: &str,
    ) -> Result<Message, EngineError> {
        let message = Message {
            id: Uuid::new_v4(),
            document_id: document_id.to_string(),
            author,
            text: text.to_string(),
            created_at: Utc::now(),
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst) + 1,
        };
        self.messages
            .write()
            .entry(document_id.to_string())
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn list_recent(
        &self,
        document_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, EngineError> {
        let guard = self.messages.read();
        let log = guard.get(document_id).map(Vec::as_slice).unwrap_or(&[]);
        let start = log.len().saturating_sub(limit);
        Ok(log[start..].to_vec())
    }

    async fn list_page(
        &self,
        document_id: &str,
        limit: usize,
        cursor: Option<i64>,
    ) -> Result<MessagePage, EngineError> {
        let guard = self.messages.read();
        let log = guard.get(document_id).map(Vec::as_slice).unwrap_or(&[]);
        let bound = cursor.unwrap_or(i64::MAX);

        // Fetch one extra to learn whether an older page exists.
        let mut page: Vec<Message> = log
            .iter()
            .rev()
            .filter(|m| m.seq < bound)
            .take(limit + 1)
            .cloned()
            .collect();

        let next_cursor = if page.len() > limit {
            page.truncate(limit);
            page.last().map(|m| m.seq)
        } else {
            None
        };

        Ok(MessagePage {
            messages: page,
            next_cursor,
        })
    }

    async fn delete_for_document(&self, document_id: &str) -> Result<(), EngineError> {
        self.messages.write().remove(document_id);
        Ok(())
    }
}
