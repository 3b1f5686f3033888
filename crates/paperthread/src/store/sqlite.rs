//! SQLite-backed store. Messages live in an append-only log keyed by an
//! AUTOINCREMENT sequence, so reads are consistent with one total order per
//! document even when timestamps collide.

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{DocumentStore, MessageStore};
use crate::error::EngineError;
use crate::types::{Document, DocumentStatus, Message, MessageAuthor, MessagePage};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        name TEXT NOT NULL,
        status TEXT NOT NULL,
        storage_key TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS messages (
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL,
        document_id TEXT NOT NULL,
        author TEXT NOT NULL,
        text TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_messages_document ON messages(document_id, seq)",
];

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (creating if missing) the database at `database_url` and ensure
    /// the schema exists. `sqlite::memory:` is pinned to a single pooled
    /// connection so the database survives between queries.
    pub async fn connect(database_url: &str) -> Result<Self, EngineError> {
        let in_memory = database_url.contains(":memory:");
        if !in_memory {
            // Handles both "sqlite:data/foo.db" and bare path forms.
            let file_path = database_url
                .strip_prefix("sqlite://")
                .or_else(|| database_url.strip_prefix("sqlite:"))
                .unwrap_or(database_url);
            if let Some(parent) = std::path::Path::new(file_path).parent() {
                if !parent.as_os_str().is_empty() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| EngineError::Store(format!("cannot create {:?}: {}", parent, e)))?;
                }
            }
        }
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| EngineError::Store(format!("bad database url: {}", e)))?
            .create_if_missing(true);

        let mut pool_options = SqlitePoolOptions::new();
        if in_memory {
            pool_options = pool_options
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None);
        } else {
            pool_options = pool_options.max_connections(5);
        }

        let pool = pool_options.connect_with(options).await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        Ok(Self { pool })
    }
}

fn message_from_row(row: &SqliteRow) -> Result<Message, EngineError> {
    let id: String = row.get("id");
    let author: String = row.get("author");
    let created_at: String = row.get("created_at");
    Ok(Message {
        id: Uuid::parse_str(&id).map_err(|e| EngineError::Store(format!("bad message id: {}", e)))?,
        document_id: row.get("document_id"),
        author: MessageAuthor::parse(&author)
            .ok_or_else(|| EngineError::Store(format!("unknown author {:?}", author)))?,
        text: row.get("text"),
        created_at: parse_timestamp(&created_at)?,
        seq: row.get("seq"),
    })
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, EngineError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| EngineError::Store(format!("bad timestamp {:?}: {}", value, e)))
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn insert(&self, document: Document) -> Result<(), EngineError> {
        sqlx::query(
            "INSERT INTO documents (id, user_id, name, status, storage_key, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&document.id)
        .bind(&document.user_id)
        .bind(&document.name)
        .bind(document.status.as_str())
        .bind(&document.storage_key)
        .bind(document.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_owned(
        &self,
        document_id: &str,
        user_id: &str,
    ) -> Result<Option<Document>, EngineError> {
        let row = sqlx::query(
            "SELECT id, user_id, name, status, storage_key, created_at
             FROM documents WHERE id = ? AND user_id = ?",
        )
        .bind(document_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let status: String = row.get("status");
            let created_at: String = row.get("created_at");
            Ok(Document {
                id: row.get("id"),
                user_id: row.get("user_id"),
                name: row.get("name"),
                status: DocumentStatus::parse(&status)
                    .ok_or_else(|| EngineError::Store(format!("unknown status {:?}", status)))?,
                storage_key: row.get("storage_key"),
                created_at: parse_timestamp(&created_at)?,
            })
        })
        .transpose()
    }

    async fn delete(&self, document_id: &str) -> Result<(), EngineError> {
        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageStore for SqliteStore {
    async fn append(
        &self,
        document_id: &str,
        author: MessageAuthor,
        text: &str,
    ) -> Result<Message, EngineError> {
        let id = Uuid::new_v4();
        let created_at = Utc::now();

        let row = sqlx::query(
            "INSERT INTO messages (id, document_id, author, text, created_at)
             VALUES (?, ?, ?, ?, ?) RETURNING seq",
        )
        .bind(id.to_string())
        .bind(document_id)
        .bind(author.as_str())
        .bind(text)
        .bind(created_at.to_rfc3339())
        .fetch_one(&self.pool)
        .await?;

        Ok(Message {
            id,
            document_id: document_id.to_string(),
            author,
            text: text.to_string(),
            created_at,
            seq: row.get("seq"),
        })
    }

    async fn list_recent(
        &self,
        document_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, EngineError> {
        let rows = sqlx::query(
            "SELECT seq, id, document_id, author, text, created_at
             FROM messages WHERE document_id = ?
             ORDER BY seq DESC LIMIT ?",
        )
        .bind(document_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = rows
            .iter()
            .map(message_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        messages.reverse();
        Ok(messages)
    }

    async fn list_page(
        &self,
        document_id: &str,
        limit: usize,
        cursor: Option<i64>,
    ) -> Result<MessagePage, EngineError> {
        let bound = cursor.unwrap_or(i64::MAX);

        // Fetch one extra to learn whether an older page exists.
        let rows = sqlx::query(
            "SELECT seq, id, document_id, author, text, created_at
             FROM messages WHERE document_id = ? AND seq < ?
             ORDER BY seq DESC LIMIT ?",
        )
        .bind(document_id)
        .bind(bound)
        .bind(limit as i64 + 1)
        .fetch_all(&self.pool)
        .await?;

        let mut messages = rows
            .iter()
            .map(message_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let next_cursor = if messages.len() > limit {
            messages.truncate(limit);
            messages.last().map(|m| m.seq)
        } else {
            None
        };

        Ok(MessagePage {
            messages,
            next_cursor,
        })
    }

    async fn delete_for_document(&self, document_id: &str) -> Result<(), EngineError> {
        sqlx::query("DELETE FROM messages WHERE document_id = ?")
            .bind(document_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
