//! Failure taxonomy for the conversation engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// No caller identity was supplied.
    #[error("caller is not authenticated")]
    Unauthorized,

    /// Malformed request; rejected before any side effect.
    #[error("invalid request: {0}")]
    Validation(String),

    /// Document missing or not owned by the caller. The two cases are
    /// indistinguishable on purpose.
    #[error("document not found")]
    DocumentNotFound,

    /// Vector index unavailable or namespace missing. The orchestrator
    /// degrades to an empty context block instead of failing the turn.
    #[error("retrieval unavailable: {0}")]
    Retrieval(String),

    /// Embedding or completion provider call failed. Aborts the turn.
    #[error("provider call failed: {0}")]
    Provider(String),

    /// Message or document store failure.
    #[error("store operation failed: {0}")]
    Store(String),
}

impl From<sqlx::Error> for EngineError {
    fn from(e: sqlx::Error) -> Self {
        EngineError::Store(e.to_string())
    }
}
