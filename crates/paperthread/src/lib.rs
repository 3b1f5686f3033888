pub mod chat;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod llm;
pub mod store;
pub mod types;

// Re-export primary types for convenience
pub use chat::{ConversationEngine, TurnOptions};
pub use config::EngineConfig;
pub use error::EngineError;
pub use llm::{ChatMessage, ChatRole, GenerationConfig, TokenStream};
pub use types::{
    Document, DocumentStatus, Message, MessageAuthor, MessagePage, RetrievedChunk, TurnRequest,
};
