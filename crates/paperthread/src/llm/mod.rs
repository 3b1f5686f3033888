//! Hosted chat-completion providers and token streaming.

pub mod openai;
pub mod streaming;

pub use openai::OpenAiCompletions;
pub use streaming::{TokenResult, TokenStream};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::CompletionConfig;
use crate::error::EngineError;

/// A role-tagged message in the completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// Sampling parameters for one completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1024,
            temperature: 0.0,
            top_p: 1.0,
        }
    }
}

impl From<&CompletionConfig> for GenerationConfig {
    fn from(config: &CompletionConfig) -> Self {
        Self {
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
        }
    }
}

#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Stream a chat completion. The request itself (connection + HTTP
    /// status) is checked before the stream is returned, so a failure
    /// before any token arrives is a direct `Err`. Failures after that
    /// arrive as an `Err` item on the stream; a stream that closes without
    /// one is a clean completion.
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
    ) -> Result<TokenStream, EngineError>;

    /// Model identifier for logging.
    fn model(&self) -> &str;
}
