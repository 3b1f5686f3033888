use serde::{Deserialize, Serialize};

use crate::chat::TurnOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub database_url: String,
    pub embedding: EmbeddingConfig,
    pub completion: CompletionConfig,
    pub index: IndexConfig,
    pub turn: TurnOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub dimension: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub top_p: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Host of the vector index (one index, many per-document namespaces).
    pub base_url: String,
    pub api_key: String,
}

impl EngineConfig {
    /// Load configuration from environment variables, falling back to
    /// defaults for everything except credentials.
    pub fn from_env() -> Result<Self, String> {
        fn required(name: &str) -> Result<String, String> {
            std::env::var(name).map_err(|_| format!("{} is not set", name))
        }
        fn optional(name: &str, default: &str) -> String {
            std::env::var(name).unwrap_or_else(|_| default.to_string())
        }

        let openai_key = required("OPENAI_API_KEY")?;
        let defaults = Self::default();

        let config = Self {
            database_url: optional("DATABASE_URL", &defaults.database_url),
            embedding: EmbeddingConfig {
                base_url: optional("EMBEDDING_BASE_URL", &defaults.embedding.base_url),
                api_key: openai_key.clone(),
                model: optional("EMBEDDING_MODEL", &defaults.embedding.model),
                dimension: defaults.embedding.dimension,
            },
            completion: CompletionConfig {
                base_url: optional("COMPLETION_BASE_URL", &defaults.completion.base_url),
                api_key: openai_key,
                model: optional("CHAT_MODEL", &defaults.completion.model),
                ..defaults.completion
            },
            index: IndexConfig {
                base_url: required("VECTOR_INDEX_URL")?,
                api_key: required("VECTOR_INDEX_API_KEY")?,
            },
            turn: defaults.turn,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate config values, returning errors for clearly broken
    /// configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.embedding.dimension == 0 {
            return Err("embedding.dimension must be > 0".into());
        }
        if self.completion.max_tokens == 0 {
            return Err("completion.max_tokens must be > 0".into());
        }
        if !(0.0..=2.0).contains(&self.completion.temperature) {
            return Err("completion.temperature must be in [0.0, 2.0]".into());
        }
        if self.turn.context_chunks == 0 {
            return Err("turn.context_chunks must be > 0".into());
        }
        if self.turn.max_message_len == 0 {
            return Err("turn.max_message_len must be > 0".into());
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:data/paperthread.db".to_string(),
            embedding: EmbeddingConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: String::new(),
                model: "text-embedding-3-small".to_string(),
                dimension: 1536,
            },
            completion: CompletionConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: String::new(),
                model: "gpt-3.5-turbo".to_string(),
                max_tokens: 1024,
                // Answers must stay grounded in retrieved context, so
                // sampling is pinned deterministic.
                temperature: 0.0,
                top_p: 1.0,
            },
            index: IndexConfig {
                base_url: String::new(),
                api_key: String::new(),
            },
            turn: TurnOptions::default(),
        }
    }
}
