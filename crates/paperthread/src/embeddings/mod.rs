//! Embedding clients: raw text to fixed-dimension vectors.

pub mod remote;

pub use remote::RemoteEmbedder;

use async_trait::async_trait;

use crate::error::EngineError;

#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Embed one text into a fixed-dimension vector.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError>;

    /// Output vector dimension.
    fn dimension(&self) -> usize;
}
