//! Vector index adapters. One namespace per document keeps retrieval
//! strictly scoped: a query never sees another document's chunks.

pub mod memory;
pub mod remote;

pub use memory::MemoryVectorIndex;
pub use remote::RemoteVectorIndex;

use async_trait::async_trait;

use crate::error::EngineError;
use crate::types::RetrievedChunk;

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// The `k` chunks most similar to `vector` within `namespace`, ordered
    /// by decreasing score. A missing namespace is `EngineError::Retrieval`.
    async fn similarity_search(
        &self,
        namespace: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, EngineError>;

    /// Remove every vector in `namespace` (document deletion cascade).
    async fn delete_namespace(&self, namespace: &str) -> Result<(), EngineError>;
}
