//! Hosted vector index client (Pinecone-style HTTP API). Chunk text rides
//! in vector metadata under the `"text"` key.

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use super::VectorIndex;
use crate::config::IndexConfig;
use crate::error::EngineError;
use crate::types::RetrievedChunk;

pub struct RemoteVectorIndex {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RemoteVectorIndex {
    pub fn new(config: &IndexConfig) -> Result<Self, EngineError> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(15))
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| EngineError::Retrieval(format!("index client init failed: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl VectorIndex for RemoteVectorIndex {
    async fn similarity_search(
        &self,
        namespace: &str,
        vector: &[f32],
        k: usize,
    ) -> Result<Vec<RetrievedChunk>, EngineError> {
        let endpoint = format!("{}/query", self.base_url);
        let request = json!({
            "namespace": namespace,
            "vector": vector,
            "topK": k,
            "includeMetadata": true,
        });

        let response = self
            .client
            .post(&endpoint)
            .header("Api-Key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::Retrieval(format!("query to {} failed: {}", endpoint, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Retrieval(format!(
                "index query error ({}): {}",
                status, body
            )));
        }

        let parsed: serde_json::Value = response
            .json()
            .await
            .map_err(|e| EngineError::Retrieval(format!("bad index response: {}", e)))?;

        let matches = parsed["matches"]
            .as_array()
            .ok_or_else(|| EngineError::Retrieval("index response missing matches".into()))?;

        let chunks = matches
            .iter()
            .filter_map(|m| {
                let text = m["metadata"]["text"].as_str()?;
                let score = m["score"].as_f64().unwrap_or(0.0) as f32;
                Some(RetrievedChunk {
                    text: text.to_string(),
                    score,
                })
            })
            .collect();

        Ok(chunks)
    }

    async fn delete_namespace(&self, namespace: &str) -> Result<(), EngineError> {
        let endpoint = format!("{}/vectors/delete", self.base_url);
        let request = json!({
            "namespace": namespace,
            "deleteAll": true,
        });

        let response = self
            .client
            .post(&endpoint)
            .header("Api-Key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| EngineError::Retrieval(format!("delete on {} failed: {}", endpoint, e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Retrieval(format!(
                "namespace delete error ({}): {}",
                status, body
            )));
        }

        Ok(())
    }
}
