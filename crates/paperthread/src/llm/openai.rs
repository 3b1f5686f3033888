//! OpenAI-compatible chat completions over SSE streaming.

use async_trait::async_trait;
use futures_util::stream::StreamExt;
use reqwest::Client;
use serde_json::json;
use tokio::sync::mpsc;

use super::{ChatMessage, CompletionProvider, GenerationConfig, TokenResult, TokenStream};
use crate::config::CompletionConfig;
use crate::error::EngineError;

pub struct OpenAiCompletions {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl OpenAiCompletions {
    pub fn new(config: &CompletionConfig) -> Result<Self, EngineError> {
        let client = Client::builder()
            .connect_timeout(std::time::Duration::from_secs(15))
            .timeout(std::time::Duration::from_secs(300))
            .pool_idle_timeout(std::time::Duration::from_secs(90))
            .tcp_nodelay(true)
            .build()
            .map_err(|e| EngineError::Provider(format!("completion client init failed: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAiCompletions {
    async fn stream_chat(
        &self,
        messages: &[ChatMessage],
        config: &GenerationConfig,
    ) -> Result<TokenStream, EngineError> {
        let endpoint = format!("{}/chat/completions", self.base_url);
        let request = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": config.max_tokens,
            "temperature": config.temperature,
            "top_p": config.top_p,
            "stream": true,
        });

        let response = self
            .client
            .post(&endpoint)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::Provider(format!("request to {} timed out", endpoint))
                } else if e.is_connect() {
                    EngineError::Provider(format!("failed to connect to {}: {}", endpoint, e))
                } else {
                    EngineError::Provider(format!("request to {} failed: {}", endpoint, e))
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Provider(format!(
                "completion API error ({}): {}",
                status, body
            )));
        }

        let (tx, rx) = mpsc::channel(100);
        tokio::spawn(relay_sse(response, tx));
        Ok(TokenStream::new(rx))
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Forward SSE content deltas into the token channel. Events can split
/// across transport chunks, so lines are drained from a carry-over buffer.
async fn relay_sse(response: reqwest::Response, tx: mpsc::Sender<TokenResult>) {
    let mut stream = response.bytes_stream();
    let mut buffer = String::new();

    while let Some(chunk_result) = stream.next().await {
        match chunk_result {
            Ok(chunk) => {
                buffer.push_str(&String::from_utf8_lossy(&chunk));
                while let Some(pos) = buffer.find('\n') {
                    let line: String = buffer.drain(..=pos).collect();
                    let line = line.trim_end();
                    if let Some(data) = line.strip_prefix("data: ") {
                        if data == "[DONE]" {
                            return;
                        }
                        if let Ok(parsed) = serde_json::from_str::<serde_json::Value>(data) {
                            if let Some(content) =
                                parsed["choices"][0]["delta"]["content"].as_str()
                            {
                                if tx.send(Ok(content.to_string())).await.is_err() {
                                    return;
                                }
                            }
                        }
                    }
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "completion stream interrupted");
                let _ = tx
                    .send(Err(EngineError::Provider(format!(
                        "stream interrupted: {}",
                        e
                    ))))
                    .await;
                return;
            }
        }
    }
}
