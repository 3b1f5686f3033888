//! Streaming token transport between providers and callers.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::Stream;
use tokio::sync::mpsc;

use crate::error::EngineError;

/// Item type flowing through a token stream.
pub type TokenResult = Result<String, EngineError>;

/// Ordered stream of answer tokens backed by an mpsc channel. The channel
/// closing without an `Err` item is a clean completion.
#[derive(Debug)]
pub struct TokenStream {
    receiver: mpsc::Receiver<TokenResult>,
}

impl TokenStream {
    pub fn new(receiver: mpsc::Receiver<TokenResult>) -> Self {
        Self { receiver }
    }

    /// Get the next token.
    pub async fn next(&mut self) -> Option<TokenResult> {
        self.receiver.recv().await
    }

    /// Collect the full text, returning the first stream error if any.
    pub async fn collect(mut self) -> Result<String, EngineError> {
        let mut result = String::new();
        while let Some(item) = self.next().await {
            result.push_str(&item?);
        }
        Ok(result)
    }
}

impl Stream for TokenStream {
    type Item = TokenResult;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}
