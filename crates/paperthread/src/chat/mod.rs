//! Conversation orchestration: one user turn in, one streamed answer out.

pub mod engine;
pub mod prompt;

pub use engine::ConversationEngine;

use serde::{Deserialize, Serialize};

/// Caps applied to every turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOptions {
    /// Chunks retrieved into the context block.
    pub context_chunks: usize,
    /// Prior messages rendered into the prompt.
    pub history_window: usize,
    /// Upper bound on inbound message length, bytes.
    pub max_message_len: usize,
}

impl Default for TurnOptions {
    fn default() -> Self {
        Self {
            context_chunks: 4,
            history_window: 6,
            max_message_len: 32 * 1024,
        }
    }
}
