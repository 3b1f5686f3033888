//! Prompt assembly: fixed instruction, prior conversation, retrieved
//! context, then the question. Pure functions; no length management beyond
//! the caps the orchestrator already applied.

use crate::llm::ChatMessage;
use crate::types::{Message, MessageAuthor, RetrievedChunk};

pub const SYSTEM_PROMPT: &str = "Use the following pieces of context (or the previous conversation if needed) to answer the user's question in markdown format. If you don't know the answer, just say that you don't know, don't try to make up an answer.";

const BLOCK_SEPARATOR: &str = "\n----------------\n";

/// Build the completion request for one turn. History must already be
/// windowed and ordered oldest-first; chunks stay in retrieval order.
pub fn assemble(
    history: &[Message],
    chunks: &[RetrievedChunk],
    question: &str,
) -> Vec<ChatMessage> {
    let mut body = String::new();

    body.push_str("PREVIOUS CONVERSATION:\n");
    for message in history {
        let tag = match message.author {
            MessageAuthor::User => "User",
            MessageAuthor::Assistant => "Assistant",
        };
        body.push_str(&format!("{}: {}\n", tag, message.text));
    }

    body.push_str(BLOCK_SEPARATOR);
    body.push_str("\nCONTEXT:\n");
    let context: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    body.push_str(&context.join("\n\n"));
    body.push('\n');

    body.push_str(BLOCK_SEPARATOR);
    body.push_str(&format!("\nUSER INPUT: {}", question));

    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(body)]
}
