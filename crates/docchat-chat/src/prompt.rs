//! Prompt assembly.

use docchat_core::{ChatMessage, ChatRequest, Chunk, Message};
use std::fmt::Write;

/// Instruction sent first in every request.
pub const SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Answer the user's question based on the context provided.";

/// Render retrieved chunks as numbered passages with their provenance.
///
/// ```text
/// [1] (source: syllabus.pdf, page 2)
/// Office hours are on Tuesdays.
/// ```
pub fn format_context(chunks: &[Chunk]) -> String {
    let mut out = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        if i > 0 {
            out.push_str("\n\n");
        }
        let source = chunk.source_file().unwrap_or("unknown");
        let _ = write!(out, "[{}] (source: {}", i + 1, source);
        if let Some(page) = chunk.page() {
            let _ = write!(out, ", page {page}");
        }
        let _ = write!(out, ")\n{}", chunk.text.trim());
    }
    out
}

/// Assemble the request for one turn: instructions, context, prior turns,
/// then the new question.
pub fn build_request(history: &[Message], context: &[Chunk], question: &str) -> ChatRequest {
    let mut request = ChatRequest::default();
    request
        .system(SYSTEM_PROMPT)
        .system(format!("Relevant Context: {}", format_context(context)));
    request
        .messages
        .extend(history.iter().map(ChatMessage::from));
    request.user(question);
    request
}
