//! Splitting conversations into extraction-sized chunks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Conversation;
use crate::error::{Error, Result};
use crate::types::{RawExtraction, RawMemory};

/// Rough characters-per-token ratio used for sizing.
const CHARS_PER_TOKEN: usize = 4;

/// Chunk sizing, in approximate tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1500,
            chunk_overlap: 200,
        }
    }
}

impl ChunkConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::invalid_config("chunk_size", "must be greater than zero"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::invalid_config(
                "chunk_overlap",
                format!("must be smaller than chunk_size ({})", self.chunk_size),
            ));
        }
        Ok(())
    }
}

/// A slice of one conversation handed to an extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationChunk {
    pub conversation_id: String,
    pub title: String,
    pub chunk_index: usize,
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl ConversationChunk {
    /// Wrap extractor output for this chunk, keeping the chunk as excerpt.
    pub fn to_extraction(&self, memories: Vec<RawMemory>) -> RawExtraction {
        RawExtraction {
            conversation_id: self.conversation_id.clone(),
            conversation_title: Some(self.title.clone()),
            chunk_index: self.chunk_index,
            created_at: self.created_at,
            excerpt: Some(self.text.clone()),
            memories,
        }
    }
}

/// Render a conversation as plain text: a title line, then one
/// `ROLE: content` block per message.
pub fn render_conversation(conversation: &Conversation) -> String {
    let mut text = format!("Title: {}", conversation.title);
    for message in &conversation.messages {
        text.push_str("\n\n");
        text.push_str(&message.role.to_uppercase());
        text.push_str(": ");
        text.push_str(&message.content);
    }
    text
}

/// Split a conversation into overlapping chunks.
///
/// Chunk boundaries prefer the last newline, then the last period, found
/// past the middle of the window. Every character of the rendered text lands
/// in at least one chunk and each chunk starts strictly after the previous one.
pub fn conversation_chunks(conversation: &Conversation, config: &ChunkConfig) -> Vec<ConversationChunk> {
    split_text(&render_conversation(conversation), config)
        .into_iter()
        .enumerate()
        .map(|(chunk_index, text)| ConversationChunk {
            conversation_id: conversation.id.clone(),
            title: conversation.title.clone(),
            chunk_index,
            text,
            created_at: conversation.created_at,
        })
        .collect()
}

/// Split text into trimmed, non-empty chunks.
pub fn split_text(text: &str, config: &ChunkConfig) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let len = chars.len();
    let window = config.chunk_size.max(1) * CHARS_PER_TOKEN;
    let overlap = config.chunk_overlap * CHARS_PER_TOKEN;

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < len {
        let mut end = (start + window).min(len);

        if end < len {
            let midpoint = start + window / 2;
            let slice = &chars[start..end];
            if let Some(pos) = slice.iter().rposition(|&c| c == '\n').filter(|&p| start + p > midpoint) {
                end = start + pos;
            } else if let Some(pos) = slice.iter().rposition(|&c| c == '.').filter(|&p| start + p > midpoint) {
                end = start + pos + 1;
            }
        }

        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }

        if end >= len {
            break;
        }
        let next = end.saturating_sub(overlap);
        start = if next > start { next } else { end };
    }
    chunks
}
