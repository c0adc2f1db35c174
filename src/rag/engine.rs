//! Passage collection and chunking.
//!
//! Collects text chunks from:
//! - Record contexts (the dataset's own abstracts)
//! - Direct text input

use serde::{Deserialize, Serialize};

use super::RagConfig;
use crate::corpus::Record;

/// A text chunk with source information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    /// The text content
    pub text: String,
    /// Source identifier (record id, filename, etc.)
    pub source: String,
    /// Character offset in original document
    pub start_offset: usize,
    /// Chunk index within the source
    pub chunk_index: usize,
}

/// Splits source text into overlapping passages.
pub struct PassageChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    max_chunks: usize,
}

impl PassageChunker {
    pub fn new(config: &RagConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            chunk_overlap: config.chunk_overlap,
            max_chunks: config.max_chunks.max(1),
        }
    }

    /// Chunk every context paragraph of every record; source is the record id.
    pub fn collect_from_records(&self, records: &[Record]) -> Vec<TextChunk> {
        records
            .iter()
            .flat_map(|record| {
                let joined = record.contexts.join("\n");
                self.collect_from_text(&joined, &record.id)
            })
            .collect()
    }

    /// Collect chunks from text content.
    pub fn collect_from_text(&self, text: &str, source: &str) -> Vec<TextChunk> {
        let mut chunks = Vec::new();
        let chars: Vec<char> = text.chars().collect();
        let total_chars = chars.len();

        if total_chars == 0 {
            return chunks;
        }

        let step = self.chunk_size.saturating_sub(self.chunk_overlap).max(1);
        let mut start = 0;
        let mut chunk_index = 0;

        while start < total_chars && chunks.len() < self.max_chunks {
            let end = (start + self.chunk_size).min(total_chars);
            let chunk_text: String = chars[start..end].iter().collect();

            // Try to break at sentence boundary
            let final_text = if end < total_chars {
                find_sentence_boundary(&chunk_text)
            } else {
                chunk_text
            };

            let trimmed = final_text.trim();
            if !trimmed.is_empty() {
                chunks.push(TextChunk {
                    text: trimmed.to_string(),
                    source: source.to_string(),
                    start_offset: start,
                    chunk_index,
                });
                chunk_index += 1;
            }

            if end == total_chars {
                break;
            }
            start += step;
        }

        chunks
    }
}

/// Cut at the last sentence ending in the final fifth of the chunk, if any.
fn find_sentence_boundary(text: &str) -> String {
    let sentence_endings = [". ", "! ", "? ", ".\n", "!\n", "?\n"];

    let mut search_start = (text.len() * 80) / 100;
    while !text.is_char_boundary(search_start) {
        search_start += 1;
    }
    let search_text = &text[search_start..];

    for ending in sentence_endings.iter() {
        if let Some(pos) = search_text.rfind(ending) {
            let cut_pos = search_start + pos + ending.len();
            return text[..cut_pos].to_string();
        }
    }

    text.to_string()
}
