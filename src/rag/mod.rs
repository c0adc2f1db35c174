//! RAG (Retrieval-Augmented Generation) module.
//!
//! This module provides:
//! - `PassageChunker`: Splits record contexts and free text into overlapping chunks
//! - `PassageIndex`: Dense (or keyword fallback) top-k passage search
//! - `RAGContextBuilder`: Formats retrieved snippets into a cited context block

mod context_builder;
mod engine;
mod index;

use serde::{Deserialize, Serialize};

pub use context_builder::{RAGContextBuilder, Snippet};
pub use engine::{PassageChunker, TextChunk};
pub use index::PassageIndex;

/// Configuration for passage collection and context building.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Overlap between chunks
    pub chunk_overlap: usize,
    /// Maximum chunks collected per source
    pub max_chunks: usize,
    /// Maximum number of passages to include
    pub top_k: usize,
    /// Maximum total context length in characters
    pub max_context_length: usize,
    /// Whether to include source citations
    pub include_citations: bool,
    /// Similarity threshold (-1.0 to 1.0)
    pub similarity_threshold: f32,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            max_chunks: 20,
            top_k: 3,
            max_context_length: 4000,
            include_citations: true,
            similarity_threshold: 0.1,
        }
    }
}
