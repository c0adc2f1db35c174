//! RAG Context Builder.
//!
//! Formats retrieved snippets into a context block with numbered citations,
//! bounded by a maximum character length.

use serde::{Deserialize, Serialize};

use super::RagConfig;

/// A retrieved passage with its similarity score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snippet {
    pub source: String,
    pub text: String,
    pub score: f32,
}

/// Builds the context block that precedes the target question.
pub struct RAGContextBuilder {
    max_context_length: usize,
    include_citations: bool,
}

impl RAGContextBuilder {
    pub fn new(config: &RagConfig) -> Self {
        Self {
            max_context_length: config.max_context_length,
            include_citations: config.include_citations,
        }
    }

    /// Snippets that fit within the length budget, in order.
    pub fn fit<'a>(&self, snippets: &'a [Snippet]) -> &'a [Snippet] {
        let mut current_length = 0;
        for (i, snippet) in snippets.iter().enumerate() {
            // Extra for the citation header
            let addition_length = snippet.text.len() + 50;
            if current_length + addition_length > self.max_context_length {
                return &snippets[..i];
            }
            current_length += addition_length;
        }
        snippets
    }

    /// Format snippets into a context string.
    pub fn format_context(&self, snippets: &[Snippet]) -> String {
        let mut context = String::new();

        for (i, snippet) in self.fit(snippets).iter().enumerate() {
            if self.include_citations {
                context.push_str(&format!(
                    "[{}] (Source: {}, relevance: {:.2})\n{}\n\n",
                    i + 1,
                    snippet.source,
                    snippet.score,
                    snippet.text
                ));
            } else {
                context.push_str(&snippet.text);
                context.push_str("\n\n");
            }
        }

        context.trim().to_string()
    }
}
