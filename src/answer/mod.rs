//! Parsed generation results.

mod parser;

use serde::{Deserialize, Serialize};

use crate::rag::Snippet;

pub use parser::{clean, AnswerParser, ParsedAnswer};

/// The retained result for one (record, method) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub id: String,
    pub method: String,
    pub predicted: char,
    #[serde(default)]
    pub rationale: Option<String>,
    /// Passages the prompt was augmented with, RAG methods only.
    #[serde(default)]
    pub snippets: Vec<Snippet>,
    pub prompt_fingerprint: String,
}

impl Answer {
    pub fn from_parsed(
        id: impl Into<String>,
        method: impl Into<String>,
        parsed: ParsedAnswer,
        snippets: Vec<Snippet>,
        prompt_fingerprint: impl Into<String>,
    ) -> Self {
        let rationale = Some(parsed.rationale).filter(|r| !r.trim().is_empty());
        Self {
            id: id.into(),
            method: method.into(),
            predicted: parsed.symbol,
            rationale,
            snippets,
            prompt_fingerprint: prompt_fingerprint.into(),
        }
    }
}
