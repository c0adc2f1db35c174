//! Typed lab configuration.
//!
//! `LabConfig` is the one configuration object handed explicitly to every
//! component that needs the label mapping, markers or retrieval parameters.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::core::errors::LabError;
use crate::corpus::Split;
use crate::llm::types::DecodingParams;
use crate::rag::RagConfig;
use crate::retrieval::RetrievalMode;

/// Fixed mapping from gold-label values to the closed answer symbol set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnswerMapping {
    entries: BTreeMap<String, char>,
}

impl AnswerMapping {
    pub fn new<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, char)>,
        S: Into<String>,
    {
        Self {
            entries: pairs.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }

    pub fn symbol_for(&self, label: &str) -> Result<char, LabError> {
        self.entries.get(label).copied().ok_or_else(|| {
            LabError::InvalidLabel(format!("'{}' is not in the answer mapping", label))
        })
    }

    /// Options ordered by symbol, e.g. `[('A', "yes"), ('B', "no"), ('C', "maybe")]`.
    pub fn options(&self) -> Vec<(char, &str)> {
        let mut options: Vec<(char, &str)> = self
            .entries
            .iter()
            .map(|(label, symbol)| (*symbol, label.as_str()))
            .collect();
        options.sort_by_key(|(symbol, _)| *symbol);
        options
    }

    pub fn labels(&self) -> Vec<String> {
        self.options()
            .into_iter()
            .map(|(_, label)| label.to_string())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn validate(&self) -> Result<(), LabError> {
        if self.entries.is_empty() {
            return Err(LabError::Config("answer_mapping must not be empty".to_string()));
        }
        let mut seen = HashSet::new();
        for (label, symbol) in &self.entries {
            if !seen.insert(*symbol) {
                return Err(LabError::Config(format!(
                    "answer_mapping symbol '{}' is used more than once (label '{}')",
                    symbol, label
                )));
            }
        }
        Ok(())
    }
}

impl Default for AnswerMapping {
    fn default() -> Self {
        Self::new([("yes", 'A'), ("no", 'B'), ("maybe", 'C')])
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub instruction: String,
    pub rationale_marker: String,
    pub answer_marker: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            instruction: "You are a helpful medical expert. Answer the question using the options \
                          provided. Think step by step, then reply with a JSON object of the form \
                          {\"step_by_step_thinking\": \"...\", \"answer_choice\": \"X\"}."
                .to_string(),
            rationale_marker: "step_by_step_thinking".to_string(),
            answer_marker: "answer_choice".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub mode: RetrievalMode,
    /// Upper bound on neighbors per query; `None` keeps every match.
    pub k: Option<usize>,
    pub num_shots: usize,
    pub seed: u64,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            mode: RetrievalMode::Similarity,
            k: Some(8),
            num_shots: 3,
            seed: 42,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub base_url: String,
    pub model: String,
    pub embedding_model: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub max_concurrency: usize,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1234/v1".to_string(),
            model: "qwen/qwen3-8b".to_string(),
            embedding_model: None,
            api_key: None,
            timeout_secs: 120,
            max_concurrency: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    pub train: Split,
    pub test: Split,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            train: Split::new(0, 450),
            test: Split::new(450, 500),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LabConfig {
    pub answer_mapping: AnswerMapping,
    pub prompt: PromptConfig,
    pub retrieval: RetrievalConfig,
    pub rag: RagConfig,
    pub decoding: DecodingParams,
    pub generator: GeneratorConfig,
    pub splits: SplitConfig,
}

impl LabConfig {
    /// Cross-field checks that the per-field validation cannot express.
    pub fn validate(&self) -> Result<(), LabError> {
        self.answer_mapping.validate()?;
        self.decoding.validate()?;

        if self.prompt.rationale_marker.trim().is_empty()
            || self.prompt.answer_marker.trim().is_empty()
        {
            return Err(LabError::Config("prompt markers must not be empty".to_string()));
        }
        if self.prompt.rationale_marker == self.prompt.answer_marker {
            return Err(LabError::Config(
                "rationale_marker and answer_marker must differ".to_string(),
            ));
        }

        let SplitConfig { train, test } = &self.splits;
        if train.is_empty() || test.is_empty() {
            return Err(LabError::Config("split ranges must not be empty".to_string()));
        }
        if train.overlaps(test) {
            return Err(LabError::Config(format!(
                "train split {} overlaps test split {}",
                train, test
            )));
        }

        if let Some(k) = self.retrieval.k {
            if k < self.retrieval.num_shots {
                return Err(LabError::Config(format!(
                    "retrieval.k ({}) is below retrieval.num_shots ({})",
                    k, self.retrieval.num_shots
                )));
            }
        }

        if self.generator.max_concurrency == 0 {
            return Err(LabError::Config(
                "generator.max_concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
