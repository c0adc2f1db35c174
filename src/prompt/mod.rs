//! Prompt assembly for vanilla, few-shot and retrieval-augmented prompts.

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::core::config::{AnswerMapping, LabConfig, PromptConfig};
use crate::core::errors::LabError;
use crate::corpus::Record;
use crate::llm::types::ChatMessage;

/// One worked example derived from a single training record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Demonstration {
    pub record_id: String,
    pub question: String,
    pub rationale: String,
    pub answer_symbol: char,
}

/// Instruction, demonstrations, optional retrieved context and target question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptSpec {
    pub record_id: String,
    pub instruction: String,
    pub options: Vec<(char, String)>,
    pub demonstrations: Vec<Demonstration>,
    pub context: Option<String>,
    pub question: String,
    rationale_marker: String,
    answer_marker: String,
}

impl PromptSpec {
    /// Instruction and question only, default markers.
    pub fn bare(instruction: impl Into<String>, question: impl Into<String>) -> Self {
        let markers = PromptConfig::default();
        Self {
            record_id: String::new(),
            instruction: instruction.into(),
            options: Vec::new(),
            demonstrations: Vec::new(),
            context: None,
            question: question.into(),
            rationale_marker: markers.rationale_marker,
            answer_marker: markers.answer_marker,
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let context = context.into();
        self.context = if context.trim().is_empty() {
            None
        } else {
            Some(context)
        };
        self
    }

    pub fn shot_count(&self) -> usize {
        self.demonstrations.len()
    }

    /// The structured answer block for a rationale and symbol.
    pub fn answer_block(&self, rationale: &str, symbol: char) -> String {
        format!(
            "{{{}: {}, {}: {}}}",
            json_string(&self.rationale_marker),
            json_string(rationale),
            json_string(&self.answer_marker),
            json_string(&symbol.to_string())
        )
    }

    /// Everything after the instruction.
    pub fn body(&self) -> String {
        let mut out = String::new();

        if !self.options.is_empty() {
            out.push_str("Options:\n");
            for (symbol, label) in &self.options {
                out.push_str(&format!("{}. {}\n", symbol, label));
            }
            out.push('\n');
        }

        for (i, demo) in self.demonstrations.iter().enumerate() {
            out.push_str(&format!(
                "## Example {}\nQuestion: {}\nAnswer: {}\n\n",
                i + 1,
                demo.question,
                self.answer_block(&demo.rationale, demo.answer_symbol)
            ));
        }

        if let Some(context) = &self.context {
            out.push_str("## Context\n");
            out.push_str(context);
            out.push_str("\n\n");
        }

        out.push_str("## Question\n");
        out.push_str(&self.question);
        out.push_str("\nAnswer:");
        out
    }

    pub fn render(&self) -> String {
        format!("{}\n\n{}", self.instruction, self.body())
    }

    pub fn messages(&self) -> Vec<ChatMessage> {
        vec![ChatMessage::system(&self.instruction), ChatMessage::user(self.body())]
    }

    /// Hex sha256 of the rendered prompt.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(self.render().as_bytes()))
    }
}

fn json_string(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}

/// Builds prompts from records using one explicit label mapping.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    prompt: PromptConfig,
    mapping: AnswerMapping,
}

impl PromptBuilder {
    pub fn new(prompt: PromptConfig, mapping: AnswerMapping) -> Self {
        Self { prompt, mapping }
    }

    pub fn from_config(config: &LabConfig) -> Self {
        Self::new(config.prompt.clone(), config.answer_mapping.clone())
    }

    pub fn mapping(&self) -> &AnswerMapping {
        &self.mapping
    }

    pub fn demonstration(&self, record: &Record) -> Result<Demonstration, LabError> {
        let answer_symbol = self.mapping.symbol_for(&record.gold_answer).map_err(|_| {
            LabError::InvalidLabel(format!(
                "demonstration '{}' has gold answer '{}' outside the answer mapping",
                record.id, record.gold_answer
            ))
        })?;

        Ok(Demonstration {
            record_id: record.id.clone(),
            question: record.question.clone(),
            rationale: record.long_answer.clone().unwrap_or_default(),
            answer_symbol,
        })
    }

    /// Prompt for `query` with the first `num_shots` of `neighbors` as
    /// demonstrations. `num_shots == 0` yields instruction + question only.
    pub fn build_prompt(
        &self,
        query: &Record,
        neighbors: &[&Record],
        num_shots: usize,
    ) -> Result<PromptSpec, LabError> {
        if num_shots > neighbors.len() {
            return Err(LabError::InsufficientNeighbors {
                requested: num_shots,
                available: neighbors.len(),
            });
        }

        let demonstrations = neighbors[..num_shots]
            .iter()
            .map(|record| self.demonstration(record))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(PromptSpec {
            record_id: query.id.clone(),
            instruction: self.prompt.instruction.clone(),
            options: self.options_for(query)?,
            demonstrations,
            context: None,
            question: query.question.clone(),
            rationale_marker: self.prompt.rationale_marker.clone(),
            answer_marker: self.prompt.answer_marker.clone(),
        })
    }

    fn options_for(&self, query: &Record) -> Result<Vec<(char, String)>, LabError> {
        if query.options.is_empty() {
            return Ok(self
                .mapping
                .options()
                .into_iter()
                .map(|(symbol, label)| (symbol, label.to_string()))
                .collect());
        }

        query
            .options
            .iter()
            .map(|label| Ok((self.mapping.symbol_for(label)?, label.clone())))
            .collect()
    }
}
