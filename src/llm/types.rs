use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::errors::LabError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Decoding options forwarded untouched to the external generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodingParams {
    /// Beam-search width; 1 means greedy.
    pub num_beams: u32,
    pub do_sample: bool,
    pub max_length: Option<u32>,
    pub min_length: Option<u32>,
    pub temperature: Option<f32>,
    /// Concept tags the generator may use to bias decoding.
    pub concept_bias: Vec<String>,
}

impl Default for DecodingParams {
    fn default() -> Self {
        Self {
            num_beams: 1,
            do_sample: false,
            max_length: Some(512),
            min_length: None,
            temperature: None,
            concept_bias: Vec::new(),
        }
    }
}

impl DecodingParams {
    pub fn validate(&self) -> Result<(), LabError> {
        if self.num_beams == 0 {
            return Err(LabError::Config("decoding.num_beams must be at least 1".to_string()));
        }
        if let (Some(min), Some(max)) = (self.min_length, self.max_length) {
            if min > max {
                return Err(LabError::Config(format!(
                    "decoding.min_length ({}) exceeds max_length ({})",
                    min, max
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub params: DecodingParams,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>, params: DecodingParams) -> Self {
        Self { messages, params }
    }

    /// OpenAI-compatible request body. Beam and length options use the names
    /// accepted by vLLM / llama.cpp style servers.
    pub fn to_body(&self, model_id: &str) -> Value {
        let mut body = json!({
            "model": model_id,
            "messages": self.messages,
            "stream": false,
        });

        if let Some(obj) = body.as_object_mut() {
            let params = &self.params;
            let temperature = match (params.do_sample, params.temperature) {
                (_, Some(t)) => t,
                (true, None) => 0.7,
                (false, None) => 0.0,
            };
            obj.insert("temperature".to_string(), json!(temperature));
            if let Some(max) = params.max_length {
                obj.insert("max_tokens".to_string(), json!(max));
            }
            if let Some(min) = params.min_length {
                obj.insert("min_tokens".to_string(), json!(min));
            }
            if params.num_beams > 1 {
                obj.insert("use_beam_search".to_string(), json!(true));
                obj.insert("best_of".to_string(), json!(params.num_beams));
                obj.insert("n".to_string(), json!(params.num_beams));
            }
            if !params.concept_bias.is_empty() {
                obj.insert("concept_bias".to_string(), json!(params.concept_bias));
            }
        }

        body
    }
}
