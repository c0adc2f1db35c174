use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

use super::generator::{Generator, RawGeneration};
use super::types::{ChatRequest, DecodingParams};
use crate::core::config::GeneratorConfig;
use crate::core::errors::LabError;
use crate::prompt::PromptSpec;
use crate::retrieval::Embedder;

/// Client for any server exposing `/v1/chat/completions` and `/v1/embeddings`
/// (LM Studio, llama.cpp, vLLM, hosted OpenAI-style APIs).
#[derive(Clone)]
pub struct OpenAiCompatGenerator {
    base_url: String,
    model: String,
    embedding_model: String,
    api_key: Option<String>,
    timeout: Duration,
    client: Client,
}

impl OpenAiCompatGenerator {
    pub fn new(config: &GeneratorConfig) -> Result<Self, LabError> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(LabError::internal)?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            embedding_model: config
                .embedding_model
                .clone()
                .unwrap_or_else(|| config.model.clone()),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            timeout,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        let base = self.base_url.as_str();
        if base.ends_with("/v1") {
            format!("{}/{}", base, path)
        } else {
            format!("{}/v1/{}", base, path)
        }
    }

    async fn post(&self, path: &str, body: &Value) -> Result<Value, LabError> {
        let mut req = self.client.post(self.endpoint(path)).json(body);
        if let Some(key) = &self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }

        let res = req.send().await.map_err(|err| {
            if err.is_timeout() {
                LabError::GenerationTimeout(self.timeout)
            } else {
                LabError::internal(err)
            }
        })?;

        if !res.status().is_success() {
            let status = res.status();
            let text = res.text().await.unwrap_or_default();
            return Err(LabError::Internal(format!(
                "{} request failed ({}): {}",
                path, status, text
            )));
        }

        res.json().await.map_err(LabError::internal)
    }
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

/// Pull `choices[*].message.content` out of a chat completion payload.
fn extract_generation(payload: &Value) -> Result<RawGeneration, LabError> {
    let Some(choices) = payload.get("choices").and_then(Value::as_array) else {
        return Ok(RawGeneration::Structured(payload.clone()));
    };

    let contents: Vec<String> = choices
        .iter()
        .filter_map(|c| c["message"]["content"].as_str())
        .map(str::to_string)
        .collect();

    match contents.len() {
        0 => Err(LabError::MalformedAnswer(
            "completion contained no message content".to_string(),
        )),
        1 => Ok(RawGeneration::Text(contents.into_iter().next().unwrap_or_default())),
        _ => Ok(RawGeneration::Candidates(contents)),
    }
}

#[async_trait]
impl Generator for OpenAiCompatGenerator {
    fn name(&self) -> &str {
        "openai_compat"
    }

    async fn generate(
        &self,
        prompt: &PromptSpec,
        params: &DecodingParams,
    ) -> Result<RawGeneration, LabError> {
        let request = ChatRequest::new(prompt.messages(), params.clone());
        let payload = self
            .post("chat/completions", &request.to_body(&self.model))
            .await?;
        extract_generation(&payload)
    }
}

#[async_trait]
impl Embedder for OpenAiCompatGenerator {
    fn name(&self) -> &str {
        "openai_compat"
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, LabError> {
        if inputs.is_empty() {
            return Ok(Vec::new());
        }
        let body = json!({
            "model": self.embedding_model,
            "input": inputs,
        });
        let payload = self.post("embeddings", &body).await?;
        let mut response: EmbeddingResponse =
            serde_json::from_value(payload).map_err(LabError::internal)?;

        response.data.sort_by_key(|item| item.index);
        if response.data.len() != inputs.len() {
            return Err(LabError::Internal(format!(
                "embedding count mismatch: {} != {}",
                response.data.len(),
                inputs.len()
            )));
        }
        Ok(response.data.into_iter().map(|item| item.embedding).collect())
    }
}
