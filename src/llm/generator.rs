use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::types::DecodingParams;
use crate::core::errors::LabError;
use crate::prompt::PromptSpec;

/// Raw output of a generator call, before any parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum RawGeneration {
    Text(String),
    /// Several candidates, e.g. one per beam.
    Candidates(Vec<String>),
    /// Any other shape the client handed back.
    Structured(Value),
}

impl From<String> for RawGeneration {
    fn from(text: String) -> Self {
        RawGeneration::Text(text)
    }
}

impl From<&str> for RawGeneration {
    fn from(text: &str) -> Self {
        RawGeneration::Text(text.to_string())
    }
}

impl From<Value> for RawGeneration {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => RawGeneration::Text(text),
            Value::Array(items) if items.iter().all(Value::is_string) => RawGeneration::Candidates(
                items
                    .into_iter()
                    .filter_map(|item| item.as_str().map(str::to_string))
                    .collect(),
            ),
            other => RawGeneration::Structured(other),
        }
    }
}

/// The external text generator. Opaque to the pipeline: one blocking
/// request per prompt, retries are the implementation's business.
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;

    async fn generate(
        &self,
        prompt: &PromptSpec,
        params: &DecodingParams,
    ) -> Result<RawGeneration, LabError>;
}

/// Always answers with the same text.
#[derive(Debug, Clone)]
pub struct StaticGenerator {
    text: String,
}

impl StaticGenerator {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl Generator for StaticGenerator {
    fn name(&self) -> &str {
        "static"
    }

    async fn generate(
        &self,
        _prompt: &PromptSpec,
        _params: &DecodingParams,
    ) -> Result<RawGeneration, LabError> {
        Ok(RawGeneration::Text(self.text.clone()))
    }
}

/// Answers through a closure over the prompt.
pub struct FnGenerator<F> {
    respond: F,
}

impl<F> FnGenerator<F>
where
    F: Fn(&PromptSpec) -> Result<RawGeneration, LabError> + Send + Sync,
{
    pub fn new(respond: F) -> Self {
        Self { respond }
    }
}

#[async_trait]
impl<F> Generator for FnGenerator<F>
where
    F: Fn(&PromptSpec) -> Result<RawGeneration, LabError> + Send + Sync,
{
    fn name(&self) -> &str {
        "fn"
    }

    async fn generate(
        &self,
        prompt: &PromptSpec,
        _params: &DecodingParams,
    ) -> Result<RawGeneration, LabError> {
        (self.respond)(prompt)
    }
}

/// Bounds every call of `inner`; expiry surfaces as `GenerationTimeout`.
pub struct DeadlineGenerator {
    inner: Arc<dyn Generator>,
    deadline: Duration,
}

impl DeadlineGenerator {
    pub fn new(inner: Arc<dyn Generator>, deadline: Duration) -> Self {
        Self { inner, deadline }
    }
}

/// Wrap `inner` so every call is bounded by `deadline`.
pub fn with_deadline(inner: Arc<dyn Generator>, deadline: Duration) -> Arc<dyn Generator> {
    Arc::new(DeadlineGenerator::new(inner, deadline))
}

#[async_trait]
impl Generator for DeadlineGenerator {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(
        &self,
        prompt: &PromptSpec,
        params: &DecodingParams,
    ) -> Result<RawGeneration, LabError> {
        match tokio::time::timeout(self.deadline, self.inner.generate(prompt, params)).await {
            Ok(result) => result,
            Err(_) => Err(LabError::GenerationTimeout(self.deadline)),
        }
    }
}
