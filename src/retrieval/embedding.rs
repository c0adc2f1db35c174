use std::collections::HashMap;

use async_trait::async_trait;

use crate::core::errors::LabError;
use crate::corpus::Record;
use crate::vector_math;

#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    /// One vector per input, same order.
    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, LabError>;
}

/// Offline embedder: signed feature hashing of lowercase word tokens,
/// L2-normalised. Deterministic across runs and platforms.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];
        for token in tokenize(text) {
            let hash = fnv1a(token.as_bytes());
            let slot = (hash % self.dimensions as u64) as usize;
            let sign = if (hash >> 63) & 1 == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }
        vector_math::normalize(&mut vector);
        vector
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashingEmbedder {
    fn name(&self) -> &str {
        "hashing"
    }

    async fn embed(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, LabError> {
        Ok(inputs.iter().map(|text| self.embed_text(text)).collect())
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
}

pub(crate) fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in bytes {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

/// Precomputed record representations, keyed by record id.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingTable {
    vectors: HashMap<String, Vec<f32>>,
}

impl EmbeddingTable {
    /// Embed every record's question text in one batch.
    pub async fn build(embedder: &dyn Embedder, records: &[Record]) -> Result<Self, LabError> {
        let inputs: Vec<String> = records.iter().map(|r| r.question.clone()).collect();
        let vectors = embedder.embed(&inputs).await?;
        if vectors.len() != records.len() {
            return Err(LabError::Internal(format!(
                "embedder returned {} vectors for {} records",
                vectors.len(),
                records.len()
            )));
        }

        tracing::debug!(
            embedder = embedder.name(),
            count = records.len(),
            "Built record embedding table"
        );

        Ok(Self {
            vectors: records
                .iter()
                .map(|r| r.id.clone())
                .zip(vectors)
                .collect(),
        })
    }

    pub fn get(&self, id: &str) -> Result<&[f32], LabError> {
        self.vectors
            .get(id)
            .map(Vec::as_slice)
            .ok_or_else(|| LabError::NotFound(format!("embedding for record '{}'", id)))
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }
}
