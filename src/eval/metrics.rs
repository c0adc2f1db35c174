use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::errors::LabError;
use crate::retrieval::Embedder;
use crate::vector_math;

/// Fraction of gold ids whose prediction matches. Ids missing from
/// `predictions` count as wrong; an empty gold set scores 0.0.
pub fn accuracy(predictions: &BTreeMap<String, char>, gold: &BTreeMap<String, char>) -> f64 {
    if gold.is_empty() {
        return 0.0;
    }
    let correct = gold
        .iter()
        .filter(|(id, symbol)| predictions.get(*id) == Some(*symbol))
        .count();
    correct as f64 / gold.len() as f64
}

/// Mean per-item typing saved when starting from the hypothesis instead of
/// an empty box: `1 - min(edit_distance, len(ref)) / len(ref)`.
///
/// Pairs are `(hypothesis, reference)`; pairs with an empty reference are
/// skipped. Lengths and distances are in characters.
pub fn keystroke_reduction<'a, I>(pairs: I) -> f64
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut total = 0.0;
    let mut counted = 0usize;

    for (hypothesis, reference) in pairs {
        let reference_len = reference.chars().count();
        if reference_len == 0 {
            continue;
        }
        let distance = strsim::levenshtein(hypothesis, reference).min(reference_len);
        total += 1.0 - distance as f64 / reference_len as f64;
        counted += 1;
    }

    if counted == 0 {
        0.0
    } else {
        total / counted as f64
    }
}

/// Pairwise semantic similarity between hypotheses and references.
#[async_trait]
pub trait SemanticScorer: Send + Sync {
    fn name(&self) -> &str;

    /// One score per aligned pair.
    async fn score(&self, hypotheses: &[String], references: &[String]) -> Result<Vec<f64>, LabError>;
}

/// Cosine similarity of embeddings from any `Embedder`.
pub struct EmbeddingScorer {
    embedder: Arc<dyn Embedder>,
}

impl EmbeddingScorer {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self { embedder }
    }
}

#[async_trait]
impl SemanticScorer for EmbeddingScorer {
    fn name(&self) -> &str {
        self.embedder.name()
    }

    async fn score(&self, hypotheses: &[String], references: &[String]) -> Result<Vec<f64>, LabError> {
        let hyp_vectors = self.embedder.embed(hypotheses).await?;
        let ref_vectors = self.embedder.embed(references).await?;

        hyp_vectors
            .iter()
            .zip(ref_vectors.iter())
            .map(|(h, r)| vector_math::cosine_similarity(h, r).map(f64::from))
            .collect()
    }
}

/// Mean semantic similarity over aligned pairs; 0.0 for no pairs.
pub async fn correlation(
    scorer: &dyn SemanticScorer,
    hypotheses: &[String],
    references: &[String],
) -> Result<f64, LabError> {
    if hypotheses.len() != references.len() {
        return Err(LabError::Internal(format!(
            "correlation needs aligned inputs, got {} hypotheses and {} references",
            hypotheses.len(),
            references.len()
        )));
    }
    if hypotheses.is_empty() {
        return Ok(0.0);
    }

    let scores = scorer.score(hypotheses, references).await?;
    if scores.len() != hypotheses.len() {
        return Err(LabError::Internal(format!(
            "scorer '{}' returned {} scores for {} pairs",
            scorer.name(),
            scores.len(),
            hypotheses.len()
        )));
    }
    Ok(scores.iter().sum::<f64>() / scores.len() as f64)
}

/// Aggregate metrics for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub accuracy: f64,
    pub keystroke_reduction: f64,
    /// Absent when no answer carried a rationale to compare.
    pub correlation: Option<f64>,
    /// Ids with a mapped gold label.
    pub gold_count: usize,
    pub answered: usize,
}
