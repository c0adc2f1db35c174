use super::context_builder::Snippet;
use super::engine::TextChunk;
use crate::core::errors::LabError;
use crate::retrieval::Embedder;
use crate::vector_math;

/// Brute-force dense index over passage chunks.
pub struct PassageIndex {
    chunks: Vec<TextChunk>,
    embeddings: Vec<Vec<f32>>,
}

impl PassageIndex {
    pub async fn build(embedder: &dyn Embedder, chunks: Vec<TextChunk>) -> Result<Self, LabError> {
        let inputs: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = embedder.embed(&inputs).await?;
        if embeddings.len() != chunks.len() {
            return Err(LabError::Internal(format!(
                "embedder returned {} vectors for {} passages",
                embeddings.len(),
                chunks.len()
            )));
        }

        tracing::info!(passages = chunks.len(), embedder = embedder.name(), "Passage index built");
        Ok(Self { chunks, embeddings })
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Top-k passages by cosine at or above `threshold`.
    ///
    /// Passages whose source is in `exclude_sources` are skipped, so a query
    /// can be kept from reading its own abstract when that is not wanted.
    pub fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        threshold: f32,
        exclude_sources: &[&str],
    ) -> Result<Vec<Snippet>, LabError> {
        let ranked = vector_math::rank_descending_by_cosine(query_embedding, &self.embeddings)?;

        Ok(ranked
            .into_iter()
            .filter(|(_, score)| *score >= threshold)
            .filter(|(idx, _)| !exclude_sources.contains(&self.chunks[*idx].source.as_str()))
            .take(top_k)
            .map(|(idx, score)| to_snippet(&self.chunks[idx], score))
            .collect())
    }
}

fn to_snippet(chunk: &TextChunk, score: f32) -> Snippet {
    Snippet {
        source: chunk.source.clone(),
        text: chunk.text.clone(),
        score,
    }
}
