//! Demonstration retrieval.
//!
//! Given a query record and a candidate split, `Retriever` returns an ordered
//! list of neighbor ids by one of three modes:
//! 1. `similarity`: cosine over precomputed record embeddings, top-k
//! 2. `tag_overlap`: candidates sharing at least one concept with the query
//! 3. `random`: a seeded sample, reproducible per (seed, query id)
//!
//! The query itself is never returned as its own neighbor.

mod embedding;

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::core::errors::LabError;
use crate::corpus::{Corpus, Record, Split};
use crate::vector_math;

pub use embedding::{Embedder, EmbeddingTable, HashingEmbedder};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalMode {
    Similarity,
    TagOverlap,
    Random,
}

impl RetrievalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalMode::Similarity => "similarity",
            RetrievalMode::TagOverlap => "tag_overlap",
            RetrievalMode::Random => "random",
        }
    }
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RetrievalMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "similarity" => Ok(RetrievalMode::Similarity),
            "tag_overlap" | "tags" => Ok(RetrievalMode::TagOverlap),
            "random" => Ok(RetrievalMode::Random),
            other => Err(format!(
                "unknown retrieval mode '{}' (expected similarity, tag_overlap or random)",
                other
            )),
        }
    }
}

/// Neighbor ids per query id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NeighborSet {
    entries: BTreeMap<String, Vec<String>>,
}

impl NeighborSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, query_id: impl Into<String>, neighbors: Vec<String>) {
        self.entries.insert(query_id.into(), neighbors);
    }

    pub fn get(&self, query_id: &str) -> Option<&[String]> {
        self.entries.get(query_id).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.entries.iter()
    }
}

/// Stateless neighbor lookup over a shared, read-only corpus.
#[derive(Clone)]
pub struct Retriever {
    corpus: Arc<Corpus>,
    embeddings: Option<Arc<EmbeddingTable>>,
    seed: u64,
}

impl Retriever {
    pub fn new(corpus: Arc<Corpus>) -> Self {
        Self {
            corpus,
            embeddings: None,
            seed: 0,
        }
    }

    pub fn with_embeddings(mut self, embeddings: Arc<EmbeddingTable>) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Neighbors of `query_id` among the records in `candidates`.
    ///
    /// `k` bounds the result; `None` returns every match (every candidate for
    /// `similarity` and `random`). Asking for more than exist is not an error.
    pub fn find_neighbors(
        &self,
        query_id: &str,
        candidates: Split,
        mode: RetrievalMode,
        k: Option<usize>,
    ) -> Result<Vec<String>, LabError> {
        let query = self.corpus.get(query_id)?;
        let pool: Vec<&Record> = self
            .corpus
            .slice(candidates)
            .iter()
            .filter(|candidate| candidate.id != query.id)
            .collect();

        if pool.is_empty() {
            return Ok(Vec::new());
        }

        let neighbors = match mode {
            RetrievalMode::Similarity => self.by_similarity(query, &pool, k)?,
            RetrievalMode::TagOverlap => by_tag_overlap(query, &pool, k),
            RetrievalMode::Random => self.by_random(query, &pool, k),
        };

        tracing::trace!(
            query = query_id,
            mode = %mode,
            found = neighbors.len(),
            "Neighbors resolved"
        );
        Ok(neighbors)
    }

    /// Neighbors for every record in `queries`. Fails on the first lookup error.
    pub fn neighbor_set(
        &self,
        queries: Split,
        candidates: Split,
        mode: RetrievalMode,
        k: Option<usize>,
    ) -> Result<NeighborSet, LabError> {
        let mut set = NeighborSet::new();
        for query in self.corpus.slice(queries) {
            let neighbors = self.find_neighbors(&query.id, candidates, mode, k)?;
            set.insert(query.id.clone(), neighbors);
        }
        Ok(set)
    }

    fn by_similarity(
        &self,
        query: &Record,
        pool: &[&Record],
        k: Option<usize>,
    ) -> Result<Vec<String>, LabError> {
        Ok(self
            .rank_by_similarity(query, pool, k)?
            .into_iter()
            .map(|(id, _)| id)
            .collect())
    }

    fn rank_by_similarity(
        &self,
        query: &Record,
        pool: &[&Record],
        k: Option<usize>,
    ) -> Result<Vec<(String, f32)>, LabError> {
        let table = self.embeddings.as_ref().ok_or_else(|| {
            LabError::Config("similarity retrieval requires an embedding table".to_string())
        })?;
        let query_vector = table.get(&query.id)?;

        let mut scored = Vec::with_capacity(pool.len());
        for candidate in pool {
            let score = vector_math::cosine_similarity(query_vector, table.get(&candidate.id)?)?;
            scored.push((candidate.id.clone(), score));
        }

        scored.sort_by(|left, right| {
            vector_math::descending_score(left.1, right.1).then_with(|| left.0.cmp(&right.0))
        });
        if let Some(k) = k {
            scored.truncate(k);
        }
        Ok(scored)
    }

    fn by_random(&self, query: &Record, pool: &[&Record], k: Option<usize>) -> Vec<String> {
        let mut ids: Vec<String> = pool.iter().map(|r| r.id.clone()).collect();
        let mut rng = StdRng::seed_from_u64(self.seed ^ embedding::fnv1a(query.id.as_bytes()));
        ids.shuffle(&mut rng);
        if let Some(k) = k {
            ids.truncate(k);
        }
        ids
    }
}

/// Candidates sharing a concept with the query.
///
/// Every match ties, so unbounded results keep first-seen order and a `k`
/// bound keeps the matches with the smallest ids.
fn by_tag_overlap(query: &Record, pool: &[&Record], k: Option<usize>) -> Vec<String> {
    if query.concepts.is_empty() {
        return Vec::new();
    }

    let mut seen = std::collections::HashSet::new();
    let mut matches: Vec<&str> = pool
        .iter()
        .filter(|candidate| !candidate.concepts.is_disjoint(&query.concepts))
        .map(|candidate| candidate.id.as_str())
        .filter(|id| seen.insert(*id))
        .collect();

    if let Some(k) = k {
        matches.sort_unstable();
        matches.truncate(k);
    }

    matches.into_iter().map(str::to_string).collect()
}
