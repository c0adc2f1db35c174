//! Evaluation corpus.
//!
//! - `Record`: one immutable question instance
//! - `Split`: a contiguous `[start, end)` index range
//! - `Corpus`: records in load order, partitioned into train and test splits

mod loader;

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::core::errors::LabError;

pub use loader::{load_jsonl, load_pubmedqa};

/// One question instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub question: String,
    /// Candidate labels in presentation order.
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub concepts: BTreeSet<String>,
    pub gold_answer: String,
    #[serde(default)]
    pub long_answer: Option<String>,
    /// Source passages attached to the question, used as the RAG corpus.
    #[serde(default)]
    pub contexts: Vec<String>,
}

impl Record {
    pub fn new(id: impl Into<String>, question: impl Into<String>, gold_answer: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            question: question.into(),
            options: Vec::new(),
            concepts: BTreeSet::new(),
            gold_answer: gold_answer.into(),
            long_answer: None,
            contexts: Vec::new(),
        }
    }

    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_concepts<I, S>(mut self, concepts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.concepts = concepts.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_long_answer(mut self, long_answer: impl Into<String>) -> Self {
        self.long_answer = Some(long_answer.into());
        self
    }

    pub fn with_contexts<I, S>(mut self, contexts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.contexts = contexts.into_iter().map(Into::into).collect();
        self
    }
}

/// Contiguous `[start, end)` index range over a corpus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    pub start: usize,
    pub end: usize,
}

impl Split {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn overlaps(&self, other: &Split) -> bool {
        !self.is_empty() && !other.is_empty() && self.start < other.end && other.start < self.end
    }
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Ordered records with an id index and disjoint train/test splits.
///
/// Read-only after construction, so one instance can be shared behind an
/// `Arc` by any number of concurrent readers.
#[derive(Debug, Clone)]
pub struct Corpus {
    records: Vec<Record>,
    index: HashMap<String, usize>,
    train: Split,
    test: Split,
}

impl Corpus {
    pub fn new(records: Vec<Record>, train: Split, test: Split) -> Result<Self, LabError> {
        let mut index = HashMap::with_capacity(records.len());
        for (position, record) in records.iter().enumerate() {
            if index.insert(record.id.clone(), position).is_some() {
                return Err(LabError::Config(format!(
                    "duplicate record id '{}' in corpus",
                    record.id
                )));
            }
        }

        for (name, split) in [("train", &train), ("test", &test)] {
            if split.start > split.end || split.end > records.len() {
                return Err(LabError::Config(format!(
                    "{} split {} is outside the corpus (len {})",
                    name,
                    split,
                    records.len()
                )));
            }
        }
        if train.overlaps(&test) {
            return Err(LabError::Config(format!(
                "train split {} overlaps test split {}",
                train, test
            )));
        }

        Ok(Self {
            records,
            index,
            train,
            test,
        })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn train_split(&self) -> Split {
        self.train
    }

    pub fn test_split(&self) -> Split {
        self.test
    }

    pub fn train(&self) -> &[Record] {
        self.slice(self.train)
    }

    pub fn test(&self) -> &[Record] {
        self.slice(self.test)
    }

    /// Records covered by `split`, clamped to the corpus bounds.
    pub fn slice(&self, split: Split) -> &[Record] {
        let end = split.end.min(self.records.len());
        let start = split.start.min(end);
        &self.records[start..end]
    }

    pub fn get(&self, id: &str) -> Result<&Record, LabError> {
        self.index
            .get(id)
            .map(|&position| &self.records[position])
            .ok_or_else(|| LabError::NotFound(format!("record '{}'", id)))
    }

    pub fn qids(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.id.as_str()).collect()
    }

    /// Gold labels aligned with `qids`.
    pub fn choices(&self) -> Vec<&str> {
        self.records.iter().map(|r| r.gold_answer.as_str()).collect()
    }

    /// Concept sets aligned with `qids`.
    pub fn concepts(&self) -> Vec<&BTreeSet<String>> {
        self.records.iter().map(|r| &r.concepts).collect()
    }
}
