//! Evaluation harness and metrics.

mod harness;
pub mod metrics;

pub use harness::{Evaluator, FailureRecord, Method, Preparation, PreparedQuery, RunReport};
pub use metrics::{accuracy, correlation, keystroke_reduction, EmbeddingScorer, MetricSummary, SemanticScorer};
