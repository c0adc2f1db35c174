use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LabError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid label: {0}")]
    InvalidLabel(String),
    #[error("insufficient neighbors: requested {requested}, available {available}")]
    InsufficientNeighbors { requested: usize, available: usize },
    #[error("malformed answer: {0}")]
    MalformedAnswer(String),
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("generation timed out after {0:?}")]
    GenerationTimeout(Duration),
    #[error("configuration error: {0}")]
    Config(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl LabError {
    pub fn internal<E: std::fmt::Display>(err: E) -> Self {
        LabError::Internal(err.to_string())
    }

    pub fn io<E: std::fmt::Display>(err: E) -> Self {
        LabError::Io(err.to_string())
    }

    /// Data-shape failures that belong to a single record and must not abort a run.
    pub fn is_per_record(&self) -> bool {
        matches!(
            self,
            LabError::InvalidLabel(_) | LabError::MalformedAnswer(_) | LabError::UnsupportedFormat(_)
        )
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, LabError::GenerationTimeout(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            LabError::NotFound(_) => "not_found",
            LabError::InvalidLabel(_) => "invalid_label",
            LabError::InsufficientNeighbors { .. } => "insufficient_neighbors",
            LabError::MalformedAnswer(_) => "malformed_answer",
            LabError::UnsupportedFormat(_) => "unsupported_format",
            LabError::GenerationTimeout(_) => "generation_timeout",
            LabError::Config(_) => "config",
            LabError::Io(_) => "io",
            LabError::Internal(_) => "internal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_shape_errors_are_per_record() {
        assert!(LabError::InvalidLabel("x".into()).is_per_record());
        assert!(LabError::MalformedAnswer("x".into()).is_per_record());
        assert!(LabError::UnsupportedFormat("x".into()).is_per_record());
        assert!(!LabError::NotFound("x".into()).is_per_record());
        assert!(!LabError::InsufficientNeighbors {
            requested: 5,
            available: 2
        }
        .is_per_record());
    }

    #[test]
    fn only_timeouts_are_retryable() {
        assert!(LabError::GenerationTimeout(Duration::from_secs(1)).is_retryable());
        assert!(!LabError::MalformedAnswer("x".into()).is_retryable());
        assert_eq!(
            LabError::GenerationTimeout(Duration::from_secs(1)).kind(),
            "generation_timeout"
        );
    }
}
