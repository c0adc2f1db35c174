pub mod answer;
pub mod core;
pub mod corpus;
pub mod eval;
pub mod export;
pub mod llm;
pub mod prompt;
pub mod rag;
pub mod retrieval;
pub mod vector_math;
