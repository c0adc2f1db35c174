pub mod generator;
pub mod openai;
pub mod types;

pub use generator::{
    with_deadline, DeadlineGenerator, FnGenerator, Generator, RawGeneration, StaticGenerator,
};
pub use openai::OpenAiCompatGenerator;
pub use types::{ChatMessage, ChatRequest, DecodingParams};
