pub mod defaults;
pub mod paths;
pub mod schema;
pub mod service;
pub mod validation;

pub use paths::AppPaths;
pub use schema::{AnswerMapping, GeneratorConfig, LabConfig, PromptConfig, RetrievalConfig};
pub use service::ConfigService;
