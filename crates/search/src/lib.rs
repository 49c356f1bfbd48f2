pub mod assemble;
pub mod engine;
pub mod generate;

pub use assemble::{Passage, assemble_passages};
pub use engine::{SearchEngine, SearchError, SearchResult};
pub use generate::{AnswerGenerator, GenerateError, QueryUpdate, build_context, build_prompt};
