pub mod embedder;
pub mod jina;
pub mod provider;
pub mod resilient;

pub use embedder::Embedder;
pub use jina::JinaProvider;
pub use provider::{EmbeddingError, EmbeddingProvider, EmbeddingTask};
pub use resilient::{ResilientProvider, RetryConfig, is_retryable_error};
