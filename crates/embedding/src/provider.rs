use async_trait::async_trait;
use seemantic_core::DistanceMetric;
use serde::Serialize;

/// What the vectors will be used for; providers embed passages and queries
/// asymmetrically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingTask {
  Document,
  Query,
}

#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
  #[error("Request failed: {0}")]
  Request(#[from] reqwest::Error),
  #[error("Provider error: {0}")]
  Provider(String),
  #[error("Request timed out")]
  Timeout,
  #[error("Provider returned {got} vectors for {expected} inputs")]
  CountMismatch { expected: usize, got: usize },
  #[error("Provider returned a {got}-dimension vector, expected {expected}")]
  DimensionMismatch { expected: usize, got: usize },
}

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
  fn name(&self) -> &str;
  fn model_id(&self) -> &str;
  /// Fixed dimension of every vector this provider returns.
  fn dimensions(&self) -> usize;
  /// The distance metric these vectors are meant to be compared under;
  /// propagated to the vector store at construction.
  fn metric(&self) -> DistanceMetric;

  /// Embed a batch of texts; one vector per input, in order.
  async fn embed(&self, task: EmbeddingTask, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}
