use seemantic_core::{Chunk, DistanceMetric, EmbeddedChunk, ParsedDocument};
use std::sync::Arc;
use tracing::debug;

use crate::provider::{EmbeddingError, EmbeddingProvider, EmbeddingTask};

/// Batches chunk embedding over a provider.
///
/// Chunks are grouped into batches whose concatenated character length stays
/// under `max_chars` (a heuristic bound on the provider's token budget); a
/// single oversized chunk forms its own batch. Each batch is one provider
/// call.
pub struct Embedder {
  provider: Arc<dyn EmbeddingProvider>,
  max_chars: usize,
}

impl Embedder {
  pub fn new(provider: Arc<dyn EmbeddingProvider>, max_chars: usize) -> Self {
    Self { provider, max_chars }
  }

  pub fn dimensions(&self) -> usize {
    self.provider.dimensions()
  }

  pub fn metric(&self) -> DistanceMetric {
    self.provider.metric()
  }

  /// Embed every chunk of a parsed document, preserving chunk order.
  pub async fn embed_document(
    &self,
    parsed: &ParsedDocument,
    chunks: &[Chunk],
  ) -> Result<Vec<EmbeddedChunk>, EmbeddingError> {
    let mut embedded = Vec::with_capacity(chunks.len());
    for batch in partition_by_chars(parsed, chunks, self.max_chars) {
      let texts: Vec<&str> = batch.iter().map(|c| parsed.slice(*c)).collect();
      debug!(batch_len = batch.len(), "embedding document batch");
      let vectors = self.provider.embed(EmbeddingTask::Document, &texts).await?;
      if vectors.len() != batch.len() {
        return Err(EmbeddingError::CountMismatch {
          expected: batch.len(),
          got: vectors.len(),
        });
      }
      embedded.extend(
        batch
          .into_iter()
          .zip(vectors)
          .map(|(chunk, embedding)| EmbeddedChunk { chunk, embedding }),
      );
    }
    Ok(embedded)
  }

  /// Embed a natural-language query into a single vector.
  pub async fn embed_query(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
    let mut vectors = self.provider.embed(EmbeddingTask::Query, &[text]).await?;
    vectors.pop().ok_or(EmbeddingError::CountMismatch { expected: 1, got: 0 })
  }
}

/// Split chunks into consecutive batches of bounded concatenated length.
fn partition_by_chars(parsed: &ParsedDocument, chunks: &[Chunk], max_chars: usize) -> Vec<Vec<Chunk>> {
  let mut batches = Vec::new();
  let mut current: Vec<Chunk> = Vec::new();
  let mut current_chars = 0usize;

  for &chunk in chunks {
    let len = parsed.slice(chunk).len();
    if !current.is_empty() && current_chars + len > max_chars {
      batches.push(std::mem::take(&mut current));
      current_chars = 0;
    }
    current.push(chunk);
    current_chars += len;
  }
  if !current.is_empty() {
    batches.push(current);
  }
  batches
}
