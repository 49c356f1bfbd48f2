use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_128;

/// 128-bit content hash, hex encoded.
///
/// Used at every level of the content-addressing scheme: raw bytes from the
/// source and the canonical markdown produced by the parser.
pub fn content_hash(content: &[u8]) -> String {
  format!("{:032x}", xxh3_128(content))
}

/// Half-open byte range `[start, end)` within a parsed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
  pub start: usize,
  pub end: usize,
}

impl Chunk {
  pub fn new(start: usize, end: usize) -> Self {
    Self { start, end }
  }

  pub fn len(&self) -> usize {
    self.end - self.start
  }

  pub fn is_empty(&self) -> bool {
    self.start == self.end
  }
}

/// A chunk together with its embedding vector.
#[derive(Debug, Clone)]
pub struct EmbeddedChunk {
  pub chunk: Chunk,
  pub embedding: Vec<f32>,
}

/// A chunk returned from a vector query, with its distance to the query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkHit {
  pub chunk: Chunk,
  pub distance: f32,
}

/// Canonical markdown output of the parser, addressed by its own hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedDocument {
  pub parsed_hash: String,
  pub markdown: String,
}

impl ParsedDocument {
  /// Build a parsed document from markdown, computing its hash.
  pub fn from_markdown(markdown: String) -> Self {
    let parsed_hash = content_hash(markdown.as_bytes());
    Self { parsed_hash, markdown }
  }

  /// The markdown covered by `chunk`.
  pub fn slice(&self, chunk: Chunk) -> &str {
    &self.markdown[chunk.start..chunk.end]
  }
}

/// Lifecycle of a document within one indexer version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexingStatus {
  Pending,
  Indexing,
  IndexingSuccess,
  IndexingError,
}

impl IndexingStatus {
  pub fn as_str(&self) -> &'static str {
    match self {
      IndexingStatus::Pending => "pending",
      IndexingStatus::Indexing => "indexing",
      IndexingStatus::IndexingSuccess => "indexing_success",
      IndexingStatus::IndexingError => "indexing_error",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "pending" => Some(IndexingStatus::Pending),
      "indexing" => Some(IndexingStatus::Indexing),
      "indexing_success" => Some(IndexingStatus::IndexingSuccess),
      "indexing_error" => Some(IndexingStatus::IndexingError),
      _ => None,
    }
  }
}

/// Distance metric declared by the embedder and wired into the vector store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
  L2,
  #[default]
  Cosine,
  Dot,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_content_hash_is_stable_and_128_bit() {
    let a = content_hash(b"hello");
    let b = content_hash(b"hello");
    assert_eq!(a, b);
    assert_eq!(a.len(), 32);
  }

  #[test]
  fn test_content_hash_differs_on_content() {
    assert_ne!(content_hash(b"a"), content_hash(b"b"));
  }

  #[test]
  fn test_parsed_document_slice() {
    let doc = ParsedDocument::from_markdown("# Title\nbody".to_string());
    assert_eq!(doc.slice(Chunk::new(0, 7)), "# Title");
    assert_eq!(doc.parsed_hash, content_hash(doc.markdown.as_bytes()));
  }

  #[test]
  fn test_status_round_trip() {
    for status in [
      IndexingStatus::Pending,
      IndexingStatus::Indexing,
      IndexingStatus::IndexingSuccess,
      IndexingStatus::IndexingError,
    ] {
      assert_eq!(IndexingStatus::parse(status.as_str()), Some(status));
    }
    assert_eq!(IndexingStatus::parse("done"), None);
  }
}
