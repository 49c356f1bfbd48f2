use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SourceError {
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("Watch error: {0}")]
  Watch(#[from] notify::Error),
  #[error("Source unavailable: {0}")]
  Unavailable(String),
}

pub type Result<T> = std::result::Result<T, SourceError>;

/// A listed object: its key and an opaque version token.
///
/// Version tokens are compared only for equality; inequality implies the
/// content may have changed since the last observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
  pub key: String,
  pub version: String,
}

/// Object bytes together with the version they were read at.
#[derive(Debug, Clone)]
pub struct ObjectContent {
  pub bytes: Vec<u8>,
  pub version: String,
}

/// Notification emitted by an object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ObjectEvent {
  Created(ObjectMeta),
  Deleted { key: String },
}

/// Contract over the object-store driver.
///
/// Keys are `/`-separated strings. `watch` yields an at-least-once event
/// stream; duplicates and reorderings are tolerated downstream. A stream
/// that errors or ends is re-opened by the consumer.
#[async_trait]
pub trait ObjectStore: Send + Sync {
  async fn list(&self, prefix: &str) -> Result<Vec<ObjectMeta>>;
  async fn get(&self, key: &str) -> Result<Option<ObjectContent>>;
  async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;
  async fn delete(&self, key: &str) -> Result<()>;
  async fn watch(&self, prefix: &str) -> Result<BoxStream<'static, Result<ObjectEvent>>>;
}
