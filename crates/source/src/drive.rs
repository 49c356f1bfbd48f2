use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::store::{ObjectEvent, ObjectStore, Result};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Reference to a document in the source: its uri and opaque version token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentReference {
  pub uri: String,
  pub source_version: String,
}

/// Current content of a source document.
#[derive(Debug, Clone)]
pub struct SourceDocument {
  pub uri: String,
  pub bytes: Vec<u8>,
  pub source_version: String,
}

/// A change observed in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
  Upsert(DocumentReference),
  Delete { uri: String },
}

/// The document drive: an object store scoped under a fixed prefix.
///
/// Uris exposed to the rest of the system are object keys with the prefix
/// stripped; only objects under the prefix are visible.
#[derive(Clone)]
pub struct DriveSource {
  store: Arc<dyn ObjectStore>,
  prefix: String,
}

impl DriveSource {
  pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
    Self {
      store,
      prefix: prefix.into(),
    }
  }

  fn with_prefix(&self, uri: &str) -> String {
    format!("{}{uri}", self.prefix)
  }

  fn without_prefix(&self, key: &str) -> Option<String> {
    key.strip_prefix(&self.prefix).map(str::to_string)
  }

  /// Snapshot enumeration of every document under the prefix.
  pub async fn list_all(&self) -> Result<Vec<DocumentReference>> {
    let objects = self.store.list(&self.prefix).await?;
    Ok(
      objects
        .into_iter()
        .filter_map(|meta| {
          self.without_prefix(&meta.key).map(|uri| DocumentReference {
            uri,
            source_version: meta.version,
          })
        })
        .collect(),
    )
  }

  /// Read the current content of a document, `None` when absent.
  pub async fn get_object(&self, uri: &str) -> Result<Option<SourceDocument>> {
    let content = self.store.get(&self.with_prefix(uri)).await?;
    Ok(content.map(|c| SourceDocument {
      uri: uri.to_string(),
      bytes: c.bytes,
      source_version: c.version,
    }))
  }

  pub async fn put_object(&self, uri: &str, bytes: &[u8]) -> Result<()> {
    self.store.put(&self.with_prefix(uri), bytes).await
  }

  pub async fn delete_object(&self, uri: &str) -> Result<()> {
    self.store.delete(&self.with_prefix(uri)).await
  }

  /// Resumable, at-least-once event stream.
  ///
  /// The underlying watch is re-opened with exponential back-off whenever it
  /// errors or ends; duplicates across reconnects are expected and handled
  /// by the consumer.
  pub fn subscribe(&self) -> BoxStream<'static, SourceEvent> {
    let state = SubscribeState {
      store: self.store.clone(),
      prefix: self.prefix.clone(),
      stream: None,
      backoff: INITIAL_BACKOFF,
    };
    futures::stream::unfold(state, |mut state| async move {
      loop {
        if state.stream.is_none() {
          match state.store.watch(&state.prefix).await {
            Ok(stream) => {
              debug!("source subscription opened under prefix {:?}", state.prefix);
              state.stream = Some(stream);
            }
            Err(e) => {
              warn!("failed to open source subscription: {e}, retrying in {:?}", state.backoff);
              sleep(state.backoff).await;
              state.bump_backoff();
              continue;
            }
          }
        }
        let next = match state.stream.as_mut() {
          Some(stream) => stream.next().await,
          None => continue,
        };
        match next {
          Some(Ok(event)) => {
            state.backoff = INITIAL_BACKOFF;
            if let Some(event) = convert(&state.prefix, event) {
              return Some((event, state));
            }
          }
          Some(Err(e)) => {
            warn!("source subscription error: {e}, reconnecting in {:?}", state.backoff);
            state.stream = None;
            sleep(state.backoff).await;
            state.bump_backoff();
          }
          None => {
            warn!("source subscription ended, reconnecting in {:?}", state.backoff);
            state.stream = None;
            sleep(state.backoff).await;
            state.bump_backoff();
          }
        }
      }
    })
    .boxed()
  }
}

struct SubscribeState {
  store: Arc<dyn ObjectStore>,
  prefix: String,
  stream: Option<BoxStream<'static, Result<ObjectEvent>>>,
  backoff: Duration,
}

impl SubscribeState {
  fn bump_backoff(&mut self) {
    self.backoff = (self.backoff * 2).min(MAX_BACKOFF);
  }
}

fn convert(prefix: &str, event: ObjectEvent) -> Option<SourceEvent> {
  match event {
    ObjectEvent::Created(meta) => meta.key.strip_prefix(prefix).map(|uri| {
      SourceEvent::Upsert(DocumentReference {
        uri: uri.to_string(),
        source_version: meta.version,
      })
    }),
    ObjectEvent::Deleted { key } => key
      .strip_prefix(prefix)
      .map(|uri| SourceEvent::Delete { uri: uri.to_string() }),
  }
}
