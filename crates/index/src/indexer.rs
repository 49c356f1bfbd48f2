use catalog::{Catalog, CatalogError, IndexedContent};
use embedding::{Embedder, EmbeddingError};
use futures::StreamExt;
use parser::{ParseError, Parser};
use seemantic_core::{IndexingStatus, content_hash};
use source::{DocumentReference, DriveSource, SourceEvent};
use std::sync::Arc;
use store::VectorStore;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::chunker::Chunker;
use crate::queue::{WorkItem, WorkQueue, WorkReceiver, work_queue};
use crate::reconcile::{Classification, classify, deleted_uris};

#[derive(Error, Debug)]
pub enum IndexerError {
  #[error("Source error: {0}")]
  Source(#[from] source::SourceError),
  #[error("Catalog error: {0}")]
  Catalog(#[from] CatalogError),
  #[error("Work queue closed")]
  QueueClosed,
}

/// Closed set of per-unit failure modes; the consumer switches on this once
/// and maps each to its public error message.
#[derive(Debug)]
pub enum IndexFailure {
  NotFound,
  Unsupported(String),
  Parse,
  Transient(String),
  Unknown(String),
}

impl IndexFailure {
  /// The message stored on the IndexedDocument and shown to users.
  /// Internal detail stays in the logs.
  pub fn public_message(&self) -> String {
    match self {
      IndexFailure::NotFound => "document not found in source".to_string(),
      IndexFailure::Unsupported(filetype) => format!("unsupported filetype {filetype}"),
      IndexFailure::Parse => "parse error".to_string(),
      IndexFailure::Transient(_) => "transient error".to_string(),
      IndexFailure::Unknown(_) => "unknown error".to_string(),
    }
  }
}

fn transient(e: impl std::fmt::Display) -> IndexFailure {
  IndexFailure::Transient(e.to_string())
}

#[derive(Debug, Clone)]
pub struct IndexerConfig {
  pub indexer_version: i32,
  pub max_queue_size: usize,
  pub chunker_max_chars: usize,
}

/// The orchestrator: reconciles the source against the catalog, consumes
/// the work queue, and drives each unit through the indexing state machine.
pub struct Indexer {
  source: DriveSource,
  catalog: Arc<dyn Catalog>,
  store: Arc<VectorStore>,
  parser: Arc<Parser>,
  embedder: Arc<Embedder>,
  chunker: Chunker,
  indexer_version: i32,
  queue: WorkQueue,
}

impl Indexer {
  pub fn new(
    source: DriveSource,
    catalog: Arc<dyn Catalog>,
    store: Arc<VectorStore>,
    parser: Arc<Parser>,
    embedder: Arc<Embedder>,
    config: IndexerConfig,
  ) -> (Arc<Self>, WorkReceiver) {
    let (queue, receiver) = work_queue(config.max_queue_size);
    let indexer = Arc::new(Self {
      source,
      catalog,
      store,
      parser,
      embedder,
      chunker: Chunker::new(config.chunker_max_chars),
      indexer_version: config.indexer_version,
      queue,
    });
    (indexer, receiver)
  }

  /// Run until cancelled: spawn the queue consumer, reconcile once, then
  /// follow source events.
  pub async fn run(self: Arc<Self>, receiver: WorkReceiver, cancel: CancellationToken) {
    let consumer = {
      let indexer = self.clone();
      let cancel = cancel.clone();
      tokio::spawn(async move { indexer.consume(receiver, cancel).await })
    };

    // reconciliation failures are fatal to reconciliation only
    if let Err(e) = self.reconcile().await {
      error!("reconciliation failed: {e}");
    }

    let mut events = self.source.subscribe();
    loop {
      tokio::select! {
        _ = cancel.cancelled() => break,
        event = events.next() => match event {
          Some(event) => self.handle_event(event).await,
          None => break,
        }
      }
    }

    let _ = consumer.await;
  }

  /// Converge the catalog to the current source snapshot: enqueue new and
  /// changed documents, delete what the source no longer has.
  pub async fn reconcile(&self) -> Result<(), IndexerError> {
    let refs = self.source.list_all().await?;
    let db = self.catalog.get_all_documents(self.indexer_version).await?;
    info!(source = refs.len(), catalog = db.len(), "reconciling");

    let by_uri: std::collections::HashMap<&str, &catalog::DocumentView> =
      db.iter().map(|view| (view.uri.as_str(), view)).collect();

    let to_index: Vec<DocumentReference> = refs
      .iter()
      .filter(|r| classify(by_uri.get(r.uri.as_str()).copied(), r) != Classification::Unchanged)
      .cloned()
      .collect();
    self.mark_pending_and_enqueue(&to_index).await?;

    let gone = deleted_uris(&db, &refs);
    if !gone.is_empty() {
      info!(count = gone.len(), "removing documents absent from source");
      self.catalog.delete_documents(&gone).await?;
    }
    Ok(())
  }

  /// Process one source event.
  pub async fn handle_event(&self, event: SourceEvent) {
    let outcome = match event {
      SourceEvent::Upsert(doc_ref) => self.handle_upsert(doc_ref).await,
      SourceEvent::Delete { uri } => {
        debug!(uri, "source delete");
        self.catalog.delete_documents(&[uri]).await.map_err(IndexerError::from)
      }
    };
    if let Err(e) = outcome {
      warn!("failed to process source event: {e}");
    }
  }

  async fn handle_upsert(&self, doc_ref: DocumentReference) -> Result<(), IndexerError> {
    let views = self
      .catalog
      .get_documents(std::slice::from_ref(&doc_ref.uri), self.indexer_version)
      .await?;
    match classify(views.get(&doc_ref.uri), &doc_ref) {
      Classification::Unchanged => {
        debug!(uri = doc_ref.uri, "upsert for unchanged content, skipping");
        Ok(())
      }
      Classification::New | Classification::Changed => self.mark_pending_and_enqueue(&[doc_ref]).await,
    }
  }

  async fn mark_pending_and_enqueue(&self, refs: &[DocumentReference]) -> Result<(), IndexerError> {
    if refs.is_empty() {
      return Ok(());
    }
    let uris: Vec<String> = refs.iter().map(|r| r.uri.clone()).collect();
    let ids = self.catalog.create_indexed_documents(&uris, self.indexer_version).await?;
    for doc_ref in refs {
      let Some(&indexed_document_id) = ids.get(&doc_ref.uri) else { continue };
      let enqueued = self
        .queue
        .enqueue(WorkItem {
          doc_ref: doc_ref.clone(),
          indexed_document_id,
        })
        .await
        .map_err(|_| IndexerError::QueueClosed)?;
      if !enqueued {
        debug!(uri = doc_ref.uri, "already enqueued, suppressing duplicate");
      }
    }
    Ok(())
  }

  /// Single consumer: errors inside a unit never poison the queue.
  pub async fn consume(&self, mut receiver: WorkReceiver, cancel: CancellationToken) {
    loop {
      tokio::select! {
        _ = cancel.cancelled() => break,
        item = receiver.dequeue() => match item {
          Some(item) => self.process(item).await,
          None => break,
        }
      }
    }
  }

  /// Drive one unit through the indexing state machine.
  pub async fn process(&self, item: WorkItem) {
    let id = item.indexed_document_id;
    let uri = item.doc_ref.uri.clone();
    debug!(uri, "indexing");

    if let Err(e) = self
      .catalog
      .update_indexed_documents_status(&[id], IndexingStatus::Indexing, None)
      .await
    {
      // the unit stays pending; reconciliation re-derives it after restart
      warn!(uri, "could not mark indexing: {e}");
      return;
    }

    match self.index_document(&item).await {
      Ok(()) => info!(uri, "indexing succeeded"),
      Err(failure) => {
        warn!(uri, "indexing failed: {failure:?}");
        let message = failure.public_message();
        if let Err(e) = self
          .catalog
          .update_indexed_documents_status(&[id], IndexingStatus::IndexingError, Some(&message))
          .await
        {
          warn!(uri, "could not record indexing error: {e}");
        }
      }
    }
  }

  async fn index_document(&self, item: &WorkItem) -> Result<(), IndexFailure> {
    let uri = &item.doc_ref.uri;
    let id = item.indexed_document_id;

    let doc = self.source.get_object(uri).await.map_err(transient)?;
    let Some(doc) = doc else {
      // the document vanished between reference and fetch; the matching
      // delete event cleans the catalog up
      return Err(IndexFailure::NotFound);
    };

    // level 1: the raw bytes were already indexed under this version
    let raw_hash = content_hash(&doc.bytes);
    if let Some(existing) = self
      .catalog
      .get_indexed_content_if_exists(&raw_hash, self.indexer_version)
      .await
      .map_err(transient)?
    {
      debug!(uri, raw_hash, "raw content already indexed, skipping parse");
      self
        .catalog
        .finalize_indexed_document(id, Some(&doc.source_version), existing.id)
        .await
        .map_err(transient)?;
      return Ok(());
    }

    let parsed = self.parser.parse(uri, &doc.bytes).map_err(|e| match e {
      ParseError::UnsupportedType(filetype) => IndexFailure::Unsupported(filetype),
      ParseError::Malformed(detail) => {
        warn!(uri, "parse failed: {detail}");
        IndexFailure::Parse
      }
    })?;

    // level 2: another raw form already produced this markdown
    let already_indexed = self.store.is_indexed(&parsed.parsed_hash).await.map_err(transient)?;
    if already_indexed {
      debug!(uri, parsed_hash = parsed.parsed_hash, "parsed content already in store, skipping embedding");
    } else {
      let chunks = self.chunker.chunk(&parsed.markdown);
      let embedded = if parsed.markdown.is_empty() {
        Vec::new()
      } else {
        self
          .embedder
          .embed_document(&parsed, &chunks)
          .await
          .map_err(|e| match e {
            EmbeddingError::Request(_) | EmbeddingError::Provider(_) | EmbeddingError::Timeout => transient(e),
            other => IndexFailure::Unknown(other.to_string()),
          })?
      };
      self.store.index(&parsed, &embedded).await.map_err(transient)?;
    }

    let content_id = self
      .catalog
      .upsert_indexed_content(
        &IndexedContent {
          raw_hash,
          parsed_hash: parsed.parsed_hash.clone(),
        },
        self.indexer_version,
      )
      .await
      .map_err(transient)?;
    self
      .catalog
      .finalize_indexed_document(id, Some(&doc.source_version), content_id)
      .await
      .map_err(transient)?;
    Ok(())
  }
}
