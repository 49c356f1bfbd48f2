//! In-process catalog.
//!
//! Mirrors the relational semantics of the Postgres implementation
//! (idempotent upserts, the finalize-only success path, cascade deletes)
//! without a database. Used by the indexer and search test suites.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use seemantic_core::IndexingStatus;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::model::{Catalog, CatalogError, DocumentView, IndexedContent, IndexedContentRef, Result};

#[derive(Debug, Clone)]
struct DocumentRow {
  id: Uuid,
}

#[derive(Debug, Clone)]
struct IndexedDocumentRow {
  id: Uuid,
  document_id: Uuid,
  uri: String,
  indexer_version: i32,
  status: IndexingStatus,
  last_status_change: DateTime<Utc>,
  last_indexing: Option<DateTime<Utc>>,
  error_message: Option<String>,
  indexed_source_version: Option<String>,
  indexed_content_id: Option<Uuid>,
}

#[derive(Debug, Clone)]
struct IndexedContentRow {
  raw_hash: String,
  parsed_hash: String,
  indexer_version: i32,
}

#[derive(Default)]
struct State {
  documents: HashMap<String, DocumentRow>,
  indexed_documents: HashMap<Uuid, IndexedDocumentRow>,
  contents: HashMap<Uuid, IndexedContentRow>,
}

impl State {
  fn view(&self, row: &IndexedDocumentRow) -> DocumentView {
    let indexed_content = row.indexed_content_id.and_then(|id| self.contents.get(&id)).map(|c| IndexedContent {
      raw_hash: c.raw_hash.clone(),
      parsed_hash: c.parsed_hash.clone(),
    });
    DocumentView {
      uri: row.uri.clone(),
      indexed_document_id: row.id,
      indexer_version: row.indexer_version,
      status: row.status,
      last_status_change: row.last_status_change,
      error_message: row.error_message.clone(),
      indexed_source_version: row.indexed_source_version.clone(),
      last_indexing: row.last_indexing,
      indexed_content,
    }
  }
}

#[derive(Clone, Default)]
pub struct MemoryCatalog {
  state: Arc<Mutex<State>>,
}

impl MemoryCatalog {
  pub fn new() -> Self {
    Self::default()
  }
}

#[async_trait]
impl Catalog for MemoryCatalog {
  async fn delete_documents(&self, uris: &[String]) -> Result<()> {
    let mut state = self.state.lock().expect("memory catalog lock");
    for uri in uris {
      if let Some(doc) = state.documents.remove(uri) {
        state.indexed_documents.retain(|_, row| row.document_id != doc.id);
      }
    }
    Ok(())
  }

  async fn create_indexed_documents(&self, uris: &[String], indexer_version: i32) -> Result<HashMap<String, Uuid>> {
    let now = Utc::now();
    let mut state = self.state.lock().expect("memory catalog lock");
    let mut ids = HashMap::with_capacity(uris.len());

    for uri in uris {
      let document_id = match state.documents.get(uri) {
        Some(doc) => doc.id,
        None => {
          let id = Uuid::now_v7();
          state.documents.insert(uri.clone(), DocumentRow { id });
          id
        }
      };

      let existing = state
        .indexed_documents
        .values_mut()
        .find(|row| row.document_id == document_id && row.indexer_version == indexer_version);
      let id = match existing {
        Some(row) => {
          row.status = IndexingStatus::Pending;
          row.last_status_change = now;
          row.error_message = None;
          row.indexed_content_id = None;
          row.id
        }
        None => {
          let id = Uuid::now_v7();
          state.indexed_documents.insert(
            id,
            IndexedDocumentRow {
              id,
              document_id,
              uri: uri.clone(),
              indexer_version,
              status: IndexingStatus::Pending,
              last_status_change: now,
              last_indexing: None,
              error_message: None,
              indexed_source_version: None,
              indexed_content_id: None,
            },
          );
          id
        }
      };
      ids.insert(uri.clone(), id);
    }
    Ok(ids)
  }

  async fn update_indexed_documents_status(
    &self,
    ids: &[Uuid],
    status: IndexingStatus,
    error_message: Option<&str>,
  ) -> Result<()> {
    if status == IndexingStatus::IndexingSuccess {
      return Err(CatalogError::InvalidTransition(
        "indexing_success is only reachable through finalize_indexed_document",
      ));
    }
    let now = Utc::now();
    let mut state = self.state.lock().expect("memory catalog lock");
    for id in ids {
      if let Some(row) = state.indexed_documents.get_mut(id) {
        row.status = status;
        row.last_status_change = now;
        row.error_message = error_message.map(str::to_string);
        row.indexed_content_id = None;
      }
    }
    Ok(())
  }

  async fn get_indexed_content_if_exists(
    &self,
    raw_hash: &str,
    indexer_version: i32,
  ) -> Result<Option<IndexedContentRef>> {
    let state = self.state.lock().expect("memory catalog lock");
    Ok(
      state
        .contents
        .iter()
        .find(|(_, c)| c.raw_hash == raw_hash && c.indexer_version == indexer_version)
        .map(|(id, c)| IndexedContentRef {
          id: *id,
          content: IndexedContent {
            raw_hash: c.raw_hash.clone(),
            parsed_hash: c.parsed_hash.clone(),
          },
        }),
    )
  }

  async fn upsert_indexed_content(&self, content: &IndexedContent, indexer_version: i32) -> Result<Uuid> {
    let mut state = self.state.lock().expect("memory catalog lock");
    let existing = state
      .contents
      .iter_mut()
      .find(|(_, c)| c.raw_hash == content.raw_hash && c.indexer_version == indexer_version);
    match existing {
      Some((id, row)) => {
        row.parsed_hash = content.parsed_hash.clone();
        Ok(*id)
      }
      None => {
        let id = Uuid::now_v7();
        state.contents.insert(
          id,
          IndexedContentRow {
            raw_hash: content.raw_hash.clone(),
            parsed_hash: content.parsed_hash.clone(),
            indexer_version,
          },
        );
        Ok(id)
      }
    }
  }

  async fn finalize_indexed_document(
    &self,
    indexed_document_id: Uuid,
    source_version: Option<&str>,
    content_id: Uuid,
  ) -> Result<()> {
    let now = Utc::now();
    let mut state = self.state.lock().expect("memory catalog lock");
    if let Some(row) = state.indexed_documents.get_mut(&indexed_document_id) {
      row.status = IndexingStatus::IndexingSuccess;
      row.last_status_change = now;
      row.last_indexing = Some(now);
      row.error_message = None;
      row.indexed_source_version = source_version.map(str::to_string);
      row.indexed_content_id = Some(content_id);
    }
    Ok(())
  }

  async fn get_documents_from_indexed_parsed_hashes(
    &self,
    parsed_hashes: &[String],
    indexer_version: i32,
  ) -> Result<HashMap<String, DocumentView>> {
    let state = self.state.lock().expect("memory catalog lock");
    let mut views = HashMap::new();
    for row in state.indexed_documents.values() {
      if row.indexer_version != indexer_version {
        continue;
      }
      let Some(content_id) = row.indexed_content_id else { continue };
      let Some(content) = state.contents.get(&content_id) else { continue };
      if parsed_hashes.contains(&content.parsed_hash) {
        views.insert(content.parsed_hash.clone(), state.view(row));
      }
    }
    Ok(views)
  }

  async fn get_all_documents(&self, indexer_version: i32) -> Result<Vec<DocumentView>> {
    let state = self.state.lock().expect("memory catalog lock");
    Ok(
      state
        .indexed_documents
        .values()
        .filter(|row| row.indexer_version == indexer_version)
        .map(|row| state.view(row))
        .collect(),
    )
  }

  async fn get_documents(&self, uris: &[String], indexer_version: i32) -> Result<HashMap<String, DocumentView>> {
    let state = self.state.lock().expect("memory catalog lock");
    Ok(
      state
        .indexed_documents
        .values()
        .filter(|row| row.indexer_version == indexer_version && uris.contains(&row.uri))
        .map(|row| (row.uri.clone(), state.view(row)))
        .collect(),
    )
  }
}
