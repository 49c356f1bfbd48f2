use async_trait::async_trait;
use chrono::{DateTime, Utc};
use seemantic_core::IndexingStatus;
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum CatalogError {
  #[error("Database error: {0}")]
  Database(#[from] sqlx::Error),
  #[error("Migration error: {0}")]
  Migration(#[from] sqlx::migrate::MigrateError),
  #[error("Invalid transition: {0}")]
  InvalidTransition(&'static str),
  #[error("Unknown status value: {0}")]
  UnknownStatus(String),
}

pub type Result<T> = std::result::Result<T, CatalogError>;

/// The (raw_hash, parsed_hash) pair recorded for one indexer version; the
/// deduplication anchor for work-skipping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedContent {
  pub raw_hash: String,
  pub parsed_hash: String,
}

/// A stored `IndexedContent` row: its id plus the content pair.
#[derive(Debug, Clone)]
pub struct IndexedContentRef {
  pub id: Uuid,
  pub content: IndexedContent,
}

/// A document as viewed by one indexer version, joined with its indexed
/// content when indexing has succeeded.
#[derive(Debug, Clone)]
pub struct DocumentView {
  pub uri: String,
  pub indexed_document_id: Uuid,
  pub indexer_version: i32,
  pub status: IndexingStatus,
  pub last_status_change: DateTime<Utc>,
  pub error_message: Option<String>,
  pub indexed_source_version: Option<String>,
  pub last_indexing: Option<DateTime<Utc>>,
  pub indexed_content: Option<IndexedContent>,
}

/// Relational catalog operations consumed by the indexer and the search
/// side. Each call is atomic; the DBMS driver behind the production
/// implementation is external.
#[async_trait]
pub trait Catalog: Send + Sync {
  /// Cascade-remove documents (and their IndexedDocuments across all
  /// indexer versions) by uri.
  async fn delete_documents(&self, uris: &[String]) -> Result<()>;

  /// Upsert Documents and their per-version IndexedDocument rows with
  /// `status = pending`. Idempotent: an existing row is reset to pending
  /// (clearing any indexed content, per the success invariant).
  async fn create_indexed_documents(&self, uris: &[String], indexer_version: i32) -> Result<HashMap<String, Uuid>>;

  /// Set the status of several IndexedDocuments.
  ///
  /// Writing `indexing_success` through this call is rejected: finalize is
  /// the only success path.
  async fn update_indexed_documents_status(
    &self,
    ids: &[Uuid],
    status: IndexingStatus,
    error_message: Option<&str>,
  ) -> Result<()>;

  async fn get_indexed_content_if_exists(
    &self,
    raw_hash: &str,
    indexer_version: i32,
  ) -> Result<Option<IndexedContentRef>>;

  /// Unique on (raw_hash, indexer_version); on conflict the parsed_hash is
  /// updated (idempotent: the same input bytes parse to the same hash).
  async fn upsert_indexed_content(&self, content: &IndexedContent, indexer_version: i32) -> Result<Uuid>;

  /// Atomic transition to `indexing_success`: sets the content link and the
  /// source version, stamps `last_indexing`, clears the error.
  async fn finalize_indexed_document(
    &self,
    indexed_document_id: Uuid,
    source_version: Option<&str>,
    content_id: Uuid,
  ) -> Result<()>;

  /// Query-time join: only rows whose `indexed_content_id` is present and
  /// matches one of `parsed_hashes` are returned.
  async fn get_documents_from_indexed_parsed_hashes(
    &self,
    parsed_hashes: &[String],
    indexer_version: i32,
  ) -> Result<HashMap<String, DocumentView>>;

  async fn get_all_documents(&self, indexer_version: i32) -> Result<Vec<DocumentView>>;

  async fn get_documents(&self, uris: &[String], indexer_version: i32) -> Result<HashMap<String, DocumentView>>;
}
