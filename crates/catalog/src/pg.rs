use async_trait::async_trait;
use chrono::Utc;
use seemantic_core::IndexingStatus;
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use std::collections::HashMap;
use tracing::info;
use uuid::Uuid;

use crate::model::{Catalog, CatalogError, DocumentView, IndexedContent, IndexedContentRef, Result};

const VIEW_SELECT: &str = "SELECT d.uri AS uri, i.id AS indexed_document_id, i.indexer_version, i.status, \
       i.last_status_change, i.error_message, i.indexed_source_version, i.last_indexing, \
       c.raw_hash AS raw_hash, c.parsed_hash AS parsed_hash \
  FROM document d \
  JOIN indexed_document i ON i.document_id = d.id \
  LEFT JOIN indexed_content c ON i.indexed_content_id = c.id";

/// Postgres-backed catalog.
///
/// Connecting runs the embedded migrations, which also install the
/// `table_changes` NOTIFY trigger the change bus listens on.
#[derive(Clone)]
pub struct PgCatalog {
  pool: PgPool,
}

impl PgCatalog {
  pub async fn connect(database_url: &str) -> Result<Self> {
    let pool = PgPoolOptions::new().max_connections(5).connect(database_url).await?;
    info!("Connected to catalog database");
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(Self { pool })
  }

  pub fn pool(&self) -> &PgPool {
    &self.pool
  }
}

fn row_to_view(row: &PgRow) -> Result<DocumentView> {
  let status_str: String = row.try_get("status")?;
  let status = IndexingStatus::parse(&status_str).ok_or(CatalogError::UnknownStatus(status_str))?;
  let raw_hash: Option<String> = row.try_get("raw_hash")?;
  let parsed_hash: Option<String> = row.try_get("parsed_hash")?;
  let indexed_content = match (raw_hash, parsed_hash) {
    (Some(raw_hash), Some(parsed_hash)) => Some(IndexedContent { raw_hash, parsed_hash }),
    _ => None,
  };

  Ok(DocumentView {
    uri: row.try_get("uri")?,
    indexed_document_id: row.try_get("indexed_document_id")?,
    indexer_version: row.try_get("indexer_version")?,
    status,
    last_status_change: row.try_get("last_status_change")?,
    error_message: row.try_get("error_message")?,
    indexed_source_version: row.try_get("indexed_source_version")?,
    last_indexing: row.try_get("last_indexing")?,
    indexed_content,
  })
}

#[async_trait]
impl Catalog for PgCatalog {
  async fn delete_documents(&self, uris: &[String]) -> Result<()> {
    // indexed_document rows across all versions go with the FK cascade
    sqlx::query("DELETE FROM document WHERE uri = ANY($1)")
      .bind(uris)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  async fn create_indexed_documents(&self, uris: &[String], indexer_version: i32) -> Result<HashMap<String, Uuid>> {
    let now = Utc::now();
    let mut tx = self.pool.begin().await?;
    let mut ids = HashMap::with_capacity(uris.len());

    for uri in uris {
      let document_id: Uuid = sqlx::query_scalar(
        "INSERT INTO document (id, uri, creation_time) VALUES ($1, $2, $3) \
         ON CONFLICT (uri) DO UPDATE SET uri = excluded.uri \
         RETURNING id",
      )
      .bind(Uuid::now_v7())
      .bind(uri)
      .bind(now)
      .fetch_one(&mut *tx)
      .await?;

      let indexed_document_id: Uuid = sqlx::query_scalar(
        "INSERT INTO indexed_document \
           (id, document_id, uri, indexer_version, indexed_source_version, indexed_content_id, \
            status, last_status_change, last_indexing, error_message, creation_time) \
         VALUES ($1, $2, $3, $4, NULL, NULL, 'pending', $5, NULL, NULL, $5) \
         ON CONFLICT (document_id, indexer_version) DO UPDATE \
           SET status = 'pending', \
               last_status_change = excluded.last_status_change, \
               error_message = NULL, \
               indexed_content_id = NULL \
         RETURNING id",
      )
      .bind(Uuid::now_v7())
      .bind(document_id)
      .bind(uri)
      .bind(indexer_version)
      .bind(now)
      .fetch_one(&mut *tx)
      .await?;

      ids.insert(uri.clone(), indexed_document_id);
    }

    tx.commit().await?;
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
    // any non-success state has no content link (CHECK constraint)
    sqlx::query(
      "UPDATE indexed_document \
         SET status = $2, last_status_change = $3, error_message = $4, indexed_content_id = NULL \
       WHERE id = ANY($1)",
    )
    .bind(ids)
    .bind(status.as_str())
    .bind(Utc::now())
    .bind(error_message)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn get_indexed_content_if_exists(
    &self,
    raw_hash: &str,
    indexer_version: i32,
  ) -> Result<Option<IndexedContentRef>> {
    let row = sqlx::query(
      "SELECT id, raw_hash, parsed_hash FROM indexed_content \
       WHERE raw_hash = $1 AND indexer_version = $2",
    )
    .bind(raw_hash)
    .bind(indexer_version)
    .fetch_optional(&self.pool)
    .await?;

    row
      .map(|row| {
        Ok(IndexedContentRef {
          id: row.try_get("id")?,
          content: IndexedContent {
            raw_hash: row.try_get("raw_hash")?,
            parsed_hash: row.try_get("parsed_hash")?,
          },
        })
      })
      .transpose()
  }

  async fn upsert_indexed_content(&self, content: &IndexedContent, indexer_version: i32) -> Result<Uuid> {
    let id: Uuid = sqlx::query_scalar(
      "INSERT INTO indexed_content (id, raw_hash, parsed_hash, indexer_version) \
       VALUES ($1, $2, $3, $4) \
       ON CONFLICT (raw_hash, indexer_version) DO UPDATE SET parsed_hash = excluded.parsed_hash \
       RETURNING id",
    )
    .bind(Uuid::now_v7())
    .bind(&content.raw_hash)
    .bind(&content.parsed_hash)
    .bind(indexer_version)
    .fetch_one(&self.pool)
    .await?;
    Ok(id)
  }

  async fn finalize_indexed_document(
    &self,
    indexed_document_id: Uuid,
    source_version: Option<&str>,
    content_id: Uuid,
  ) -> Result<()> {
    sqlx::query(
      "UPDATE indexed_document \
         SET status = 'indexing_success', last_status_change = $2, error_message = NULL, \
             indexed_source_version = $3, indexed_content_id = $4, last_indexing = $2 \
       WHERE id = $1",
    )
    .bind(indexed_document_id)
    .bind(Utc::now())
    .bind(source_version)
    .bind(content_id)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  async fn get_documents_from_indexed_parsed_hashes(
    &self,
    parsed_hashes: &[String],
    indexer_version: i32,
  ) -> Result<HashMap<String, DocumentView>> {
    let rows = sqlx::query(&format!(
      "{VIEW_SELECT} WHERE i.indexer_version = $1 AND c.indexer_version = $1 AND c.parsed_hash = ANY($2)"
    ))
    .bind(indexer_version)
    .bind(parsed_hashes)
    .fetch_all(&self.pool)
    .await?;

    let mut views = HashMap::with_capacity(rows.len());
    for row in &rows {
      let view = row_to_view(row)?;
      if let Some(content) = &view.indexed_content {
        views.insert(content.parsed_hash.clone(), view);
      }
    }
    Ok(views)
  }

  async fn get_all_documents(&self, indexer_version: i32) -> Result<Vec<DocumentView>> {
    let rows = sqlx::query(&format!("{VIEW_SELECT} WHERE i.indexer_version = $1"))
      .bind(indexer_version)
      .fetch_all(&self.pool)
      .await?;
    rows.iter().map(row_to_view).collect()
  }

  async fn get_documents(&self, uris: &[String], indexer_version: i32) -> Result<HashMap<String, DocumentView>> {
    let rows = sqlx::query(&format!("{VIEW_SELECT} WHERE i.indexer_version = $1 AND d.uri = ANY($2)"))
      .bind(indexer_version)
      .bind(uris)
      .fetch_all(&self.pool)
      .await?;

    let mut views = HashMap::with_capacity(rows.len());
    for row in &rows {
      let view = row_to_view(row)?;
      views.insert(view.uri.clone(), view);
    }
    Ok(views)
  }
}

// These tests need a live Postgres; they skip when
// SEEMANTIC_TEST_DATABASE_URL is not set.
#[cfg(test)]
mod tests {
  use super::*;

  async fn test_catalog() -> Option<PgCatalog> {
    let url = std::env::var("SEEMANTIC_TEST_DATABASE_URL").ok()?;
    Some(PgCatalog::connect(&url).await.expect("connect test database"))
  }

  fn unique_uri(tag: &str) -> String {
    format!("tests/{tag}/{}.md", Uuid::now_v7())
  }

  #[tokio::test]
  async fn test_create_is_idempotent() {
    let Some(catalog) = test_catalog().await else { return };
    let uri = unique_uri("create");

    let first = catalog.create_indexed_documents(&[uri.clone()], 1).await.unwrap();
    let second = catalog.create_indexed_documents(&[uri.clone()], 1).await.unwrap();
    assert_eq!(first[&uri], second[&uri]);

    let view = &catalog.get_documents(&[uri.clone()], 1).await.unwrap()[&uri];
    assert_eq!(view.status, IndexingStatus::Pending);
  }

  #[tokio::test]
  async fn test_status_update_rejects_success() {
    let Some(catalog) = test_catalog().await else { return };
    let uri = unique_uri("reject");
    let ids = catalog.create_indexed_documents(&[uri], 1).await.unwrap();
    let ids: Vec<Uuid> = ids.into_values().collect();

    let err = catalog
      .update_indexed_documents_status(&ids, IndexingStatus::IndexingSuccess, None)
      .await
      .unwrap_err();
    assert!(matches!(err, CatalogError::InvalidTransition(_)));
  }

  #[tokio::test]
  async fn test_finalize_links_content() {
    let Some(catalog) = test_catalog().await else { return };
    let uri = unique_uri("finalize");
    let ids = catalog.create_indexed_documents(&[uri.clone()], 1).await.unwrap();

    let content = IndexedContent {
      raw_hash: format!("raw-{}", Uuid::now_v7()),
      parsed_hash: format!("parsed-{}", Uuid::now_v7()),
    };
    let content_id = catalog.upsert_indexed_content(&content, 1).await.unwrap();
    catalog
      .finalize_indexed_document(ids[&uri], Some("etag-1"), content_id)
      .await
      .unwrap();

    let view = &catalog.get_documents(&[uri.clone()], 1).await.unwrap()[&uri];
    assert_eq!(view.status, IndexingStatus::IndexingSuccess);
    assert_eq!(view.indexed_source_version.as_deref(), Some("etag-1"));
    assert_eq!(view.indexed_content.as_ref().unwrap().parsed_hash, content.parsed_hash);
    assert!(view.last_indexing.is_some());

    let by_hash = catalog
      .get_documents_from_indexed_parsed_hashes(&[content.parsed_hash.clone()], 1)
      .await
      .unwrap();
    assert_eq!(by_hash[&content.parsed_hash].uri, uri);
  }

  #[tokio::test]
  async fn test_upsert_content_is_idempotent() {
    let Some(catalog) = test_catalog().await else { return };
    let content = IndexedContent {
      raw_hash: format!("raw-{}", Uuid::now_v7()),
      parsed_hash: "same-parsed".to_string(),
    };
    let a = catalog.upsert_indexed_content(&content, 1).await.unwrap();
    let b = catalog.upsert_indexed_content(&content, 1).await.unwrap();
    assert_eq!(a, b);
  }

  #[tokio::test]
  async fn test_delete_cascades() {
    let Some(catalog) = test_catalog().await else { return };
    let uri = unique_uri("delete");
    catalog.create_indexed_documents(&[uri.clone()], 1).await.unwrap();
    catalog.create_indexed_documents(&[uri.clone()], 2).await.unwrap();

    catalog.delete_documents(&[uri.clone()]).await.unwrap();

    assert!(catalog.get_documents(&[uri.clone()], 1).await.unwrap().is_empty());
    assert!(catalog.get_documents(&[uri], 2).await.unwrap().is_empty());
  }
}
