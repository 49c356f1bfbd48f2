// Parsed-markdown table operations

use arrow_array::{RecordBatch, RecordBatchIterator, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use seemantic_core::ParsedDocument;
use std::sync::Arc;

use crate::connection::{Result, StoreError, VectorStore};
use crate::schema::parsed_schema;

impl VectorStore {
  /// Upsert the markdown row for a parsed hash. Idempotent: the row content
  /// is a function of its key.
  pub(crate) async fn upsert_markdown(&self, parsed: &ParsedDocument) -> Result<()> {
    let table = self.parsed_table().await?;
    let batch = RecordBatch::try_new(
      parsed_schema(),
      vec![
        Arc::new(StringArray::from(vec![parsed.parsed_hash.clone()])),
        Arc::new(StringArray::from(vec![parsed.markdown.clone()])),
      ],
    )?;
    let batches = RecordBatchIterator::new(vec![Ok(batch)], parsed_schema());

    let mut merge_insert = table.merge_insert(&["parsed_hash"]);
    merge_insert.when_matched_update_all(None).when_not_matched_insert_all();
    merge_insert.execute(Box::new(batches)).await?;
    Ok(())
  }

  /// Fetch the markdown for a parsed hash, `None` when absent.
  pub async fn get_document(&self, parsed_hash: &str) -> Result<Option<ParsedDocument>> {
    let table = self.parsed_table().await?;
    let results: Vec<RecordBatch> = table
      .query()
      .only_if(format!("parsed_hash = '{parsed_hash}'"))
      .execute()
      .await?
      .try_collect()
      .await?;

    for batch in &results {
      if batch.num_rows() > 0 {
        return Ok(Some(ParsedDocument {
          parsed_hash: column_str(batch, "parsed_hash", 0)?,
          markdown: column_str(batch, "markdown", 0)?,
        }));
      }
    }
    Ok(None)
  }

  /// Fetch markdown for several parsed hashes in one scan.
  pub(crate) async fn get_documents(&self, parsed_hashes: &[String]) -> Result<Vec<ParsedDocument>> {
    if parsed_hashes.is_empty() {
      return Ok(Vec::new());
    }
    let list = parsed_hashes
      .iter()
      .map(|h| format!("'{h}'"))
      .collect::<Vec<_>>()
      .join(", ");
    let table = self.parsed_table().await?;
    let results: Vec<RecordBatch> = table
      .query()
      .only_if(format!("parsed_hash IN ({list})"))
      .execute()
      .await?
      .try_collect()
      .await?;

    let mut documents = Vec::new();
    for batch in &results {
      for row in 0..batch.num_rows() {
        documents.push(ParsedDocument {
          parsed_hash: column_str(batch, "parsed_hash", row)?,
          markdown: column_str(batch, "markdown", row)?,
        });
      }
    }
    Ok(documents)
  }
}

pub(crate) fn column_str(batch: &RecordBatch, name: &str, row: usize) -> Result<String> {
  batch
    .column_by_name(name)
    .and_then(|c| c.as_any().downcast_ref::<StringArray>())
    .map(|a| a.value(row).to_string())
    .ok_or_else(|| StoreError::Schema(format!("missing column {name}")))
}
