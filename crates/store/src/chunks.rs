// Chunk-vector table operations

use arrow_array::{FixedSizeListArray, Float16Array, Int64Array, RecordBatch, RecordBatchIterator, StringArray};
use arrow_schema::{DataType, Field};
use half::f16;
use seemantic_core::{EmbeddedChunk, ParsedDocument};
use std::sync::Arc;
use tracing::debug;

use crate::connection::{Result, VectorStore};
use crate::schema::chunk_schema;

impl VectorStore {
  /// Atomically upsert the markdown row and the full chunk set for a parsed
  /// hash: "for this `parsed_hash`, replace all chunks with the given set."
  ///
  /// The markdown row is written first and chunk rows last, so the presence
  /// of chunk rows implies the markdown is present. Chunk row ids are
  /// derived from `(parsed_hash, start, end)`, so overlapping writers
  /// converge on identical rows instead of duplicating them.
  pub async fn index(&self, parsed: &ParsedDocument, chunks: &[EmbeddedChunk]) -> Result<()> {
    self.upsert_markdown(parsed).await?;
    debug!(parsed_hash = %parsed.parsed_hash, chunks = chunks.len(), "indexing chunk set");
    if chunks.is_empty() {
      return Ok(());
    }

    let batch = chunks_to_batch(&parsed.parsed_hash, chunks, self.vector_dim())?;
    let batches = RecordBatchIterator::new(vec![Ok(batch)], chunk_schema(self.vector_dim()));

    let table = self.chunk_table().await?;
    let mut merge_insert = table.merge_insert(&["id"]);
    merge_insert
      .when_matched_update_all(None)
      .when_not_matched_insert_all()
      .when_not_matched_by_source_delete(Some(format!("parsed_hash = '{}'", parsed.parsed_hash)));
    merge_insert.execute(Box::new(batches)).await?;
    Ok(())
  }

  /// Whether chunk rows exist for this parsed hash.
  ///
  /// Chunks are written last, so their presence implies the markdown row is
  /// present too.
  pub async fn is_indexed(&self, parsed_hash: &str) -> Result<bool> {
    Ok(self.count_chunks(parsed_hash).await? > 0)
  }

  /// Number of chunk rows stored for a parsed hash.
  pub async fn count_chunks(&self, parsed_hash: &str) -> Result<usize> {
    let table = self.chunk_table().await?;
    Ok(table.count_rows(Some(format!("parsed_hash = '{parsed_hash}'"))).await?)
  }
}

fn chunks_to_batch(parsed_hash: &str, chunks: &[EmbeddedChunk], vector_dim: usize) -> Result<RecordBatch> {
  let ids = StringArray::from(
    chunks
      .iter()
      .map(|c| format!("{parsed_hash}:{}:{}", c.chunk.start, c.chunk.end))
      .collect::<Vec<_>>(),
  );
  let hashes = StringArray::from(vec![parsed_hash.to_string(); chunks.len()]);
  let starts = Int64Array::from(chunks.iter().map(|c| c.chunk.start as i64).collect::<Vec<_>>());
  let ends = Int64Array::from(chunks.iter().map(|c| c.chunk.end as i64).collect::<Vec<_>>());

  let mut values: Vec<f16> = Vec::with_capacity(chunks.len() * vector_dim);
  for chunk in chunks {
    let mut embedding = chunk.embedding.clone();
    embedding.resize(vector_dim, 0.0);
    values.extend(embedding.iter().map(|v| f16::from_f32(*v)));
  }
  let item_field = Arc::new(Field::new("item", DataType::Float16, true));
  let vectors = FixedSizeListArray::try_new(item_field, vector_dim as i32, Arc::new(Float16Array::from(values)), None)?;

  Ok(RecordBatch::try_new(
    chunk_schema(vector_dim),
    vec![
      Arc::new(ids),
      Arc::new(hashes),
      Arc::new(starts),
      Arc::new(ends),
      Arc::new(vectors),
    ],
  )?)
}
