// Top-k chunk search, grouped per parsed document

use arrow_array::{Float32Array, Int64Array, RecordBatch, StringArray};
use futures::TryStreamExt;
use lancedb::query::{ExecutableQuery, QueryBase};
use seemantic_core::{Chunk, ChunkHit, ParsedDocument};
use std::collections::HashMap;
use tracing::warn;

use crate::connection::{Result, StoreError, VectorStore};
use crate::parsed::column_str;

/// Chunk hits of one parsed document, joined with its markdown.
#[derive(Debug, Clone)]
pub struct DocumentHit {
  pub parsed: ParsedDocument,
  pub chunks: Vec<ChunkHit>,
}

impl DocumentHit {
  /// Best (smallest) distance among this document's hits.
  pub fn min_distance(&self) -> f32 {
    self.chunks.iter().map(|c| c.distance).fold(f32::INFINITY, f32::min)
  }
}

impl VectorStore {
  /// Top-k nearest chunks under the declared metric, grouped by
  /// `parsed_hash` and joined with markdown in a single extra lookup.
  ///
  /// Groups are ordered by their best distance.
  pub async fn query(&self, vector: &[f32], k: usize) -> Result<Vec<DocumentHit>> {
    let table = self.chunk_table().await?;
    let results: Vec<RecordBatch> = table
      .vector_search(vector.to_vec())?
      .distance_type(self.distance)
      .limit(k)
      .execute()
      .await?
      .try_collect()
      .await?;

    // group hits per parsed_hash, preserving nearest-first arrival order
    let mut order: Vec<String> = Vec::new();
    let mut grouped: HashMap<String, Vec<ChunkHit>> = HashMap::new();
    for batch in &results {
      for row in 0..batch.num_rows() {
        let parsed_hash = column_str(batch, "parsed_hash", row)?;
        let hit = ChunkHit {
          chunk: Chunk::new(column_i64(batch, "start", row)? as usize, column_i64(batch, "end", row)? as usize),
          distance: column_f32(batch, "_distance", row)?,
        };
        grouped
          .entry(parsed_hash.clone())
          .or_insert_with(|| {
            order.push(parsed_hash.clone());
            Vec::new()
          })
          .push(hit);
      }
    }

    let documents = self.get_documents(&order).await?;
    let mut markdown_by_hash: HashMap<String, ParsedDocument> =
      documents.into_iter().map(|d| (d.parsed_hash.clone(), d)).collect();

    let mut hits = Vec::with_capacity(order.len());
    for parsed_hash in order {
      let Some(chunks) = grouped.remove(&parsed_hash) else { continue };
      match markdown_by_hash.remove(&parsed_hash) {
        Some(parsed) => hits.push(DocumentHit { parsed, chunks }),
        // chunks are written after markdown, so this means a torn manual edit
        None => warn!(parsed_hash, "chunk rows without a markdown row, skipping"),
      }
    }
    hits.sort_by(|a, b| a.min_distance().total_cmp(&b.min_distance()));
    Ok(hits)
  }
}

fn column_i64(batch: &RecordBatch, name: &str, row: usize) -> Result<i64> {
  batch
    .column_by_name(name)
    .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
    .map(|a| a.value(row))
    .ok_or_else(|| StoreError::Schema(format!("missing column {name}")))
}

fn column_f32(batch: &RecordBatch, name: &str, row: usize) -> Result<f32> {
  batch
    .column_by_name(name)
    .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
    .map(|a| a.value(row))
    .ok_or_else(|| StoreError::Schema(format!("missing column {name}")))
}
