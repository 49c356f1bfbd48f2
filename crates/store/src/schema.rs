use arrow_schema::{DataType, Field, Schema};
use std::sync::Arc;

/// Schema for `parsed_v{V}`: canonical markdown addressed by its hash.
pub fn parsed_schema() -> Arc<Schema> {
  Arc::new(Schema::new(vec![
    Field::new("parsed_hash", DataType::Utf8, false),
    Field::new("markdown", DataType::Utf8, false),
  ]))
}

/// Schema for `chunk_v{V}`: one row per embedded chunk.
///
/// `id` is `{parsed_hash}:{start}:{end}` so merge-inserts are idempotent.
pub fn chunk_schema(vector_dim: usize) -> Arc<Schema> {
  Arc::new(Schema::new(vec![
    Field::new("id", DataType::Utf8, false),
    Field::new("parsed_hash", DataType::Utf8, false),
    Field::new("start", DataType::Int64, false),
    Field::new("end", DataType::Int64, false),
    Field::new(
      "vector",
      DataType::FixedSizeList(Arc::new(Field::new("item", DataType::Float16, true)), vector_dim as i32),
      true,
    ),
  ]))
}
