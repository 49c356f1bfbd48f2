use lancedb::{Connection, DistanceType, connect};
use seemantic_core::DistanceMetric;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use crate::schema::{chunk_schema, parsed_schema};

#[derive(Error, Debug)]
pub enum StoreError {
  #[error("LanceDB error: {0}")]
  Lance(#[from] lancedb::Error),
  #[error("Arrow error: {0}")]
  Arrow(#[from] arrow::error::ArrowError),
  #[error("Unexpected row shape: {0}")]
  Schema(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Content-addressed markdown + chunk-vector storage, partitioned by indexer
/// version: tables `parsed_v{V}` and `chunk_v{V}`.
///
/// Reads are eventually consistent, bounded by the connection's
/// read-consistency interval; callers tolerate a just-written chunk set not
/// appearing in queries for up to that interval.
pub struct VectorStore {
  pub(crate) connection: Connection,
  indexer_version: i32,
  vector_dim: usize,
  pub(crate) distance: DistanceType,
}

fn to_distance_type(metric: DistanceMetric) -> DistanceType {
  match metric {
    DistanceMetric::L2 => DistanceType::L2,
    DistanceMetric::Cosine => DistanceType::Cosine,
    DistanceMetric::Dot => DistanceType::Dot,
  }
}

impl VectorStore {
  /// Connect to `uri` and ensure this version's tables exist.
  pub async fn connect(
    uri: &str,
    indexer_version: i32,
    vector_dim: usize,
    metric: DistanceMetric,
    read_consistency_interval: Duration,
  ) -> Result<Self> {
    info!("Opening LanceDB at {uri} (indexer version {indexer_version})");
    let connection = connect(uri)
      .read_consistency_interval(read_consistency_interval)
      .execute()
      .await?;

    let store = Self {
      connection,
      indexer_version,
      vector_dim,
      distance: to_distance_type(metric),
    };
    store.ensure_tables().await?;
    Ok(store)
  }

  pub fn vector_dim(&self) -> usize {
    self.vector_dim
  }

  pub(crate) fn parsed_table_name(&self) -> String {
    format!("parsed_v{}", self.indexer_version)
  }

  pub(crate) fn chunk_table_name(&self) -> String {
    format!("chunk_v{}", self.indexer_version)
  }

  async fn ensure_tables(&self) -> Result<()> {
    let table_names = self.connection.table_names().execute().await?;

    let parsed = self.parsed_table_name();
    if !table_names.contains(&parsed) {
      debug!("Creating {parsed} table");
      self.connection.create_empty_table(&parsed, parsed_schema()).execute().await?;
    }

    let chunks = self.chunk_table_name();
    if !table_names.contains(&chunks) {
      debug!("Creating {chunks} table");
      self
        .connection
        .create_empty_table(&chunks, chunk_schema(self.vector_dim))
        .execute()
        .await?;
    }

    Ok(())
  }

  pub(crate) async fn parsed_table(&self) -> Result<lancedb::Table> {
    Ok(self.connection.open_table(self.parsed_table_name()).execute().await?)
  }

  pub(crate) async fn chunk_table(&self) -> Result<lancedb::Table> {
    Ok(self.connection.open_table(self.chunk_table_name()).execute().await?)
  }
}
