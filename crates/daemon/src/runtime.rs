//! Composition root: every component is constructed here, once, from the
//! immutable settings record, and handed around by value.

use catalog::{CatalogError, ChangeBus, PgCatalog};
use embedding::{Embedder, EmbeddingProvider, JinaProvider, ResilientProvider};
use index::{Indexer, IndexerConfig, WorkReceiver};
use parser::Parser;
use search::SearchEngine;
use seemantic_core::Settings;
use source::{DriveSource, FsObjectStore, SourceError};
use std::sync::Arc;
use std::time::Duration;
use store::{StoreError, VectorStore};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Error, Debug)]
pub enum AppError {
  #[error("Catalog error: {0}")]
  Catalog(#[from] CatalogError),
  #[error("Store error: {0}")]
  Store(#[from] StoreError),
  #[error("Source error: {0}")]
  Source(#[from] SourceError),
}

/// The assembled engine: indexing runtime plus retrieval surface.
pub struct App {
  pub settings: Settings,
  pub catalog: PgCatalog,
  pub bus: ChangeBus,
  pub drive: DriveSource,
  pub store: Arc<VectorStore>,
  pub engine: SearchEngine,
  indexer: Arc<Indexer>,
  receiver: Option<WorkReceiver>,
}

impl App {
  pub async fn build(settings: Settings) -> Result<Self, AppError> {
    let catalog = PgCatalog::connect(&settings.database_url).await?;
    let bus = ChangeBus::new(catalog.pool().clone());

    let object_store = FsObjectStore::new(&settings.drive_root)?;
    let drive = DriveSource::new(Arc::new(object_store), settings.drive_prefix.clone());

    // the embedder declares the distance metric; the store is wired with it
    let provider: Arc<dyn EmbeddingProvider> = Arc::new(ResilientProvider::new(
      JinaProvider::from_settings(&settings.embedder).with_metric(settings.distance_metric),
    ));
    let embedder = Arc::new(Embedder::new(provider.clone(), settings.embedder_max_chars));

    let store = Arc::new(
      VectorStore::connect(
        &settings.store_uri,
        settings.indexer_version,
        provider.dimensions(),
        provider.metric(),
        Duration::from_secs_f64(settings.read_consistency_interval_s),
      )
      .await?,
    );

    let parser = Arc::new(Parser::new());
    let (indexer, receiver) = Indexer::new(
      drive.clone(),
      Arc::new(catalog.clone()),
      store.clone(),
      parser,
      embedder.clone(),
      IndexerConfig {
        indexer_version: settings.indexer_version,
        max_queue_size: settings.max_queue_size,
        chunker_max_chars: settings.chunker_max_chars,
      },
    );

    let engine = SearchEngine::new(
      embedder,
      store.clone(),
      Arc::new(catalog.clone()),
      settings.indexer_version,
    );

    Ok(Self {
      settings,
      catalog,
      bus,
      drive,
      store,
      engine,
      indexer,
      receiver: Some(receiver),
    })
  }

  /// Subscribe to catalog changes as SSE-ready frames, with the configured
  /// keep-alive cadence. Dropping the stream unsubscribes.
  pub fn event_stream(&self, nb_events: Option<usize>) -> impl futures::Stream<Item = crate::events::EventFrame> {
    let keep_alive = Duration::from_secs_f64(self.settings.keep_alive_interval_s);
    crate::events::event_frames(self.bus.subscribe().into_stream(), keep_alive, nb_events)
  }

  /// Run the indexing runtime until cancelled.
  pub async fn run(&mut self, cancel: CancellationToken) {
    let Some(receiver) = self.receiver.take() else {
      info!("indexer already running");
      return;
    };
    info!(
      indexer_version = self.settings.indexer_version,
      "starting indexing runtime"
    );
    self.indexer.clone().run(receiver, cancel).await;
  }
}
