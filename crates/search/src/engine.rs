use catalog::{Catalog, CatalogError, DocumentView};
use embedding::{Embedder, EmbeddingError};
use futures::{StreamExt, stream};
use seemantic_core::ParsedDocument;
use std::sync::Arc;
use store::{StoreError, VectorStore};
use thiserror::Error;
use tracing::warn;

use crate::assemble::{Passage, assemble_passages};
use crate::generate::{AnswerGenerator, QueryUpdate, build_prompt};

#[derive(Error, Debug)]
pub enum SearchError {
  #[error("Embedding error: {0}")]
  Embedding(#[from] EmbeddingError),
  #[error("Store error: {0}")]
  Store(#[from] StoreError),
  #[error("Catalog error: {0}")]
  Catalog(#[from] CatalogError),
  #[error("Generation error: {0}")]
  Generate(#[from] crate::generate::GenerateError),
}

/// One retrieved document: its catalog view, parsed markdown, and the
/// section-aligned passages assembled from the chunk hits.
#[derive(Debug, Clone)]
pub struct SearchResult {
  pub document: DocumentView,
  pub parsed: ParsedDocument,
  pub passages: Vec<Passage>,
}

/// Retrieval: embed the query, search chunk vectors, join with the catalog,
/// assemble passages.
#[derive(Clone)]
pub struct SearchEngine {
  embedder: Arc<Embedder>,
  store: Arc<VectorStore>,
  catalog: Arc<dyn Catalog>,
  indexer_version: i32,
}

impl SearchEngine {
  pub fn new(embedder: Arc<Embedder>, store: Arc<VectorStore>, catalog: Arc<dyn Catalog>, indexer_version: i32) -> Self {
    Self {
      embedder,
      store,
      catalog,
      indexer_version,
    }
  }

  pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>, SearchError> {
    let vector = self.embedder.embed_query(query).await?;
    let hits = self.store.query(&vector, k).await?;

    let parsed_hashes: Vec<String> = hits.iter().map(|h| h.parsed.parsed_hash.clone()).collect();
    let by_hash = self
      .catalog
      .get_documents_from_indexed_parsed_hashes(&parsed_hashes, self.indexer_version)
      .await?;

    // keep only hits whose content the catalog still references; orphaned
    // store rows (pre-commit or awaiting GC) are invisible to users
    let mut results = Vec::with_capacity(hits.len());
    for hit in hits {
      let Some(document) = by_hash.get(&hit.parsed.parsed_hash) else {
        continue;
      };
      let passages = assemble_passages(&hit.parsed.markdown, &hit.chunks);
      results.push(SearchResult {
        document: document.clone(),
        parsed: hit.parsed,
        passages,
      });
    }
    Ok(results)
  }

  /// Fetch the parsed markdown of a document by uri, `None` when the
  /// document is absent or not indexed yet.
  pub async fn get_document(&self, uri: &str) -> Result<Option<ParsedDocument>, SearchError> {
    let uris = [uri.to_string()];
    let views = self.catalog.get_documents(&uris, self.indexer_version).await?;
    let Some(view) = views.get(uri) else {
      return Ok(None);
    };
    let Some(content) = &view.indexed_content else {
      return Ok(None);
    };
    let parsed = self.store.get_document(&content.parsed_hash).await?;
    if parsed.is_none() {
      warn!(
        uri,
        parsed_hash = content.parsed_hash,
        "document is marked indexed but its markdown is missing from the store"
      );
    }
    Ok(parsed)
  }

  /// Streamed query response: first an update carrying the references, then
  /// one update per answer delta from the generator.
  pub fn answer_stream(
    &self,
    query: String,
    k: usize,
    generator: Arc<dyn AnswerGenerator>,
  ) -> futures::stream::BoxStream<'static, Result<QueryUpdate, SearchError>> {
    let engine = self.clone();
    stream::once(async move {
      let results = engine.search(&query, k).await?;
      let prompt = build_prompt(&query, &results);
      let deltas = generator.stream_answer(&prompt);
      Ok::<_, SearchError>((results, deltas))
    })
    .flat_map(|prepared| match prepared {
      Err(e) => stream::once(futures::future::ready(Err(e))).boxed(),
      Ok((results, deltas)) => {
        let references = stream::once(futures::future::ready(Ok(QueryUpdate {
          delta_answer: None,
          search_results: Some(results),
        })));
        let answer = deltas.map(|delta| {
          delta
            .map(|text| QueryUpdate {
              delta_answer: Some(text),
              search_results: None,
            })
            .map_err(SearchError::from)
        });
        references.chain(answer).boxed()
      }
    })
    .boxed()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::generate::GenerateError;
  use async_trait::async_trait;
  use catalog::{IndexedContent, MemoryCatalog};
  use embedding::{EmbeddingProvider, EmbeddingTask};
  use seemantic_core::{Chunk, DistanceMetric, EmbeddedChunk};
  use std::time::Duration;
  use tempfile::TempDir;

  /// Maps known texts to fixed corners of the vector space.
  struct RoutedProvider;

  #[async_trait]
  impl EmbeddingProvider for RoutedProvider {
    fn name(&self) -> &str {
      "routed"
    }
    fn model_id(&self) -> &str {
      "routed-1"
    }
    fn dimensions(&self) -> usize {
      4
    }
    fn metric(&self) -> DistanceMetric {
      DistanceMetric::L2
    }

    async fn embed(&self, _task: EmbeddingTask, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
      Ok(
        texts
          .iter()
          .map(|t| {
            if t.contains("rag") || t.contains("RAG") {
              vec![1.0, 0.0, 0.0, 0.0]
            } else {
              vec![0.0, 1.0, 0.0, 0.0]
            }
          })
          .collect(),
      )
    }
  }

  struct EchoGenerator;

  impl AnswerGenerator for EchoGenerator {
    fn stream_answer(&self, prompt: &str) -> futures::stream::BoxStream<'static, Result<String, GenerateError>> {
      let words: Vec<String> = prompt
        .lines()
        .filter(|l| l.contains("RAG"))
        .map(|l| l.to_lowercase())
        .collect();
      stream::iter(words.into_iter().map(Ok)).boxed()
    }
  }

  struct Fixture {
    _tmp: TempDir,
    engine: SearchEngine,
    catalog: MemoryCatalog,
    store: Arc<VectorStore>,
  }

  async fn fixture() -> Fixture {
    let tmp = TempDir::new().unwrap();
    let store = Arc::new(
      VectorStore::connect(
        tmp.path().join("db").to_str().unwrap(),
        1,
        4,
        DistanceMetric::L2,
        Duration::from_millis(0),
      )
      .await
      .unwrap(),
    );
    let catalog = MemoryCatalog::new();
    let embedder = Arc::new(Embedder::new(Arc::new(RoutedProvider), 10_000));
    let engine = SearchEngine::new(embedder, store.clone(), Arc::new(catalog.clone()), 1);
    Fixture {
      _tmp: tmp,
      engine,
      catalog,
      store,
    }
  }

  /// Index a document in the store and commit it to the catalog.
  async fn commit(f: &Fixture, uri: &str, markdown: &str, vector: [f32; 4]) -> ParsedDocument {
    let parsed = ParsedDocument::from_markdown(markdown.to_string());
    f.store
      .index(&parsed, &[EmbeddedChunk {
        chunk: Chunk::new(0, markdown.len()),
        embedding: vector.to_vec(),
      }])
      .await
      .unwrap();

    let ids = f.catalog.create_indexed_documents(&[uri.to_string()], 1).await.unwrap();
    let content_id = f
      .catalog
      .upsert_indexed_content(
        &IndexedContent {
          raw_hash: format!("raw-{uri}"),
          parsed_hash: parsed.parsed_hash.clone(),
        },
        1,
      )
      .await
      .unwrap();
    f.catalog.finalize_indexed_document(ids[uri], Some("v1"), content_id).await.unwrap();
    parsed
  }

  #[tokio::test]
  async fn test_search_joins_catalog_and_assembles_passages() {
    let f = fixture().await;
    commit(&f, "rag.md", "# What is seemantic ? It's a RAG", [1.0, 0.0, 0.0, 0.0]).await;
    commit(&f, "other.md", "# Something else entirely", [0.0, 1.0, 0.0, 0.0]).await;

    let results = f.engine.search("what is seemantic rag?", 10).await.unwrap();
    assert_eq!(results[0].document.uri, "rag.md");
    assert_eq!(results[0].passages.len(), 1);
    let passage = &results[0].passages[0];
    assert!(results[0].parsed.slice(passage.chunk).contains("RAG"));
  }

  #[tokio::test]
  async fn test_search_drops_hits_unknown_to_catalog() {
    let f = fixture().await;
    // indexed in the store but never committed to the catalog
    let parsed = ParsedDocument::from_markdown("# orphan".to_string());
    f.store
      .index(&parsed, &[EmbeddedChunk {
        chunk: Chunk::new(0, 8),
        embedding: vec![1.0, 0.0, 0.0, 0.0],
      }])
      .await
      .unwrap();

    let results = f.engine.search("rag", 10).await.unwrap();
    assert!(results.is_empty());
  }

  #[tokio::test]
  async fn test_get_document_by_uri() {
    let f = fixture().await;
    let parsed = commit(&f, "a.md", "# Doc body", [1.0, 0.0, 0.0, 0.0]).await;

    let fetched = f.engine.get_document("a.md").await.unwrap().unwrap();
    assert_eq!(fetched.parsed_hash, parsed.parsed_hash);
    assert!(f.engine.get_document("missing.md").await.unwrap().is_none());
  }

  #[tokio::test]
  async fn test_answer_stream_yields_references_then_deltas() {
    let f = fixture().await;
    commit(&f, "rag.md", "# What is seemantic ? It's a RAG", [1.0, 0.0, 0.0, 0.0]).await;

    let mut stream = f.engine.answer_stream("rag?".to_string(), 10, Arc::new(EchoGenerator));

    let first = stream.next().await.unwrap().unwrap();
    assert!(first.delta_answer.is_none());
    assert_eq!(first.search_results.unwrap()[0].document.uri, "rag.md");

    let mut answer = String::new();
    while let Some(update) = stream.next().await {
      if let Some(delta) = update.unwrap().delta_answer {
        answer.push_str(&delta);
      }
    }
    assert!(answer.to_lowercase().contains("rag"));
  }
}
