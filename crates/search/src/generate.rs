use futures::stream::BoxStream;
use thiserror::Error;

use crate::engine::SearchResult;

#[derive(Error, Debug)]
pub enum GenerateError {
  #[error("Generation failed: {0}")]
  Provider(String),
}

/// Seam for the LLM client: turns a grounded prompt into a stream of answer
/// deltas. The concrete client lives outside the engine.
pub trait AnswerGenerator: Send + Sync {
  fn stream_answer(&self, prompt: &str) -> BoxStream<'static, Result<String, GenerateError>>;
}

/// One incremental update of a streamed query response.
///
/// `search_results`, when present, replaces the previous result set;
/// `delta_answer` appends to the answer built so far.
#[derive(Debug, Clone, Default)]
pub struct QueryUpdate {
  pub delta_answer: Option<String>,
  pub search_results: Option<Vec<SearchResult>>,
}

fn document_context(result: &SearchResult) -> String {
  let passages = result
    .passages
    .iter()
    .map(|p| result.parsed.slice(p.chunk))
    .collect::<Vec<_>>()
    .join(">>> \n");

  format!("__Document {}__:\n\n{}", result.document.uri, passages)
}

/// Render retrieved passages as the context block of the prompt.
pub fn build_context(results: &[SearchResult]) -> String {
  results.iter().map(document_context).collect::<Vec<_>>().join("\n\n")
}

/// The grounded prompt handed to the generator.
pub fn build_prompt(query: &str, results: &[SearchResult]) -> String {
  format!(
    "Context information is below.\n\
     ---------------------\n\
     {}\n\
     ---------------------\n\
     Given the context information and not prior knowledge, answer the query.\n\
     Query: {query}\n\
     Answer:\n",
    build_context(results)
  )
}
