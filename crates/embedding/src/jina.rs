use async_trait::async_trait;
use seemantic_core::{DistanceMetric, EmbedderSettings};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::provider::{EmbeddingError, EmbeddingProvider, EmbeddingTask};

/// HTTP embedding provider speaking the `{model, task, dimensions, input}`
/// wire contract (Jina v3 and compatible endpoints).
#[derive(Debug, Clone)]
pub struct JinaProvider {
  client: reqwest::Client,
  url: String,
  model: String,
  dimensions: usize,
  metric: DistanceMetric,
  api_key: Option<String>,
}

impl JinaProvider {
  pub fn new(url: impl Into<String>, model: impl Into<String>, dimensions: usize) -> Self {
    Self {
      client: reqwest::Client::new(),
      url: url.into(),
      model: model.into(),
      dimensions,
      metric: DistanceMetric::Cosine,
      api_key: None,
    }
  }

  pub fn from_settings(settings: &EmbedderSettings) -> Self {
    let mut provider = Self::new(&settings.url, &settings.model, settings.dimensions);
    provider.api_key = settings.api_key.clone();
    provider
  }

  pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
    self.api_key = Some(key.into());
    self
  }

  pub fn with_metric(mut self, metric: DistanceMetric) -> Self {
    self.metric = metric;
    self
  }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
  model: &'a str,
  task: EmbeddingTask,
  dimensions: usize,
  input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
  data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
  embedding: Vec<f32>,
}

#[async_trait]
impl EmbeddingProvider for JinaProvider {
  fn name(&self) -> &str {
    "jina"
  }

  fn model_id(&self) -> &str {
    &self.model
  }

  fn dimensions(&self) -> usize {
    self.dimensions
  }

  fn metric(&self) -> DistanceMetric {
    self.metric
  }

  async fn embed(&self, task: EmbeddingTask, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    if texts.is_empty() {
      return Ok(Vec::new());
    }
    let request = EmbeddingRequest {
      model: &self.model,
      task,
      dimensions: self.dimensions,
      input: texts,
    };
    debug!(count = texts.len(), task = ?task, "embedding batch");

    let mut builder = self.client.post(&self.url).json(&request);
    if let Some(key) = &self.api_key {
      builder = builder.bearer_auth(key);
    }
    let response = builder.send().await?;

    if !response.status().is_success() {
      let status = response.status();
      let body = response.text().await.unwrap_or_default();
      warn!("embedding request failed: {status} - {body}");
      return Err(EmbeddingError::Provider(format!("status {status}: {body}")));
    }

    let parsed: EmbeddingResponse = response.json().await?;
    if parsed.data.len() != texts.len() {
      return Err(EmbeddingError::CountMismatch {
        expected: texts.len(),
        got: parsed.data.len(),
      });
    }
    let mut vectors = Vec::with_capacity(parsed.data.len());
    for row in parsed.data {
      if row.embedding.len() != self.dimensions {
        return Err(EmbeddingError::DimensionMismatch {
          expected: self.dimensions,
          got: row.embedding.len(),
        });
      }
      vectors.push(row.embedding);
    }
    Ok(vectors)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_request_wire_shape() {
    let request = EmbeddingRequest {
      model: "jina-embeddings-v3",
      task: EmbeddingTask::Query,
      dimensions: 1024,
      input: &["what is seemantic?"],
    };
    let json = serde_json::to_value(&request).unwrap();
    assert_eq!(json["model"], "jina-embeddings-v3");
    assert_eq!(json["task"], "query");
    assert_eq!(json["dimensions"], 1024);
    assert_eq!(json["input"][0], "what is seemantic?");
  }

  #[test]
  fn test_response_parse() {
    let body = r#"{"data":[{"embedding":[0.1,0.2]},{"embedding":[0.3,0.4]}]}"#;
    let parsed: EmbeddingResponse = serde_json::from_str(body).unwrap();
    assert_eq!(parsed.data.len(), 2);
    assert_eq!(parsed.data[1].embedding, vec![0.3, 0.4]);
  }

  #[test]
  fn test_provider_declares_metric_and_dims() {
    let provider = JinaProvider::new("http://localhost/embed", "test", 8).with_metric(DistanceMetric::Dot);
    assert_eq!(provider.dimensions(), 8);
    assert_eq!(provider.metric(), DistanceMetric::Dot);
  }
}
