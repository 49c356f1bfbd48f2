// Retry wrapper for embedding providers.
//
// Exponential backoff with jitter; retries network errors, timeouts and
// 429/502/503/504 provider responses. Each provider call is bounded by a
// request timeout so a wedged connection surfaces as a retryable error.

use crate::provider::{EmbeddingError, EmbeddingProvider, EmbeddingTask};
use async_trait::async_trait;
use seemantic_core::DistanceMetric;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetryConfig {
  pub max_retries: u32,
  pub initial_backoff: Duration,
  pub max_backoff: Duration,
  pub backoff_multiplier: f64,
  pub add_jitter: bool,
  pub request_timeout: Duration,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_retries: 3,
      initial_backoff: Duration::from_secs(1),
      max_backoff: Duration::from_secs(30),
      backoff_multiplier: 2.0,
      add_jitter: true,
      request_timeout: Duration::from_secs(60),
    }
  }
}

impl RetryConfig {
  /// Backoff duration before retry number `attempt + 1`.
  pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
    let base = self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
    let mut backoff = Duration::from_secs_f64(base.min(self.max_backoff.as_secs_f64()));

    if self.add_jitter {
      let jitter_factor = 1.0 + (rand_f64() * 0.25);
      backoff = Duration::from_secs_f64(backoff.as_secs_f64() * jitter_factor);
    }

    backoff.min(self.max_backoff)
  }
}

/// Pseudo-random jitter source (no external deps).
fn rand_f64() -> f64 {
  use std::time::{SystemTime, UNIX_EPOCH};

  let nanos = SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .subsec_nanos();

  (nanos as f64 / u32::MAX as f64).fract()
}

pub fn is_retryable_error(error: &EmbeddingError) -> bool {
  match error {
    EmbeddingError::Timeout => true,
    EmbeddingError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
    EmbeddingError::Provider(msg) => {
      msg.contains("429") || msg.contains("502") || msg.contains("503") || msg.contains("504")
    }
    _ => false,
  }
}

/// Wraps a provider with in-call retries; exhaustion surfaces the last error
/// to the caller, which reports the unit as a transient indexing failure.
pub struct ResilientProvider<P: EmbeddingProvider> {
  inner: P,
  config: RetryConfig,
}

impl<P: EmbeddingProvider> ResilientProvider<P> {
  pub fn new(inner: P) -> Self {
    Self {
      inner,
      config: RetryConfig::default(),
    }
  }

  pub fn with_config(inner: P, config: RetryConfig) -> Self {
    Self { inner, config }
  }
}

#[async_trait]
impl<P: EmbeddingProvider> EmbeddingProvider for ResilientProvider<P> {
  fn name(&self) -> &str {
    self.inner.name()
  }

  fn model_id(&self) -> &str {
    self.inner.model_id()
  }

  fn dimensions(&self) -> usize {
    self.inner.dimensions()
  }

  fn metric(&self) -> DistanceMetric {
    self.inner.metric()
  }

  async fn embed(&self, task: EmbeddingTask, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    let mut last_error = None;

    for attempt in 0..=self.config.max_retries {
      if attempt > 0 {
        let backoff = self.config.backoff_for_attempt(attempt - 1);
        debug!("retry attempt {attempt} after {backoff:?}");
        sleep(backoff).await;
      }

      match tokio::time::timeout(self.config.request_timeout, self.inner.embed(task, texts)).await {
        Ok(Ok(vectors)) => return Ok(vectors),
        Ok(Err(e)) => {
          if is_retryable_error(&e) && attempt < self.config.max_retries {
            warn!("retryable embedding error on attempt {}: {e}", attempt + 1);
            last_error = Some(e);
            continue;
          }
          return Err(e);
        }
        Err(_) => {
          warn!("embedding request timed out on attempt {}", attempt + 1);
          last_error = Some(EmbeddingError::Timeout);
        }
      }
    }

    Err(last_error.unwrap_or_else(|| EmbeddingError::Provider("max retries exceeded".to_string())))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};

  struct FlakyProvider {
    failures: AtomicU32,
  }

  #[async_trait]
  impl EmbeddingProvider for FlakyProvider {
    fn name(&self) -> &str {
      "flaky"
    }
    fn model_id(&self) -> &str {
      "flaky-1"
    }
    fn dimensions(&self) -> usize {
      2
    }
    fn metric(&self) -> DistanceMetric {
      DistanceMetric::Cosine
    }

    async fn embed(&self, _task: EmbeddingTask, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
      if self.failures.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
        return Err(EmbeddingError::Provider("status 503".to_string()));
      }
      Ok(texts.iter().map(|_| vec![0.0, 1.0]).collect())
    }
  }

  fn fast_config() -> RetryConfig {
    RetryConfig {
      max_retries: 3,
      initial_backoff: Duration::from_millis(1),
      max_backoff: Duration::from_millis(2),
      backoff_multiplier: 1.0,
      add_jitter: false,
      request_timeout: Duration::from_secs(1),
    }
  }

  #[tokio::test]
  async fn test_retries_transient_failures() {
    let provider = ResilientProvider::with_config(
      FlakyProvider {
        failures: AtomicU32::new(2),
      },
      fast_config(),
    );
    let vectors = provider.embed(EmbeddingTask::Document, &["a", "b"]).await.unwrap();
    assert_eq!(vectors.len(), 2);
  }

  #[tokio::test]
  async fn test_gives_up_after_max_retries() {
    let provider = ResilientProvider::with_config(
      FlakyProvider {
        failures: AtomicU32::new(100),
      },
      fast_config(),
    );
    let err = provider.embed(EmbeddingTask::Document, &["a"]).await.unwrap_err();
    assert!(matches!(err, EmbeddingError::Provider(_)));
  }

  #[test]
  fn test_backoff_calculation() {
    let config = RetryConfig {
      initial_backoff: Duration::from_secs(1),
      backoff_multiplier: 2.0,
      max_backoff: Duration::from_secs(60),
      add_jitter: false,
      ..Default::default()
    };

    assert_eq!(config.backoff_for_attempt(0), Duration::from_secs(1));
    assert_eq!(config.backoff_for_attempt(1), Duration::from_secs(2));
    assert_eq!(config.backoff_for_attempt(2), Duration::from_secs(4));
  }

  #[test]
  fn test_backoff_respects_max() {
    let config = RetryConfig {
      initial_backoff: Duration::from_secs(10),
      backoff_multiplier: 10.0,
      max_backoff: Duration::from_secs(30),
      add_jitter: false,
      ..Default::default()
    };
    assert_eq!(config.backoff_for_attempt(2), Duration::from_secs(30));
  }

  #[test]
  fn test_is_retryable_error() {
    assert!(is_retryable_error(&EmbeddingError::Timeout));
    assert!(is_retryable_error(&EmbeddingError::Provider("status 429".to_string())));
    assert!(is_retryable_error(&EmbeddingError::Provider("status 503".to_string())));
    assert!(!is_retryable_error(&EmbeddingError::Provider("status 400".to_string())));
    assert!(!is_retryable_error(&EmbeddingError::DimensionMismatch { expected: 4, got: 2 }));
  }
}
