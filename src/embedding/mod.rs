//! Embedding generation with input guarding and bounded retry.

pub mod guard;
pub mod hashing;
pub mod ollama;
pub mod openai;

pub use guard::{coerce_input, preview, validate_text};
pub use hashing::HashingEmbeddingClient;
pub use ollama::OllamaEmbeddingClient;
pub use openai::OpenAiEmbeddingClient;

use crate::config::{Config, EmbeddingProvider};
use crate::retry::{RetryPolicy, Transient, with_retry};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by embedding backends.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Rate limiting, overload, or a connection problem; worth retrying.
    #[error("embedding provider temporarily unavailable: {0}")]
    Transient(String),
    /// The provider refused or could not produce a vector.
    #[error("failed to generate embedding: {0}")]
    Failed(String),
}

/// Errors surfaced by [`Embedder`].
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// Input was empty or whitespace only.
    #[error("embedding input is empty")]
    EmptyInput,
    /// Input contains characters the provider must never see.
    #[error("embedding input rejected ({reason}); length={length}, preview=\"{preview}\"")]
    InvalidInput {
        /// What was wrong.
        reason: String,
        /// Input length in bytes.
        length: usize,
        /// Leading characters of the input.
        preview: String,
    },
    /// The backend failed after retries.
    #[error("embedding call failed for input length={length}, preview=\"{preview}\": {source}")]
    Upstream {
        /// Input length in bytes.
        length: usize,
        /// Leading characters of the input.
        preview: String,
        /// Backend error.
        #[source]
        source: EmbeddingClientError,
    },
    /// The backend returned a vector of the wrong width.
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Configured dimension.
        expected: usize,
        /// Dimension received.
        actual: usize,
    },
}

impl Transient for EmbeddingClientError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl Transient for EmbeddingError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Upstream { source, .. } if source.is_transient())
    }
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient: Send + Sync {
    /// Produce one vector for `text`.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError>;
}

/// Guarded entry point used by the pipeline and the resolver.
#[derive(Clone)]
pub struct Embedder {
    client: Arc<dyn EmbeddingClient>,
    dimension: usize,
    retry: RetryPolicy,
}

impl Embedder {
    /// Wrap `client`, expecting vectors of `dimension` components.
    pub fn new(client: Arc<dyn EmbeddingClient>, dimension: usize, retry: RetryPolicy) -> Self {
        Self {
            client,
            dimension,
            retry,
        }
    }

    /// Configured vector width.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Embed a text after validation; invalid input never reaches the backend.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let cleaned = validate_text(text)?;
        let vector = with_retry(&self.retry, "embed", || self.client.embed(cleaned))
            .await
            .map_err(|source| EmbeddingError::Upstream {
                length: text.len(),
                preview: preview(text),
                source,
            })?;
        if vector.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(vector)
    }

    /// Embed an arbitrary JSON value after coercing it to text.
    pub async fn embed_value(&self, value: &Value) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(&coerce_input(value)).await
    }
}

/// Build the backend selected by `config`.
pub fn build_embedding_client(
    config: &Config,
) -> Result<Arc<dyn EmbeddingClient>, EmbeddingClientError> {
    let client: Arc<dyn EmbeddingClient> = match config.embedding_provider {
        EmbeddingProvider::OpenAI => {
            let api_key = config.openai_api_key.as_deref().unwrap_or_default();
            Arc::new(OpenAiEmbeddingClient::new(
                api_key,
                &config.openai_base_url,
                &config.embedding_model,
                Some(config.embedding_dimension),
            )?)
        }
        EmbeddingProvider::Ollama => Arc::new(OllamaEmbeddingClient::new(
            &config.ollama_url,
            &config.embedding_model,
        )?),
        EmbeddingProvider::Hash => Arc::new(HashingEmbeddingClient::new(config.embedding_dimension)),
    };
    tracing::info!(
        provider = ?config.embedding_provider,
        model = %config.embedding_model,
        dimension = config.embedding_dimension,
        "Embedding client ready"
    );
    Ok(client)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct CountingClient {
        calls: AtomicUsize,
        fail_first: usize,
        width: usize,
    }

    #[async_trait]
    impl EmbeddingClient for CountingClient {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingClientError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                return Err(EmbeddingClientError::Transient("429".into()));
            }
            Ok(vec![0.5; self.width])
        }
    }

    fn embedder(fail_first: usize, width: usize) -> (Embedder, Arc<CountingClient>) {
        let client = Arc::new(CountingClient {
            calls: AtomicUsize::new(0),
            fail_first,
            width,
        });
        let embedder = Embedder::new(client.clone(), 4, RetryPolicy::new(3, Duration::ZERO));
        (embedder, client)
    }

    #[tokio::test]
    async fn invalid_input_fails_before_any_call() {
        let (embedder, client) = embedder(0, 4);
        let error = embedder.embed("bad\u{0}bytes").await.unwrap_err();
        assert!(error.to_string().contains("length=9"));
        assert!(matches!(embedder.embed("  ").await, Err(EmbeddingError::EmptyInput)));
        assert_eq!(client.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let (embedder, client) = embedder(2, 4);
        let vector = embedder.embed("hello").await.expect("vector");
        assert_eq!(vector.len(), 4);
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn wrong_width_is_reported() {
        let (embedder, _) = embedder(0, 3);
        assert!(matches!(
            embedder.embed("hello").await,
            Err(EmbeddingError::DimensionMismatch { expected: 4, actual: 3 })
        ));
    }

    #[tokio::test]
    async fn json_values_are_coerced() {
        let (embedder, _) = embedder(0, 4);
        assert!(embedder.embed_value(&serde_json::json!(["a", 1])).await.is_ok());
        assert!(matches!(
            embedder.embed_value(&Value::Null).await,
            Err(EmbeddingError::EmptyInput)
        ));
    }
}
