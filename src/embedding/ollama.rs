//! Ollama embeddings through `ollama-rs`.

use super::{EmbeddingClient, EmbeddingClientError};
use async_trait::async_trait;
use ollama_rs::Ollama;
use ollama_rs::generation::embeddings::request::{EmbeddingsInput, GenerateEmbeddingsRequest};
use reqwest::Url;

/// Embedding client backed by a local Ollama runtime.
pub struct OllamaEmbeddingClient {
    ollama: Ollama,
    model: String,
}

impl OllamaEmbeddingClient {
    /// Connect to the runtime at `base_url` using `model`.
    pub fn new(base_url: &str, model: &str) -> Result<Self, EmbeddingClientError> {
        let url = Url::parse(base_url)
            .map_err(|error| EmbeddingClientError::Failed(format!("invalid Ollama URL: {error}")))?;
        Ok(Self {
            ollama: Ollama::from_url(url),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl EmbeddingClient for OllamaEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError> {
        let request = GenerateEmbeddingsRequest::new(
            self.model.clone(),
            EmbeddingsInput::Single(text.to_string()),
        );
        let response = self
            .ollama
            .generate_embeddings(request)
            .await
            .map_err(|error| {
                let message = error.to_string();
                let lowered = message.to_lowercase();
                if lowered.contains("connect") || lowered.contains("timed out") {
                    EmbeddingClientError::Transient(message)
                } else {
                    EmbeddingClientError::Failed(message)
                }
            })?;
        response
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingClientError::Failed("Ollama returned no embeddings".into()))
    }
}
