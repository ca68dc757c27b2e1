//! OpenAI-compatible embeddings over HTTP.

use super::{EmbeddingClient, EmbeddingClientError};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Embeddings client that talks to `/embeddings` on an OpenAI-compatible endpoint.
pub struct OpenAiEmbeddingClient {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
}

impl OpenAiEmbeddingClient {
    /// Build a client; `dimensions` is forwarded for models that support shortening.
    pub fn new(
        api_key: &str,
        base_url: &str,
        model: &str,
        dimensions: Option<usize>,
    ) -> Result<Self, EmbeddingClientError> {
        if api_key.trim().is_empty() {
            return Err(EmbeddingClientError::Failed("missing OpenAI API key".into()));
        }
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", api_key.trim()))
            .map_err(|_| EmbeddingClientError::Failed("invalid OpenAI API key".into()))?;
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .default_headers(headers)
            .build()
            .map_err(|error| EmbeddingClientError::Failed(error.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingClient for OpenAiEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError> {
        let request = EmbeddingRequest {
            model: &self.model,
            input: [text],
            dimensions: self.dimensions,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() || error.is_connect() || error.is_request() {
                    EmbeddingClientError::Transient(error.to_string())
                } else {
                    EmbeddingClientError::Failed(error.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            let message = format!("embeddings request failed ({status}): {body}");
            return if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                Err(EmbeddingClientError::Transient(message))
            } else {
                Err(EmbeddingClientError::Failed(message))
            };
        }

        let parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|error| EmbeddingClientError::Failed(error.to_string()))?;
        parsed
            .data
            .into_iter()
            .min_by_key(|entry| entry.index)
            .map(|entry| entry.embedding)
            .ok_or_else(|| EmbeddingClientError::Failed("response contained no embeddings".into()))
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: [&'a str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;

    #[tokio::test]
    async fn posts_single_input_and_reads_vector() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1/embeddings")
                    .header("authorization", "Bearer sk-test")
                    .json_body(json!({ "model": "text-embedding-3-small", "input": ["hello"] }));
                then.status(200).json_body(json!({
                    "data": [{ "index": 0, "embedding": [0.25, 0.5] }]
                }));
            })
            .await;

        let client = OpenAiEmbeddingClient::new(
            "sk-test",
            &format!("{}/v1", server.base_url()),
            "text-embedding-3-small",
            None,
        )
        .expect("client");
        let vector = client.embed("hello").await.expect("vector");

        mock.assert_async().await;
        assert_eq!(vector, vec![0.25, 0.5]);
    }

    #[tokio::test]
    async fn server_errors_are_transient() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(503).body("overloaded");
            })
            .await;

        let client = OpenAiEmbeddingClient::new("sk-test", &server.base_url(), "m", None)
            .expect("client");
        let error = client.embed("hello").await.unwrap_err();
        assert!(matches!(error, EmbeddingClientError::Transient(_)));
    }
}
