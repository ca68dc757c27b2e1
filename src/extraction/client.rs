//! HTTP client for the remote document-analysis service.
//!
//! The service follows an analyze-then-poll protocol: the file is posted to
//! `documentModels/{model}:analyze`, the response carries an `Operation-Location` header, and
//! that URL is polled until the operation reports `succeeded` or `failed`.

use super::types::{AnalyzeOperation, AnalyzeResult, ExtractionError};
use crate::config::get_config;
use async_trait::async_trait;
use reqwest::{Client, StatusCode, header::CONTENT_TYPE};
use std::time::Duration;

const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);
const DEFAULT_MAX_POLLS: usize = 600;

/// Remote analysis backend used by the extraction engine.
#[async_trait]
pub trait DocumentAnalysisProvider: Send + Sync {
    /// Analyze `bytes` with the given model and return the structural result.
    async fn analyze(&self, model_id: &str, bytes: &[u8]) -> Result<AnalyzeResult, ExtractionError>;
}

/// Client for a document-intelligence style REST API.
pub struct DocumentIntelligenceClient {
    pub(crate) client: Client,
    pub(crate) endpoint: String,
    pub(crate) api_key: String,
    pub(crate) api_version: String,
    pub(crate) poll_interval: Duration,
    pub(crate) max_polls: usize,
}

impl DocumentIntelligenceClient {
    /// Construct a client from explicit settings.
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        api_version: impl Into<String>,
    ) -> Result<Self, ExtractionError> {
        let client = Client::builder()
            .user_agent("kbcore/0.1")
            .timeout(Duration::from_secs(120))
            .build()?;
        let endpoint = endpoint.into().trim_end_matches('/').to_string();
        tracing::debug!(endpoint = %endpoint, "Initialized document analysis client");
        Ok(Self {
            client,
            endpoint,
            api_key: api_key.into(),
            api_version: api_version.into(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_polls: DEFAULT_MAX_POLLS,
        })
    }

    /// Construct a client using configuration derived from the environment.
    pub fn from_config() -> Result<Self, ExtractionError> {
        let config = get_config();
        Self::new(
            &config.extraction_endpoint,
            &config.extraction_api_key,
            &config.extraction_api_version,
        )
    }

    /// Override the polling cadence.
    pub fn with_polling(mut self, interval: Duration, max_polls: usize) -> Self {
        self.poll_interval = interval;
        self.max_polls = max_polls.max(1);
        self
    }

    async fn submit(&self, model_id: &str, bytes: &[u8]) -> Result<String, ExtractionError> {
        let url = format!(
            "{}/documentintelligence/documentModels/{model_id}:analyze",
            self.endpoint
        );
        let response = self
            .client
            .post(url)
            .query(&[("api-version", self.api_version.as_str())])
            .header(SUBSCRIPTION_KEY_HEADER, &self.api_key)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(bytes.to_vec())
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::ACCEPTED && !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let error = ExtractionError::from_status(status, &body);
            tracing::warn!(model = model_id, %status, error = %error, "Analyze request rejected");
            return Err(error);
        }

        response
            .headers()
            .get("operation-location")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                ExtractionError::InvalidResponse("missing Operation-Location header".into())
            })
    }

    async fn poll(&self, operation_url: &str) -> Result<AnalyzeResult, ExtractionError> {
        for attempt in 0..self.max_polls {
            let response = self
                .client
                .get(operation_url)
                .header(SUBSCRIPTION_KEY_HEADER, &self.api_key)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(ExtractionError::from_status(status, &body));
            }

            let operation: AnalyzeOperation = response.json().await?;
            match operation.status.to_ascii_lowercase().as_str() {
                "succeeded" => {
                    return operation.analyze_result.ok_or_else(|| {
                        ExtractionError::InvalidResponse("operation succeeded without a result".into())
                    });
                }
                "failed" | "canceled" => {
                    let (code, message) = operation
                        .error
                        .map(|error| (error.code, error.message))
                        .unwrap_or_default();
                    return Err(ExtractionError::Rejected {
                        status: None,
                        reason: format!("Document analysis failed ({code}): {message}"),
                    });
                }
                other => {
                    tracing::trace!(attempt, status = other, "Analysis still running");
                    tokio::time::sleep(self.poll_interval).await;
                }
            }
        }

        Err(ExtractionError::Transient(format!(
            "analysis did not finish after {} polls",
            self.max_polls
        )))
    }
}

#[async_trait]
impl DocumentAnalysisProvider for DocumentIntelligenceClient {
    async fn analyze(&self, model_id: &str, bytes: &[u8]) -> Result<AnalyzeResult, ExtractionError> {
        let operation_url = self.submit(model_id, bytes).await?;
        tracing::debug!(model = model_id, operation = %operation_url, "Analysis submitted");
        self.poll(&operation_url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::Transient;
    use httpmock::{Method::GET, Method::POST, MockServer};
    use serde_json::json;

    fn client_for(server: &MockServer) -> DocumentIntelligenceClient {
        DocumentIntelligenceClient::new(server.base_url(), "secret", "2024-11-30")
            .expect("client")
            .with_polling(Duration::from_millis(1), 5)
    }

    #[tokio::test]
    async fn analyze_submits_then_polls_result() {
        let server = MockServer::start_async().await;
        let operation_url = format!("{}/operations/op-1", server.base_url());

        let submit = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/documentintelligence/documentModels/prebuilt-layout:analyze")
                    .query_param("api-version", "2024-11-30")
                    .header(SUBSCRIPTION_KEY_HEADER, "secret");
                then.status(202).header("Operation-Location", operation_url.as_str());
            })
            .await;
        let poll = server
            .mock_async(|when, then| {
                when.method(GET).path("/operations/op-1");
                then.status(200).json_body(json!({
                    "status": "succeeded",
                    "analyzeResult": {
                        "content": "Hello",
                        "pages": [{ "pageNumber": 1 }, { "pageNumber": 2 }],
                        "paragraphs": [{ "content": "Hello", "confidence": 0.9 }]
                    }
                }));
            })
            .await;

        let result = client_for(&server)
            .analyze("prebuilt-layout", b"%PDF-1.7")
            .await
            .expect("analysis");

        submit.assert_async().await;
        poll.assert_async().await;
        assert_eq!(result.pages.len(), 2);
        assert_eq!(result.paragraphs[0].confidence, Some(0.9));
    }

    #[tokio::test]
    async fn rate_limited_submission_is_transient() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(429).body("slow down");
            })
            .await;

        let error = client_for(&server)
            .analyze("prebuilt-read", b"text")
            .await
            .unwrap_err();
        assert!(error.is_transient());
    }

    #[tokio::test]
    async fn unsupported_media_is_terminal() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(415).body("unsupported");
            })
            .await;

        let error = client_for(&server)
            .analyze("prebuilt-layout", b"???")
            .await
            .unwrap_err();
        assert!(!error.is_transient());
        assert!(error.to_string().contains("does not support"));
    }

    #[tokio::test]
    async fn failed_operation_is_rejected() {
        let server = MockServer::start_async().await;
        let operation_url = format!("{}/operations/op-2", server.base_url());
        server
            .mock_async(|when, then| {
                when.method(POST);
                then.status(202).header("Operation-Location", operation_url.as_str());
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/operations/op-2");
                then.status(200).json_body(json!({
                    "status": "failed",
                    "error": { "code": "InvalidContent", "message": "corrupt" }
                }));
            })
            .await;

        let error = client_for(&server)
            .analyze("prebuilt-layout", b"x")
            .await
            .unwrap_err();
        assert!(matches!(error, ExtractionError::Rejected { .. }));
        assert!(error.to_string().contains("corrupt"));
    }
}
