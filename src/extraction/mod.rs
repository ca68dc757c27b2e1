//! Extraction engine: file bytes in, normalized text and confidence out.

pub mod assemble;
pub mod client;
pub mod models;
pub mod types;

pub use client::{DocumentAnalysisProvider, DocumentIntelligenceClient};
pub use models::{ModelDescriptor, ModelKind, file_extension, select_model};
pub use types::{AnalyzeResult, ConfidenceSamples, ExtractedContent, ExtractionError};

use std::sync::Arc;
use std::time::{Duration, Instant};

/// Validates inputs, dispatches to the right model, and assembles the provider output.
#[derive(Clone)]
pub struct ExtractionEngine {
    provider: Arc<dyn DocumentAnalysisProvider>,
    max_bytes: u64,
}

impl ExtractionEngine {
    /// Build an engine over `provider` accepting files up to `max_bytes`.
    pub fn new(provider: Arc<dyn DocumentAnalysisProvider>, max_bytes: u64) -> Self {
        Self {
            provider,
            max_bytes,
        }
    }

    /// Reject inputs that must never reach the provider.
    pub fn validate(&self, bytes_len: u64, file_name: &str) -> Result<ModelDescriptor, ExtractionError> {
        if !is_plain_file_name(file_name) {
            return Err(ExtractionError::InvalidFileName(file_name.to_string()));
        }
        let model = select_model(file_name).ok_or_else(|| {
            ExtractionError::UnsupportedFileType(
                file_extension(file_name).unwrap_or_else(|| file_name.to_string()),
            )
        })?;
        if bytes_len == 0 {
            return Err(ExtractionError::EmptyFile);
        }
        if bytes_len > self.max_bytes {
            return Err(ExtractionError::PayloadTooLarge {
                size: bytes_len,
                max: self.max_bytes,
            });
        }
        Ok(model)
    }

    /// Extract normalized text from a file.
    pub async fn extract(
        &self,
        bytes: &[u8],
        file_name: &str,
    ) -> Result<ExtractedContent, ExtractionError> {
        let model = self.validate(bytes.len() as u64, file_name)?;
        let started = Instant::now();
        tracing::debug!(file_name, model = model.model_id, bytes = bytes.len(), "Extracting document");

        let result = self.provider.analyze(model.model_id, bytes).await?;
        let assembled = assemble::assemble(model.kind, &result);
        if assembled.text.trim().is_empty() {
            tracing::warn!(file_name, model = model.model_id, "Extraction produced no text");
            return Err(ExtractionError::NoContent);
        }

        let pages = u32::try_from(result.pages.len()).unwrap_or(u32::MAX).max(1);
        let confidence = assembled.samples.mean();
        let duration = started.elapsed();
        tracing::info!(
            file_name,
            model = model.model_id,
            pages,
            words = assembled.word_count,
            confidence,
            elapsed_ms = duration.as_millis() as u64,
            "Extraction finished"
        );

        Ok(ExtractedContent {
            text: assembled.text,
            word_count: assembled.word_count,
            pages,
            confidence,
            samples: assembled.samples,
            model: model.kind,
            duration,
        })
    }

    /// Check provider connectivity with a tiny read-model request.
    ///
    /// The request is abandoned (its future dropped) once `timeout` passes, so a hung provider
    /// never holds the caller.
    pub async fn probe(&self, timeout: Duration) -> Result<(), ExtractionError> {
        match tokio::time::timeout(timeout, self.provider.analyze("prebuilt-read", b"ping")).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(error)) => Err(error),
            Err(_) => {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Extraction probe aborted");
                Err(ExtractionError::Transient("connectivity probe timed out".into()))
            }
        }
    }
}

/// A bare name: no path separators, not `.` or `..`, no control characters.
fn is_plain_file_name(file_name: &str) -> bool {
    !file_name.trim().is_empty()
        && !matches!(file_name, "." | "..")
        && !file_name.contains(['/', '\\'])
        && !file_name.chars().any(char::is_control)
}
