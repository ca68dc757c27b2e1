//! Wire and result types for document extraction.

use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use super::models::ModelKind;
use crate::retry::Transient;

/// Errors raised while turning a raw file into text.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// File name carries path components or control characters.
    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),
    /// File extension has no entry in the model table.
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),
    /// Upload contained zero bytes.
    #[error("File is empty")]
    EmptyFile,
    /// Upload exceeded the configured size ceiling.
    #[error("File too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge {
        /// Size of the rejected payload.
        size: u64,
        /// Configured ceiling.
        max: u64,
    },
    /// Provider was rate limited, unavailable, or the connection failed. Safe to retry.
    #[error("Extraction service temporarily unavailable: {0}")]
    Transient(String),
    /// Provider refused the document. Retrying will not help.
    #[error("{reason}")]
    Rejected {
        /// HTTP status returned by the provider, when known.
        status: Option<StatusCode>,
        /// User-facing explanation stored on the document.
        reason: String,
    },
    /// Provider succeeded but no text could be recovered from the file.
    #[error("No text could be extracted from the document; it may be blank or an image without legible text")]
    NoContent,
    /// Provider response could not be decoded.
    #[error("Malformed extraction response: {0}")]
    InvalidResponse(String),
}

impl Transient for ExtractionError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl ExtractionError {
    /// Classify an unsuccessful provider status.
    pub fn from_status(status: StatusCode, body: &str) -> Self {
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Self::Transient(format!("{status}: {}", truncate(body, 200)));
        }
        let reason = match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                "The extraction service rejected our credentials".to_string()
            }
            StatusCode::PAYLOAD_TOO_LARGE => {
                "The file exceeds the extraction service size limit".to_string()
            }
            StatusCode::UNSUPPORTED_MEDIA_TYPE => {
                "The extraction service does not support this file format".to_string()
            }
            _ => format!(
                "The extraction service rejected the document ({status}): {}",
                truncate(body, 200)
            ),
        };
        Self::Rejected {
            status: Some(status),
            reason,
        }
    }
}

impl From<reqwest::Error> for ExtractionError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::InvalidResponse(error.to_string())
        } else {
            Self::Transient(error.to_string())
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Normalized text and statistics produced for a single document.
#[derive(Debug, Clone)]
pub struct ExtractedContent {
    /// Assembled text handed to chunking.
    pub text: String,
    /// Whitespace-delimited words across every emitted segment.
    pub word_count: usize,
    /// Number of pages reported by the provider (at least one).
    pub pages: u32,
    /// Flat mean of the non-zero confidence samples, or `0` when there were none.
    pub confidence: f32,
    /// Raw samples grouped by structural element.
    pub samples: ConfidenceSamples,
    /// Model family used for the document.
    pub model: ModelKind,
    /// Wall time spent in extraction.
    pub duration: Duration,
}

/// Per-element confidence samples collected during assembly.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfidenceSamples {
    /// Paragraph-level samples.
    pub paragraphs: Vec<f32>,
    /// Table-cell samples.
    pub tables: Vec<f32>,
    /// Key-value pair samples.
    pub key_values: Vec<f32>,
}

impl ConfidenceSamples {
    /// Flat mean across every present, non-zero sample.
    pub fn mean(&self) -> f32 {
        let usable: Vec<f32> = self
            .paragraphs
            .iter()
            .chain(&self.tables)
            .chain(&self.key_values)
            .copied()
            .filter(|value| value.is_finite() && *value > 0.0)
            .collect();
        if usable.is_empty() {
            return 0.0;
        }
        usable.iter().sum::<f32>() / usable.len() as f32
    }
}

/// Analysis payload returned by the provider.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResult {
    /// Full reading-order content.
    #[serde(default)]
    pub content: String,
    /// Page descriptors; only the count is used.
    #[serde(default)]
    pub pages: Vec<AnalyzedPage>,
    /// Paragraphs in reading order.
    #[serde(default)]
    pub paragraphs: Vec<AnalyzedParagraph>,
    /// Recognized tables.
    #[serde(default)]
    pub tables: Vec<AnalyzedTable>,
    /// Recognized key-value pairs.
    #[serde(default)]
    pub key_value_pairs: Vec<AnalyzedKeyValue>,
    /// Recognized lists.
    #[serde(default)]
    pub lists: Vec<AnalyzedList>,
}

/// Page descriptor.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedPage {
    /// One-based page number.
    #[serde(default)]
    pub page_number: u32,
}

/// Paragraph element.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyzedParagraph {
    /// Paragraph text.
    #[serde(default)]
    pub content: String,
    /// Optional recognition confidence.
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// Table element.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedTable {
    /// Declared number of rows.
    #[serde(default)]
    pub row_count: u32,
    /// Declared number of columns.
    #[serde(default)]
    pub column_count: u32,
    /// Cells in provider order.
    #[serde(default)]
    pub cells: Vec<AnalyzedCell>,
}

/// Table cell element.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzedCell {
    /// Zero-based row index.
    #[serde(default)]
    pub row_index: u32,
    /// Zero-based column index.
    #[serde(default)]
    pub column_index: u32,
    /// Cell text.
    #[serde(default)]
    pub content: String,
    /// Optional recognition confidence.
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// Key-value pair element.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyzedKeyValue {
    /// Key span.
    #[serde(default)]
    pub key: Option<AnalyzedSpan>,
    /// Value span.
    #[serde(default)]
    pub value: Option<AnalyzedSpan>,
    /// Optional recognition confidence.
    #[serde(default)]
    pub confidence: Option<f32>,
}

/// Text span used by key-value pairs and list items.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyzedSpan {
    /// Span text.
    #[serde(default)]
    pub content: String,
}

/// List element.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyzedList {
    /// Items in order.
    #[serde(default)]
    pub items: Vec<AnalyzedSpan>,
}

/// Long-running operation envelope returned while polling.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AnalyzeOperation {
    pub(crate) status: String,
    #[serde(default)]
    pub(crate) analyze_result: Option<AnalyzeResult>,
    #[serde(default)]
    pub(crate) error: Option<OperationError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OperationError {
    #[serde(default)]
    pub(crate) code: String,
    #[serde(default)]
    pub(crate) message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_paragraph_samples() {
        let samples = ConfidenceSamples {
            paragraphs: vec![0.9, 0.8],
            ..Default::default()
        };
        assert!((samples.mean() - 0.85).abs() < 1e-6);
    }

    #[test]
    fn mean_without_samples_is_zero() {
        assert_eq!(ConfidenceSamples::default().mean(), 0.0);
        let zeros = ConfidenceSamples {
            tables: vec![0.0, 0.0],
            ..Default::default()
        };
        assert_eq!(zeros.mean(), 0.0);
    }

    #[test]
    fn status_classification() {
        assert!(ExtractionError::from_status(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
        assert!(ExtractionError::from_status(StatusCode::BAD_GATEWAY, "").is_transient());
        for status in [
            StatusCode::UNAUTHORIZED,
            StatusCode::PAYLOAD_TOO_LARGE,
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ] {
            let error = ExtractionError::from_status(status, "nope");
            assert!(!error.is_transient());
            assert!(matches!(error, ExtractionError::Rejected { .. }));
        }
    }
}
