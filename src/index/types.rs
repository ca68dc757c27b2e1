//! Shared types used by the index backends and the gateway.

use crate::embedding::EmbeddingError;
use crate::retry::Transient;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors returned while interacting with the vector index.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid index URL: {0}")]
    InvalidUrl(String),
    /// The collection does not exist yet.
    #[error("Index '{0}' not found")]
    IndexNotFound(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The index responded with an unexpected status code.
    #[error("Unexpected index response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the index.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Query text could not be embedded.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    /// A chunk vector does not match the collection dimension.
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Collection dimension.
        expected: usize,
        /// Offending vector length.
        actual: usize,
    },
}

impl Transient for IndexError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Http(error) => error.is_timeout() || error.is_connect(),
            Self::UnexpectedStatus { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
            }
            Self::Embedding(error) => error.is_transient(),
            _ => false,
        }
    }
}

/// Conversation mode a chunk is indexed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    /// Shared department documents.
    #[default]
    Doc,
    /// Per-user, per-thread uploads.
    Data,
    /// Plain chat without retrieval.
    Simple,
    /// Web-grounded chat.
    Web,
    /// Single-document chat.
    Document,
}

impl ChatType {
    /// Wire form stored in the `chatType` payload field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Doc => "doc",
            Self::Data => "data",
            Self::Simple => "simple",
            Self::Web => "web",
            Self::Document => "document",
        }
    }
}

impl fmt::Display for ChatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "doc" => Ok(Self::Doc),
            "data" => Ok(Self::Data),
            "simple" => Ok(Self::Simple),
            "web" => Ok(Self::Web),
            "document" => Ok(Self::Document),
            other => Err(format!("unknown chat type '{other}'")),
        }
    }
}

/// A chunk ready to be written to the index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedChunk {
    /// Deterministic point id derived from document id and ordinal.
    pub id: String,
    /// Owning document.
    pub document_id: String,
    /// Conversation mode the document was ingested for.
    pub chat_type: ChatType,
    /// Department name.
    pub dept_name: String,
    /// Owning user for `data` uploads.
    pub user: Option<String>,
    /// Owning thread for `data` uploads.
    pub chat_thread_id: Option<String>,
    /// Chunk text.
    pub content: String,
    /// Embedding of `content`.
    pub vector: Vec<f32>,
    /// Optional blob link.
    pub sas_url: Option<String>,
    /// Original file name.
    pub file_name: String,
    /// Free-form metadata string.
    pub metadata: String,
}

/// Scored chunk returned by a search.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchHit {
    /// Point id.
    pub id: String,
    /// Similarity score; higher is closer.
    pub score: f32,
    /// Owning document, when present in the payload.
    pub document_id: Option<String>,
    /// Original file name.
    pub file_name: Option<String>,
    /// Metadata string.
    pub metadata: Option<String>,
    /// Chunk text.
    pub content: Option<String>,
    /// Department name.
    pub dept_name: Option<String>,
    /// Owning thread.
    pub chat_thread_id: Option<String>,
    /// Blob link.
    pub sas_url: Option<String>,
}

impl SearchHit {
    /// Read the known payload fields out of a stored payload map.
    pub fn from_payload(id: String, score: f32, payload: &Map<String, Value>) -> Self {
        let field = |key: &str| {
            payload
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
        };
        Self {
            id,
            score,
            document_id: field("documentId"),
            file_name: field("fileName"),
            metadata: field("metadata"),
            content: field("content"),
            dept_name: field("deptName"),
            chat_thread_id: field("chatThreadId"),
            sas_url: field("sasUrl"),
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    pub(crate) result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

#[derive(Deserialize)]
pub(crate) struct QueryPoint {
    pub(crate) id: Value,
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
pub(crate) struct ScrollResponse {
    pub(crate) result: ScrollResult,
}

#[derive(Deserialize)]
pub(crate) struct ScrollResult {
    #[serde(default)]
    pub(crate) points: Vec<ScrollPoint>,
    #[serde(default)]
    pub(crate) next_page_offset: Option<Value>,
}

#[derive(Deserialize)]
pub(crate) struct ScrollPoint {
    #[serde(default)]
    pub(crate) id: Option<Value>,
}
