//! Requests, reports, and errors of the ingestion pipeline.

use serde::Serialize;
use thiserror::Error;

use super::chunking::ChunkingError;
use crate::documents::{StoreError, TrackerError};
use crate::embedding::EmbeddingError;
use crate::extraction::ExtractionError;
use crate::index::{ChatType, IndexError};
use crate::retry::Transient;
use crate::storage::BlobError;

/// Uploader recorded when the caller does not name one.
pub const SYSTEM_UPLOADER: &str = "system";

/// A file to ingest and the scope it is indexed under.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Raw file bytes.
    pub bytes: Vec<u8>,
    /// Original file name; its extension selects the extraction model.
    pub file_name: String,
    /// Owning department id.
    pub department_id: String,
    /// Conversation mode the chunks are tagged with.
    pub chat_type: ChatType,
    /// Owning user; required for `data`.
    pub user: Option<String>,
    /// Owning thread; required for `data`.
    pub chat_thread_id: Option<String>,
    /// Uploading user.
    pub uploaded_by: String,
}

impl IngestRequest {
    /// Department-wide `doc` upload by the system user.
    pub fn new(bytes: Vec<u8>, file_name: impl Into<String>, department_id: impl Into<String>) -> Self {
        Self {
            bytes,
            file_name: file_name.into(),
            department_id: department_id.into(),
            chat_type: ChatType::Doc,
            user: None,
            chat_thread_id: None,
            uploaded_by: SYSTEM_UPLOADER.to_string(),
        }
    }

    /// Per-user, per-thread `data` upload.
    pub fn for_thread(mut self, user: impl Into<String>, chat_thread_id: impl Into<String>) -> Self {
        let user = user.into();
        self.chat_type = ChatType::Data;
        self.uploaded_by = user.clone();
        self.user = Some(user);
        self.chat_thread_id = Some(chat_thread_id.into());
        self
    }
}

/// Outcome of one bulk repair pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    /// Candidates picked up.
    pub attempted: usize,
    /// Candidates that reached `completed`.
    pub succeeded: usize,
    /// Candidates that ended in `error` or could not be run.
    pub failed: usize,
}

/// Errors surfaced by the knowledge-base entrypoints.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The department id is not known.
    #[error("unknown department '{0}'")]
    UnknownDepartment(String),
    /// The request is inconsistent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Extraction failed or rejected the input.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    /// Embedding failed.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),
    /// Chunker could not be built.
    #[error(transparent)]
    Chunking(#[from] ChunkingError),
    /// Index operation failed.
    #[error(transparent)]
    Index(#[from] IndexError),
    /// Lifecycle transition failed.
    #[error(transparent)]
    Tracker(#[from] TrackerError),
    /// Collaborator store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Blob storage failed.
    #[error(transparent)]
    Blob(#[from] BlobError),
}

impl PipelineError {
    /// Whether the caller supplied something unusable.
    pub fn is_input_error(&self) -> bool {
        match self {
            Self::UnknownDepartment(_) | Self::InvalidRequest(_) => true,
            Self::Extraction(error) => matches!(
                error,
                ExtractionError::InvalidFileName(_)
                    | ExtractionError::UnsupportedFileType(_)
                    | ExtractionError::EmptyFile
                    | ExtractionError::PayloadTooLarge { .. }
            ),
            _ => false,
        }
    }

    /// Whether the referenced document does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Tracker(TrackerError::NotFound(_)))
    }

    /// Whether the index has not been created.
    pub fn is_index_missing(&self) -> bool {
        matches!(self, Self::Index(IndexError::IndexNotFound(_)))
    }
}

impl Transient for PipelineError {
    fn is_transient(&self) -> bool {
        match self {
            Self::Extraction(error) => error.is_transient(),
            Self::Embedding(error) => error.is_transient(),
            Self::Index(error) => error.is_transient(),
            _ => false,
        }
    }
}
