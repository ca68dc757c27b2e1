//! Document records and their processing states.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use thiserror::Error;

use crate::index::ChatType;

/// Processing state of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    /// Bytes stored, pipeline not started.
    Uploaded,
    /// Pipeline running.
    Processing,
    /// Indexed and searchable.
    Completed,
    /// Pipeline failed; see `error_reason`.
    Error,
    /// Status was never recorded.
    Blank,
}

impl DocumentStatus {
    /// Lower-case wire form.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Error => "error",
            Self::Blank => "blank",
        }
    }

    /// Whether bulk repair picks this state up.
    pub fn is_repairable(self) -> bool {
        matches!(self, Self::Blank | Self::Error)
    }
}

impl fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Missing, null, or empty status strings read back as [`DocumentStatus::Blank`].
fn status_or_blank<'de, D>(deserializer: D) -> Result<DocumentStatus, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let normalized = raw.as_deref().map(str::trim).unwrap_or_default().to_ascii_lowercase();
    match normalized.as_str() {
        "" | "blank" => Ok(DocumentStatus::Blank),
        "uploaded" => Ok(DocumentStatus::Uploaded),
        "processing" => Ok(DocumentStatus::Processing),
        "completed" => Ok(DocumentStatus::Completed),
        "error" => Ok(DocumentStatus::Error),
        other => Err(serde::de::Error::unknown_variant(other, STATUS_NAMES)),
    }
}

const STATUS_NAMES: &[&str] = &["uploaded", "processing", "completed", "error", "blank"];

fn blank_status() -> DocumentStatus {
    DocumentStatus::Blank
}

/// A department that owns uploaded documents.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Department {
    /// Stable identifier used by callers.
    pub id: String,
    /// Display name written into chunk payloads.
    pub name: String,
    /// Blob container holding the department's files.
    pub container: String,
}

/// Tracked document record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// UUID v4.
    pub id: String,
    /// Original file name.
    pub file_name: String,
    /// Lower-case extension.
    pub file_type: String,
    /// Size in bytes.
    pub size: u64,
    /// Uploading user.
    pub uploaded_by: String,
    /// RFC 3339 upload time.
    pub uploaded_at: String,
    /// RFC 3339 time of the last state change.
    #[serde(default)]
    pub updated_at: String,
    /// Owning department name.
    pub dept_name: String,
    /// Blob container of the owning department.
    pub container: String,
    /// Blob name the bytes are stored under.
    pub blob_name: String,
    /// Current state.
    #[serde(default = "blank_status", deserialize_with = "status_or_blank")]
    pub status: DocumentStatus,
    /// Page count; `0` until completed.
    #[serde(default)]
    pub pages: u32,
    /// Extraction confidence in `[0, 1]`; `0` until completed.
    #[serde(default)]
    pub confidence: f32,
    /// Soft-delete flag.
    #[serde(default)]
    pub deleted: bool,
    /// Failure reason, present only in [`DocumentStatus::Error`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
    /// Conversation mode the document was ingested for.
    #[serde(default)]
    pub chat_type: ChatType,
    /// Owning user for `data` uploads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Owning thread for `data` uploads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_thread_id: Option<String>,
}

/// Fields supplied when a document is first recorded.
#[derive(Debug, Clone)]
pub struct NewDocument {
    /// Pre-generated document id.
    pub id: String,
    /// Original file name.
    pub file_name: String,
    /// Size in bytes.
    pub size: u64,
    /// Uploading user.
    pub uploaded_by: String,
    /// Owning department.
    pub department: Department,
    /// Blob name the bytes were stored under.
    pub blob_name: String,
    /// Conversation mode.
    pub chat_type: ChatType,
    /// Owning user for `data` uploads.
    pub user: Option<String>,
    /// Owning thread for `data` uploads.
    pub chat_thread_id: Option<String>,
}

/// Persistence failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem access failed.
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// A stored record could not be (de)serialized.
    #[error("store record is malformed: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Lifecycle failures.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// No record with this id.
    #[error("document {0} not found")]
    NotFound(String),
    /// The document was soft-deleted.
    #[error("document {0} has been deleted")]
    Deleted(String),
    /// The requested state change is not allowed.
    #[error("document {id}: cannot move from {from} to {to}")]
    InvalidTransition {
        /// Document id.
        id: String,
        /// Current state.
        from: DocumentStatus,
        /// Requested state.
        to: DocumentStatus,
    },
    /// Underlying store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(status: serde_json::Value) -> serde_json::Value {
        let mut value = json!({
            "id": "d1",
            "fileName": "a.txt",
            "fileType": "txt",
            "size": 3,
            "uploadedBy": "alice",
            "uploadedAt": "2025-01-01T00:00:00Z",
            "deptName": "Sales",
            "container": "sales",
            "blobName": "d1/a.txt"
        });
        if !status.is_null() {
            value["status"] = status;
        }
        value
    }

    #[test]
    fn missing_or_empty_status_reads_as_blank() {
        for status in [json!(null), json!(""), json!("  ")] {
            let document: Document = serde_json::from_value(record(status)).expect("document");
            assert_eq!(document.status, DocumentStatus::Blank);
        }
        let mut explicit_null = record(json!(null));
        explicit_null["status"] = json!(null);
        let document: Document = serde_json::from_value(explicit_null).expect("document");
        assert_eq!(document.status, DocumentStatus::Blank);
    }

    #[test]
    fn blank_is_written_explicitly() {
        let document: Document = serde_json::from_value(record(json!(null))).unwrap();
        let written = serde_json::to_value(&document).unwrap();
        assert_eq!(written["status"], "blank");
        assert_eq!(written["chatType"], "doc");
    }

    #[test]
    fn known_statuses_parse_case_insensitively() {
        let document: Document = serde_json::from_value(record(json!("Completed"))).unwrap();
        assert_eq!(document.status, DocumentStatus::Completed);
        assert!(serde_json::from_value::<Document>(record(json!("archived"))).is_err());
    }
}
