//! Validated state transitions over a [`DocumentStore`].

use std::sync::Arc;

use super::store::DocumentStore;
use super::types::{Document, DocumentStatus, NewDocument, TrackerError};
use crate::extraction::file_extension;
use crate::index::payload::current_timestamp_rfc3339;

/// Records every document's progress through the pipeline.
#[derive(Clone)]
pub struct DocumentTracker {
    store: Arc<dyn DocumentStore>,
}

impl DocumentTracker {
    /// Tracker persisting through `store`.
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Record a freshly uploaded document.
    pub async fn create_uploaded(&self, new: NewDocument) -> Result<Document, TrackerError> {
        let now = current_timestamp_rfc3339();
        let document = Document {
            file_type: file_extension(&new.file_name).unwrap_or_default(),
            id: new.id,
            file_name: new.file_name,
            size: new.size,
            uploaded_by: new.uploaded_by,
            uploaded_at: now.clone(),
            updated_at: now,
            dept_name: new.department.name,
            container: new.department.container,
            blob_name: new.blob_name,
            status: DocumentStatus::Uploaded,
            pages: 0,
            confidence: 0.0,
            deleted: false,
            error_reason: None,
            chat_type: new.chat_type,
            user: new.user,
            chat_thread_id: new.chat_thread_id,
        };
        self.store.put(document.clone()).await?;
        tracing::info!(
            document_id = %document.id,
            file_name = %document.file_name,
            dept = %document.dept_name,
            status = %document.status,
            "Document recorded"
        );
        Ok(document)
    }

    /// Record by id, including soft-deleted ones.
    pub async fn get(&self, id: &str) -> Result<Document, TrackerError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| TrackerError::NotFound(id.to_string()))
    }

    /// `uploaded` → `processing`.
    pub async fn mark_processing(&self, id: &str) -> Result<Document, TrackerError> {
        self.transition(id, DocumentStatus::Processing, &[DocumentStatus::Uploaded], |_| {})
            .await
    }

    /// `processing` → `completed`, storing page count and confidence.
    pub async fn mark_completed(
        &self,
        id: &str,
        pages: u32,
        confidence: f32,
    ) -> Result<Document, TrackerError> {
        self.transition(
            id,
            DocumentStatus::Completed,
            &[DocumentStatus::Processing],
            |document| {
                document.pages = pages;
                document.confidence = confidence.clamp(0.0, 1.0);
                document.error_reason = None;
            },
        )
        .await
    }

    /// `uploaded | processing` → `error`, storing the reason.
    pub async fn mark_error(&self, id: &str, reason: &str) -> Result<Document, TrackerError> {
        self.transition(
            id,
            DocumentStatus::Error,
            &[DocumentStatus::Uploaded, DocumentStatus::Processing],
            |document| {
                document.error_reason = Some(reason.to_string());
                document.pages = 0;
                document.confidence = 0.0;
            },
        )
        .await
    }

    /// `blank | error` → `uploaded`, clearing previous results.
    pub async fn reset_for_repair(&self, id: &str) -> Result<Document, TrackerError> {
        self.transition(
            id,
            DocumentStatus::Uploaded,
            &[DocumentStatus::Blank, DocumentStatus::Error],
            |document| {
                document.error_reason = None;
                document.pages = 0;
                document.confidence = 0.0;
            },
        )
        .await
    }

    /// Flag the record deleted. Deleting twice is a no-op.
    pub async fn soft_delete(&self, id: &str) -> Result<Document, TrackerError> {
        let mut document = self.get(id).await?;
        if document.deleted {
            return Ok(document);
        }
        document.deleted = true;
        document.updated_at = current_timestamp_rfc3339();
        self.store.put(document.clone()).await?;
        tracing::info!(document_id = id, "Document soft-deleted");
        Ok(document)
    }

    /// Live documents in `blank` or `error`, oldest first.
    pub async fn repair_candidates(&self) -> Result<Vec<Document>, TrackerError> {
        Ok(self
            .store
            .list()
            .await?
            .into_iter()
            .filter(|document| !document.deleted && document.status.is_repairable())
            .collect())
    }

    async fn transition<F>(
        &self,
        id: &str,
        to: DocumentStatus,
        allowed_from: &[DocumentStatus],
        apply: F,
    ) -> Result<Document, TrackerError>
    where
        F: FnOnce(&mut Document),
    {
        let mut document = self.get(id).await?;
        if document.deleted {
            return Err(TrackerError::Deleted(id.to_string()));
        }
        if !allowed_from.contains(&document.status) {
            return Err(TrackerError::InvalidTransition {
                id: id.to_string(),
                from: document.status,
                to,
            });
        }
        let from = document.status;
        document.status = to;
        document.updated_at = current_timestamp_rfc3339();
        apply(&mut document);
        self.store.put(document.clone()).await?;
        tracing::debug!(document_id = id, %from, %to, "Document status changed");
        Ok(document)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::store::MemoryDocumentStore;
    use crate::documents::types::Department;
    use crate::index::ChatType;

    fn new_document(id: &str) -> NewDocument {
        NewDocument {
            id: id.into(),
            file_name: "Report.PDF".into(),
            size: 42,
            uploaded_by: "alice".into(),
            department: Department {
                id: "sales".into(),
                name: "Sales".into(),
                container: "sales-docs".into(),
            },
            blob_name: format!("{id}/Report.PDF"),
            chat_type: ChatType::Doc,
            user: None,
            chat_thread_id: None,
        }
    }

    fn tracker() -> DocumentTracker {
        DocumentTracker::new(Arc::new(MemoryDocumentStore::new()))
    }

    #[tokio::test]
    async fn happy_path_records_results() {
        let tracker = tracker();
        let created = tracker.create_uploaded(new_document("d1")).await.unwrap();
        assert_eq!(created.file_type, "pdf");
        assert_eq!(created.status, DocumentStatus::Uploaded);
        assert_eq!((created.pages, created.confidence), (0, 0.0));

        tracker.mark_processing("d1").await.unwrap();
        let done = tracker.mark_completed("d1", 3, 0.85).await.unwrap();
        assert_eq!(done.status, DocumentStatus::Completed);
        assert_eq!(done.pages, 3);
        assert!(done.error_reason.is_none());
    }

    #[tokio::test]
    async fn backwards_moves_are_rejected() {
        let tracker = tracker();
        tracker.create_uploaded(new_document("d1")).await.unwrap();
        tracker.mark_processing("d1").await.unwrap();
        tracker.mark_completed("d1", 1, 0.5).await.unwrap();

        let error = tracker.mark_processing("d1").await.unwrap_err();
        assert!(matches!(
            error,
            TrackerError::InvalidTransition {
                from: DocumentStatus::Completed,
                to: DocumentStatus::Processing,
                ..
            }
        ));
        assert!(tracker.reset_for_repair("d1").await.is_err());
    }

    #[tokio::test]
    async fn errors_can_be_repaired() {
        let tracker = tracker();
        tracker.create_uploaded(new_document("d1")).await.unwrap();
        tracker.mark_processing("d1").await.unwrap();
        let failed = tracker.mark_error("d1", "No text could be extracted").await.unwrap();
        assert_eq!(failed.error_reason.as_deref(), Some("No text could be extracted"));

        let candidates = tracker.repair_candidates().await.unwrap();
        assert_eq!(candidates.len(), 1);

        let reset = tracker.reset_for_repair("d1").await.unwrap();
        assert_eq!(reset.status, DocumentStatus::Uploaded);
        assert!(reset.error_reason.is_none());
    }

    #[tokio::test]
    async fn deleted_documents_are_excluded_and_frozen() {
        let tracker = tracker();
        tracker.create_uploaded(new_document("d1")).await.unwrap();
        tracker.mark_error("d1", "boom").await.unwrap();
        tracker.soft_delete("d1").await.unwrap();
        tracker.soft_delete("d1").await.unwrap();

        assert!(tracker.repair_candidates().await.unwrap().is_empty());
        assert!(matches!(
            tracker.reset_for_repair("d1").await,
            Err(TrackerError::Deleted(_))
        ));
        assert!(tracker.get("d1").await.unwrap().deleted);
        assert!(matches!(tracker.get("nope").await, Err(TrackerError::NotFound(_))));
    }
}
