//! Knowledge-base service: ingestion, repair, deletion, and citation lookup.

use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use uuid::Uuid;

use super::chunking::TextChunker;
use super::supervisor::TaskSupervisor;
use super::types::{IngestRequest, PipelineError, RepairReport};
use crate::citations::{CitationRecord, CitationResolution, CitationResolver};
use crate::documents::{
    DepartmentDirectory, Document, DocumentStatus, DocumentTracker, KeyedLocks, NewDocument,
};
use crate::extraction::{ExtractedContent, ExtractionEngine};
use crate::index::{ChatType, IndexError, IndexGateway, IndexedChunk, chunk_point_id};
use crate::metrics::{MetricsSnapshot, PipelineMetrics};
use crate::retry::{RetryPolicy, with_retry};
use crate::storage::BlobStore;

/// Default number of documents repaired concurrently.
pub const REPAIR_CONCURRENCY: usize = 4;

/// Components a [`KnowledgeBase`] is assembled from.
pub struct KnowledgeBaseParts {
    /// Text extraction.
    pub extraction: ExtractionEngine,
    /// Chunker applied to extracted text.
    pub chunker: TextChunker,
    /// Index facade; also embeds chunks.
    pub gateway: IndexGateway,
    /// Lifecycle tracker.
    pub tracker: DocumentTracker,
    /// Department lookup.
    pub departments: Arc<dyn DepartmentDirectory>,
    /// File bytes storage.
    pub blobs: Arc<dyn BlobStore>,
    /// Citation lookup.
    pub resolver: CitationResolver,
    /// Shared counters.
    pub metrics: Arc<PipelineMetrics>,
    /// Retry policy for extraction and index writes.
    pub retry: RetryPolicy,
    /// Documents repaired at once.
    pub repair_concurrency: usize,
}

struct Inner {
    extraction: ExtractionEngine,
    chunker: TextChunker,
    gateway: IndexGateway,
    tracker: DocumentTracker,
    departments: Arc<dyn DepartmentDirectory>,
    blobs: Arc<dyn BlobStore>,
    resolver: CitationResolver,
    metrics: Arc<PipelineMetrics>,
    retry: RetryPolicy,
    repair_concurrency: usize,
    locks: KeyedLocks,
    supervisor: TaskSupervisor,
}

/// Orchestrates the pipeline. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct KnowledgeBase {
    inner: Arc<Inner>,
}

/// Operations exposed to the HTTP and CLI surfaces.
#[async_trait]
pub trait KnowledgeBaseApi: Send + Sync {
    /// Record a file and start processing it in the background.
    async fn ingest_with(&self, request: IngestRequest) -> Result<String, PipelineError>;
    /// Current record for `document_id`.
    async fn document(&self, document_id: &str) -> Result<Document, PipelineError>;
    /// Soft-delete a document and drop its chunks.
    async fn delete_document(&self, document_id: &str) -> Result<Document, PipelineError>;
    /// Start a repair pass in the background.
    fn spawn_repair(&self);
    /// Citations for a thread's latest answer, with diagnostics.
    async fn resolve(&self, thread_id: &str) -> CitationResolution;
    /// Create the index when missing.
    async fn ensure_index_created(&self) -> Result<(), PipelineError>;
    /// Drop and rebuild the index.
    async fn force_recreate_index(&self) -> Result<(), PipelineError>;
    /// Counter snapshot.
    fn metrics_snapshot(&self) -> MetricsSnapshot;
}

impl KnowledgeBase {
    /// Assemble the service. Must be called inside a Tokio runtime.
    pub fn new(parts: KnowledgeBaseParts) -> Self {
        let supervisor = TaskSupervisor::new(parts.metrics.clone());
        Self {
            inner: Arc::new(Inner {
                extraction: parts.extraction,
                chunker: parts.chunker,
                gateway: parts.gateway,
                tracker: parts.tracker,
                departments: parts.departments,
                blobs: parts.blobs,
                resolver: parts.resolver,
                metrics: parts.metrics,
                retry: parts.retry,
                repair_concurrency: parts.repair_concurrency.max(1),
                locks: KeyedLocks::new(),
                supervisor,
            }),
        }
    }

    /// Lifecycle tracker, for read access.
    pub fn tracker(&self) -> &DocumentTracker {
        &self.inner.tracker
    }

    /// Background task supervisor.
    pub fn supervisor(&self) -> &TaskSupervisor {
        &self.inner.supervisor
    }

    /// Ingest a department-wide `doc` upload.
    pub async fn ingest(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        department_id: &str,
    ) -> Result<String, PipelineError> {
        self.ingest_with(IngestRequest::new(bytes, file_name, department_id))
            .await
    }

    /// Validate, store, and record an upload, then process it in the background.
    ///
    /// Input errors are returned before anything is stored or recorded.
    pub async fn ingest_with(&self, request: IngestRequest) -> Result<String, PipelineError> {
        let document_id = self.record_upload(request).await?;
        let this = self.clone();
        let task_id = document_id.clone();
        self.inner.supervisor.spawn(format!("ingest:{document_id}"), async move {
            this.process_document(&task_id).await?;
            Ok::<(), anyhow::Error>(())
        });
        Ok(document_id)
    }

    /// Store the bytes and create the `uploaded` record without starting the pipeline.
    pub async fn record_upload(&self, request: IngestRequest) -> Result<String, PipelineError> {
        let inner = &self.inner;
        inner
            .extraction
            .validate(request.bytes.len() as u64, &request.file_name)?;
        validate_scope(&request)?;
        let department = inner
            .departments
            .resolve(&request.department_id)
            .await?
            .ok_or_else(|| PipelineError::UnknownDepartment(request.department_id.clone()))?;

        let document_id = Uuid::new_v4().to_string();
        let blob_name = format!("{document_id}/{}", request.file_name);
        inner
            .blobs
            .upload_file(&department.container, &blob_name, &request.bytes)
            .await?;

        inner
            .tracker
            .create_uploaded(NewDocument {
                id: document_id.clone(),
                file_name: request.file_name,
                size: request.bytes.len() as u64,
                uploaded_by: request.uploaded_by,
                department,
                blob_name,
                chat_type: request.chat_type,
                user: request.user,
                chat_thread_id: request.chat_thread_id,
            })
            .await?;
        Ok(document_id)
    }

    /// Run the full pipeline for one document and return its final record.
    ///
    /// Stage failures end in `error` with a reason and are not returned as `Err`; only lifecycle
    /// problems (unknown, deleted, or already running documents) are.
    pub async fn process_document(&self, document_id: &str) -> Result<Document, PipelineError> {
        let inner = &self.inner;
        let _guard = inner.locks.lock(document_id).await;

        let mut document = inner.tracker.get(document_id).await?;
        if document.status == DocumentStatus::Completed && !document.deleted {
            tracing::debug!(document_id, "Document already completed; skipping");
            return Ok(document);
        }
        if document.status.is_repairable() {
            document = inner.tracker.reset_for_repair(document_id).await?;
        }
        let document = inner.tracker.mark_processing(&document.id).await?;
        tracing::info!(
            document_id,
            file_name = %document.file_name,
            dept = %document.dept_name,
            "Processing document"
        );

        match self.run_stages(&document).await {
            Ok((content, chunk_count)) => {
                inner.metrics.record_completed(chunk_count as u64);
                let completed = inner
                    .tracker
                    .mark_completed(document_id, content.pages, content.confidence)
                    .await?;
                tracing::info!(
                    document_id,
                    pages = completed.pages,
                    confidence = completed.confidence,
                    chunks = chunk_count,
                    "Document completed"
                );
                Ok(completed)
            }
            Err(error) => {
                inner.metrics.record_failed();
                tracing::warn!(document_id, error = %error, "Document processing failed");
                let failed = inner
                    .tracker
                    .mark_error(document_id, &error.to_string())
                    .await?;
                Ok(failed)
            }
        }
    }

    async fn run_stages(
        &self,
        document: &Document,
    ) -> Result<(ExtractedContent, usize), PipelineError> {
        let inner = &self.inner;
        let bytes = inner
            .blobs
            .download_file(&document.container, &document.blob_name)
            .await?;

        let content = with_retry(&inner.retry, "extract", || {
            inner.extraction.extract(&bytes, &document.file_name)
        })
        .await?;

        let pieces = inner.chunker.chunk_blocking(content.text.clone()).await?;
        if pieces.is_empty() {
            return Err(crate::extraction::ExtractionError::NoContent.into());
        }

        let metadata = format!("{} ({} pages)", document.file_name, content.pages);
        let embedder = inner.gateway.embedder();
        let mut chunks = Vec::with_capacity(pieces.len());
        for piece in pieces {
            let vector = embedder.embed(&piece.text).await?;
            chunks.push(IndexedChunk {
                id: chunk_point_id(&document.id, piece.ordinal),
                document_id: document.id.clone(),
                chat_type: document.chat_type,
                dept_name: document.dept_name.clone(),
                user: scoped(document.chat_type, &document.user),
                chat_thread_id: scoped(document.chat_type, &document.chat_thread_id),
                content: piece.text,
                vector,
                sas_url: None,
                file_name: document.file_name.clone(),
                metadata: metadata.clone(),
            });
        }

        let chunk_count = chunks.len();
        self.replace_chunks(&document.id, chunks).await?;
        Ok((content, chunk_count))
    }

    /// Drop stale chunks of a previous run, then upsert, creating the index if needed.
    async fn replace_chunks(
        &self,
        document_id: &str,
        chunks: Vec<IndexedChunk>,
    ) -> Result<(), PipelineError> {
        let gateway = &self.inner.gateway;
        match gateway.delete_by_document_id(document_id).await {
            Ok(()) => {}
            Err(IndexError::IndexNotFound(_)) => gateway.ensure_index_created().await?,
            Err(error) => return Err(error.into()),
        }
        let written = with_retry(&self.inner.retry, "upsert", || gateway.upsert(chunks.clone())).await?;
        tracing::debug!(document_id, written, "Chunks indexed");
        Ok(())
    }

    /// Re-run every live `blank` or `error` document, a bounded number at a time.
    ///
    /// One document failing never affects the others.
    pub async fn repair_blank_or_error_documents(&self) -> Result<RepairReport, PipelineError> {
        let inner = &self.inner;
        inner.metrics.record_repair_run();
        let candidates = inner.tracker.repair_candidates().await?;
        let attempted = candidates.len();
        tracing::info!(attempted, concurrency = inner.repair_concurrency, "Repair pass started");

        let outcomes: Vec<bool> = stream::iter(candidates)
            .map(|document| async move {
                match self.process_document(&document.id).await {
                    Ok(result) => result.status == DocumentStatus::Completed,
                    Err(error) => {
                        tracing::warn!(document_id = %document.id, error = %error, "Repair skipped document");
                        false
                    }
                }
            })
            .buffer_unordered(inner.repair_concurrency)
            .collect()
            .await;

        let succeeded = outcomes.iter().filter(|ok| **ok).count();
        let report = RepairReport {
            attempted,
            succeeded,
            failed: attempted - succeeded,
        };
        tracing::info!(
            attempted = report.attempted,
            succeeded = report.succeeded,
            failed = report.failed,
            "Repair pass finished"
        );
        Ok(report)
    }

    /// Run a repair pass in the background.
    pub fn spawn_repair(&self) {
        let this = self.clone();
        self.inner.supervisor.spawn("repair", async move {
            this.repair_blank_or_error_documents().await?;
            Ok::<(), anyhow::Error>(())
        });
    }

    /// Soft-delete a document and remove its chunks from the index.
    pub async fn delete_document(&self, document_id: &str) -> Result<Document, PipelineError> {
        let inner = &self.inner;
        let _guard = inner.locks.lock(document_id).await;
        inner.tracker.get(document_id).await?;

        match inner.gateway.delete_by_document_id(document_id).await {
            Ok(()) | Err(IndexError::IndexNotFound(_)) => {}
            Err(error) => return Err(error.into()),
        }
        match inner.gateway.document_chunk_ids(document_id).await {
            Ok(remaining) if !remaining.is_empty() => {
                tracing::warn!(document_id, remaining = remaining.len(), "Chunks still present after delete");
            }
            Ok(_) => tracing::debug!(document_id, "Chunk delete verified"),
            Err(error) => tracing::debug!(document_id, error = %error, "Chunk delete verification skipped"),
        }

        Ok(inner.tracker.soft_delete(document_id).await?)
    }

    /// Citations for a thread's latest answer.
    pub async fn resolve_citations(&self, thread_id: &str) -> Vec<CitationRecord> {
        self.inner.resolver.resolve_citations(thread_id).await
    }

    /// Create the index when missing.
    pub async fn ensure_index_created(&self) -> Result<(), PipelineError> {
        Ok(self.inner.gateway.ensure_index_created().await?)
    }

    /// Drop and rebuild the index.
    pub async fn force_recreate_index(&self) -> Result<(), PipelineError> {
        Ok(self.inner.gateway.force_recreate_index().await?)
    }
}

#[async_trait]
impl KnowledgeBaseApi for KnowledgeBase {
    async fn ingest_with(&self, request: IngestRequest) -> Result<String, PipelineError> {
        KnowledgeBase::ingest_with(self, request).await
    }

    async fn document(&self, document_id: &str) -> Result<Document, PipelineError> {
        Ok(self.inner.tracker.get(document_id).await?)
    }

    async fn delete_document(&self, document_id: &str) -> Result<Document, PipelineError> {
        KnowledgeBase::delete_document(self, document_id).await
    }

    fn spawn_repair(&self) {
        KnowledgeBase::spawn_repair(self);
    }

    async fn resolve(&self, thread_id: &str) -> CitationResolution {
        self.inner.resolver.resolve(thread_id).await
    }

    async fn ensure_index_created(&self) -> Result<(), PipelineError> {
        KnowledgeBase::ensure_index_created(self).await
    }

    async fn force_recreate_index(&self) -> Result<(), PipelineError> {
        KnowledgeBase::force_recreate_index(self).await
    }

    fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }
}

fn validate_scope(request: &IngestRequest) -> Result<(), PipelineError> {
    if request.chat_type != ChatType::Data {
        return Ok(());
    }
    let present = |value: &Option<String>| value.as_deref().is_some_and(|v| !v.trim().is_empty());
    if !present(&request.user) || !present(&request.chat_thread_id) {
        return Err(PipelineError::InvalidRequest(
            "data uploads need both user and chat_thread_id".into(),
        ));
    }
    Ok(())
}

/// Owner fields only belong on `data` chunks.
fn scoped(chat_type: ChatType, value: &Option<String>) -> Option<String> {
    match chat_type {
        ChatType::Data => value.clone(),
        _ => None,
    }
}
