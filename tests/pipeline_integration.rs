use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use kbcore::citations::{ChatMessage, ChatThread, CitationResolver, CitationSource, MemoryChatStore, Role};
use kbcore::documents::{
    Department, DocumentStatus, DocumentTracker, MemoryDocumentStore, StaticDepartmentDirectory,
    TrackerError,
};
use kbcore::embedding::{Embedder, HashingEmbeddingClient};
use kbcore::extraction::{AnalyzeResult, DocumentAnalysisProvider, ExtractionEngine, ExtractionError};
use kbcore::index::{ChatType, IndexGateway, MemoryIndex, VectorIndex};
use kbcore::metrics::PipelineMetrics;
use kbcore::pipeline::{
    IngestRequest, KnowledgeBase, KnowledgeBaseApi, KnowledgeBaseParts, PipelineError, TextChunker,
};
use kbcore::retry::RetryPolicy;
use reqwest::StatusCode;
use kbcore::storage::MemoryBlobStore;
use serde_json::json;

const DIMENSION: usize = 32;

/// Echoes UTF-8 file bytes back as reading-order content.
///
/// Bytes containing `broken` always fail; bytes containing `flaky` fail while `outage` is set.
#[derive(Default)]
struct EchoProvider {
    outage: AtomicBool,
}

#[async_trait]
impl DocumentAnalysisProvider for EchoProvider {
    async fn analyze(&self, _model_id: &str, bytes: &[u8]) -> Result<AnalyzeResult, ExtractionError> {
        let text = String::from_utf8_lossy(bytes).into_owned();
        if text.contains("broken") {
            return Err(ExtractionError::InvalidResponse("unreadable document".into()));
        }
        if text.contains("flaky") && self.outage.load(Ordering::SeqCst) {
            return Err(ExtractionError::InvalidResponse("service outage".into()));
        }
        let result = json!({
            "content": text,
            "pages": [{ "pageNumber": 1 }],
        });
        Ok(serde_json::from_value(result).expect("analyze result"))
    }
}

/// Fails with the queued errors first, then echoes the file text.
#[derive(Default)]
struct ScriptedProvider {
    failures: Mutex<VecDeque<ExtractionError>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn failing_with(failures: impl IntoIterator<Item = ExtractionError>) -> Self {
        Self {
            failures: Mutex::new(failures.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl DocumentAnalysisProvider for ScriptedProvider {
    async fn analyze(&self, model_id: &str, bytes: &[u8]) -> Result<AnalyzeResult, ExtractionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.failures.lock().expect("failures lock").pop_front();
        match next {
            Some(error) => Err(error),
            None => EchoProvider::default().analyze(model_id, bytes).await,
        }
    }
}

struct Harness<P> {
    kb: KnowledgeBase,
    index: Arc<MemoryIndex>,
    chats: Arc<MemoryChatStore>,
    provider: Arc<P>,
    metrics: Arc<PipelineMetrics>,
}

fn harness() -> Harness<EchoProvider> {
    harness_with(EchoProvider::default(), RetryPolicy::none())
}

fn harness_with<P>(provider: P, retry: RetryPolicy) -> Harness<P>
where
    P: DocumentAnalysisProvider + 'static,
{
    let provider = Arc::new(provider);
    let index = Arc::new(MemoryIndex::new("kb-test"));
    let chats = Arc::new(MemoryChatStore::new());
    let metrics = Arc::new(PipelineMetrics::new());

    let embedder = Embedder::new(
        Arc::new(HashingEmbeddingClient::new(DIMENSION)),
        DIMENSION,
        RetryPolicy::none(),
    );
    let gateway = IndexGateway::new(index.clone(), embedder);
    let departments = StaticDepartmentDirectory::new([Department {
        id: "sales".into(),
        name: "Sales".into(),
        container: "sales-docs".into(),
    }]);

    let kb = KnowledgeBase::new(KnowledgeBaseParts {
        extraction: ExtractionEngine::new(provider.clone(), 1024 * 1024),
        chunker: TextChunker::new(64, 8).expect("chunker"),
        resolver: CitationResolver::new(chats.clone(), gateway.clone(), 5),
        gateway,
        tracker: DocumentTracker::new(Arc::new(MemoryDocumentStore::new())),
        departments: Arc::new(departments),
        blobs: Arc::new(MemoryBlobStore::new()),
        metrics: metrics.clone(),
        retry,
        repair_concurrency: 2,
    });

    Harness {
        kb,
        index,
        chats,
        provider,
        metrics,
    }
}

#[tokio::test]
async fn uploaded_notes_are_indexed_cited_and_deleted() {
    let h = harness();
    h.kb.ensure_index_created().await.expect("index");

    let notes = "Quarterly revenue grew in the northern region.\n\nThe sales team closed twelve new accounts.";
    let document_id = h
        .kb
        .ingest(notes.as_bytes().to_vec(), "notes.txt", "sales")
        .await
        .expect("ingest accepted");
    h.kb.supervisor().wait_idle().await;

    let document = h.kb.tracker().get(&document_id).await.expect("record");
    assert_eq!(document.status, DocumentStatus::Completed);
    assert_eq!(document.pages, 1);
    assert_eq!(document.dept_name, "Sales");
    assert_eq!(document.container, "sales-docs");
    assert!(document.error_reason.is_none());

    let chunks = h.index.chunks().await;
    assert!(!chunks.is_empty());
    assert!(chunks.iter().all(|chunk| chunk.document_id == document_id));
    assert!(chunks.iter().all(|chunk| chunk.chat_type == ChatType::Doc && chunk.user.is_none()));
    assert_eq!(chunks[0].metadata, "notes.txt (1 pages)");

    h.chats
        .insert(ChatThread {
            id: "thread-1".into(),
            chat_type: ChatType::Doc,
            user: Some("alice".into()),
            messages: vec![ChatMessage {
                role: Role::User,
                content: "How many accounts did sales close?".into(),
                context: None,
                created_at: "2025-01-01T00:00:00Z".into(),
            }],
        })
        .await;
    let resolution = h.kb.resolve("thread-1").await;
    assert_eq!(resolution.source, CitationSource::Search);
    assert!(!resolution.citations.is_empty());
    let first = &resolution.citations[0];
    assert_eq!(first.label.as_deref(), Some("notes.txt"));
    assert_eq!(first.document_id.as_deref(), Some(document_id.as_str()));

    let deleted = h.kb.delete_document(&document_id).await.expect("delete");
    assert!(deleted.deleted);
    assert!(h.index.document_chunk_ids(&document_id).await.expect("ids").is_empty());
    assert!(matches!(
        h.kb.process_document(&document_id).await,
        Err(PipelineError::Tracker(TrackerError::Deleted(_)))
    ));
    assert_eq!(h.metrics.snapshot().documents_completed, 1);
}

#[tokio::test]
async fn data_uploads_stay_inside_their_thread() {
    let h = harness();
    h.kb.ensure_index_created().await.expect("index");

    let mine = h
        .kb
        .ingest_with(
            IngestRequest::new(b"private forecast for alice".to_vec(), "mine.txt", "sales")
                .for_thread("alice", "thread-a"),
        )
        .await
        .expect("accepted");
    h.kb
        .ingest_with(
            IngestRequest::new(b"private forecast for bob".to_vec(), "bob.txt", "sales")
                .for_thread("bob", "thread-b"),
        )
        .await
        .expect("accepted");
    h.kb.supervisor().wait_idle().await;

    h.chats
        .insert(ChatThread {
            id: "thread-a".into(),
            chat_type: ChatType::Data,
            user: Some("alice".into()),
            messages: vec![ChatMessage {
                role: Role::User,
                content: "private forecast".into(),
                context: None,
                created_at: String::new(),
            }],
        })
        .await;

    let resolution = h.kb.resolve("thread-a").await;
    assert!(!resolution.citations.is_empty());
    assert!(
        resolution
            .citations
            .iter()
            .all(|citation| citation.document_id.as_deref() == Some(mine.as_str()))
    );
}

#[tokio::test]
async fn invalid_uploads_are_rejected_before_anything_is_recorded() {
    let h = harness();
    let unsupported = h.kb.ingest(b"PK".to_vec(), "archive.zip", "sales").await;
    assert!(matches!(unsupported, Err(ref error) if error.is_input_error()));

    let unknown = h.kb.ingest(b"hello".to_vec(), "a.txt", "legal").await;
    assert!(matches!(unknown, Err(PipelineError::UnknownDepartment(_))));

    let mut missing_thread = IngestRequest::new(b"hello".to_vec(), "a.txt", "sales");
    missing_thread.chat_type = ChatType::Data;
    assert!(matches!(
        h.kb.ingest_with(missing_thread).await,
        Err(PipelineError::InvalidRequest(_))
    ));

    assert!(h.kb.tracker().repair_candidates().await.expect("list").is_empty());
    assert_eq!(h.kb.supervisor().in_flight(), 0);
}

#[tokio::test]
async fn repair_recovers_each_document_independently() {
    let h = harness();
    h.provider.outage.store(true, Ordering::SeqCst);

    let mut failing = Vec::new();
    for (name, body) in [
        ("alpha.txt", "flaky alpha report"),
        ("beta.txt", "flaky beta report"),
        ("gamma.txt", "broken gamma report"),
    ] {
        let id = h
            .kb
            .record_upload(IngestRequest::new(body.as_bytes().to_vec(), name, "sales"))
            .await
            .expect("recorded");
        let document = h.kb.process_document(&id).await.expect("processed");
        assert_eq!(document.status, DocumentStatus::Error);
        assert!(document.error_reason.is_some());
        failing.push(id);
    }
    let healthy = h
        .kb
        .record_upload(IngestRequest::new(b"steady delta report".to_vec(), "delta.txt", "sales"))
        .await
        .expect("recorded");
    assert_eq!(
        h.kb.process_document(&healthy).await.expect("processed").status,
        DocumentStatus::Completed
    );

    h.provider.outage.store(false, Ordering::SeqCst);
    let report = h.kb.repair_blank_or_error_documents().await.expect("repair");
    assert_eq!((report.attempted, report.succeeded, report.failed), (3, 2, 1));

    let statuses: Vec<DocumentStatus> = {
        let mut statuses = Vec::new();
        for id in &failing {
            statuses.push(h.kb.tracker().get(id).await.expect("record").status);
        }
        statuses
    };
    assert_eq!(
        statuses,
        vec![DocumentStatus::Completed, DocumentStatus::Completed, DocumentStatus::Error]
    );
    assert_eq!(
        h.kb.tracker().get(&healthy).await.expect("record").status,
        DocumentStatus::Completed
    );
    assert_eq!(h.metrics.snapshot().repair_runs, 1);
}

#[tokio::test]
async fn completed_documents_are_not_reprocessed() {
    let h = harness();
    let id = h
        .kb
        .record_upload(IngestRequest::new(b"flaky at first".to_vec(), "notes.txt", "sales"))
        .await
        .expect("recorded");
    h.provider.outage.store(true, Ordering::SeqCst);
    let failed = h.kb.process_document(&id).await.expect("processed");
    assert_eq!(failed.status, DocumentStatus::Error);
    assert!(h.index.document_chunk_ids(&id).await.is_err());

    h.provider.outage.store(false, Ordering::SeqCst);
    let completed = h.kb.process_document(&id).await.expect("processed");
    assert_eq!(completed.status, DocumentStatus::Completed);
    assert!(completed.error_reason.is_none());
    let first = h.index.document_chunk_ids(&id).await.expect("ids");

    h.provider.outage.store(true, Ordering::SeqCst);
    let again = h.kb.process_document(&id).await.expect("processed");
    assert_eq!(again.status, DocumentStatus::Completed);
    let second = h.index.document_chunk_ids(&id).await.expect("ids");
    assert!(!first.is_empty());
    assert_eq!(first, second);
    assert_eq!(h.metrics.snapshot().documents_failed, 1);
}

fn outages(count: usize) -> Vec<ExtractionError> {
    (1..=count)
        .map(|attempt| ExtractionError::Transient(format!("outage {attempt}")))
        .collect()
}

#[tokio::test]
async fn transient_extraction_failures_are_retried_within_the_policy() {
    for failures in 0..3 {
        let h = harness_with(
            ScriptedProvider::failing_with(outages(failures)),
            RetryPolicy::new(3, Duration::ZERO),
        );
        let id = h
            .kb
            .record_upload(IngestRequest::new(b"retry me".to_vec(), "notes.txt", "sales"))
            .await
            .expect("recorded");
        let document = h.kb.process_document(&id).await.expect("processed");

        assert_eq!(document.status, DocumentStatus::Completed, "after {failures} outages");
        assert_eq!(h.provider.calls.load(Ordering::SeqCst), failures + 1);
    }
}

#[tokio::test]
async fn exhausted_retries_record_the_last_transient_message() {
    let h = harness_with(
        ScriptedProvider::failing_with(outages(5)),
        RetryPolicy::new(3, Duration::ZERO),
    );
    let id = h
        .kb
        .record_upload(IngestRequest::new(b"still down".to_vec(), "notes.txt", "sales"))
        .await
        .expect("recorded");
    let document = h.kb.process_document(&id).await.expect("processed");

    assert_eq!(document.status, DocumentStatus::Error);
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 3);
    let reason = document.error_reason.expect("reason stored");
    assert!(reason.ends_with("outage 3"), "reason: {reason}");
    assert!(h.index.chunks().await.is_empty());
}

#[tokio::test]
async fn rejected_documents_fail_once_with_the_user_facing_reason() {
    let h = harness_with(
        ScriptedProvider::failing_with([ExtractionError::from_status(
            StatusCode::UNSUPPORTED_MEDIA_TYPE,
            "",
        )]),
        RetryPolicy::new(3, Duration::ZERO),
    );
    let id = h
        .kb
        .record_upload(IngestRequest::new(b"%PDF-odd".to_vec(), "scan.pdf", "sales"))
        .await
        .expect("recorded");
    let document = h.kb.process_document(&id).await.expect("processed");

    assert_eq!(document.status, DocumentStatus::Error);
    assert_eq!(h.provider.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        document.error_reason.as_deref(),
        Some("The extraction service does not support this file format")
    );
}

#[tokio::test]
async fn path_like_file_names_are_input_errors() {
    let h = harness();
    let result = h.kb.ingest(b"hello".to_vec(), "../escape.txt", "sales").await;
    assert!(matches!(result, Err(ref error) if error.is_input_error()));
    assert!(h.kb.tracker().repair_candidates().await.expect("list").is_empty());
    assert_eq!(h.kb.supervisor().in_flight(), 0);
}
