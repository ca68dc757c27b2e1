//! Assemble a [`KnowledgeBase`] from the loaded configuration.

use anyhow::Context;
use std::sync::Arc;

use super::chunking::TextChunker;
use super::service::{KnowledgeBase, KnowledgeBaseParts};
use crate::citations::{CitationResolver, JsonDirChatStore};
use crate::config::Config;
use crate::documents::{DocumentTracker, JsonFileDocumentStore, StaticDepartmentDirectory};
use crate::embedding::{Embedder, build_embedding_client};
use crate::extraction::{DocumentIntelligenceClient, ExtractionEngine};
use crate::index::{IndexGateway, QdrantIndex};
use crate::metrics::PipelineMetrics;
use crate::retry::RetryPolicy;
use crate::storage::LocalBlobStore;
use std::time::Duration;

/// Wire every production backend named in `config`.
pub async fn build_from_config(config: &Config) -> anyhow::Result<KnowledgeBase> {
    let retry = RetryPolicy::new(
        config.retry_max_attempts,
        Duration::from_millis(config.retry_base_delay_ms),
    );

    let provider = DocumentIntelligenceClient::new(
        &config.extraction_endpoint,
        &config.extraction_api_key,
        &config.extraction_api_version,
    )
    .context("failed to build document analysis client")?;
    let extraction = ExtractionEngine::new(Arc::new(provider), config.max_upload_bytes);

    let embedding_client =
        build_embedding_client(config).context("failed to build embedding client")?;
    let embedder = Embedder::new(embedding_client, config.embedding_dimension, retry);

    let index = QdrantIndex::new(
        &config.qdrant_url,
        config.qdrant_api_key.clone(),
        &config.qdrant_collection_name,
    )
    .context("failed to build Qdrant client")?;
    let gateway = IndexGateway::new(Arc::new(index), embedder);

    let store = JsonFileDocumentStore::open(&config.document_store_path)
        .await
        .with_context(|| {
            format!(
                "failed to open document store at {}",
                config.document_store_path.display()
            )
        })?;
    let departments = StaticDepartmentDirectory::load(&config.departments_file)
        .await
        .context("failed to load departments")?;
    let chats = JsonDirChatStore::new(&config.chat_store_dir);

    let chunker = TextChunker::new(
        config.text_splitter_chunk_size,
        config.text_splitter_chunk_overlap,
    )?;
    tracing::info!(
        chunk_size = config.text_splitter_chunk_size,
        overlap = config.text_splitter_chunk_overlap,
        "Chunker ready"
    );

    Ok(KnowledgeBase::new(KnowledgeBaseParts {
        extraction,
        chunker,
        resolver: CitationResolver::new(Arc::new(chats), gateway.clone(), config.citation_top_k),
        gateway,
        tracker: DocumentTracker::new(Arc::new(store)),
        departments: Arc::new(departments),
        blobs: Arc::new(LocalBlobStore::new(&config.blob_root)),
        metrics: Arc::new(PipelineMetrics::new()),
        retry,
        repair_concurrency: config.repair_concurrency,
    }))
}
