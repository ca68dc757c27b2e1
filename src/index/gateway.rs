//! Facade that embeds query text and drives a [`VectorIndex`] backend.

use std::sync::Arc;

use super::VectorIndex;
use super::filters::SearchOptions;
use super::types::{IndexError, IndexedChunk, SearchHit};
use crate::embedding::Embedder;

/// Entry point the pipeline and resolver use for every index operation.
#[derive(Clone)]
pub struct IndexGateway {
    index: Arc<dyn VectorIndex>,
    embedder: Embedder,
}

impl IndexGateway {
    /// Wrap `index`, embedding queries with `embedder`.
    pub fn new(index: Arc<dyn VectorIndex>, embedder: Embedder) -> Self {
        Self { index, embedder }
    }

    /// Embedder shared with the ingestion pipeline.
    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    /// Create the index and its filterable fields when missing. Safe to call repeatedly.
    pub async fn ensure_index_created(&self) -> Result<(), IndexError> {
        let created = self.index.ensure(self.embedder.dimension()).await?;
        if created {
            tracing::info!(index = self.index.name(), "Index created");
        } else {
            tracing::debug!(index = self.index.name(), "Index already present");
        }
        Ok(())
    }

    /// Drop and rebuild the index. Every indexed chunk is lost.
    pub async fn force_recreate_index(&self) -> Result<(), IndexError> {
        tracing::warn!(
            index = self.index.name(),
            "Recreating index; all indexed chunks will be dropped"
        );
        self.index.recreate(self.embedder.dimension()).await
    }

    /// Insert or replace chunks by id.
    pub async fn upsert(&self, chunks: Vec<IndexedChunk>) -> Result<usize, IndexError> {
        self.index.upsert(chunks).await
    }

    /// Remove every chunk belonging to `document_id`.
    pub async fn delete_by_document_id(&self, document_id: &str) -> Result<(), IndexError> {
        self.index.delete_by_document_id(document_id).await
    }

    /// Ids of the chunks currently stored for `document_id`.
    pub async fn document_chunk_ids(&self, document_id: &str) -> Result<Vec<String>, IndexError> {
        self.index.document_chunk_ids(document_id).await
    }

    /// Embed `query` and return the `top_k` closest chunks passing `options`.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let vector = self.embedder.embed(query).await?;
        let hits = self.index.search(&vector, top_k, options).await?;
        tracing::debug!(
            index = self.index.name(),
            filter = %options.describe(),
            top_k,
            hits = hits.len(),
            "Index search finished"
        );
        Ok(hits)
    }

    /// Like [`search`](Self::search), but creates a missing index and retries once.
    pub async fn search_with_recovery(
        &self,
        query: &str,
        top_k: usize,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, IndexError> {
        match self.search(query, top_k, options).await {
            Err(IndexError::IndexNotFound(name)) => {
                tracing::warn!(index = %name, "Index missing during search; creating and retrying");
                self.ensure_index_created().await?;
                self.search(query, top_k, options).await
            }
            other => other,
        }
    }
}
