//! Vector index gateway: schema management, upserts, filtered search.

pub mod filters;
pub mod gateway;
pub mod memory;
pub mod payload;
pub mod qdrant;
/// Streaming helpers for scroll pagination.
pub mod scroller;
pub mod types;

pub use filters::{SearchFilter, SearchOptions, document_filter};
pub use gateway::IndexGateway;
pub use memory::MemoryIndex;
pub use payload::{chunk_point_id, compute_content_hash};
pub use qdrant::QdrantIndex;
pub use types::{ChatType, IndexError, IndexedChunk, SearchHit};

use async_trait::async_trait;

/// Storage backend for chunk vectors.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Collection name, for logs and errors.
    fn name(&self) -> &str;

    /// Create the collection when missing; returns `true` if it was created.
    async fn ensure(&self, dimension: usize) -> Result<bool, IndexError>;

    /// Drop and recreate the collection.
    async fn recreate(&self, dimension: usize) -> Result<(), IndexError>;

    /// Insert or replace chunks by id; returns how many were written.
    async fn upsert(&self, chunks: Vec<IndexedChunk>) -> Result<usize, IndexError>;

    /// Delete every chunk whose `documentId` equals `document_id`.
    async fn delete_by_document_id(&self, document_id: &str) -> Result<(), IndexError>;

    /// Nearest chunks to `vector`, best first.
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, IndexError>;

    /// Ids of every chunk stored for `document_id`.
    async fn document_chunk_ids(&self, document_id: &str) -> Result<Vec<String>, IndexError>;
}
