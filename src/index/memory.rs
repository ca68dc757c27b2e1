//! In-process brute-force index for local runs and tests.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::VectorIndex;
use super::filters::SearchOptions;
use super::types::{IndexError, IndexedChunk, SearchHit};

#[derive(Debug)]
struct Collection {
    dimension: usize,
    chunks: Vec<IndexedChunk>,
}

/// Cosine-similarity index kept in insertion order.
#[derive(Debug)]
pub struct MemoryIndex {
    name: String,
    collection: RwLock<Option<Collection>>,
}

impl MemoryIndex {
    /// Empty index that reports [`IndexError::IndexNotFound`] until ensured.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            collection: RwLock::new(None),
        }
    }

    /// Number of stored chunks; `0` when the collection is missing.
    pub async fn len(&self) -> usize {
        self.collection
            .read()
            .await
            .as_ref()
            .map_or(0, |collection| collection.chunks.len())
    }

    /// Whether the collection is missing or holds no chunks.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Snapshot of every stored chunk, in insertion order.
    pub async fn chunks(&self) -> Vec<IndexedChunk> {
        self.collection
            .read()
            .await
            .as_ref()
            .map(|collection| collection.chunks.clone())
            .unwrap_or_default()
    }

    fn missing(&self) -> IndexError {
        IndexError::IndexNotFound(self.name.clone())
    }
}

#[async_trait]
impl VectorIndex for MemoryIndex {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ensure(&self, dimension: usize) -> Result<bool, IndexError> {
        let mut guard = self.collection.write().await;
        if guard.is_some() {
            return Ok(false);
        }
        *guard = Some(Collection {
            dimension,
            chunks: Vec::new(),
        });
        Ok(true)
    }

    async fn recreate(&self, dimension: usize) -> Result<(), IndexError> {
        *self.collection.write().await = Some(Collection {
            dimension,
            chunks: Vec::new(),
        });
        Ok(())
    }

    async fn upsert(&self, chunks: Vec<IndexedChunk>) -> Result<usize, IndexError> {
        let mut guard = self.collection.write().await;
        let collection = guard.as_mut().ok_or_else(|| self.missing())?;
        if let Some(bad) = chunks.iter().find(|chunk| chunk.vector.len() != collection.dimension) {
            return Err(IndexError::DimensionMismatch {
                expected: collection.dimension,
                actual: bad.vector.len(),
            });
        }
        let count = chunks.len();
        for chunk in chunks {
            match collection.chunks.iter_mut().find(|existing| existing.id == chunk.id) {
                Some(existing) => *existing = chunk,
                None => collection.chunks.push(chunk),
            }
        }
        Ok(count)
    }

    async fn delete_by_document_id(&self, document_id: &str) -> Result<(), IndexError> {
        let mut guard = self.collection.write().await;
        let collection = guard.as_mut().ok_or_else(|| self.missing())?;
        collection
            .chunks
            .retain(|chunk| chunk.document_id != document_id);
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, IndexError> {
        let guard = self.collection.read().await;
        let collection = guard.as_ref().ok_or_else(|| self.missing())?;
        let mut scored: Vec<(f32, &IndexedChunk)> = collection
            .chunks
            .iter()
            .filter(|chunk| options.matches(chunk))
            .map(|chunk| (cosine(vector, &chunk.vector), chunk))
            .collect();
        // Stable sort keeps insertion order among equal scores.
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, chunk)| SearchHit {
                id: chunk.id.clone(),
                score,
                document_id: Some(chunk.document_id.clone()),
                file_name: Some(chunk.file_name.clone()).filter(|name| !name.is_empty()),
                metadata: Some(chunk.metadata.clone()).filter(|meta| !meta.is_empty()),
                content: Some(chunk.content.clone()),
                dept_name: Some(chunk.dept_name.clone()),
                chat_thread_id: chunk.chat_thread_id.clone(),
                sas_url: chunk.sas_url.clone(),
            })
            .collect())
    }

    async fn document_chunk_ids(&self, document_id: &str) -> Result<Vec<String>, IndexError> {
        let guard = self.collection.read().await;
        let collection = guard.as_ref().ok_or_else(|| self.missing())?;
        Ok(collection
            .chunks
            .iter()
            .filter(|chunk| chunk.document_id == document_id)
            .map(|chunk| chunk.id.clone())
            .collect())
    }
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::filters::SearchFilter;
    use crate::index::payload::chunk_point_id;
    use crate::index::types::ChatType;

    fn chunk(document_id: &str, ordinal: usize, content: &str, vector: Vec<f32>) -> IndexedChunk {
        IndexedChunk {
            id: chunk_point_id(document_id, ordinal),
            document_id: document_id.into(),
            chat_type: ChatType::Doc,
            dept_name: "Sales".into(),
            user: None,
            chat_thread_id: None,
            content: content.into(),
            vector,
            sas_url: None,
            file_name: format!("{document_id}.txt"),
            metadata: String::new(),
        }
    }

    #[tokio::test]
    async fn missing_collection_is_distinct_from_empty() {
        let index = MemoryIndex::new("kb");
        let error = index
            .search(&[1.0, 0.0], 5, &SearchOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(error, IndexError::IndexNotFound(_)));

        assert!(index.ensure(2).await.unwrap());
        assert!(!index.ensure(2).await.unwrap());
        let hits = index.search(&[1.0, 0.0], 5, &SearchOptions::default()).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let index = MemoryIndex::new("kb");
        index.ensure(2).await.unwrap();
        index
            .upsert(vec![chunk("d1", 0, "old", vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .upsert(vec![chunk("d1", 0, "new", vec![1.0, 0.0])])
            .await
            .unwrap();
        let stored = index.chunks().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].content, "new");
    }

    #[tokio::test]
    async fn delete_cascades_to_every_chunk_of_a_document() {
        let index = MemoryIndex::new("kb");
        index.ensure(2).await.unwrap();
        index
            .upsert(vec![
                chunk("d1", 0, "a", vec![1.0, 0.0]),
                chunk("d1", 1, "b", vec![0.0, 1.0]),
                chunk("d2", 0, "c", vec![1.0, 1.0]),
            ])
            .await
            .unwrap();
        index.delete_by_document_id("d1").await.unwrap();
        assert!(index.document_chunk_ids("d1").await.unwrap().is_empty());
        assert_eq!(index.document_chunk_ids("d2").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn results_are_ordered_by_score_with_stable_ties() {
        let index = MemoryIndex::new("kb");
        index.ensure(2).await.unwrap();
        index
            .upsert(vec![
                chunk("d1", 0, "tie-first", vec![0.0, 1.0]),
                chunk("d2", 0, "best", vec![1.0, 0.0]),
                chunk("d3", 0, "tie-second", vec![0.0, 2.0]),
            ])
            .await
            .unwrap();
        let hits = index.search(&[1.0, 0.5], 3, &SearchOptions::default()).await.unwrap();
        let contents: Vec<_> = hits.iter().filter_map(|hit| hit.content.as_deref()).collect();
        assert_eq!(contents, vec!["best", "tie-first", "tie-second"]);
    }

    #[tokio::test]
    async fn filter_restricts_candidates() {
        let index = MemoryIndex::new("kb");
        index.ensure(2).await.unwrap();
        let mut owned = chunk("d1", 0, "mine", vec![1.0, 0.0]);
        owned.chat_type = ChatType::Data;
        owned.user = Some("u1".into());
        owned.chat_thread_id = Some("t1".into());
        index
            .upsert(vec![owned, chunk("d2", 0, "shared", vec![1.0, 0.0])])
            .await
            .unwrap();

        let options = SearchOptions::filtered(
            SearchFilter::chat_type(ChatType::Data)
                .with_user("u1")
                .with_thread("t1"),
        );
        let hits = index.search(&[1.0, 0.0], 10, &options).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].content.as_deref(), Some("mine"));
    }

    #[tokio::test]
    async fn wrong_width_vectors_are_rejected() {
        let index = MemoryIndex::new("kb");
        index.ensure(3).await.unwrap();
        let error = index
            .upsert(vec![chunk("d1", 0, "a", vec![1.0])])
            .await
            .unwrap_err();
        assert!(matches!(error, IndexError::DimensionMismatch { expected: 3, actual: 1 }));
    }
}
