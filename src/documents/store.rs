//! Persistence backends for document records.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use super::types::{Document, StoreError};

/// Keyed storage of [`Document`] records.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Record by id, deleted or not.
    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError>;
    /// Insert or replace a record.
    async fn put(&self, document: Document) -> Result<(), StoreError>;
    /// Every record, oldest upload first.
    async fn list(&self) -> Result<Vec<Document>, StoreError>;
}

fn sorted(mut documents: Vec<Document>) -> Vec<Document> {
    documents.sort_by(|a, b| {
        a.uploaded_at
            .cmp(&b.uploaded_at)
            .then_with(|| a.id.cmp(&b.id))
    });
    documents
}

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    records: Mutex<BTreeMap<String, Document>>,
}

impl MemoryDocumentStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.records.lock().await.get(id).cloned())
    }

    async fn put(&self, document: Document) -> Result<(), StoreError> {
        self.records
            .lock()
            .await
            .insert(document.id.clone(), document);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<Document>, StoreError> {
        Ok(sorted(self.records.lock().await.values().cloned().collect()))
    }
}

/// Store persisted as one JSON array on disk.
///
/// Every write rewrites the file through a temporary sibling and a rename, so a crash never leaves
/// a half-written array behind.
#[derive(Debug)]
pub struct JsonFileDocumentStore {
    path: PathBuf,
    records: Mutex<BTreeMap<String, Document>>,
}

impl JsonFileDocumentStore {
    /// Open the store at `path`, loading existing records when the file is present.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let records = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => {
                let documents: Vec<Document> = serde_json::from_slice(&bytes)?;
                documents
                    .into_iter()
                    .map(|document| (document.id.clone(), document))
                    .collect()
            }
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(error) => return Err(error.into()),
        };
        tracing::debug!(path = %path.display(), documents = records.len(), "Document store opened");
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    async fn persist(&self, records: &BTreeMap<String, Document>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }
        let documents = sorted(records.values().cloned().collect());
        let bytes = serde_json::to_vec_pretty(&documents)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for JsonFileDocumentStore {
    async fn get(&self, id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.records.lock().await.get(id).cloned())
    }

    async fn put(&self, document: Document) -> Result<(), StoreError> {
        let mut records = self.records.lock().await;
        records.insert(document.id.clone(), document);
        self.persist(&records).await
    }

    async fn list(&self) -> Result<Vec<Document>, StoreError> {
        Ok(sorted(self.records.lock().await.values().cloned().collect()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::types::DocumentStatus;
    use crate::index::ChatType;

    fn document(id: &str, uploaded_at: &str) -> Document {
        Document {
            id: id.into(),
            file_name: "a.txt".into(),
            file_type: "txt".into(),
            size: 1,
            uploaded_by: "alice".into(),
            uploaded_at: uploaded_at.into(),
            updated_at: uploaded_at.into(),
            dept_name: "Sales".into(),
            container: "sales".into(),
            blob_name: format!("{id}/a.txt"),
            status: DocumentStatus::Uploaded,
            pages: 0,
            confidence: 0.0,
            deleted: false,
            error_reason: None,
            chat_type: ChatType::Doc,
            user: None,
            chat_thread_id: None,
        }
    }

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("kbcore-store-{}", uuid::Uuid::new_v4()))
            .join(name)
    }

    #[tokio::test]
    async fn memory_store_lists_oldest_first() {
        let store = MemoryDocumentStore::new();
        store.put(document("b", "2025-02-01T00:00:00Z")).await.unwrap();
        store.put(document("a", "2025-03-01T00:00:00Z")).await.unwrap();
        let ids: Vec<_> = store.list().await.unwrap().into_iter().map(|d| d.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn json_store_survives_reopen() {
        let path = temp_path("documents.json");
        {
            let store = JsonFileDocumentStore::open(&path).await.unwrap();
            store.put(document("d1", "2025-01-01T00:00:00Z")).await.unwrap();
        }
        let reopened = JsonFileDocumentStore::open(&path).await.unwrap();
        let loaded = reopened.get("d1").await.unwrap().expect("record");
        assert_eq!(loaded.blob_name, "d1/a.txt");
        let _ = tokio::fs::remove_dir_all(path.parent().unwrap()).await;
    }

    #[tokio::test]
    async fn legacy_records_without_status_load_as_blank() {
        let path = temp_path("legacy.json");
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        let legacy = serde_json::json!([{
            "id": "old",
            "fileName": "scan.pdf",
            "fileType": "pdf",
            "size": 10,
            "uploadedBy": "bob",
            "uploadedAt": "2024-01-01T00:00:00Z",
            "deptName": "Ops",
            "container": "ops",
            "blobName": "old/scan.pdf",
            "status": ""
        }]);
        tokio::fs::write(&path, legacy.to_string()).await.unwrap();

        let store = JsonFileDocumentStore::open(&path).await.unwrap();
        let record = store.get("old").await.unwrap().expect("record");
        assert_eq!(record.status, DocumentStatus::Blank);
        let _ = tokio::fs::remove_dir_all(path.parent().unwrap()).await;
    }
}
