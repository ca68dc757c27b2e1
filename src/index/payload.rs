//! Point ids, content hashes, and payload construction for indexed chunks.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

use super::types::IndexedChunk;

/// Deterministic point id for chunk `ordinal` of `document_id`.
///
/// Re-ingesting a document therefore overwrites its previous points instead of duplicating them.
pub fn chunk_point_id(document_id: &str, ordinal: usize) -> String {
    let name = format!("{document_id}#{ordinal}");
    Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()).to_string()
}

/// Compute a deterministic SHA-256 hash for the chunk text.
pub fn compute_content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Current timestamp formatted as RFC 3339.
pub fn current_timestamp_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// Build the payload stored alongside a chunk vector.
pub(crate) fn build_payload(chunk: &IndexedChunk, indexed_at: &str) -> Map<String, Value> {
    let mut payload = Map::new();
    payload.insert("documentId".into(), Value::String(chunk.document_id.clone()));
    payload.insert("chunkId".into(), Value::String(chunk.id.clone()));
    payload.insert(
        "chatType".into(),
        Value::String(chunk.chat_type.as_str().to_string()),
    );
    payload.insert("deptName".into(), Value::String(chunk.dept_name.clone()));
    payload.insert("fileName".into(), Value::String(chunk.file_name.clone()));
    payload.insert("content".into(), Value::String(chunk.content.clone()));
    payload.insert("metadata".into(), Value::String(chunk.metadata.clone()));
    payload.insert(
        "contentHash".into(),
        Value::String(compute_content_hash(&chunk.content)),
    );
    payload.insert("indexedAt".into(), Value::String(indexed_at.to_string()));

    if let Some(user) = chunk.user.as_ref().filter(|value| !value.is_empty()) {
        payload.insert("user".into(), Value::String(user.clone()));
    }
    if let Some(thread) = chunk.chat_thread_id.as_ref().filter(|value| !value.is_empty()) {
        payload.insert("chatThreadId".into(), Value::String(thread.clone()));
    }
    if let Some(url) = chunk.sas_url.as_ref().filter(|value| !value.is_empty()) {
        payload.insert("sasUrl".into(), Value::String(url.clone()));
    }
    payload
}
