//! Chat thread storage collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;

use crate::documents::StoreError;
use crate::index::ChatType;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// End user.
    User,
    /// Model reply.
    Assistant,
    /// System prompt.
    System,
}

/// One message in a thread.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Author.
    pub role: Role,
    /// Message text.
    pub content: String,
    /// JSON string the chat layer stored with the message, e.g. saved citations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// RFC 3339 creation time.
    #[serde(default)]
    pub created_at: String,
}

/// A conversation and its settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatThread {
    /// Thread id.
    pub id: String,
    /// Retrieval mode of the thread.
    pub chat_type: ChatType,
    /// Owning user.
    #[serde(default)]
    pub user: Option<String>,
    /// Messages, oldest first.
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// Read access to chat threads.
#[async_trait]
pub trait ChatStore: Send + Sync {
    /// Thread by id; `None` when it does not exist.
    async fn thread(&self, thread_id: &str) -> Result<Option<ChatThread>, StoreError>;
}

/// Threads held in memory.
#[derive(Debug, Default)]
pub struct MemoryChatStore {
    threads: RwLock<HashMap<String, ChatThread>>,
}

impl MemoryChatStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a thread.
    pub async fn insert(&self, thread: ChatThread) {
        self.threads.write().await.insert(thread.id.clone(), thread);
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn thread(&self, thread_id: &str) -> Result<Option<ChatThread>, StoreError> {
        Ok(self.threads.read().await.get(thread_id).cloned())
    }
}

/// Threads stored as `<dir>/<thread_id>.json`.
#[derive(Debug, Clone)]
pub struct JsonDirChatStore {
    dir: PathBuf,
}

impl JsonDirChatStore {
    /// Store reading from `dir`.
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }
}

#[async_trait]
impl ChatStore for JsonDirChatStore {
    async fn thread(&self, thread_id: &str) -> Result<Option<ChatThread>, StoreError> {
        let safe = !thread_id.is_empty()
            && thread_id
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
        if !safe {
            return Ok(None);
        }
        let path = self.dir.join(format!("{thread_id}.json"));
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(error) => Err(error.into()),
        }
    }
}
