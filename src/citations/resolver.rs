//! Saved-citation replay with live search fallback.

use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;

use super::chat::{ChatMessage, ChatStore, ChatThread, Role};
use super::types::{CitationRecord, CitationResolution, CitationSource, ResolutionDiagnostics};
use crate::index::{ChatType, IndexGateway, SearchFilter, SearchOptions};

/// Default number of hits fetched for a fallback search.
pub const DEFAULT_CITATION_TOP_K: usize = 10;

/// Resolves the citations to show for a thread's latest answer.
#[derive(Clone)]
pub struct CitationResolver {
    chats: Arc<dyn ChatStore>,
    gateway: IndexGateway,
    top_k: usize,
}

impl CitationResolver {
    /// Resolver reading threads from `chats` and searching through `gateway`.
    pub fn new(chats: Arc<dyn ChatStore>, gateway: IndexGateway, top_k: usize) -> Self {
        Self {
            chats,
            gateway,
            top_k: top_k.max(1),
        }
    }

    /// Citations only; never fails.
    pub async fn resolve_citations(&self, thread_id: &str) -> Vec<CitationRecord> {
        self.resolve(thread_id).await.citations
    }

    /// Citations with their source and diagnostics; never fails.
    pub async fn resolve(&self, thread_id: &str) -> CitationResolution {
        let started = Instant::now();
        let mut diagnostics = ResolutionDiagnostics::default();
        let (citations, source) = self.resolve_inner(thread_id, &mut diagnostics).await;
        diagnostics.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::debug!(
            thread_id,
            source = ?source,
            citations = citations.len(),
            filter = diagnostics.filter.as_deref().unwrap_or(""),
            elapsed_ms = diagnostics.elapsed_ms,
            "Citations resolved"
        );
        CitationResolution {
            citations,
            source,
            diagnostics,
        }
    }

    async fn resolve_inner(
        &self,
        thread_id: &str,
        diagnostics: &mut ResolutionDiagnostics,
    ) -> (Vec<CitationRecord>, CitationSource) {
        let thread = match self.chats.thread(thread_id).await {
            Ok(Some(thread)) => thread,
            Ok(None) => {
                diagnostics.notes.push("thread not found".into());
                return (Vec::new(), CitationSource::None);
            }
            Err(error) => {
                tracing::warn!(thread_id, error = %error, "Failed to load chat thread");
                diagnostics.notes.push(format!("thread load failed: {error}"));
                return (Vec::new(), CitationSource::None);
            }
        };

        if let Some(saved) = latest(&thread, Role::Assistant).and_then(|message| {
            saved_citations(thread_id, message, diagnostics)
        }) {
            return (saved, CitationSource::Saved);
        }

        let Some(question) = latest(&thread, Role::User)
            .map(|message| message.content.trim())
            .filter(|content| !content.is_empty())
        else {
            diagnostics.notes.push("no user message to search with".into());
            return (Vec::new(), CitationSource::None);
        };

        let Some(filter) = search_filter(&thread, diagnostics) else {
            return (Vec::new(), CitationSource::None);
        };
        diagnostics.filter = Some(filter.to_odata());

        let options = SearchOptions::filtered(filter);
        match self
            .gateway
            .search_with_recovery(question, self.top_k, &options)
            .await
        {
            Ok(hits) => {
                diagnostics.hits = hits.len();
                let citations = hits.into_iter().map(CitationRecord::from_hit).collect();
                (citations, CitationSource::Search)
            }
            Err(error) => {
                tracing::warn!(thread_id, error = %error, "Citation search failed");
                diagnostics.notes.push(format!("search failed: {error}"));
                (Vec::new(), CitationSource::None)
            }
        }
    }
}

fn latest(thread: &ChatThread, role: Role) -> Option<&ChatMessage> {
    thread.messages.iter().rev().find(|message| message.role == role)
}

/// Citations saved in the message context, or `None` to fall through to search.
fn saved_citations(
    thread_id: &str,
    message: &ChatMessage,
    diagnostics: &mut ResolutionDiagnostics,
) -> Option<Vec<CitationRecord>> {
    let raw = message.context.as_deref()?.trim();
    if raw.is_empty() {
        return None;
    }
    let context: Value = match serde_json::from_str(raw) {
        Ok(context) => context,
        Err(error) => {
            tracing::warn!(thread_id, error = %error, "Assistant context is not valid JSON");
            diagnostics.notes.push(format!("malformed context: {error}"));
            return None;
        }
    };
    let saved = context.get("citations")?.as_array()?;
    let mut records = Vec::with_capacity(saved.len());
    for (position, item) in saved.iter().enumerate() {
        match CitationRecord::from_saved(item.clone()) {
            Some(record) => records.push(record),
            None => {
                tracing::warn!(thread_id, position, "Skipping saved citation that is not an object");
                diagnostics
                    .notes
                    .push(format!("saved citation {position} is not an object"));
            }
        }
    }
    Some(records)
}

fn search_filter(thread: &ChatThread, diagnostics: &mut ResolutionDiagnostics) -> Option<SearchFilter> {
    match thread.chat_type {
        ChatType::Doc => Some(SearchFilter::chat_type(ChatType::Doc)),
        ChatType::Data => {
            let user = thread.user.as_deref().map(str::trim).unwrap_or_default();
            if user.is_empty() {
                diagnostics.notes.push("data thread has no owning user".into());
                return None;
            }
            Some(
                SearchFilter::chat_type(ChatType::Data)
                    .with_user(user)
                    .with_thread(thread.id.as_str()),
            )
        }
        other => {
            diagnostics
                .notes
                .push(format!("chat type '{other}' has no document search"));
            None
        }
    }
}
