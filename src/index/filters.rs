//! Typed search filters rendered to predicate strings and Qdrant filter bodies.

use serde_json::{Map, Value, json};

use super::types::{ChatType, IndexedChunk};

/// Conjunction of equality clauses; always constrains `chatType`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFilter {
    /// Required conversation mode.
    pub chat_type: ChatType,
    /// Optional owning user.
    pub user: Option<String>,
    /// Optional owning thread.
    pub chat_thread_id: Option<String>,
    /// Optional department name.
    pub dept_name: Option<String>,
}

impl SearchFilter {
    /// Filter on `chatType` alone.
    pub fn chat_type(chat_type: ChatType) -> Self {
        Self {
            chat_type,
            user: None,
            chat_thread_id: None,
            dept_name: None,
        }
    }

    /// Add a `user` clause; blank values are ignored.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = non_empty(user.into());
        self
    }

    /// Add a `chatThreadId` clause; blank values are ignored.
    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.chat_thread_id = non_empty(thread_id.into());
        self
    }

    /// Add a `deptName` clause; blank values are ignored.
    pub fn with_department(mut self, dept_name: impl Into<String>) -> Self {
        self.dept_name = non_empty(dept_name.into());
        self
    }

    fn clauses(&self) -> Vec<(&'static str, &str)> {
        let mut clauses = vec![("chatType", self.chat_type.as_str())];
        if let Some(user) = self.user.as_deref() {
            clauses.push(("user", user));
        }
        if let Some(thread) = self.chat_thread_id.as_deref() {
            clauses.push(("chatThreadId", thread));
        }
        if let Some(dept) = self.dept_name.as_deref() {
            clauses.push(("deptName", dept));
        }
        clauses
    }

    /// OData-style predicate, e.g. `chatType eq 'data' and user eq 'u1'`.
    pub fn to_odata(&self) -> String {
        self.clauses()
            .into_iter()
            .map(|(key, value)| format!("{key} eq '{}'", value.replace('\'', "''")))
            .collect::<Vec<_>>()
            .join(" and ")
    }

    /// Whether an in-memory chunk satisfies every clause.
    pub fn matches(&self, chunk: &IndexedChunk) -> bool {
        self.clauses().into_iter().all(|(key, value)| match key {
            "chatType" => chunk.chat_type.as_str() == value,
            "user" => chunk.user.as_deref() == Some(value),
            "chatThreadId" => chunk.chat_thread_id.as_deref() == Some(value),
            "deptName" => chunk.dept_name == value,
            _ => false,
        })
    }
}

/// Filter and department scope applied to one search.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchOptions {
    /// Structured filter; `None` searches everything.
    pub filter: Option<SearchFilter>,
    /// Department name narrowing the search.
    pub scope: Option<String>,
}

impl SearchOptions {
    /// Options carrying only `filter`.
    pub fn filtered(filter: SearchFilter) -> Self {
        Self {
            filter: Some(filter),
            scope: None,
        }
    }

    /// Filter with the department scope folded in.
    pub fn effective_filter(&self) -> Option<SearchFilter> {
        let scope = self.scope.as_deref().filter(|value| !value.trim().is_empty());
        match (&self.filter, scope) {
            (Some(filter), Some(dept)) if filter.dept_name.is_none() => {
                Some(filter.clone().with_department(dept))
            }
            (Some(filter), _) => Some(filter.clone()),
            (None, _) => None,
        }
    }

    /// Department scope for callers without a structured filter.
    pub fn scope_only(&self) -> Option<&str> {
        match self.filter {
            Some(_) => None,
            None => self.scope.as_deref().filter(|value| !value.trim().is_empty()),
        }
    }

    /// Predicate string for logs and diagnostics; empty when unfiltered.
    pub fn describe(&self) -> String {
        match (self.effective_filter(), self.scope_only()) {
            (Some(filter), _) => filter.to_odata(),
            (None, Some(dept)) => format!("deptName eq '{}'", dept.replace('\'', "''")),
            (None, None) => String::new(),
        }
    }

    /// Qdrant `filter` body, or `None` when unfiltered.
    pub fn to_qdrant(&self) -> Option<Value> {
        let mut must: Vec<Value> = Vec::new();
        if let Some(filter) = self.effective_filter() {
            for (key, value) in filter.clauses() {
                must.push(match_clause(key, value));
            }
        } else if let Some(dept) = self.scope_only() {
            must.push(match_clause("deptName", dept));
        }
        if must.is_empty() {
            None
        } else {
            Some(json!({ "must": must }))
        }
    }

    /// Whether an in-memory chunk passes the filter and scope.
    pub fn matches(&self, chunk: &IndexedChunk) -> bool {
        match (self.effective_filter(), self.scope_only()) {
            (Some(filter), _) => filter.matches(chunk),
            (None, Some(dept)) => chunk.dept_name == dept,
            (None, None) => true,
        }
    }
}

/// Qdrant filter selecting every point of one document.
pub fn document_filter(document_id: &str) -> Value {
    json!({ "must": [match_clause("documentId", document_id)] })
}

fn match_clause(key: &str, value: &str) -> Value {
    let mut clause = Map::new();
    clause.insert("key".into(), Value::String(key.to_string()));
    clause.insert("match".into(), json!({ "value": value }));
    Value::Object(clause)
}

fn non_empty(input: String) -> Option<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_filter() -> SearchFilter {
        SearchFilter::chat_type(ChatType::Data)
            .with_user("u1")
            .with_thread("t1")
    }

    #[test]
    fn data_filter_renders_predicate_string() {
        assert_eq!(
            data_filter().to_odata(),
            "chatType eq 'data' and user eq 'u1' and chatThreadId eq 't1'"
        );
    }

    #[test]
    fn data_filter_renders_qdrant_must_clauses() {
        let options = SearchOptions::filtered(data_filter());
        assert_eq!(
            options.to_qdrant().expect("filter"),
            json!({
                "must": [
                    { "key": "chatType", "match": { "value": "data" } },
                    { "key": "user", "match": { "value": "u1" } },
                    { "key": "chatThreadId", "match": { "value": "t1" } }
                ]
            })
        );
    }

    #[test]
    fn scope_is_folded_into_filter() {
        let options = SearchOptions {
            filter: Some(SearchFilter::chat_type(ChatType::Doc)),
            scope: Some("Sales".into()),
        };
        assert_eq!(options.describe(), "chatType eq 'doc' and deptName eq 'Sales'");
    }

    #[test]
    fn blank_clauses_are_dropped_and_quotes_escaped() {
        let filter = SearchFilter::chat_type(ChatType::Doc)
            .with_user("  ")
            .with_department("O'Neil");
        assert_eq!(filter.to_odata(), "chatType eq 'doc' and deptName eq 'O''Neil'");
    }

    #[test]
    fn unfiltered_options_render_nothing() {
        let options = SearchOptions::default();
        assert!(options.to_qdrant().is_none());
        assert_eq!(options.describe(), "");
    }
}
