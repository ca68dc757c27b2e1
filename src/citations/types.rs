//! Citation records and per-request resolution diagnostics.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::index::SearchHit;

/// Label used when a hit carries neither a file name nor metadata.
pub const UNKNOWN_FILE_LABEL: &str = "不明なファイル";
/// Content used when a hit carries no text.
pub const MISSING_CONTENT: &str = "内容が見つかりません";

/// A citation shown next to an assistant answer.
///
/// Fields this type does not know about are kept in `extra` and written back unchanged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CitationRecord {
    /// Chunk or citation id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Display label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Quoted snippet.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Link to the source blob.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sas_url: Option<String>,
    /// Search score.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    /// Department name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dept_name: Option<String>,
    /// Source document id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    /// Chat thread the source belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chat_thread_id: Option<String>,
    /// Unrecognized fields, preserved verbatim.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CitationRecord {
    /// Build a citation from a search hit, filling placeholders for missing text.
    pub fn from_hit(hit: SearchHit) -> Self {
        let label = [hit.file_name, hit.metadata]
            .into_iter()
            .flatten()
            .find(|value| !value.trim().is_empty())
            .unwrap_or_else(|| UNKNOWN_FILE_LABEL.to_string());
        let content = hit
            .content
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| MISSING_CONTENT.to_string());
        Self {
            id: Some(hit.id),
            label: Some(label),
            content: Some(content),
            sas_url: hit.sas_url,
            score: Some(f64::from(hit.score)),
            dept_name: hit.dept_name,
            document_id: hit.document_id,
            chat_thread_id: hit.chat_thread_id,
            extra: Map::new(),
        }
    }
}

impl CitationRecord {
    /// Rebuild a citation saved by the chat layer, keeping every field.
    ///
    /// Known fields are typed only when their JSON type matches; anything else, including a
    /// known key with an unexpected type, stays in `extra` as saved. Non-object values yield
    /// `None`.
    pub fn from_saved(value: Value) -> Option<Self> {
        let Value::Object(mut fields) = value else {
            return None;
        };
        let score = match fields.get("score") {
            Some(Value::Number(number)) => number.as_f64(),
            _ => None,
        };
        if score.is_some() {
            fields.remove("score");
        }
        Some(Self {
            id: take_string(&mut fields, "id"),
            label: take_string(&mut fields, "label"),
            content: take_string(&mut fields, "content"),
            sas_url: take_string(&mut fields, "sasUrl"),
            score,
            dept_name: take_string(&mut fields, "deptName"),
            document_id: take_string(&mut fields, "documentId"),
            chat_thread_id: take_string(&mut fields, "chatThreadId"),
            extra: fields,
        })
    }
}

fn take_string(fields: &mut Map<String, Value>, key: &str) -> Option<String> {
    if !matches!(fields.get(key), Some(Value::String(_))) {
        return None;
    }
    match fields.remove(key) {
        Some(Value::String(text)) => Some(text),
        _ => None,
    }
}

/// Where the returned citations came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationSource {
    /// Replayed from the assistant message context.
    Saved,
    /// Produced by a live index search.
    Search,
    /// Nothing could be resolved.
    None,
}

/// What the resolver did for one request.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionDiagnostics {
    /// Predicate used for the search, when one ran.
    pub filter: Option<String>,
    /// Hits returned by the search.
    pub hits: usize,
    /// Wall time spent resolving.
    pub elapsed_ms: u64,
    /// Human-readable notes on skipped steps and errors.
    pub notes: Vec<String>,
}

/// Citations plus how they were obtained.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CitationResolution {
    /// Resolved citations, possibly empty.
    pub citations: Vec<CitationRecord>,
    /// Origin of `citations`.
    pub source: CitationSource,
    /// Request-scoped diagnostics.
    pub diagnostics: ResolutionDiagnostics,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn saved_fields_with_unexpected_types_are_kept_verbatim() {
        let saved = json!({ "id": 7, "score": "0.9", "label": "a.pdf", "deptName": null });
        let record = CitationRecord::from_saved(saved.clone()).expect("object");
        assert_eq!(record.id, None);
        assert_eq!(record.score, None);
        assert_eq!(record.label.as_deref(), Some("a.pdf"));
        assert_eq!(record.extra["id"], 7);
        assert_eq!(serde_json::to_value(&record).unwrap(), saved);
        assert!(CitationRecord::from_saved(Value::Null).is_none());
    }

    #[test]
    fn unknown_fields_survive_a_round_trip() {
        let saved = json!({
            "id": "c1",
            "label": "a.pdf",
            "page": 4,
            "highlights": ["x", "y"]
        });
        let record: CitationRecord = serde_json::from_value(saved.clone()).unwrap();
        assert_eq!(record.extra["page"], 4);
        assert_eq!(serde_json::to_value(&record).unwrap(), saved);
    }

    #[test]
    fn hit_mapping_falls_back_to_metadata_then_placeholder() {
        let hit = SearchHit {
            id: "p1".into(),
            score: 0.5,
            metadata: Some("Quarterly report".into()),
            ..Default::default()
        };
        let record = CitationRecord::from_hit(hit);
        assert_eq!(record.label.as_deref(), Some("Quarterly report"));
        assert_eq!(record.content.as_deref(), Some(MISSING_CONTENT));

        let bare = CitationRecord::from_hit(SearchHit {
            id: "p2".into(),
            file_name: Some("  ".into()),
            ..Default::default()
        });
        assert_eq!(bare.label.as_deref(), Some(UNKNOWN_FILE_LABEL));
    }
}
