//! Input coercion and validation applied before any embedding call.

use serde_json::Value;

use super::EmbeddingError;

const PREVIEW_CHARS: usize = 48;

/// Coerce an arbitrary JSON value into embedding text.
///
/// Strings pass through, arrays are space-joined element-wise, objects are serialized, scalars
/// use their display form, and `null` becomes the empty string.
pub fn coerce_input(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Array(items) => items
            .iter()
            .map(coerce_input)
            .collect::<Vec<_>>()
            .join(" "),
        Value::Object(_) => value.to_string(),
        Value::Number(number) => number.to_string(),
        Value::Bool(flag) => flag.to_string(),
        Value::Null => String::new(),
    }
}

/// Reject blank text and text carrying control characters.
///
/// Tabs, line feeds, and carriage returns are allowed; every other C0 control and DEL is not.
pub fn validate_text(text: &str) -> Result<&str, EmbeddingError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(EmbeddingError::EmptyInput);
    }
    if let Some((position, ch)) = text.char_indices().find(|(_, ch)| is_forbidden_control(*ch)) {
        return Err(EmbeddingError::InvalidInput {
            reason: format!("control character U+{:04X} at byte {position}", ch as u32),
            length: text.len(),
            preview: preview(text),
        });
    }
    Ok(trimmed)
}

fn is_forbidden_control(ch: char) -> bool {
    matches!(ch, '\u{0}'..='\u{8}' | '\u{b}' | '\u{c}' | '\u{e}'..='\u{1f}' | '\u{7f}')
}

/// Short, log-safe preview of the input.
pub fn preview(text: &str) -> String {
    let mut preview: String = text
        .chars()
        .take(PREVIEW_CHARS)
        .map(|ch| if ch.is_control() { ' ' } else { ch })
        .collect();
    if text.chars().count() > PREVIEW_CHARS {
        preview.push('…');
    }
    preview
}
