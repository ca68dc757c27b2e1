//! Turn a provider analysis into normalized text plus confidence samples.

use super::models::ModelKind;
use super::types::{AnalyzeResult, AnalyzedTable, ConfidenceSamples};

/// Text assembled from one analysis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Assembled {
    /// Normalized text, segments separated by blank lines.
    pub text: String,
    /// Words counted across every emitted segment.
    pub word_count: usize,
    /// Confidence samples gathered from structural elements.
    pub samples: ConfidenceSamples,
}

/// Assemble the provider result for the given model family.
///
/// The read model uses the reading-order `content` directly. The layout model builds text from
/// paragraphs, then appends tables, key-value pairs, and list items. Either path falls back to
/// the other source of text when its preferred one is empty.
pub fn assemble(kind: ModelKind, result: &AnalyzeResult) -> Assembled {
    let mut builder = SegmentBuilder::default();
    let paragraphs: Vec<&str> = result
        .paragraphs
        .iter()
        .map(|paragraph| paragraph.content.trim())
        .filter(|content| !content.is_empty())
        .collect();

    for paragraph in &result.paragraphs {
        if let Some(confidence) = paragraph.confidence {
            builder.samples.paragraphs.push(confidence);
        }
    }

    let content = result.content.trim();
    let prefer_content = match kind {
        ModelKind::Read => !content.is_empty(),
        ModelKind::Layout => paragraphs.is_empty(),
    };

    if prefer_content {
        builder.push(content.to_string());
    } else {
        builder.push(paragraphs.join("\n\n"));
    }

    if kind == ModelKind::Layout {
        for (index, table) in result.tables.iter().enumerate() {
            let block = render_table(index + 1, table, &mut builder.samples);
            builder.push(block);
        }

        let mut pairs = Vec::new();
        for pair in &result.key_value_pairs {
            let key = pair
                .key
                .as_ref()
                .map(|span| span.content.trim())
                .unwrap_or_default();
            if key.is_empty() {
                continue;
            }
            let value = pair
                .value
                .as_ref()
                .map(|span| span.content.trim())
                .unwrap_or_default();
            if let Some(confidence) = pair.confidence {
                builder.samples.key_values.push(confidence);
            }
            pairs.push(format!("{key}: {value}"));
        }
        if !pairs.is_empty() {
            builder.push(pairs.join("\n"));
        }

        let items: Vec<String> = result
            .lists
            .iter()
            .flat_map(|list| list.items.iter())
            .map(|item| item.content.trim())
            .filter(|item| !item.is_empty())
            .map(|item| format!("• {item}"))
            .collect();
        if !items.is_empty() {
            builder.push(items.join("\n"));
        }
    }

    builder.finish()
}

fn render_table(number: usize, table: &AnalyzedTable, samples: &mut ConfidenceSamples) -> String {
    let mut cells: Vec<_> = table.cells.iter().collect();
    cells.sort_by_key(|cell| (cell.row_index, cell.column_index));

    let mut block = format!(
        "[TABLE {number}] {}x{}",
        table.row_count, table.column_count
    );
    for cell in cells {
        if let Some(confidence) = cell.confidence {
            samples.tables.push(confidence);
        }
        let content = cell.content.trim();
        if content.is_empty() {
            continue;
        }
        block.push_str(&format!(
            "\n[{},{}] {content}",
            cell.row_index, cell.column_index
        ));
    }
    block
}

#[derive(Default)]
struct SegmentBuilder {
    segments: Vec<String>,
    word_count: usize,
    samples: ConfidenceSamples,
}

impl SegmentBuilder {
    fn push(&mut self, segment: String) {
        let trimmed = segment.trim();
        if trimmed.is_empty() {
            return;
        }
        self.word_count += trimmed.split_whitespace().count();
        self.segments.push(trimmed.to_string());
    }

    fn finish(self) -> Assembled {
        Assembled {
            text: self.segments.join("\n\n"),
            word_count: self.word_count,
            samples: self.samples,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extraction::types::{
        AnalyzedCell, AnalyzedKeyValue, AnalyzedList, AnalyzedParagraph, AnalyzedSpan,
    };

    fn paragraph(content: &str, confidence: Option<f32>) -> AnalyzedParagraph {
        AnalyzedParagraph {
            content: content.into(),
            confidence,
        }
    }

    fn span(content: &str) -> AnalyzedSpan {
        AnalyzedSpan {
            content: content.into(),
        }
    }

    #[test]
    fn read_model_uses_content_directly() {
        let result = AnalyzeResult {
            content: "  hello world  ".into(),
            paragraphs: vec![paragraph("ignored", None)],
            ..Default::default()
        };
        let assembled = assemble(ModelKind::Read, &result);
        assert_eq!(assembled.text, "hello world");
        assert_eq!(assembled.word_count, 2);
        assert_eq!(assembled.samples.mean(), 0.0);
    }

    #[test]
    fn layout_model_joins_paragraphs_and_tags_tables() {
        let result = AnalyzeResult {
            content: "raw".into(),
            paragraphs: vec![paragraph(" First ", Some(0.9)), paragraph("Second", Some(0.8))],
            tables: vec![AnalyzedTable {
                row_count: 2,
                column_count: 2,
                cells: vec![
                    AnalyzedCell {
                        row_index: 1,
                        column_index: 0,
                        content: "b".into(),
                        confidence: None,
                    },
                    AnalyzedCell {
                        row_index: 0,
                        column_index: 1,
                        content: "a2".into(),
                        confidence: None,
                    },
                    AnalyzedCell {
                        row_index: 0,
                        column_index: 0,
                        content: "a1".into(),
                        confidence: None,
                    },
                ],
            }],
            key_value_pairs: vec![AnalyzedKeyValue {
                key: Some(span("Owner")),
                value: Some(span("Sales")),
                confidence: None,
            }],
            lists: vec![AnalyzedList {
                items: vec![span("one"), span("")],
            }],
            ..Default::default()
        };

        let assembled = assemble(ModelKind::Layout, &result);
        assert_eq!(
            assembled.text,
            "First\n\nSecond\n\n[TABLE 1] 2x2\n[0,0] a1\n[0,1] a2\n[1,0] b\n\nOwner: Sales\n\n• one"
        );
        assert!((assembled.samples.mean() - 0.85).abs() < 1e-6);
    }

    #[test]
    fn layout_without_paragraphs_falls_back_to_content() {
        let result = AnalyzeResult {
            content: "only content".into(),
            ..Default::default()
        };
        assert_eq!(assemble(ModelKind::Layout, &result).text, "only content");
    }

    #[test]
    fn empty_analysis_produces_empty_text() {
        let assembled = assemble(ModelKind::Layout, &AnalyzeResult::default());
        assert!(assembled.text.is_empty());
        assert_eq!(assembled.word_count, 0);
    }
}
