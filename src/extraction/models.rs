//! Extension → extraction model dispatch table.
//!
//! New formats are supported by adding a row to [`MODEL_TABLE`].

use serde::Serialize;

/// Family of analysis performed for a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Plain reading-order text; content is concatenated directly.
    Read,
    /// Structural analysis: paragraphs, tables, key-value pairs, lists.
    Layout,
}

/// Remote model used for a file type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelDescriptor {
    /// Model family.
    pub kind: ModelKind,
    /// Identifier sent to the provider.
    pub model_id: &'static str,
}

const READ: ModelDescriptor = ModelDescriptor {
    kind: ModelKind::Read,
    model_id: "prebuilt-read",
};

const LAYOUT: ModelDescriptor = ModelDescriptor {
    kind: ModelKind::Layout,
    model_id: "prebuilt-layout",
};

/// Supported extensions and their models.
pub const MODEL_TABLE: &[(&str, ModelDescriptor)] = &[
    ("txt", READ),
    ("md", READ),
    ("csv", READ),
    ("tsv", READ),
    ("json", READ),
    ("log", READ),
    ("html", READ),
    ("htm", READ),
    ("xml", READ),
    ("pdf", LAYOUT),
    ("png", LAYOUT),
    ("jpg", LAYOUT),
    ("jpeg", LAYOUT),
    ("bmp", LAYOUT),
    ("tif", LAYOUT),
    ("tiff", LAYOUT),
    ("heif", LAYOUT),
    ("docx", LAYOUT),
    ("xlsx", LAYOUT),
    ("pptx", LAYOUT),
];

/// Lower-cased extension of a file name, if any.
pub fn file_extension(file_name: &str) -> Option<String> {
    let (stem, extension) = file_name.rsplit_once('.')?;
    if stem.is_empty() || extension.is_empty() {
        return None;
    }
    Some(extension.to_ascii_lowercase())
}

/// Look up the model for a file name.
pub fn select_model(file_name: &str) -> Option<ModelDescriptor> {
    let extension = file_extension(file_name)?;
    MODEL_TABLE
        .iter()
        .find(|(candidate, _)| *candidate == extension)
        .map(|(_, descriptor)| *descriptor)
}
