use std::sync::Arc;

use serde::Serialize;

use super::classifier::{Classification, DocumentTypeRegistry, FieldPattern};
use super::domain::{DocumentType, ExtractedFields};

/// Text and fields recovered from one OCR pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OcrOutput {
    pub text: String,
    pub fields: ExtractedFields,
    /// Recognition quality reported by the adapter, in `[0, 1]`.
    pub confidence: f64,
}

/// OCR adapter boundary. Implementations receive the raw file and the field table for
/// the document type being extracted.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, content: &[u8], patterns: &[FieldPattern]) -> Result<OcrOutput, OcrError>;
}

#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("document content is not machine readable: {0}")]
    Unreadable(String),
    #[error("ocr service unavailable: {0}")]
    Unavailable(String),
}

impl OcrError {
    pub fn is_transient(&self) -> bool {
        matches!(self, OcrError::Unavailable(_))
    }
}

/// Apply a field table to raw text. Each field takes the first participating capture
/// group of its first match; empty captures and non-matching fields are left out.
pub fn apply_patterns(text: &str, patterns: &[FieldPattern]) -> ExtractedFields {
    let mut fields = ExtractedFields::new();

    for pattern in patterns {
        let Some(captures) = pattern.regex.captures(text) else {
            continue;
        };

        let value = captures
            .iter()
            .skip(1)
            .flatten()
            .map(|group| group.as_str().trim())
            .next();

        if let Some(value) = value.filter(|value| !value.is_empty()) {
            fields.insert(pattern.field.clone(), value.to_string());
        }
    }

    fields
}

/// Adapter for documents that already carry a text layer (plain text exports, e-mailed
/// transcripts). Reports a fixed confidence since no recognition takes place.
#[derive(Debug, Clone)]
pub struct PlainTextExtractor {
    confidence: f64,
}

impl PlainTextExtractor {
    pub fn new(confidence: f64) -> Self {
        Self {
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, content: &[u8], patterns: &[FieldPattern]) -> Result<OcrOutput, OcrError> {
        let text = std::str::from_utf8(content)
            .map_err(|err| OcrError::Unreadable(err.to_string()))?
            .to_string();
        let fields = apply_patterns(&text, patterns);

        Ok(OcrOutput {
            text,
            fields,
            confidence: self.confidence,
        })
    }
}

/// Couples the OCR adapter with the pattern registry.
#[derive(Clone)]
pub struct FieldExtractor {
    ocr: Arc<dyn TextExtractor>,
    registry: Arc<DocumentTypeRegistry>,
}

impl FieldExtractor {
    pub fn new(ocr: Arc<dyn TextExtractor>, registry: Arc<DocumentTypeRegistry>) -> Self {
        Self { ocr, registry }
    }

    pub fn registry(&self) -> &DocumentTypeRegistry {
        &self.registry
    }

    /// First pass: raw OCR with no field table, used for classification.
    pub fn recognize(&self, content: &[u8]) -> Result<OcrOutput, OcrError> {
        self.ocr.extract(content, &[])
    }

    pub fn classify(&self, text: &str) -> Classification {
        self.registry.classify(text)
    }

    /// Second pass: structured extraction with the table for `document_type`. Unknown types
    /// run against an empty table and come back with no fields.
    pub fn extract(
        &self,
        content: &[u8],
        document_type: DocumentType,
    ) -> Result<OcrOutput, OcrError> {
        let patterns = self.registry.field_patterns(document_type);
        self.ocr.extract(content, patterns)
    }
}
