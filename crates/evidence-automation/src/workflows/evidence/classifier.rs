use regex::{Regex, RegexBuilder};
use serde::Serialize;

use super::domain::DocumentType;
use super::validation::rules::{validate_insurance, validate_license, validate_transcript};
use super::validation::Validator;

/// Scores at or below this value classify as [`DocumentType::Unknown`].
pub const UNKNOWN_THRESHOLD: f64 = 0.2;

/// Declarative description of a document type: how to recognise it, which fields to pull
/// out of it, and which validator judges it. New types are added here, not in the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct DocumentTypeDefinition {
    pub document_type: DocumentType,
    pub signatures: &'static [&'static str],
    pub field_patterns: &'static [(&'static str, &'static str)],
    pub validator: Option<Validator>,
}

/// Compiled regex for one named field. The first capture group that participates in the
/// first match becomes the field value.
#[derive(Debug, Clone)]
pub struct FieldPattern {
    pub field: String,
    pub regex: Regex,
}

#[derive(Debug, Clone)]
pub struct DocumentTypeSpec {
    pub document_type: DocumentType,
    pub signatures: Vec<Regex>,
    pub field_patterns: Vec<FieldPattern>,
    pub validator: Option<Validator>,
}

impl DocumentTypeSpec {
    fn score(&self, text: &str) -> f64 {
        if self.signatures.is_empty() {
            return 0.0;
        }

        let matched = self
            .signatures
            .iter()
            .filter(|signature| signature.is_match(text))
            .count();
        matched as f64 / self.signatures.len() as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TypeScore {
    pub document_type: DocumentType,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classification {
    pub document_type: DocumentType,
    pub confidence: f64,
    pub scores: Vec<TypeScore>,
}

#[derive(Debug, thiserror::Error)]
pub enum ClassifierError {
    #[error("invalid pattern for {document_type}: {source}")]
    Pattern {
        document_type: DocumentType,
        #[source]
        source: regex::Error,
    },
    #[error("document type {0} is defined more than once")]
    DuplicateType(DocumentType),
    #[error("the unknown document type cannot carry a definition")]
    UnknownDefinition,
}

/// Compiled pattern tables for every recognised document type.
#[derive(Debug, Clone)]
pub struct DocumentTypeRegistry {
    specs: Vec<DocumentTypeSpec>,
}

impl DocumentTypeRegistry {
    pub fn from_definitions(
        definitions: &[DocumentTypeDefinition],
    ) -> Result<Self, ClassifierError> {
        let mut specs: Vec<DocumentTypeSpec> = Vec::with_capacity(definitions.len());

        for definition in definitions {
            let document_type = definition.document_type;
            if document_type == DocumentType::Unknown {
                return Err(ClassifierError::UnknownDefinition);
            }
            if specs.iter().any(|spec| spec.document_type == document_type) {
                return Err(ClassifierError::DuplicateType(document_type));
            }

            let compile = |pattern: &str| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|source| ClassifierError::Pattern {
                        document_type,
                        source,
                    })
            };

            let signatures = definition
                .signatures
                .iter()
                .map(|pattern| compile(pattern))
                .collect::<Result<Vec<_>, _>>()?;

            let field_patterns = definition
                .field_patterns
                .iter()
                .map(|(field, pattern)| {
                    compile(pattern).map(|regex| FieldPattern {
                        field: (*field).to_string(),
                        regex,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            specs.push(DocumentTypeSpec {
                document_type,
                signatures,
                field_patterns,
                validator: definition.validator,
            });
        }

        // Ties resolve in enumeration order regardless of definition order.
        specs.sort_by_key(|spec| spec.document_type);

        Ok(Self { specs })
    }

    /// Registry for the transcript, license, insurance, MOU, ID and W-2 documents handled
    /// by the enrollment and partner workflows.
    pub fn standard() -> Self {
        Self::from_definitions(&standard_definitions())
            .expect("built-in document patterns compile")
    }

    pub fn spec(&self, document_type: DocumentType) -> Option<&DocumentTypeSpec> {
        self.specs
            .iter()
            .find(|spec| spec.document_type == document_type)
    }

    /// Field patterns for a type; unrecognised types get an empty table.
    pub fn field_patterns(&self, document_type: DocumentType) -> &[FieldPattern] {
        self.spec(document_type)
            .map(|spec| spec.field_patterns.as_slice())
            .unwrap_or(&[])
    }

    pub fn validator(&self, document_type: DocumentType) -> Option<Validator> {
        self.spec(document_type).and_then(|spec| spec.validator)
    }

    /// Score raw text against every signature table and pick the best type.
    pub fn classify(&self, text: &str) -> Classification {
        let scores: Vec<TypeScore> = self
            .specs
            .iter()
            .map(|spec| TypeScore {
                document_type: spec.document_type,
                score: spec.score(text),
            })
            .collect();

        let mut best: Option<TypeScore> = None;
        for candidate in &scores {
            match best {
                Some(current) if candidate.score <= current.score => {}
                _ => best = Some(*candidate),
            }
        }

        match best {
            Some(top) if top.score > UNKNOWN_THRESHOLD => Classification {
                document_type: top.document_type,
                confidence: top.score,
                scores,
            },
            top => Classification {
                document_type: DocumentType::Unknown,
                confidence: top.map(|score| score.score).unwrap_or(0.0),
                scores,
            },
        }
    }
}

impl Default for DocumentTypeRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

pub fn standard_definitions() -> Vec<DocumentTypeDefinition> {
    vec![
        DocumentTypeDefinition {
            document_type: DocumentType::Transcript,
            signatures: TRANSCRIPT_SIGNATURES,
            field_patterns: TRANSCRIPT_FIELDS,
            validator: Some(validate_transcript),
        },
        DocumentTypeDefinition {
            document_type: DocumentType::License,
            signatures: LICENSE_SIGNATURES,
            field_patterns: LICENSE_FIELDS,
            validator: Some(validate_license),
        },
        DocumentTypeDefinition {
            document_type: DocumentType::Insurance,
            signatures: INSURANCE_SIGNATURES,
            field_patterns: INSURANCE_FIELDS,
            validator: Some(validate_insurance),
        },
        DocumentTypeDefinition {
            document_type: DocumentType::Mou,
            signatures: MOU_SIGNATURES,
            field_patterns: MOU_FIELDS,
            validator: None,
        },
        DocumentTypeDefinition {
            document_type: DocumentType::Id,
            signatures: ID_SIGNATURES,
            field_patterns: ID_FIELDS,
            validator: None,
        },
        DocumentTypeDefinition {
            document_type: DocumentType::W2,
            signatures: W2_SIGNATURES,
            field_patterns: W2_FIELDS,
            validator: None,
        },
    ]
}

const TRANSCRIPT_SIGNATURES: &[&str] = &[
    r"\btranscript\b",
    r"total\s+(?:clock\s+)?hours",
    r"hours\s+(?:completed|earned|attended)",
    r"\b(?:academy|school|college|institute|university)\b",
    r"\b(?:student|enrollee)\b",
    r"\b(?:graduat\w*|completion\s+date|date\s+completed)\b",
];

const TRANSCRIPT_FIELDS: &[(&str, &str)] = &[
    (
        "school_name",
        r"(?m)(?:school|institution)\s+name\s*[:\-]\s*([^\n]+?)\s*$|((?:[a-z&.']+ )*(?:academy|school|college|institute|university)(?: of(?: [a-z&.']+)+)?)",
    ),
    (
        "student_name",
        r"student(?:\s+name)?\s*[:\-]\s*([a-z][a-z .'\-]*[a-z])",
    ),
    (
        "total_hours",
        r"(?:total\s+(?:clock\s+)?)?hours(?:\s+(?:completed|earned|attended))?\s*[:\-]?\s*(\d[\d,]*(?:\.\d+)?)",
    ),
    (
        "completion_date",
        r"(?:(?:completion|completed|graduation)\s+date|date\s+completed)\s*[:\-]?\s*(\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{4})",
    ),
    ("state", r"\bstate\s*[:\-]\s*([a-z]{2})\b"),
];

const LICENSE_SIGNATURES: &[&str] = &[
    r"\blicen[sc]e\b",
    r"licen[sc]e\s*(?:no\.?|number|#)",
    r"\bexpir\w*",
    r"\bboard\s+of\b",
    r"\b(?:barber\w*|cosmetolog\w*|shop)\b",
];

const LICENSE_FIELDS: &[(&str, &str)] = &[
    (
        "license_number",
        r"licen[sc]e\s*(?:no\.?|number|#)\s*[:\-]?\s*([a-z0-9][a-z0-9\-]*)",
    ),
    (
        "holder_name",
        r"(?m)(?:licensee|holder|name)\s*[:\-]\s*([^\n]+?)\s*$",
    ),
    (
        "expiration_date",
        r"(?:expiration|expires|exp\.?)\s*(?:date)?\s*[:\-]?\s*(\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{4})",
    ),
    ("state", r"\bstate\s*[:\-]\s*([a-z]{2})\b"),
];

const INSURANCE_SIGNATURES: &[&str] = &[
    r"\binsurance\b",
    r"\bpolicy\s*(?:no\.?|number|#)",
    r"certificate\s+of\s+(?:liability\s+)?insurance|\bacord\b",
    r"\bliability\b",
    r"\b(?:insured|insurer|coverage)\b",
];

const INSURANCE_FIELDS: &[(&str, &str)] = &[
    (
        "policy_number",
        r"policy\s*(?:no\.?|number|#)\s*[:\-]?\s*([a-z0-9][a-z0-9\-]*)",
    ),
    ("insured_name", r"(?m)\binsured\s*[:\-]\s*([^\n]+?)\s*$"),
    (
        "coverage_amount",
        r"(?:coverage|limit)[^\n$]*\$\s*([\d,]+(?:\.\d{2})?)",
    ),
    (
        "expiration_date",
        r"(?:expiration|expires|policy\s+period\s+end)\s*(?:date)?\s*[:\-]?\s*(\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{4})",
    ),
];

const MOU_SIGNATURES: &[&str] = &[
    r"\bmemorandum\b",
    r"\bunderstanding\b",
    r"\bmou\b",
    r"\b(?:agreement|parties)\b",
    r"\b(?:signature|signed|executed)\b",
];

const MOU_FIELDS: &[(&str, &str)] = &[
    (
        "partner_name",
        r"(?m)partner(?:\s+name)?\s*[:\-]\s*([^\n]+?)\s*$",
    ),
    (
        "signature_date",
        r"(?:signature|signed)\s*(?:date|on)?\s*[:\-]?\s*(\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{4})",
    ),
    (
        "effective_date",
        r"effective\s*(?:date)?\s*[:\-]?\s*(\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{4})",
    ),
];

const ID_SIGNATURES: &[&str] = &[
    r"\bidentification\b",
    r"driver'?s?\s+licen[sc]e",
    r"\b(?:date\s+of\s+birth|dob)\b",
    r"\bid\s*(?:no\.?|number|#)",
    r"\b(?:height|eyes|sex)\b",
];

const ID_FIELDS: &[(&str, &str)] = &[
    ("full_name", r"(?m)\bname\s*[:\-]\s*([^\n]+?)\s*$"),
    (
        "id_number",
        r"\b(?:id|dl)\s*(?:no\.?|number|#)\s*[:\-]?\s*([a-z0-9][a-z0-9\-]*)",
    ),
    (
        "date_of_birth",
        r"(?:date\s+of\s+birth|dob)\s*[:\-]?\s*(\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{4})",
    ),
    (
        "expiration_date",
        r"(?:expiration|expires|exp\.?)\s*(?:date)?\s*[:\-]?\s*(\d{4}-\d{2}-\d{2}|\d{1,2}/\d{1,2}/\d{4})",
    ),
];

const W2_SIGNATURES: &[&str] = &[
    r"\bw-?2\b",
    r"wage\s+and\s+tax\s+statement",
    r"\bemployer\b",
    r"social\s+security",
    r"federal\s+income\s+tax",
];

const W2_FIELDS: &[(&str, &str)] = &[
    (
        "employer_name",
        r"(?m)employer(?:'s)?\s+name\s*[:\-]\s*([^\n]+?)\s*$",
    ),
    (
        "wages",
        r"wages,?\s+tips[^\n$\d]*\$?\s*([\d,]+(?:\.\d{2})?)",
    ),
    ("tax_year", r"\b(20\d{2})\b"),
];
