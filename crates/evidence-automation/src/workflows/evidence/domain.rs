use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn generate() -> Self {
                Self(format!(concat!($prefix, "-{}"), Uuid::new_v4().simple()))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Identifier of an uploaded document owned by the surrounding application.
    DocumentId,
    "doc"
);
string_id!(ExtractionId, "ext");
string_id!(DecisionId, "dec");
string_id!(ReviewItemId, "rvw");
string_id!(
    /// Identifier of a partner shop going through onboarding.
    PartnerId,
    "ptr"
);
string_id!(TransferHoursId, "thr");

/// Extracted field name to raw extracted value.
pub type ExtractedFields = BTreeMap<String, String>;

/// Document types the classifier can recognise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Transcript,
    License,
    Insurance,
    Mou,
    Id,
    W2,
    Unknown,
}

impl DocumentType {
    /// Known types in enumeration order; classification ties resolve to the earliest entry.
    pub const fn ordered() -> [Self; 6] {
        [
            Self::Transcript,
            Self::License,
            Self::Insurance,
            Self::Mou,
            Self::Id,
            Self::W2,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Transcript => "transcript",
            Self::License => "license",
            Self::Insurance => "insurance",
            Self::Mou => "mou",
            Self::Id => "id",
            Self::W2 => "w2",
            Self::Unknown => "unknown",
        }
    }

    /// Ruleset `rule_type` consulted when validating this document type.
    pub fn rule_type(self) -> String {
        format!("{}_approval", self.label())
    }
}

impl fmt::Display for DocumentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    Approved,
    Rejected,
}

/// The slice of an application document the pipeline reads and writes back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub file_location: String,
    pub status: DocumentStatus,
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl Document {
    pub fn pending(id: DocumentId, file_location: impl Into<String>) -> Self {
        Self {
            id,
            file_location: file_location.into(),
            status: DocumentStatus::Pending,
            reviewed_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pending,
    Passed,
    Failed,
    NeedsReview,
}

impl ValidationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::NeedsReview => "needs_review",
        }
    }
}

/// One processing run over a document. Re-processing appends a new row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentExtraction {
    pub id: ExtractionId,
    pub document_id: DocumentId,
    pub document_type: DocumentType,
    pub extracted_fields: ExtractedFields,
    pub raw_text: String,
    pub confidence: f64,
    pub validation_status: ValidationStatus,
    pub validation_errors: Vec<String>,
    pub ruleset_version: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionValue {
    Approved,
    Rejected,
    NeedsReview,
    Recommended,
    Assigned,
    Flagged,
}

impl DecisionValue {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::NeedsReview => "needs_review",
            Self::Recommended => "recommended",
            Self::Assigned => "assigned",
            Self::Flagged => "flagged",
        }
    }

    /// Decisions that withhold approval and therefore must carry reasons.
    pub const fn is_adverse(self) -> bool {
        matches!(self, Self::Rejected | Self::NeedsReview | Self::Flagged)
    }
}

impl From<ValidationStatus> for DecisionValue {
    fn from(status: ValidationStatus) -> Self {
        match status {
            ValidationStatus::Passed => Self::Approved,
            ValidationStatus::Failed => Self::Rejected,
            ValidationStatus::NeedsReview | ValidationStatus::Pending => Self::NeedsReview,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectKind {
    Document,
    Partner,
    TransferHours,
}

impl SubjectKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Document => "document",
            Self::Partner => "partner",
            Self::TransferHours => "transfer_hours",
        }
    }
}

/// Tagged reference to whatever entity a decision or review item is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub kind: SubjectKind,
    pub id: String,
}

impl Subject {
    pub fn document(id: &DocumentId) -> Self {
        Self {
            kind: SubjectKind::Document,
            id: id.0.clone(),
        }
    }

    pub fn partner(id: &PartnerId) -> Self {
        Self {
            kind: SubjectKind::Partner,
            id: id.0.clone(),
        }
    }

    pub fn transfer_hours(id: &TransferHoursId) -> Self {
        Self {
            kind: SubjectKind::TransferHours,
            id: id.0.clone(),
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.label(), self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Actor {
    System,
    Named(String),
}

impl Actor {
    pub fn from_name(name: &str) -> Self {
        if name.trim().is_empty() || name.eq_ignore_ascii_case("system") {
            Self::System
        } else {
            Self::Named(name.trim().to_string())
        }
    }

    pub fn label(&self) -> &str {
        match self {
            Self::System => "system",
            Self::Named(name) => name,
        }
    }
}

/// Immutable audit record explaining one automated (or reviewer) judgment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutomatedDecision {
    pub id: DecisionId,
    pub subject: Subject,
    pub decision: DecisionValue,
    pub reason_codes: Vec<String>,
    pub input_snapshot: Value,
    pub ruleset_version: Option<String>,
    pub actor: Actor,
    pub idempotency_key: String,
    pub processing_time_ms: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueType {
    DocumentReview,
    TranscriptReview,
    PartnerDocsReview,
}

impl QueueType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::DocumentReview => "document_review",
            Self::TranscriptReview => "transcript_review",
            Self::PartnerDocsReview => "partner_docs_review",
        }
    }
}

/// Lower numbers are worked first.
pub const PRIORITY_ELEVATED: u8 = 3;
pub const PRIORITY_DEFAULT: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    Open,
    Closed,
}

/// Recorded outcome of the explicit close action on a review item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewClosure {
    pub reviewer: String,
    pub decision: DecisionValue,
    pub notes: Option<String>,
    pub decision_id: DecisionId,
    pub closed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewQueueItem {
    pub id: ReviewItemId,
    pub queue: QueueType,
    pub subject: Subject,
    pub priority: u8,
    pub reasons: Vec<String>,
    pub metadata: Value,
    pub status: ReviewStatus,
    pub closure: Option<ReviewClosure>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartnerDocumentStatus {
    Pending,
    Accepted,
    Rejected,
}

/// Slot for one required document type on a partner's onboarding checklist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerDocument {
    pub id: String,
    pub partner_id: PartnerId,
    pub document_type: String,
    pub document_id: Option<DocumentId>,
    pub status: PartnerDocumentStatus,
    pub expiration_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub reviewed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartnerStatus {
    PendingDocuments,
    ActionRequired,
    UnderReview,
    Active,
}

impl PartnerStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::PendingDocuments => "pending_documents",
            Self::ActionRequired => "action_required",
            Self::UnderReview => "under_review",
            Self::Active => "active",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Partner {
    pub id: PartnerId,
    pub name: String,
    pub status: PartnerStatus,
    pub approved_at: Option<DateTime<Utc>>,
    pub auto_approved: bool,
    /// Bumped on every write; updates must present the version they read.
    pub version: u64,
}

impl Partner {
    pub fn new(id: PartnerId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            status: PartnerStatus::PendingDocuments,
            approved_at: None,
            auto_approved: false,
            version: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MouStatus {
    NotSent,
    Sent,
    PartnerSigned,
    FullyExecuted,
}

/// Program enrolment of a partner, carrying the MOU signature state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramHolder {
    pub partner_id: PartnerId,
    pub program_id: String,
    pub mou_status: MouStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferHoursStatus {
    Approved,
    PendingReview,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferHours {
    pub id: TransferHoursId,
    pub user_id: String,
    pub application_id: Option<String>,
    pub enrollment_id: Option<String>,
    pub source_institution: Option<String>,
    pub source_state: Option<String>,
    pub total_hours: Option<f64>,
    pub approved_hours: Option<f64>,
    pub document_id: DocumentId,
    pub extraction_id: ExtractionId,
    pub decision_id: DecisionId,
    pub status: TransferHoursStatus,
    pub auto_approved: bool,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub action: String,
    pub subject: Subject,
    pub actor: Actor,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}
