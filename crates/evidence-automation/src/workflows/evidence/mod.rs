//! Document evidence processing and automated decisions.
//!
//! A document goes through OCR, classification, field extraction, and validation against
//! the active ruleset for its type. Every run appends an extraction and an immutable
//! decision; uncertain outcomes land in a human review queue. Transfer-hours credit and
//! partner onboarding reuse the same pipeline and record decisions of their own.

pub mod classifier;
pub mod domain;
pub mod extraction;
pub mod memory;
pub mod partner;
pub mod recorder;
pub mod report;
pub mod repository;
pub mod review;
pub mod router;
pub mod ruleset;
pub mod service;
pub mod storage;
pub mod transfer;
pub mod validation;

#[cfg(test)]
mod tests;

pub use classifier::{Classification, ClassifierError, DocumentTypeRegistry, FieldPattern};
pub use domain::{
    Actor, AuditEvent, AutomatedDecision, DecisionId, DecisionValue, Document, DocumentExtraction,
    DocumentId, DocumentStatus, DocumentType, ExtractedFields, ExtractionId, MouStatus, Partner,
    PartnerDocument, PartnerDocumentStatus, PartnerId, PartnerStatus, ProgramHolder, QueueType,
    ReviewItemId, ReviewQueueItem, ReviewStatus, Subject, SubjectKind, TransferHours,
    TransferHoursId, TransferHoursStatus, ValidationStatus,
};
pub use extraction::{FieldExtractor, OcrError, OcrOutput, PlainTextExtractor, TextExtractor};
pub use memory::{MemoryAuditSink, MemoryDocumentStorage, MemoryEvidenceStore};
pub use partner::{
    LicenseCheck, PartnerApprovalError, PartnerApprovalResult, PartnerApprovalService,
    PartnerChecklist,
};
pub use recorder::{DecisionDraft, DecisionRecorder, ProcessingAttempt, RecorderError};
pub use report::{write_decisions_csv, DecisionView};
pub use repository::{
    AuditError, AuditSink, DocumentStorage, EvidenceStore, RepositoryError, RulesetStoreError,
    StorageError,
};
pub use review::{ResolvedReview, ReviewQueue, ReviewQueueError, ReviewResolution};
pub use router::{evidence_router, EvidenceServices};
pub use ruleset::{
    load_rulesets, rulesets_from_json, AutomationRuleset, RulesetCatalog, RulesetError,
    RulesetRules,
};
pub use service::{
    EvidenceProcessor, FailureKind, PipelineError, PipelineSettings, PipelineStage,
    ProcessingResult,
};
pub use storage::FilesystemStorage;
pub use transfer::{TransferGates, TransferHoursOutcome, TransferHoursRequest};
pub use validation::{validate, ValidationContext, ValidationOutcome};
