use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, info_span, warn};

use crate::config::PipelineConfig;

use super::classifier::DocumentTypeRegistry;
use super::domain::{
    Actor, AuditEvent, AutomatedDecision, DecisionId, DecisionValue, Document, DocumentExtraction,
    DocumentId, DocumentStatus, DocumentType, ExtractedFields, ExtractionId, QueueType,
    ReviewItemId, ReviewQueueItem, Subject, ValidationStatus, PRIORITY_DEFAULT,
    PRIORITY_ELEVATED,
};
use super::extraction::{FieldExtractor, OcrError, TextExtractor};
use super::recorder::{DecisionDraft, DecisionRecorder, ProcessingAttempt, RecorderError};
use super::repository::{
    AuditError, AuditSink, DocumentStorage, EvidenceStore, RepositoryError, StorageError,
};
use super::review::{ReviewQueue, ReviewRequest};
use super::transfer::TransferHoursOutcome;
use super::validation::codes::{MISSING_STATE, OUT_OF_STATE, VALIDATION_PASSED};
use super::validation::{validate, ValidationContext};

/// Runtime knobs for the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    pub actor: Actor,
    /// Attempts for content fetch and OCR. Values below one behave as one.
    pub retry_attempts: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

impl From<&PipelineConfig> for PipelineSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            actor: Actor::from_name(&config.actor),
            retry_attempts: config.retry_attempts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    LoadDocument,
    FetchContent,
    Ocr,
    Classify,
    Extract,
    Validate,
    PersistExtraction,
    RecordDecision,
    UpdateDocument,
    EnqueueReview,
    AppendAudit,
}

impl PipelineStage {
    pub const fn label(self) -> &'static str {
        match self {
            Self::LoadDocument => "load_document",
            Self::FetchContent => "fetch_content",
            Self::Ocr => "ocr",
            Self::Classify => "classify",
            Self::Extract => "extract",
            Self::Validate => "validate",
            Self::PersistExtraction => "persist_extraction",
            Self::RecordDecision => "record_decision",
            Self::UpdateDocument => "update_document",
            Self::EnqueueReview => "enqueue_review",
            Self::AppendAudit => "append_audit",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("document {0} not found")]
    DocumentNotFound(DocumentId),
    #[error("{stage} failed: {source}")]
    Repository {
        stage: PipelineStage,
        #[source]
        source: RepositoryError,
    },
    #[error("unable to fetch document content: {0}")]
    Storage(#[source] StorageError),
    #[error("{stage} failed: {source}")]
    Ocr {
        stage: PipelineStage,
        #[source]
        source: OcrError,
    },
    #[error("unable to record decision: {0}")]
    Recorder(#[source] RecorderError),
    #[error("unable to append audit event: {0}")]
    Audit(#[source] AuditError),
    #[error("document {document_id} classified as {document_type}, expected a transcript")]
    NotTranscript {
        document_id: DocumentId,
        document_type: DocumentType,
    },
}

impl PipelineError {
    pub(crate) fn repository(stage: PipelineStage) -> impl FnOnce(RepositoryError) -> Self {
        move |source| Self::Repository { stage, source }
    }

    pub fn stage(&self) -> PipelineStage {
        match self {
            Self::DocumentNotFound(_) => PipelineStage::LoadDocument,
            Self::Repository { stage, .. } | Self::Ocr { stage, .. } => *stage,
            Self::Storage(_) => PipelineStage::FetchContent,
            Self::Recorder(_) => PipelineStage::RecordDecision,
            Self::Audit(_) => PipelineStage::AppendAudit,
            Self::NotTranscript { .. } => PipelineStage::Classify,
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::DocumentNotFound(_) | Self::Storage(StorageError::NotFound(_)) => {
                FailureKind::NotFound
            }
            Self::Ocr {
                source: OcrError::Unreadable(_),
                ..
            } => FailureKind::Unreadable,
            Self::NotTranscript { .. } | Self::Recorder(RecorderError::SilentDecision { .. }) => {
                FailureKind::InvalidSubject
            }
            _ => FailureKind::Storage,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.failure_kind() == FailureKind::NotFound
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NotFound,
    Storage,
    Unreadable,
    InvalidSubject,
}

/// Outcome of one pipeline call. `success` reports whether the run completed; the business
/// verdict lives in `decision`, so callers check both.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub document_id: DocumentId,
    pub document_type: Option<DocumentType>,
    pub validation_status: Option<ValidationStatus>,
    pub decision: Option<DecisionValue>,
    pub confidence: Option<f64>,
    pub extracted_fields: ExtractedFields,
    pub errors: Vec<String>,
    pub extraction_id: Option<ExtractionId>,
    pub decision_id: Option<DecisionId>,
    pub review_queue_id: Option<ReviewItemId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transfer_hours: Option<TransferHoursOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<PipelineStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProcessingResult {
    pub(crate) fn completed(outcome: &DocumentOutcome) -> Self {
        Self {
            success: true,
            document_id: outcome.document.id.clone(),
            document_type: Some(outcome.extraction.document_type),
            validation_status: Some(outcome.extraction.validation_status),
            decision: Some(outcome.decision.decision),
            confidence: Some(outcome.extraction.confidence),
            extracted_fields: outcome.extraction.extracted_fields.clone(),
            errors: outcome.extraction.validation_errors.clone(),
            extraction_id: Some(outcome.extraction.id.clone()),
            decision_id: Some(outcome.decision.id.clone()),
            review_queue_id: outcome.review_item.as_ref().map(|item| item.id.clone()),
            transfer_hours: None,
            failed_stage: None,
            failure: None,
            message: None,
        }
    }

    pub(crate) fn failed(document_id: &DocumentId, error: &PipelineError) -> Self {
        Self {
            success: false,
            document_id: document_id.clone(),
            document_type: None,
            validation_status: None,
            decision: None,
            confidence: None,
            extracted_fields: ExtractedFields::new(),
            errors: Vec::new(),
            extraction_id: None,
            decision_id: None,
            review_queue_id: None,
            transfer_hours: None,
            failed_stage: Some(error.stage()),
            failure: Some(error.failure_kind()),
            message: Some(error.to_string()),
        }
    }

    /// A run that stopped partway. Any extraction or decision it wrote stays referenced.
    pub(crate) fn stopped(document_id: &DocumentId, failure: &RunFailure) -> Self {
        Self {
            extraction_id: failure.extraction_id.clone(),
            decision_id: failure.decision_id.clone(),
            ..Self::failed(document_id, &failure.error)
        }
    }

    /// Marks a run whose document stage completed but whose follow-up work failed. The
    /// rows already written stay referenced so the caller can find them.
    pub(crate) fn interrupted(mut self, error: &PipelineError) -> Self {
        self.success = false;
        self.failed_stage = Some(error.stage());
        self.failure = Some(error.failure_kind());
        self.message = Some(error.to_string());
        self
    }

    pub fn is_not_found(&self) -> bool {
        self.failure == Some(FailureKind::NotFound)
    }
}

/// Rows written by one successful document run.
#[derive(Debug, Clone)]
pub(crate) struct DocumentOutcome {
    pub document: Document,
    pub extraction: DocumentExtraction,
    pub decision: AutomatedDecision,
    pub review_item: Option<ReviewQueueItem>,
}

/// A document run that stopped early, with the rows it had already written.
#[derive(Debug)]
pub(crate) struct RunFailure {
    pub error: PipelineError,
    pub extraction_id: Option<ExtractionId>,
    pub decision_id: Option<DecisionId>,
}

/// Tracks how far a run got so a late failure can be reported against the rows it left.
#[derive(Debug)]
struct RunProgress {
    stage: PipelineStage,
    extraction_id: Option<ExtractionId>,
    decision_id: Option<DecisionId>,
}

impl RunProgress {
    fn new() -> Self {
        Self {
            stage: PipelineStage::LoadDocument,
            extraction_id: None,
            decision_id: None,
        }
    }
}

/// Document processing pipeline: fetch, OCR, classify, extract, validate, then record the
/// extraction, the decision, and its side effects.
pub struct EvidenceProcessor<S, A> {
    store: Arc<S>,
    audit: Arc<A>,
    storage: Arc<dyn DocumentStorage>,
    extractor: FieldExtractor,
    recorder: Arc<DecisionRecorder<S>>,
    reviews: Arc<ReviewQueue<S>>,
    settings: PipelineSettings,
}

impl<S, A> EvidenceProcessor<S, A>
where
    S: EvidenceStore + 'static,
    A: AuditSink + 'static,
{
    pub fn new(
        store: Arc<S>,
        audit: Arc<A>,
        storage: Arc<dyn DocumentStorage>,
        ocr: Arc<dyn TextExtractor>,
        settings: PipelineSettings,
    ) -> Self {
        Self::with_registry(
            store,
            audit,
            storage,
            ocr,
            Arc::new(DocumentTypeRegistry::standard()),
            settings,
        )
    }

    pub fn with_registry(
        store: Arc<S>,
        audit: Arc<A>,
        storage: Arc<dyn DocumentStorage>,
        ocr: Arc<dyn TextExtractor>,
        registry: Arc<DocumentTypeRegistry>,
        settings: PipelineSettings,
    ) -> Self {
        let recorder = Arc::new(DecisionRecorder::new(store.clone(), settings.actor.clone()));
        let reviews = Arc::new(ReviewQueue::new(store.clone(), recorder.clone()));

        Self {
            store,
            audit,
            storage,
            extractor: FieldExtractor::new(ocr, registry),
            recorder,
            reviews,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn recorder(&self) -> &Arc<DecisionRecorder<S>> {
        &self.recorder
    }

    pub fn reviews(&self) -> &Arc<ReviewQueue<S>> {
        &self.reviews
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    pub(crate) fn audit(&self) -> &Arc<A> {
        &self.audit
    }

    /// Process one document end to end. Infrastructure faults come back as
    /// `success: false`; negative verdicts are successful runs.
    pub fn process_document(&self, document_id: &DocumentId) -> ProcessingResult {
        let attempt = ProcessingAttempt::begin();
        match self.run(document_id, &attempt, &ValidationContext::default()) {
            Ok(outcome) => ProcessingResult::completed(&outcome),
            Err(failure) => ProcessingResult::stopped(document_id, &failure),
        }
    }

    pub(crate) fn run(
        &self,
        document_id: &DocumentId,
        attempt: &ProcessingAttempt,
        context: &ValidationContext,
    ) -> Result<DocumentOutcome, RunFailure> {
        let span = info_span!("process_document", document_id = %document_id);
        let _entered = span.enter();

        let mut progress = RunProgress::new();
        let error = match self.run_steps(document_id, attempt, context, &mut progress) {
            Ok(outcome) => return Ok(outcome),
            Err(error) => error,
        };

        warn!(
            stage = %error.stage(),
            error = %error,
            "document processing failed"
        );
        if progress.extraction_id.is_some() {
            self.report_incomplete(document_id, &progress, &error);
        }

        Err(RunFailure {
            error,
            extraction_id: progress.extraction_id,
            decision_id: progress.decision_id,
        })
    }

    fn run_steps(
        &self,
        document_id: &DocumentId,
        attempt: &ProcessingAttempt,
        context: &ValidationContext,
        progress: &mut RunProgress,
    ) -> Result<DocumentOutcome, PipelineError> {
        progress.stage = PipelineStage::LoadDocument;
        let mut document = self
            .store
            .fetch_document(document_id)
            .map_err(PipelineError::repository(PipelineStage::LoadDocument))?
            .ok_or_else(|| PipelineError::DocumentNotFound(document_id.clone()))?;

        progress.stage = PipelineStage::FetchContent;
        let content = self
            .retry(PipelineStage::FetchContent, StorageError::is_transient, || {
                self.storage.fetch(&document.file_location)
            })
            .map_err(PipelineError::Storage)?;

        progress.stage = PipelineStage::Ocr;
        let recognized = self
            .retry(PipelineStage::Ocr, OcrError::is_transient, || {
                self.extractor.recognize(&content)
            })
            .map_err(|source| PipelineError::Ocr {
                stage: PipelineStage::Ocr,
                source,
            })?;
        debug!(characters = recognized.text.len(), "ocr complete");

        progress.stage = PipelineStage::Classify;
        let classification = self.extractor.classify(&recognized.text);
        info!(
            document_type = classification.document_type.label(),
            score = classification.confidence,
            "document classified"
        );

        progress.stage = PipelineStage::Extract;
        let extracted = self
            .retry(PipelineStage::Extract, OcrError::is_transient, || {
                self.extractor
                    .extract(&content, classification.document_type)
            })
            .map_err(|source| PipelineError::Ocr {
                stage: PipelineStage::Extract,
                source,
            })?;

        progress.stage = PipelineStage::Validate;
        let document_type = classification.document_type;
        let ruleset = self
            .store
            .active_ruleset(&document_type.rule_type())
            .map_err(PipelineError::repository(PipelineStage::Validate))?;
        let validation = validate(
            self.extractor.registry(),
            document_type,
            &extracted.fields,
            ruleset.as_ref(),
            context,
        );

        progress.stage = PipelineStage::PersistExtraction;
        let extraction = DocumentExtraction {
            id: ExtractionId::generate(),
            document_id: document.id.clone(),
            document_type,
            extracted_fields: extracted.fields,
            raw_text: extracted.text,
            confidence: extracted.confidence,
            validation_status: validation.status,
            validation_errors: validation.errors,
            ruleset_version: validation.ruleset_version,
            created_at: Utc::now(),
        };
        self.store
            .insert_extraction(extraction.clone())
            .map_err(PipelineError::repository(PipelineStage::PersistExtraction))?;
        progress.extraction_id = Some(extraction.id.clone());

        progress.stage = PipelineStage::RecordDecision;
        let reason_codes = if extraction.validation_errors.is_empty() {
            vec![VALIDATION_PASSED.to_string()]
        } else {
            extraction.validation_errors.clone()
        };
        let draft = DecisionDraft {
            subject: Subject::document(&document.id),
            decision: DecisionValue::from(extraction.validation_status),
            reason_codes,
            input_snapshot: json!({
                "document_id": document.id,
                "extraction_id": extraction.id,
                "document_type": document_type,
                "classification_score": classification.confidence,
                "confidence": extraction.confidence,
                "extracted_fields": extraction.extracted_fields,
                "validation_status": extraction.validation_status,
                "validation_errors": extraction.validation_errors,
            }),
            ruleset_version: extraction.ruleset_version.clone(),
        };
        let decision = self
            .recorder
            .record(draft, attempt)
            .map_err(PipelineError::Recorder)?;
        progress.decision_id = Some(decision.id.clone());

        if decision.decision == DecisionValue::Approved {
            progress.stage = PipelineStage::UpdateDocument;
            document.status = DocumentStatus::Approved;
            document.reviewed_at = Some(Utc::now());
            self.store
                .update_document(document.clone())
                .map_err(PipelineError::repository(PipelineStage::UpdateDocument))?;
        }

        let review_item = if decision.decision == DecisionValue::NeedsReview {
            progress.stage = PipelineStage::EnqueueReview;
            let priority = if extraction
                .validation_errors
                .iter()
                .any(|code| code == OUT_OF_STATE || code == MISSING_STATE)
            {
                PRIORITY_ELEVATED
            } else {
                PRIORITY_DEFAULT
            };
            let item = self
                .reviews
                .raise(ReviewRequest {
                    queue: QueueType::DocumentReview,
                    subject: Subject::document(&document.id),
                    priority,
                    reasons: extraction.validation_errors.clone(),
                    confidence: Some(extraction.confidence),
                    metadata: json!({
                        "document_type": document_type,
                        "extraction_id": extraction.id,
                        "decision_id": decision.id,
                    }),
                })
                .map_err(PipelineError::repository(PipelineStage::EnqueueReview))?;
            Some(item)
        } else {
            None
        };

        progress.stage = PipelineStage::AppendAudit;
        self.audit
            .append(AuditEvent {
                action: "document_processed".to_string(),
                subject: Subject::document(&document.id),
                actor: self.settings.actor.clone(),
                metadata: json!({
                    "document_type": document_type,
                    "decision": decision.decision,
                    "reason_codes": decision.reason_codes,
                    "confidence": extraction.confidence,
                    "extraction_id": extraction.id,
                    "decision_id": decision.id,
                    "review_queue_id": review_item.as_ref().map(|item| item.id.clone()),
                }),
                created_at: Utc::now(),
            })
            .map_err(PipelineError::Audit)?;

        info!(
            document_type = document_type.label(),
            decision = decision.decision.label(),
            confidence = extraction.confidence,
            "document processed"
        );

        Ok(DocumentOutcome {
            document,
            extraction,
            decision,
            review_item,
        })
    }

    /// Bounded retry for idempotent reads. Permanent errors return immediately.
    fn retry<T, E, F>(
        &self,
        stage: PipelineStage,
        transient: fn(&E) -> bool,
        mut operation: F,
    ) -> Result<T, E>
    where
        E: fmt::Display,
        F: FnMut() -> Result<T, E>,
    {
        let attempts = self.settings.retry_attempts.max(1);
        let mut attempt = 1;
        loop {
            match operation() {
                Ok(value) => return Ok(value),
                Err(error) if attempt < attempts && transient(&error) => {
                    warn!(
                        stage = %stage,
                        attempt,
                        max_attempts = attempts,
                        error = %error,
                        "retrying pipeline stage"
                    );
                    attempt += 1;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn report_incomplete(
        &self,
        document_id: &DocumentId,
        progress: &RunProgress,
        error: &PipelineError,
    ) {
        let event = AuditEvent {
            action: "document_processing_incomplete".to_string(),
            subject: Subject::document(document_id),
            actor: self.settings.actor.clone(),
            metadata: json!({
                "failed_stage": error.stage(),
                "reached_stage": progress.stage,
                "extraction_id": progress.extraction_id,
                "decision_id": progress.decision_id,
                "error": error.to_string(),
            }),
            created_at: Utc::now(),
        };

        if let Err(audit_error) = self.audit.append(event) {
            warn!(error = %audit_error, "unable to audit incomplete document run");
        }
    }
}
