use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{Duration, NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, info_span, warn};

use super::domain::{
    AuditEvent, DecisionId, DecisionValue, DocumentId, DocumentType, MouStatus, Partner,
    PartnerDocument,
    PartnerDocumentStatus, PartnerId, PartnerStatus, ProgramHolder, QueueType, ReviewItemId,
    Subject, PRIORITY_DEFAULT, PRIORITY_ELEVATED,
};
use super::recorder::{DecisionDraft, ProcessingAttempt, RecorderError};
use super::repository::{AuditError, AuditSink, EvidenceStore, RepositoryError};
use super::review::ReviewRequest;
use super::ruleset::{RulesetRules, PARTNER_APPROVAL};
use super::service::{EvidenceProcessor, FailureKind, PipelineError, ProcessingResult};
use super::validation::{parse_date, ValidationContext};

/// Partner document type whose expiry gates activation.
pub const SHOP_LICENSE: &str = "shop_license";
/// Days before expiry at which a valid license is flagged.
pub const LICENSE_WARNING_DAYS: i64 = 30;

pub const MISSING_DOCUMENTS: &str = "MISSING_DOCUMENTS";
pub const PENDING_DOCUMENTS: &str = "PENDING_DOCUMENTS";
pub const REJECTED_DOCUMENTS: &str = "REJECTED_DOCUMENTS";
pub const MOU_NOT_EXECUTED: &str = "MOU_NOT_EXECUTED";
pub const LICENSE_EXPIRED: &str = "LICENSE_EXPIRED";
pub const LICENSE_NOT_VERIFIED: &str = "LICENSE_NOT_VERIFIED";
pub const LICENSE_EXPIRING_SOON: &str = "LICENSE_EXPIRING_SOON";
pub const REQUIREMENTS_NOT_CONFIGURED: &str = "REQUIREMENTS_NOT_CONFIGURED";
pub const ALL_REQUIREMENTS_MET: &str = "ALL_REQUIREMENTS_MET";
pub const DOCUMENT_TYPE_MISMATCH: &str = "DOCUMENT_TYPE_MISMATCH";

/// Classifier type a checklist slot must hold. Slots with no classifier counterpart
/// take whatever the pipeline decided.
pub fn expected_document_type(slot_type: &str) -> Option<DocumentType> {
    match slot_type.trim().to_ascii_lowercase().as_str() {
        SHOP_LICENSE | "license" | "barber_license" => Some(DocumentType::License),
        "insurance" | "liability_insurance" => Some(DocumentType::Insurance),
        "mou" => Some(DocumentType::Mou),
        "w2" => Some(DocumentType::W2),
        _ => None,
    }
}

/// Required document types grouped by where each one stands.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentPartition {
    pub missing: Vec<String>,
    pub pending: Vec<String>,
    pub failed: Vec<String>,
    pub accepted: Vec<String>,
}

impl DocumentPartition {
    pub fn complete(&self) -> bool {
        self.missing.is_empty() && self.pending.is_empty() && self.failed.is_empty()
    }
}

/// Classify each required type: accepted if any upload of that type was accepted, else
/// pending if one awaits review, else failed when every upload was rejected.
pub fn partition_documents(required: &[String], documents: &[PartnerDocument]) -> DocumentPartition {
    let mut partition = DocumentPartition::default();

    for document_type in required {
        let statuses: Vec<PartnerDocumentStatus> = documents
            .iter()
            .filter(|document| document.document_type.eq_ignore_ascii_case(document_type))
            .map(|document| document.status)
            .collect();

        let bucket = if statuses.is_empty() {
            &mut partition.missing
        } else if statuses.contains(&PartnerDocumentStatus::Accepted) {
            &mut partition.accepted
        } else if statuses.contains(&PartnerDocumentStatus::Pending) {
            &mut partition.pending
        } else {
            &mut partition.failed
        };
        bucket.push(document_type.clone());
    }

    partition
}

/// Status a partner falls back to when it cannot be activated.
pub fn aggregate_status(partition: &DocumentPartition) -> PartnerStatus {
    if !partition.failed.is_empty() {
        PartnerStatus::ActionRequired
    } else if !partition.missing.is_empty() || !partition.pending.is_empty() {
        PartnerStatus::PendingDocuments
    } else {
        PartnerStatus::UnderReview
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LicenseCheck {
    NotRequired,
    Valid {
        expires: NaiveDate,
        expiring_soon: bool,
    },
    Expired {
        expired_on: NaiveDate,
    },
    NotVerified,
}

impl LicenseCheck {
    pub fn passes(&self) -> bool {
        matches!(self, Self::NotRequired | Self::Valid { .. })
    }

    pub fn expiring_soon(&self) -> bool {
        matches!(
            self,
            Self::Valid {
                expiring_soon: true,
                ..
            }
        )
    }
}

/// Judge the latest expiry among accepted shop licenses.
pub fn check_license(documents: &[PartnerDocument], today: NaiveDate) -> LicenseCheck {
    let latest = documents
        .iter()
        .filter(|document| document.document_type.eq_ignore_ascii_case(SHOP_LICENSE))
        .filter(|document| document.status == PartnerDocumentStatus::Accepted)
        .filter_map(|document| document.expiration_date)
        .max();

    match latest {
        None => LicenseCheck::NotVerified,
        Some(expires) if expires < today => LicenseCheck::Expired {
            expired_on: expires,
        },
        Some(expires) => LicenseCheck::Valid {
            expires,
            expiring_soon: expires <= today + Duration::days(LICENSE_WARNING_DAYS),
        },
    }
}

/// Everything the approval rule looks at, computed without side effects.
#[derive(Debug, Clone, Serialize)]
pub struct PartnerChecklist {
    pub partner_id: PartnerId,
    pub program_id: String,
    pub state: String,
    pub partner_status: PartnerStatus,
    pub required_documents: Vec<String>,
    pub documents: DocumentPartition,
    pub mou_status: Option<MouStatus>,
    pub mou_required: bool,
    pub license: LicenseCheck,
    pub ruleset_version: Option<String>,
    pub ready_for_auto_approval: bool,
    /// Reason codes the approval check would record right now.
    pub blockers: Vec<String>,
}

impl PartnerChecklist {
    fn mou_ok(&self) -> bool {
        !self.mou_required || self.mou_status == Some(MouStatus::FullyExecuted)
    }

    fn reason_codes(&self) -> Vec<String> {
        let mut codes = Vec::new();
        if self.ready_for_auto_approval {
            codes.push(ALL_REQUIREMENTS_MET);
        } else {
            if self.required_documents.is_empty() {
                codes.push(REQUIREMENTS_NOT_CONFIGURED);
            }
            if !self.documents.missing.is_empty() {
                codes.push(MISSING_DOCUMENTS);
            }
            if !self.documents.pending.is_empty() {
                codes.push(PENDING_DOCUMENTS);
            }
            if !self.documents.failed.is_empty() {
                codes.push(REJECTED_DOCUMENTS);
            }
            if !self.mou_ok() {
                codes.push(MOU_NOT_EXECUTED);
            }
            match self.license {
                LicenseCheck::Expired { .. } => codes.push(LICENSE_EXPIRED),
                LicenseCheck::NotVerified => codes.push(LICENSE_NOT_VERIFIED),
                LicenseCheck::NotRequired | LicenseCheck::Valid { .. } => {}
            }
        }
        if self.license.expiring_soon() {
            codes.push(LICENSE_EXPIRING_SOON);
        }
        codes.into_iter().map(str::to_string).collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PartnerApprovalResult {
    pub success: bool,
    pub partner_id: PartnerId,
    pub approved: bool,
    pub status: Option<PartnerStatus>,
    pub missing_documents: Vec<String>,
    pub pending_documents: Vec<String>,
    pub failed_documents: Vec<String>,
    pub reason_codes: Vec<String>,
    pub decision_id: Option<DecisionId>,
    pub review_queue_id: Option<ReviewItemId>,
    /// Pipeline result for the document that triggered this check, when there is one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<ProcessingResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl PartnerApprovalResult {
    fn failed(partner_id: &PartnerId, error: &PartnerApprovalError) -> Self {
        Self {
            success: false,
            partner_id: partner_id.clone(),
            approved: false,
            status: None,
            missing_documents: Vec::new(),
            pending_documents: Vec::new(),
            failed_documents: Vec::new(),
            reason_codes: Vec::new(),
            decision_id: None,
            review_queue_id: None,
            document: None,
            failure: Some(error.failure_kind()),
            message: Some(error.to_string()),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.failure == Some(FailureKind::NotFound)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PartnerApprovalError {
    #[error("partner {0} not found")]
    PartnerNotFound(PartnerId),
    #[error("document {document_id} is not on partner {partner_id}'s checklist")]
    DocumentNotLinked {
        partner_id: PartnerId,
        document_id: DocumentId,
    },
    #[error("document processing failed: {0}")]
    Document(#[source] PipelineError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Recorder(#[from] RecorderError),
    #[error(transparent)]
    Audit(#[from] AuditError),
}

impl PartnerApprovalError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::PartnerNotFound(_) => FailureKind::NotFound,
            Self::DocumentNotLinked { .. } => FailureKind::InvalidSubject,
            Self::Document(error) => error.failure_kind(),
            Self::Repository(RepositoryError::NotFound) => FailureKind::NotFound,
            Self::Repository(_) | Self::Recorder(_) | Self::Audit(_) => FailureKind::Storage,
        }
    }
}

/// One writer per partner id at a time. Concurrent intakes for the same partner queue up
/// here so each re-evaluation sees the previous one's writes.
#[derive(Debug, Default)]
pub struct PartnerLocks {
    slots: Mutex<HashMap<PartnerId, Arc<Mutex<()>>>>,
}

impl PartnerLocks {
    fn slot(&self, partner_id: &PartnerId) -> Arc<Mutex<()>> {
        let mut slots = match self.slots.lock() {
            Ok(slots) => slots,
            Err(poisoned) => poisoned.into_inner(),
        };
        slots.entry(partner_id.clone()).or_default().clone()
    }

    fn with_lock<T>(&self, partner_id: &PartnerId, work: impl FnOnce() -> T) -> T {
        let slot = self.slot(partner_id);
        // The slot guards no data, so a poisoned lock is still usable.
        let _guard = match slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        work()
    }
}

/// Partner onboarding orchestration on top of the document pipeline.
pub struct PartnerApprovalService<S, A> {
    processor: Arc<EvidenceProcessor<S, A>>,
    locks: PartnerLocks,
}

impl<S, A> PartnerApprovalService<S, A>
where
    S: EvidenceStore + 'static,
    A: AuditSink + 'static,
{
    pub fn new(processor: Arc<EvidenceProcessor<S, A>>) -> Self {
        Self {
            processor,
            locks: PartnerLocks::default(),
        }
    }

    pub fn processor(&self) -> &Arc<EvidenceProcessor<S, A>> {
        &self.processor
    }

    /// Read-only view of where a partner stands. Records nothing.
    pub fn checklist(
        &self,
        partner_id: &PartnerId,
        program_id: &str,
        state: &str,
    ) -> Result<PartnerChecklist, PartnerApprovalError> {
        let partner = self.load_partner(partner_id)?;
        self.assess(&partner, program_id, state)
    }

    pub fn check_partner_approval(
        &self,
        partner_id: &PartnerId,
        program_id: &str,
        state: &str,
    ) -> PartnerApprovalResult {
        let span = info_span!("check_partner_approval", partner_id = %partner_id);
        let _entered = span.enter();

        self.locks
            .with_lock(partner_id, || self.evaluate(partner_id, program_id, state))
            .unwrap_or_else(|error| {
                warn!(error = %error, "partner approval check failed");
                PartnerApprovalResult::failed(partner_id, &error)
            })
    }

    /// Run a newly uploaded partner document through the pipeline, carry the verdict onto
    /// its checklist slot, then re-evaluate the whole partner.
    pub fn process_partner_document(
        &self,
        partner_id: &PartnerId,
        document_id: &DocumentId,
        program_id: &str,
        state: &str,
    ) -> PartnerApprovalResult {
        let span = info_span!(
            "process_partner_document",
            partner_id = %partner_id,
            document_id = %document_id
        );
        let _entered = span.enter();

        if let Err(error) = self.linked_document(partner_id, document_id) {
            return PartnerApprovalResult::failed(partner_id, &error);
        }

        let attempt = ProcessingAttempt::begin();
        let context = ValidationContext::default().with_state(state);
        let outcome = match self.processor.run(document_id, &attempt, &context) {
            Ok(outcome) => outcome,
            Err(failure) => {
                let document = ProcessingResult::stopped(document_id, &failure);
                let error = PartnerApprovalError::Document(failure.error);
                return PartnerApprovalResult {
                    document: Some(document),
                    ..PartnerApprovalResult::failed(partner_id, &error)
                };
            }
        };
        let document_result = ProcessingResult::completed(&outcome);

        let result = self.locks.with_lock(partner_id, || -> Result<_, PartnerApprovalError> {
            let mut slot = self.linked_document(partner_id, document_id)?;
            let classified = outcome.extraction.document_type;
            // Unclassified uploads stay pending through the review queue instead.
            let mismatch = expected_document_type(&slot.document_type)
                .filter(|expected| classified != DocumentType::Unknown && *expected != classified);
            if let Some(expected) = mismatch {
                warn!(
                    slot = %slot.document_type,
                    expected = expected.label(),
                    classified = classified.label(),
                    "uploaded document does not match its checklist slot"
                );
                slot.status = PartnerDocumentStatus::Rejected;
                slot.reviewed_at = Some(Utc::now());
                slot.notes = Some(DOCUMENT_TYPE_MISMATCH.to_string());
                self.processor.store().update_partner_document(slot)?;
                return self.evaluate(partner_id, program_id, state);
            }

            match outcome.decision.decision {
                DecisionValue::Approved => {
                    slot.status = PartnerDocumentStatus::Accepted;
                    slot.reviewed_at = Some(Utc::now());
                    slot.notes = None;
                }
                DecisionValue::Rejected => {
                    slot.status = PartnerDocumentStatus::Rejected;
                    slot.reviewed_at = Some(Utc::now());
                    slot.notes = Some(outcome.extraction.validation_errors.join(", "));
                }
                _ => {
                    slot.status = PartnerDocumentStatus::Pending;
                    slot.notes = Some(outcome.extraction.validation_errors.join(", "));
                }
            }
            if let Some(expires) = outcome
                .extraction
                .extracted_fields
                .get("expiration_date")
                .and_then(|raw| parse_date(raw))
            {
                slot.expiration_date = Some(expires);
            }
            self.processor.store().update_partner_document(slot)?;

            self.evaluate(partner_id, program_id, state)
        });

        match result {
            Ok(result) => PartnerApprovalResult {
                document: Some(document_result),
                ..result
            },
            Err(error) => PartnerApprovalResult {
                document: Some(document_result),
                ..PartnerApprovalResult::failed(partner_id, &error)
            },
        }
    }

    /// Store a new MOU state for the partner's program and re-evaluate.
    pub fn record_mou_signature(
        &self,
        partner_id: &PartnerId,
        program_id: &str,
        state: &str,
        mou_status: MouStatus,
    ) -> PartnerApprovalResult {
        let result = self.locks.with_lock(partner_id, || -> Result<_, PartnerApprovalError> {
            self.load_partner(partner_id)?;
            self.processor.store().upsert_program_holder(ProgramHolder {
                partner_id: partner_id.clone(),
                program_id: program_id.to_string(),
                mou_status,
            })?;
            info!(partner_id = %partner_id, ?mou_status, "mou status recorded");
            self.evaluate(partner_id, program_id, state)
        });

        result.unwrap_or_else(|error| PartnerApprovalResult::failed(partner_id, &error))
    }

    fn load_partner(&self, partner_id: &PartnerId) -> Result<Partner, PartnerApprovalError> {
        self.processor
            .store()
            .fetch_partner(partner_id)?
            .ok_or_else(|| PartnerApprovalError::PartnerNotFound(partner_id.clone()))
    }

    fn linked_document(
        &self,
        partner_id: &PartnerId,
        document_id: &DocumentId,
    ) -> Result<PartnerDocument, PartnerApprovalError> {
        self.load_partner(partner_id)?;
        self.processor
            .store()
            .partner_documents(partner_id)?
            .into_iter()
            .find(|slot| slot.document_id.as_ref() == Some(document_id))
            .ok_or_else(|| PartnerApprovalError::DocumentNotLinked {
                partner_id: partner_id.clone(),
                document_id: document_id.clone(),
            })
    }

    fn assess(
        &self,
        partner: &Partner,
        program_id: &str,
        state: &str,
    ) -> Result<PartnerChecklist, PartnerApprovalError> {
        let store = self.processor.store();
        let documents = store.partner_documents(&partner.id)?;
        let ruleset = store.active_ruleset(PARTNER_APPROVAL)?;
        let default_rules = RulesetRules::default();
        let rules = ruleset
            .as_ref()
            .map(|ruleset| &ruleset.rules)
            .unwrap_or(&default_rules);

        let mut required_documents = store.required_documents(program_id, state)?;
        if required_documents.is_empty() {
            required_documents = rules.required_documents.clone().unwrap_or_default();
        }

        let partition = partition_documents(&required_documents, &documents);
        let mou_status = store
            .program_holder(&partner.id, program_id)?
            .map(|holder| holder.mou_status);
        let license = if rules.license_must_be_valid {
            check_license(&documents, Utc::now().date_naive())
        } else {
            LicenseCheck::NotRequired
        };

        let mut checklist = PartnerChecklist {
            partner_id: partner.id.clone(),
            program_id: program_id.to_string(),
            state: state.to_string(),
            partner_status: partner.status,
            required_documents,
            documents: partition,
            mou_status,
            mou_required: rules.mou_must_be_signed,
            license,
            ruleset_version: ruleset.as_ref().map(|ruleset| ruleset.version.clone()),
            ready_for_auto_approval: false,
            blockers: Vec::new(),
        };
        checklist.ready_for_auto_approval = !checklist.required_documents.is_empty()
            && checklist.documents.complete()
            && checklist.mou_ok()
            && checklist.license.passes();
        checklist.blockers = checklist.reason_codes();

        Ok(checklist)
    }

    /// Caller holds the partner's lock.
    fn evaluate(
        &self,
        partner_id: &PartnerId,
        program_id: &str,
        state: &str,
    ) -> Result<PartnerApprovalResult, PartnerApprovalError> {
        let attempt = ProcessingAttempt::begin();
        let store = self.processor.store();
        let mut partner = self.load_partner(partner_id)?;
        let checklist = self.assess(&partner, program_id, state)?;
        let approved = checklist.ready_for_auto_approval;
        let reason_codes = checklist.blockers.clone();

        let decision = self.processor.recorder().record(
            DecisionDraft {
                subject: Subject::partner(partner_id),
                decision: if approved {
                    DecisionValue::Approved
                } else {
                    DecisionValue::NeedsReview
                },
                reason_codes: reason_codes.clone(),
                input_snapshot: json!({
                    "program_id": program_id,
                    "state": state,
                    "checklist": checklist,
                }),
                ruleset_version: checklist.ruleset_version.clone(),
            },
            &attempt,
        )?;

        let next_status = if approved {
            PartnerStatus::Active
        } else {
            aggregate_status(&checklist.documents)
        };
        if partner.status != next_status {
            let expected_version = partner.version;
            partner.status = next_status;
            if approved {
                partner.approved_at = Some(Utc::now());
                partner.auto_approved = true;
            } else {
                partner.approved_at = None;
                partner.auto_approved = false;
            }
            partner = store.update_partner(partner, expected_version)?;
        }

        let needs_documents =
            !checklist.documents.pending.is_empty() || !checklist.documents.missing.is_empty();
        let review_queue_id = if !approved && needs_documents {
            let priority = if checklist.documents.failed.is_empty() {
                PRIORITY_DEFAULT
            } else {
                PRIORITY_ELEVATED
            };
            let item = self.processor.reviews().raise(ReviewRequest {
                queue: QueueType::PartnerDocsReview,
                subject: Subject::partner(partner_id),
                priority,
                reasons: reason_codes.clone(),
                confidence: None,
                metadata: json!({
                    "program_id": program_id,
                    "state": state,
                    "missing_documents": checklist.documents.missing,
                    "pending_documents": checklist.documents.pending,
                    "failed_documents": checklist.documents.failed,
                    "decision_id": decision.id,
                }),
            })?;
            Some(item.id)
        } else {
            None
        };

        let action = if approved {
            "partner_auto_approved"
        } else {
            "partner_review_required"
        };
        self.processor.audit().append(AuditEvent {
            action: action.to_string(),
            subject: Subject::partner(partner_id),
            actor: self.processor.settings().actor.clone(),
            metadata: json!({
                "program_id": program_id,
                "state": state,
                "status": partner.status,
                "reason_codes": reason_codes,
                "decision_id": decision.id,
                "review_queue_id": review_queue_id,
                "processing_time_ms": attempt.elapsed_ms(),
            }),
            created_at: Utc::now(),
        })?;

        info!(
            approved,
            status = partner.status.label(),
            reasons = ?reason_codes,
            "partner approval evaluated"
        );

        Ok(PartnerApprovalResult {
            success: true,
            partner_id: partner_id.clone(),
            approved,
            status: Some(partner.status),
            missing_documents: checklist.documents.missing,
            pending_documents: checklist.documents.pending,
            failed_documents: checklist.documents.failed,
            reason_codes,
            decision_id: Some(decision.id),
            review_queue_id,
            document: None,
            failure: None,
            message: None,
        })
    }
}
