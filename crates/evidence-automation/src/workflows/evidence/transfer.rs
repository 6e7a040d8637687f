use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::domain::{
    AuditEvent, DecisionId, DecisionValue, DocumentExtraction, DocumentId, DocumentType,
    QueueType, ReviewItemId, Subject, TransferHours, TransferHoursId, TransferHoursStatus,
    ValidationStatus, PRIORITY_DEFAULT, PRIORITY_ELEVATED,
};
use super::recorder::{DecisionDraft, ProcessingAttempt};
use super::repository::{AuditSink, EvidenceStore};
use super::review::ReviewRequest;
use super::ruleset::{RulesetRules, TRANSCRIPT_APPROVAL};
use super::service::{EvidenceProcessor, PipelineError, PipelineStage, ProcessingResult};
use super::validation::{parse_hours, ValidationContext};

pub const DEFAULT_MAX_TRANSFER_HOURS: f64 = 1000.0;
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.85;

pub const AUTO_APPROVAL_GATES_PASSED: &str = "AUTO_APPROVAL_GATES_PASSED";
pub const STATE_NOT_APPROVED: &str = "STATE_NOT_APPROVED";
pub const HOURS_OVER_CAP: &str = "HOURS_OVER_CAP";
pub const HOURS_UNREADABLE: &str = "HOURS_UNREADABLE";
pub const LOW_CONFIDENCE: &str = "LOW_CONFIDENCE";
pub const VALIDATION_NOT_PASSED: &str = "VALIDATION_NOT_PASSED";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferHoursRequest {
    pub user_id: String,
    pub document_id: DocumentId,
    #[serde(default)]
    pub application_id: Option<String>,
    #[serde(default)]
    pub enrollment_id: Option<String>,
}

/// The auto-approval gates for a transcript, kept for the decision snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferGates {
    pub state: Option<String>,
    pub state_approved: bool,
    pub hours: Option<f64>,
    pub max_hours: f64,
    pub hours_within_cap: bool,
    pub confidence: f64,
    pub min_confidence: f64,
    pub confidence_met: bool,
    pub validation_passed: bool,
}

impl TransferGates {
    pub fn auto_approved(&self) -> bool {
        self.state_approved && self.hours_within_cap && self.confidence_met && self.validation_passed
    }

    pub fn reason_codes(&self) -> Vec<String> {
        if self.auto_approved() {
            return vec![AUTO_APPROVAL_GATES_PASSED.to_string()];
        }

        let mut codes = Vec::new();
        if !self.state_approved {
            codes.push(STATE_NOT_APPROVED);
        }
        if self.hours.is_none() {
            codes.push(HOURS_UNREADABLE);
        } else if !self.hours_within_cap {
            codes.push(HOURS_OVER_CAP);
        }
        if !self.confidence_met {
            codes.push(LOW_CONFIDENCE);
        }
        if !self.validation_passed {
            codes.push(VALIDATION_NOT_PASSED);
        }
        codes.into_iter().map(str::to_string).collect()
    }
}

/// A transcript with no stated state, or a ruleset with no state list, never clears the
/// state gate.
pub fn evaluate_gates(extraction: &DocumentExtraction, rules: &RulesetRules) -> TransferGates {
    let state = extraction
        .extracted_fields
        .get("state")
        .map(|state| state.trim().to_ascii_uppercase())
        .filter(|state| !state.is_empty());
    let state_approved = state
        .as_deref()
        .and_then(|state| rules.state_approved(state))
        .unwrap_or(false);

    let hours = extraction
        .extracted_fields
        .get("total_hours")
        .and_then(|raw| parse_hours(raw));
    let max_hours = rules.max_transfer_hours.unwrap_or(DEFAULT_MAX_TRANSFER_HOURS);
    let min_confidence = rules.min_confidence.unwrap_or(DEFAULT_MIN_CONFIDENCE);

    TransferGates {
        state,
        state_approved,
        hours,
        max_hours,
        hours_within_cap: hours.map(|hours| hours <= max_hours).unwrap_or(false),
        confidence: extraction.confidence,
        min_confidence,
        confidence_met: extraction.confidence >= min_confidence,
        validation_passed: extraction.validation_status == ValidationStatus::Passed,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransferHoursOutcome {
    pub transfer_hours_id: TransferHoursId,
    pub status: TransferHoursStatus,
    pub auto_approved: bool,
    pub total_hours: Option<f64>,
    pub approved_hours: Option<f64>,
    pub decision_id: DecisionId,
    pub review_queue_id: Option<ReviewItemId>,
    pub gates: TransferGates,
}

impl<S, A> EvidenceProcessor<S, A>
where
    S: EvidenceStore + 'static,
    A: AuditSink + 'static,
{
    /// Run a transcript through the document pipeline, then decide whether its hours can
    /// be credited without a reviewer.
    pub fn process_transfer_hours(&self, request: &TransferHoursRequest) -> ProcessingResult {
        let attempt = ProcessingAttempt::begin();
        let outcome = match self.run(&request.document_id, &attempt, &ValidationContext::default())
        {
            Ok(outcome) => outcome,
            Err(failure) => return ProcessingResult::stopped(&request.document_id, &failure),
        };

        let result = ProcessingResult::completed(&outcome);
        if outcome.extraction.document_type != DocumentType::Transcript {
            let error = PipelineError::NotTranscript {
                document_id: request.document_id.clone(),
                document_type: outcome.extraction.document_type,
            };
            return result.interrupted(&error);
        }

        match self.credit_hours(request, &outcome.extraction, &outcome.decision.id, &attempt) {
            Ok(transfer) => ProcessingResult {
                transfer_hours: Some(transfer),
                ..result
            },
            Err(error) => result.interrupted(&error),
        }
    }

    fn credit_hours(
        &self,
        request: &TransferHoursRequest,
        extraction: &DocumentExtraction,
        document_decision_id: &DecisionId,
        attempt: &ProcessingAttempt,
    ) -> Result<TransferHoursOutcome, PipelineError> {
        let ruleset = self
            .store()
            .active_ruleset(TRANSCRIPT_APPROVAL)
            .map_err(PipelineError::repository(PipelineStage::Validate))?;
        let default_rules = RulesetRules::default();
        let rules = ruleset
            .as_ref()
            .map(|ruleset| &ruleset.rules)
            .unwrap_or(&default_rules);

        let gates = evaluate_gates(extraction, rules);
        let auto_approved = gates.auto_approved();
        let transfer_hours_id = TransferHoursId::generate();
        let subject = Subject::transfer_hours(&transfer_hours_id);

        // Stored before its decision: every transfer_hours decision names an existing row.
        let approved_hours = if auto_approved { gates.hours } else { None };
        let status = if auto_approved {
            TransferHoursStatus::Approved
        } else {
            TransferHoursStatus::PendingReview
        };

        self.store()
            .insert_transfer_hours(TransferHours {
                id: transfer_hours_id.clone(),
                user_id: request.user_id.clone(),
                application_id: request.application_id.clone(),
                enrollment_id: request.enrollment_id.clone(),
                source_institution: extraction.extracted_fields.get("school_name").cloned(),
                source_state: gates.state.clone(),
                total_hours: gates.hours,
                approved_hours,
                document_id: request.document_id.clone(),
                extraction_id: extraction.id.clone(),
                decision_id: document_decision_id.clone(),
                status,
                auto_approved,
                created_at: Utc::now(),
            })
            .map_err(PipelineError::repository(PipelineStage::PersistExtraction))?;

        let decision = self
            .recorder()
            .record(
                DecisionDraft {
                    subject: subject.clone(),
                    decision: if auto_approved {
                        DecisionValue::Approved
                    } else {
                        DecisionValue::NeedsReview
                    },
                    reason_codes: gates.reason_codes(),
                    input_snapshot: json!({
                        "user_id": request.user_id,
                        "document_id": request.document_id,
                        "extraction_id": extraction.id,
                        "document_decision_id": document_decision_id,
                        "gates": gates,
                    }),
                    ruleset_version: ruleset.as_ref().map(|ruleset| ruleset.version.clone()),
                },
                attempt,
            )
            .map_err(PipelineError::Recorder)?;

        let review_queue_id = if auto_approved {
            None
        } else {
            let priority = if gates.state_approved {
                PRIORITY_DEFAULT
            } else {
                PRIORITY_ELEVATED
            };
            let item = self
                .reviews()
                .enqueue(ReviewRequest {
                    queue: QueueType::TranscriptReview,
                    subject: subject.clone(),
                    priority,
                    reasons: decision.reason_codes.clone(),
                    confidence: Some(extraction.confidence),
                    metadata: json!({
                        "user_id": request.user_id,
                        "document_id": request.document_id,
                        "total_hours": gates.hours,
                        "source_state": gates.state,
                    }),
                })
                .map_err(PipelineError::repository(PipelineStage::EnqueueReview))?;
            Some(item.id)
        };

        self.audit()
            .append(AuditEvent {
                action: "transfer_hours_evaluated".to_string(),
                subject,
                actor: self.settings().actor.clone(),
                metadata: json!({
                    "auto_approved": auto_approved,
                    "total_hours": gates.hours,
                    "approved_hours": approved_hours,
                    "decision_id": decision.id,
                    "review_queue_id": review_queue_id,
                }),
                created_at: Utc::now(),
            })
            .map_err(PipelineError::Audit)?;

        info!(
            transfer_hours_id = %transfer_hours_id,
            auto_approved,
            hours = ?gates.hours,
            "transfer hours evaluated"
        );

        Ok(TransferHoursOutcome {
            transfer_hours_id,
            status,
            auto_approved,
            total_hours: gates.hours,
            approved_hours,
            decision_id: decision.id,
            review_queue_id,
            gates,
        })
    }
}
