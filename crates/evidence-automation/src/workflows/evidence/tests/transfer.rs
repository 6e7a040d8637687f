use super::common::*;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde_json::json;

use crate::workflows::evidence::domain::{
    DecisionValue, Document, DocumentId, QueueType, Subject, SubjectKind, TransferHoursStatus,
    PRIORITY_DEFAULT, PRIORITY_ELEVATED,
};
use crate::workflows::evidence::extraction::PlainTextExtractor;
use crate::workflows::evidence::memory::{
    MemoryAuditSink, MemoryDocumentStorage, MemoryEvidenceStore,
};
use crate::workflows::evidence::repository::EvidenceStore;
use crate::workflows::evidence::service::{
    EvidenceProcessor, FailureKind, PipelineSettings, PipelineStage,
};
use crate::workflows::evidence::transfer::{
    TransferHoursRequest, AUTO_APPROVAL_GATES_PASSED, LOW_CONFIDENCE, STATE_NOT_APPROVED,
    VALIDATION_NOT_PASSED,
};

fn request(document_id: &DocumentId) -> TransferHoursRequest {
    TransferHoursRequest {
        user_id: "user-42".to_string(),
        document_id: document_id.clone(),
        application_id: Some("app-7".to_string()),
        enrollment_id: None,
    }
}

#[test]
fn in_state_transcript_is_credited_automatically() {
    let harness = Harness::new();
    let document_id = harness.upload("doc-hours", &transcript_text("IN"));

    let result = harness.processor.process_transfer_hours(&request(&document_id));

    assert!(result.success);
    assert_eq!(result.decision, Some(DecisionValue::Approved));
    let transfer = result.transfer_hours.expect("transfer outcome present");
    assert!(transfer.auto_approved);
    assert_eq!(transfer.status, TransferHoursStatus::Approved);
    assert_eq!(transfer.total_hours, Some(1200.0));
    assert_eq!(transfer.approved_hours, Some(1200.0));
    assert!(transfer.review_queue_id.is_none());

    let rows = harness.store.transfer_hours().expect("rows readable");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].user_id, "user-42");
    assert_eq!(rows[0].application_id.as_deref(), Some("app-7"));
    assert_eq!(rows[0].source_state.as_deref(), Some("IN"));
    assert_eq!(
        rows[0].source_institution.as_deref(),
        Some("ACADEMY OF BARBERING")
    );
    assert_eq!(Some(rows[0].decision_id.clone()), result.decision_id);

    let decisions = harness.decisions(&Subject::transfer_hours(&transfer.transfer_hours_id));
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].subject.kind, SubjectKind::TransferHours);
    assert_eq!(decisions[0].decision, DecisionValue::Approved);
    assert_eq!(
        decisions[0].reason_codes,
        vec![AUTO_APPROVAL_GATES_PASSED.to_string()]
    );
    assert_eq!(
        harness.actions(),
        vec![
            "document_processed".to_string(),
            "transfer_hours_evaluated".to_string()
        ]
    );
}

#[test]
fn out_of_state_transcript_goes_to_priority_review() {
    let harness = Harness::new();
    let document_id = harness.upload("doc-hours-oh", &transcript_text("OH"));

    let result = harness.processor.process_transfer_hours(&request(&document_id));

    assert!(result.success);
    assert_eq!(result.decision, Some(DecisionValue::Rejected));
    let transfer = result.transfer_hours.expect("transfer outcome present");
    assert!(!transfer.auto_approved);
    assert_eq!(transfer.status, TransferHoursStatus::PendingReview);
    assert_eq!(transfer.approved_hours, None);
    assert!(!transfer.gates.state_approved);
    assert!(transfer.gates.hours_within_cap);

    let items = harness.open_items(QueueType::TranscriptReview);
    assert_eq!(items.len(), 1);
    assert_eq!(Some(items[0].id.clone()), transfer.review_queue_id);
    assert_eq!(items[0].priority, PRIORITY_ELEVATED);
    assert_eq!(
        items[0].reasons,
        vec![
            STATE_NOT_APPROVED.to_string(),
            VALIDATION_NOT_PASSED.to_string()
        ]
    );

    let decisions = harness.decisions(&Subject::transfer_hours(&transfer.transfer_hours_id));
    assert_eq!(decisions[0].decision, DecisionValue::NeedsReview);
}

#[test]
fn low_confidence_scan_needs_review_at_default_priority() {
    let harness = Harness::with_confidence(0.6);
    let document_id = harness.upload("doc-hours-blurry", &transcript_text("IN"));

    let result = harness.processor.process_transfer_hours(&request(&document_id));

    let transfer = result.transfer_hours.expect("transfer outcome present");
    assert!(!transfer.auto_approved);
    assert!(!transfer.gates.confidence_met);
    assert!(transfer.gates.validation_passed);

    let items = harness.open_items(QueueType::TranscriptReview);
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].priority, PRIORITY_DEFAULT);
    assert_eq!(items[0].reasons, vec![LOW_CONFIDENCE.to_string()]);
    assert_eq!(items[0].metadata["confidence"], json!(0.6));
    assert_eq!(
        items[0].metadata["system_recommendation"],
        json!("manual_review_required")
    );
}

#[test]
fn non_transcript_is_refused_after_document_run() {
    let harness = Harness::new();
    let document_id = harness.upload("doc-not-hours", &insurance_text("2099-01-01"));

    let result = harness.processor.process_transfer_hours(&request(&document_id));

    assert!(!result.success);
    assert_eq!(result.failure, Some(FailureKind::InvalidSubject));
    assert_eq!(result.failed_stage, Some(PipelineStage::Classify));
    assert!(result.decision_id.is_some(), "document decision stays referenced");
    assert!(result.transfer_hours.is_none());
    assert!(harness.store.transfer_hours().expect("rows readable").is_empty());
}

#[test]
fn missing_transcript_is_not_found() {
    let harness = Harness::new();

    let result = harness
        .processor
        .process_transfer_hours(&request(&DocumentId::from("doc-nowhere")));

    assert!(!result.success);
    assert!(result.is_not_found());
    assert!(harness
        .store
        .all_decisions()
        .expect("decisions readable")
        .is_empty());
}

#[test]
fn unstored_transfer_row_gets_no_decision() {
    let store = Arc::new(FaultyStore::new(MemoryEvidenceStore::with_rulesets(rulesets())));
    store.transfer_hours_down.store(true, Ordering::SeqCst);
    let storage = Arc::new(MemoryDocumentStorage::default());
    storage.put("uploads/doc-hours.txt", transcript_text("IN"));
    let document_id = DocumentId::from("doc-hours");
    store
        .inner
        .insert_document(Document::pending(document_id.clone(), "uploads/doc-hours.txt"))
        .expect("document inserted");
    let processor = EvidenceProcessor::new(
        store.clone(),
        Arc::new(MemoryAuditSink::default()),
        storage,
        Arc::new(PlainTextExtractor::new(0.9)),
        PipelineSettings::default(),
    );

    let result = processor.process_transfer_hours(&request(&document_id));

    assert!(!result.success);
    assert_eq!(result.failed_stage, Some(PipelineStage::PersistExtraction));
    assert_eq!(result.failure, Some(FailureKind::Storage));
    assert_eq!(result.decision, Some(DecisionValue::Approved));
    assert!(result.transfer_hours.is_none());

    let decisions = store.all_decisions().expect("decisions readable");
    assert_eq!(decisions.len(), 1);
    assert_eq!(decisions[0].subject.kind, SubjectKind::Document);
    assert_eq!(Some(decisions[0].id.clone()), result.decision_id);
    assert!(store.inner.transfer_hours().expect("rows readable").is_empty());
}
