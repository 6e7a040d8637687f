use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use serde_json::json;
use tower::ServiceExt;

use super::common::*;

use crate::workflows::evidence::domain::{
    Document, MouStatus, PartnerDocumentStatus, QueueType,
};
use crate::workflows::evidence::extraction::PlainTextExtractor;
use crate::workflows::evidence::memory::{
    MemoryAuditSink, MemoryDocumentStorage, MemoryEvidenceStore,
};
use crate::workflows::evidence::router;
use crate::workflows::evidence::service::{EvidenceProcessor, PipelineSettings};
use crate::workflows::evidence::EvidenceServices;

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request builds")
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .expect("request builds")
}

#[tokio::test]
async fn rejected_document_is_still_a_successful_call() {
    let harness = Harness::new();
    let document_id = harness.upload("doc-oh", &transcript_text("OH"));

    let response = router::process_document_handler::<_, MemoryAuditSink>(
        State(harness.services()),
        Path(document_id.0.clone()),
    )
    .await;

    assert_status(&response, StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["success"], true);
    assert_eq!(payload["decision"], "rejected");
    assert_eq!(payload["document_type"], "transcript");
    assert_eq!(payload["errors"], json!(["OUT_OF_STATE"]));
}

#[tokio::test]
async fn missing_document_maps_to_not_found() {
    let harness = Harness::new();

    let response = harness
        .router()
        .oneshot(json_request(
            "POST",
            "/api/v1/documents/doc-ghost/process",
            json!({}),
        ))
        .await
        .expect("route executes");

    assert_status(&response, StatusCode::NOT_FOUND);
    let payload = read_json_body(response).await;
    assert_eq!(payload["success"], false);
    assert_eq!(payload["failure"], "not_found");
    assert_eq!(payload["failed_stage"], "load_document");
}

#[tokio::test]
async fn decision_outage_maps_to_server_error() {
    let store = Arc::new(FaultyStore::decision_outage(MemoryEvidenceStore::default()));
    let storage = Arc::new(MemoryDocumentStorage::default());
    storage.put("uploads/doc-a.txt", transcript_text("IN").into_bytes());
    store
        .inner
        .insert_document(Document::pending("doc-a".into(), "uploads/doc-a.txt".to_string()))
        .expect("document inserted");
    let processor = Arc::new(EvidenceProcessor::new(
        store,
        Arc::new(MemoryAuditSink::default()),
        storage,
        Arc::new(PlainTextExtractor::new(0.9)),
        PipelineSettings::default(),
    ));
    let services = Arc::new(EvidenceServices::new(processor));

    let response = router::process_document_handler::<FaultyStore, MemoryAuditSink>(
        State(services),
        Path("doc-a".to_string()),
    )
    .await;

    assert_status(&response, StatusCode::INTERNAL_SERVER_ERROR);
    let payload = read_json_body(response).await;
    assert_eq!(payload["failed_stage"], "record_decision");
    assert!(payload["extraction_id"].is_null());
}

#[tokio::test]
async fn transfer_hours_route_returns_outcome() {
    let harness = Harness::new();
    let document_id = harness.upload("doc-hours", &transcript_text("IN"));

    let response = harness
        .router()
        .oneshot(json_request(
            "POST",
            "/api/v1/transfer-hours",
            json!({
                "user_id": "user-9",
                "document_id": document_id,
            }),
        ))
        .await
        .expect("route executes");

    assert_status(&response, StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["transfer_hours"]["auto_approved"], true);
    assert_eq!(payload["transfer_hours"]["approved_hours"], 1200.0);
}

#[tokio::test]
async fn partner_routes_report_approval_and_checklist() {
    let harness = Harness::new();
    let partner_id = onboard_partner(&harness, "partner-route");
    harness
        .store
        .upsert_partner_document(partner_document(
            &partner_id,
            "shop_license",
            PartnerDocumentStatus::Accepted,
            Some(far_future()),
        ))
        .expect("slot stored");
    set_mou(&harness, &partner_id, MouStatus::FullyExecuted);
    let router = harness.router();

    let checklist = router
        .clone()
        .oneshot(get(&format!(
            "/api/v1/partners/{partner_id}/checklist?program_id={PROGRAM}&state={STATE}"
        )))
        .await
        .expect("route executes");
    assert_status(&checklist, StatusCode::OK);
    let payload = read_json_body(checklist).await;
    assert_eq!(payload["ready_for_auto_approval"], false);
    assert_eq!(payload["documents"]["missing"], json!(["insurance"]));

    let approval = router
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/partners/{partner_id}/approval"),
            json!({ "program_id": PROGRAM, "state": STATE }),
        ))
        .await
        .expect("route executes");
    assert_status(&approval, StatusCode::OK);
    let payload = read_json_body(approval).await;
    assert_eq!(payload["approved"], false);
    assert_eq!(payload["status"], "pending_documents");
    assert!(payload["review_queue_id"].is_string());
}

#[tokio::test]
async fn unknown_partner_maps_to_not_found() {
    let harness = Harness::new();
    let router = harness.router();

    let approval = router
        .clone()
        .oneshot(json_request(
            "POST",
            "/api/v1/partners/partner-ghost/approval",
            json!({ "program_id": PROGRAM, "state": STATE }),
        ))
        .await
        .expect("route executes");
    assert_status(&approval, StatusCode::NOT_FOUND);

    let checklist = router
        .oneshot(get(&format!(
            "/api/v1/partners/partner-ghost/checklist?program_id={PROGRAM}&state={STATE}"
        )))
        .await
        .expect("route executes");
    assert_status(&checklist, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unlinked_partner_document_is_a_server_error() {
    let harness = Harness::new();
    let partner_id = onboard_partner(&harness, "partner-loose");
    let document_id = harness.upload("doc-loose", &insurance_text("2099-01-01"));

    let response = router::partner_document_handler::<_, MemoryAuditSink>(
        State(harness.services()),
        Path((partner_id.0.clone(), document_id.0.clone())),
        axum::Json(
            serde_json::from_value(json!({ "program_id": PROGRAM, "state": STATE }))
                .expect("request parses"),
        ),
    )
    .await;

    assert_status(&response, StatusCode::INTERNAL_SERVER_ERROR);
    let payload = read_json_body(response).await;
    assert_eq!(payload["failure"], "invalid_subject");
}

#[tokio::test]
async fn review_queue_lists_and_resolves_items() {
    let harness = Harness::new();
    let document_id = harness.upload("doc-note", "handwritten note from the owner");
    let result = harness.processor.process_document(&document_id);
    let item_id = result.review_queue_id.expect("item queued");
    let router = harness.router();

    let listing = router
        .clone()
        .oneshot(get("/api/v1/review-queue?queue=document_review&limit=5"))
        .await
        .expect("route executes");
    assert_status(&listing, StatusCode::OK);
    let payload = read_json_body(listing).await;
    assert_eq!(payload.as_array().map(Vec::len), Some(1));
    assert_eq!(payload[0]["id"], json!(item_id));

    let resolve_uri = format!("/api/v1/review-queue/{item_id}/resolve");
    let resolved = router
        .clone()
        .oneshot(json_request(
            "POST",
            &resolve_uri,
            json!({ "reviewer": "casey", "decision": "rejected" }),
        ))
        .await
        .expect("route executes");
    assert_status(&resolved, StatusCode::OK);
    let payload = read_json_body(resolved).await;
    assert_eq!(payload["item"]["status"], "closed");
    assert_eq!(payload["decision"]["decision"], "rejected");
    assert!(harness.open_items(QueueType::DocumentReview).is_empty());

    let again = router
        .clone()
        .oneshot(json_request(
            "POST",
            &resolve_uri,
            json!({ "reviewer": "casey", "decision": "approved" }),
        ))
        .await
        .expect("route executes");
    assert_status(&again, StatusCode::CONFLICT);

    let missing = router
        .oneshot(json_request(
            "POST",
            "/api/v1/review-queue/review-ghost/resolve",
            json!({ "reviewer": "casey", "decision": "approved" }),
        ))
        .await
        .expect("route executes");
    assert_status(&missing, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn resolving_without_reviewer_is_bad_request() {
    let harness = Harness::new();
    let document_id = harness.upload("doc-note", "handwritten note from the owner");
    let item_id = harness
        .processor
        .process_document(&document_id)
        .review_queue_id
        .expect("item queued");

    let response = harness
        .router()
        .oneshot(json_request(
            "POST",
            &format!("/api/v1/review-queue/{item_id}/resolve"),
            json!({ "reviewer": "", "decision": "approved" }),
        ))
        .await
        .expect("route executes");

    assert_status(&response, StatusCode::BAD_REQUEST);
    assert_eq!(harness.review_item(&item_id).closure, None);
}
