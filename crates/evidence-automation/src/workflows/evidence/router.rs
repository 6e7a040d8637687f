use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{DocumentId, PartnerId, QueueType, ReviewItemId};
use super::partner::{PartnerApprovalService, PartnerApprovalResult};
use super::repository::{AuditSink, EvidenceStore};
use super::review::{ReviewQueueError, ReviewResolution};
use super::service::{EvidenceProcessor, FailureKind, ProcessingResult};
use super::transfer::TransferHoursRequest;

pub const DEFAULT_QUEUE_LIMIT: usize = 50;

/// Shared state behind the evidence endpoints.
pub struct EvidenceServices<S, A> {
    pub processor: Arc<EvidenceProcessor<S, A>>,
    pub partners: PartnerApprovalService<S, A>,
}

impl<S, A> EvidenceServices<S, A>
where
    S: EvidenceStore + 'static,
    A: AuditSink + 'static,
{
    pub fn new(processor: Arc<EvidenceProcessor<S, A>>) -> Self {
        Self {
            partners: PartnerApprovalService::new(processor.clone()),
            processor,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PartnerProgramRequest {
    pub program_id: String,
    pub state: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewQueueQuery {
    #[serde(default)]
    pub queue: Option<QueueType>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// Router builder exposing document processing, partner onboarding, and review endpoints.
pub fn evidence_router<S, A>(services: Arc<EvidenceServices<S, A>>) -> Router
where
    S: EvidenceStore + 'static,
    A: AuditSink + 'static,
{
    Router::new()
        .route(
            "/api/v1/documents/:document_id/process",
            post(process_document_handler::<S, A>),
        )
        .route("/api/v1/transfer-hours", post(transfer_hours_handler::<S, A>))
        .route(
            "/api/v1/partners/:partner_id/approval",
            post(partner_approval_handler::<S, A>),
        )
        .route(
            "/api/v1/partners/:partner_id/checklist",
            get(partner_checklist_handler::<S, A>),
        )
        .route(
            "/api/v1/partners/:partner_id/documents/:document_id",
            post(partner_document_handler::<S, A>),
        )
        .route("/api/v1/review-queue", get(review_queue_handler::<S, A>))
        .route(
            "/api/v1/review-queue/:item_id/resolve",
            post(resolve_review_handler::<S, A>),
        )
        .with_state(services)
}

fn failure_status(failure: Option<FailureKind>) -> StatusCode {
    match failure {
        None => StatusCode::OK,
        Some(FailureKind::NotFound) => StatusCode::NOT_FOUND,
        Some(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn processing_response(result: ProcessingResult) -> Response {
    let status = if result.success {
        StatusCode::OK
    } else {
        failure_status(result.failure)
    };
    (status, axum::Json(result)).into_response()
}

fn partner_response(result: PartnerApprovalResult) -> Response {
    let status = if result.success {
        StatusCode::OK
    } else {
        failure_status(result.failure)
    };
    (status, axum::Json(result)).into_response()
}

pub(crate) async fn process_document_handler<S, A>(
    State(services): State<Arc<EvidenceServices<S, A>>>,
    Path(document_id): Path<String>,
) -> Response
where
    S: EvidenceStore + 'static,
    A: AuditSink + 'static,
{
    let result = services
        .processor
        .process_document(&DocumentId(document_id));
    processing_response(result)
}

pub(crate) async fn transfer_hours_handler<S, A>(
    State(services): State<Arc<EvidenceServices<S, A>>>,
    axum::Json(request): axum::Json<TransferHoursRequest>,
) -> Response
where
    S: EvidenceStore + 'static,
    A: AuditSink + 'static,
{
    processing_response(services.processor.process_transfer_hours(&request))
}

pub(crate) async fn partner_approval_handler<S, A>(
    State(services): State<Arc<EvidenceServices<S, A>>>,
    Path(partner_id): Path<String>,
    axum::Json(request): axum::Json<PartnerProgramRequest>,
) -> Response
where
    S: EvidenceStore + 'static,
    A: AuditSink + 'static,
{
    let result = services.partners.check_partner_approval(
        &PartnerId(partner_id),
        &request.program_id,
        &request.state,
    );
    partner_response(result)
}

pub(crate) async fn partner_checklist_handler<S, A>(
    State(services): State<Arc<EvidenceServices<S, A>>>,
    Path(partner_id): Path<String>,
    Query(query): Query<PartnerProgramRequest>,
) -> Response
where
    S: EvidenceStore + 'static,
    A: AuditSink + 'static,
{
    let partner_id = PartnerId(partner_id);
    match services
        .partners
        .checklist(&partner_id, &query.program_id, &query.state)
    {
        Ok(checklist) => (StatusCode::OK, axum::Json(checklist)).into_response(),
        Err(error) => {
            let payload = json!({
                "partner_id": partner_id,
                "error": error.to_string(),
            });
            (failure_status(Some(error.failure_kind())), axum::Json(payload)).into_response()
        }
    }
}

pub(crate) async fn partner_document_handler<S, A>(
    State(services): State<Arc<EvidenceServices<S, A>>>,
    Path((partner_id, document_id)): Path<(String, String)>,
    axum::Json(request): axum::Json<PartnerProgramRequest>,
) -> Response
where
    S: EvidenceStore + 'static,
    A: AuditSink + 'static,
{
    let result = services.partners.process_partner_document(
        &PartnerId(partner_id),
        &DocumentId(document_id),
        &request.program_id,
        &request.state,
    );
    partner_response(result)
}

pub(crate) async fn review_queue_handler<S, A>(
    State(services): State<Arc<EvidenceServices<S, A>>>,
    Query(query): Query<ReviewQueueQuery>,
) -> Response
where
    S: EvidenceStore + 'static,
    A: AuditSink + 'static,
{
    let limit = query.limit.unwrap_or(DEFAULT_QUEUE_LIMIT);
    match services.processor.reviews().open_items(query.queue, limit) {
        Ok(items) => (StatusCode::OK, axum::Json(items)).into_response(),
        Err(error) => {
            let payload = json!({
                "error": error.to_string(),
            });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

pub(crate) async fn resolve_review_handler<S, A>(
    State(services): State<Arc<EvidenceServices<S, A>>>,
    Path(item_id): Path<String>,
    axum::Json(resolution): axum::Json<ReviewResolution>,
) -> Response
where
    S: EvidenceStore + 'static,
    A: AuditSink + 'static,
{
    match services
        .processor
        .reviews()
        .resolve(&ReviewItemId(item_id), resolution)
    {
        Ok(resolved) => (StatusCode::OK, axum::Json(resolved)).into_response(),
        Err(error) => {
            let status = match error {
                ReviewQueueError::NotFound(_) => StatusCode::NOT_FOUND,
                ReviewQueueError::AlreadyClosed(_) => StatusCode::CONFLICT,
                ReviewQueueError::MissingReviewer => StatusCode::BAD_REQUEST,
                ReviewQueueError::Recorder(_) | ReviewQueueError::Repository(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            let payload = json!({
                "error": error.to_string(),
            });
            (status, axum::Json(payload)).into_response()
        }
    }
}
