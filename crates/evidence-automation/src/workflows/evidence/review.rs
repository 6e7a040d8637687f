use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::info;

use super::domain::{
    Actor, AutomatedDecision, DecisionValue, QueueType, ReviewClosure, ReviewItemId,
    ReviewQueueItem, ReviewStatus, Subject,
};
use super::recorder::{DecisionDraft, DecisionRecorder, ProcessingAttempt, RecorderError};
use super::repository::{EvidenceStore, RepositoryError};
use super::validation::codes::{MISSING_STATE, OUT_OF_STATE};

pub const HUMAN_REVIEW: &str = "HUMAN_REVIEW";

/// A case that could not be resolved automatically.
#[derive(Debug, Clone)]
pub struct ReviewRequest {
    pub queue: QueueType,
    pub subject: Subject,
    pub priority: u8,
    pub reasons: Vec<String>,
    /// Extraction confidence when the case came from a document.
    pub confidence: Option<f64>,
    pub metadata: Value,
}

/// Hint shown to the reviewer about the likely outcome. Cases without an extraction
/// confidence skip the quality heuristics.
pub fn system_recommendation(reasons: &[String], confidence: Option<f64>) -> &'static str {
    match confidence {
        Some(confidence) if confidence >= 0.9 && reasons.len() == 1 => {
            "likely_approve_with_override"
        }
        Some(confidence) if confidence < 0.5 => "likely_reject_poor_quality",
        _ if reasons
            .iter()
            .any(|reason| reason == OUT_OF_STATE || reason == MISSING_STATE) =>
        {
            "manual_state_verification_required"
        }
        _ => "manual_review_required",
    }
}

/// Reviewer verdict closing an open item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResolution {
    pub reviewer: String,
    pub decision: DecisionValue,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedReview {
    pub item: ReviewQueueItem,
    pub decision: AutomatedDecision,
}

#[derive(Debug, thiserror::Error)]
pub enum ReviewQueueError {
    #[error("review item {0} not found")]
    NotFound(ReviewItemId),
    #[error("review item {0} is already closed")]
    AlreadyClosed(ReviewItemId),
    #[error("a reviewer name is required to close a review item")]
    MissingReviewer,
    #[error(transparent)]
    Recorder(#[from] RecorderError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// One reviewer verdict per item, however many times closing is retried.
fn closure_key(item_id: &ReviewItemId) -> String {
    format!("review_item:{item_id}")
}

fn annotate(metadata: Value, recommendation: &str, confidence: Option<f64>) -> Value {
    let mut metadata = match metadata {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        other => {
            let mut map = Map::new();
            map.insert("details".to_string(), other);
            map
        }
    };
    metadata.insert(
        "system_recommendation".to_string(),
        Value::from(recommendation),
    );
    if let Some(confidence) = confidence {
        metadata.insert("confidence".to_string(), json!(confidence));
    }
    Value::Object(metadata)
}

/// Human review work queue. Items are closed explicitly and never deleted.
pub struct ReviewQueue<S> {
    store: Arc<S>,
    recorder: Arc<DecisionRecorder<S>>,
}

impl<S> ReviewQueue<S>
where
    S: EvidenceStore + 'static,
{
    pub fn new(store: Arc<S>, recorder: Arc<DecisionRecorder<S>>) -> Self {
        Self { store, recorder }
    }

    pub fn enqueue(&self, request: ReviewRequest) -> Result<ReviewQueueItem, RepositoryError> {
        let recommendation = system_recommendation(&request.reasons, request.confidence);
        let item = ReviewQueueItem {
            id: ReviewItemId::generate(),
            queue: request.queue,
            subject: request.subject,
            priority: request.priority,
            metadata: annotate(request.metadata, recommendation, request.confidence),
            reasons: request.reasons,
            status: ReviewStatus::Open,
            closure: None,
            created_at: Utc::now(),
        };

        self.store.insert_review_item(item.clone())?;

        info!(
            review_item_id = %item.id,
            queue = item.queue.label(),
            subject = %item.subject,
            priority = item.priority,
            recommendation,
            "review item created"
        );

        Ok(item)
    }

    /// Enqueue unless the subject already waits on this queue, in which case the open item
    /// takes the new priority, reasons and metadata. Keeps one open item per subject.
    pub fn raise(&self, request: ReviewRequest) -> Result<ReviewQueueItem, RepositoryError> {
        let Some(mut item) = self
            .store
            .open_review_item_for(request.queue, &request.subject)?
        else {
            return self.enqueue(request);
        };

        let recommendation = system_recommendation(&request.reasons, request.confidence);
        item.priority = request.priority;
        item.metadata = annotate(request.metadata, recommendation, request.confidence);
        item.reasons = request.reasons;
        self.store.update_review_item(item.clone())?;

        info!(
            review_item_id = %item.id,
            queue = item.queue.label(),
            subject = %item.subject,
            priority = item.priority,
            recommendation,
            "review item refreshed"
        );

        Ok(item)
    }

    pub fn open_items(
        &self,
        queue: Option<QueueType>,
        limit: usize,
    ) -> Result<Vec<ReviewQueueItem>, RepositoryError> {
        self.store.open_review_items(queue, limit)
    }

    /// Close an open item with a reviewer verdict. The verdict is written as a new decision
    /// on the item's subject, superseding the automated one rather than editing it.
    pub fn resolve(
        &self,
        item_id: &ReviewItemId,
        resolution: ReviewResolution,
    ) -> Result<ResolvedReview, ReviewQueueError> {
        let reviewer = resolution.reviewer.trim();
        if reviewer.is_empty() {
            return Err(ReviewQueueError::MissingReviewer);
        }

        let mut item = self
            .store
            .fetch_review_item(item_id)?
            .ok_or_else(|| ReviewQueueError::NotFound(item_id.clone()))?;
        if item.status == ReviewStatus::Closed {
            return Err(ReviewQueueError::AlreadyClosed(item_id.clone()));
        }

        let attempt = ProcessingAttempt::begin();
        let draft = DecisionDraft {
            subject: item.subject.clone(),
            decision: resolution.decision,
            reason_codes: vec![
                HUMAN_REVIEW.to_string(),
                format!(
                    "REVIEW_{}",
                    resolution.decision.label().to_ascii_uppercase()
                ),
            ],
            input_snapshot: json!({
                "review_item_id": item.id,
                "queue": item.queue.label(),
                "reasons": item.reasons,
                "notes": resolution.notes,
            }),
            ruleset_version: None,
        };
        let idempotency_key = closure_key(&item.id);
        let decision = match self.recorder.record_keyed(
            draft,
            &attempt,
            Actor::Named(reviewer.to_string()),
            idempotency_key.clone(),
        ) {
            Ok(decision) => decision,
            // An earlier attempt recorded the verdict but never closed the item.
            Err(RecorderError::Repository(RepositoryError::Conflict)) => self
                .store
                .decisions_for(&item.subject)?
                .into_iter()
                .find(|decision| decision.idempotency_key == idempotency_key)
                .ok_or(RepositoryError::Conflict)?,
            Err(error) => return Err(error.into()),
        };

        item.status = ReviewStatus::Closed;
        item.closure = Some(ReviewClosure {
            reviewer: reviewer.to_string(),
            decision: decision.decision,
            notes: resolution.notes,
            decision_id: decision.id.clone(),
            closed_at: Utc::now(),
        });
        self.store.update_review_item(item.clone())?;

        info!(
            review_item_id = %item.id,
            reviewer,
            decision = decision.decision.label(),
            "review item closed"
        );

        Ok(ResolvedReview { item, decision })
    }
}
