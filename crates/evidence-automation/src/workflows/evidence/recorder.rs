use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::info;

use super::domain::{Actor, AutomatedDecision, DecisionId, DecisionValue, Subject};
use super::repository::{EvidenceStore, RepositoryError};

/// Clock for one processing attempt. Every decision written during the attempt derives
/// its idempotency key and elapsed time from here.
#[derive(Debug, Clone, Copy)]
pub struct ProcessingAttempt {
    started_at: DateTime<Utc>,
    started: Instant,
}

impl ProcessingAttempt {
    pub fn begin() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.started.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    pub fn idempotency_key(&self, subject: &Subject) -> String {
        format!(
            "{}:{}:{}",
            subject.kind.label(),
            subject.id,
            self.started_at.to_rfc3339_opts(SecondsFormat::Nanos, true)
        )
    }
}

/// Everything needed to write one decision except identity, actor, and timing.
#[derive(Debug, Clone)]
pub struct DecisionDraft {
    pub subject: Subject,
    pub decision: DecisionValue,
    pub reason_codes: Vec<String>,
    pub input_snapshot: Value,
    pub ruleset_version: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("refusing to record {decision:?} for {subject} without reason codes")]
    SilentDecision {
        subject: Subject,
        decision: DecisionValue,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Writes immutable decision rows. Recording never touches the subject itself.
pub struct DecisionRecorder<S> {
    store: Arc<S>,
    actor: Actor,
}

impl<S> DecisionRecorder<S>
where
    S: EvidenceStore + 'static,
{
    pub fn new(store: Arc<S>, actor: Actor) -> Self {
        Self { store, actor }
    }

    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    pub fn record(
        &self,
        draft: DecisionDraft,
        attempt: &ProcessingAttempt,
    ) -> Result<AutomatedDecision, RecorderError> {
        self.record_as(draft, attempt, self.actor.clone())
    }

    /// Single write with no retry: a failed insert surfaces to the caller, and a replay of
    /// the same attempt is rejected by the store on its idempotency key.
    pub fn record_as(
        &self,
        draft: DecisionDraft,
        attempt: &ProcessingAttempt,
        actor: Actor,
    ) -> Result<AutomatedDecision, RecorderError> {
        let idempotency_key = attempt.idempotency_key(&draft.subject);
        self.record_keyed(draft, attempt, actor, idempotency_key)
    }

    /// Record under a caller-chosen key, for decisions that must be written at most once
    /// no matter how many attempts make them.
    pub fn record_keyed(
        &self,
        draft: DecisionDraft,
        attempt: &ProcessingAttempt,
        actor: Actor,
        idempotency_key: String,
    ) -> Result<AutomatedDecision, RecorderError> {
        if draft.decision.is_adverse() && draft.reason_codes.is_empty() {
            return Err(RecorderError::SilentDecision {
                subject: draft.subject,
                decision: draft.decision,
            });
        }

        let decision = AutomatedDecision {
            id: DecisionId::generate(),
            idempotency_key,
            subject: draft.subject,
            decision: draft.decision,
            reason_codes: draft.reason_codes,
            input_snapshot: draft.input_snapshot,
            ruleset_version: draft.ruleset_version,
            actor,
            processing_time_ms: attempt.elapsed_ms(),
            created_at: Utc::now(),
        };

        self.store.insert_decision(decision.clone())?;

        info!(
            decision_id = %decision.id,
            subject = %decision.subject,
            decision = decision.decision.label(),
            reasons = ?decision.reason_codes,
            "automated decision recorded"
        );

        Ok(decision)
    }
}
