use std::collections::BTreeMap;
use std::io::Write;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use super::domain::{AutomatedDecision, SubjectKind};

/// Flat view of a decision for exports and API payloads.
#[derive(Debug, Clone, Serialize)]
pub struct DecisionView {
    pub decision_id: String,
    pub subject_kind: &'static str,
    pub subject_id: String,
    pub decision: &'static str,
    pub reason_codes: Vec<String>,
    pub ruleset_version: Option<String>,
    pub actor: String,
    pub created_at: DateTime<Utc>,
}

impl From<&AutomatedDecision> for DecisionView {
    fn from(decision: &AutomatedDecision) -> Self {
        Self {
            decision_id: decision.id.to_string(),
            subject_kind: decision.subject.kind.label(),
            subject_id: decision.subject.id.clone(),
            decision: decision.decision.label(),
            reason_codes: decision.reason_codes.clone(),
            ruleset_version: decision.ruleset_version.clone(),
            actor: decision.actor.label().to_string(),
            created_at: decision.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct DecisionRow<'a> {
    decision_id: &'a str,
    subject_kind: &'static str,
    subject_id: &'a str,
    decision: &'static str,
    reason_codes: String,
    ruleset_version: &'a str,
    actor: &'a str,
    created_at: String,
}

impl<'a> From<&'a DecisionView> for DecisionRow<'a> {
    fn from(view: &'a DecisionView) -> Self {
        Self {
            decision_id: &view.decision_id,
            subject_kind: view.subject_kind,
            subject_id: &view.subject_id,
            decision: view.decision,
            reason_codes: view.reason_codes.join(";"),
            ruleset_version: view.ruleset_version.as_deref().unwrap_or(""),
            actor: &view.actor,
            created_at: view.created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }
}

/// Write the decision audit trail as CSV, one row per decision in the order given.
/// Reason codes are joined with `;`.
pub fn write_decisions_csv<W: Write>(
    writer: W,
    decisions: &[AutomatedDecision],
) -> Result<(), csv::Error> {
    let mut csv_writer = csv::WriterBuilder::new().from_writer(writer);
    for decision in decisions {
        let view = DecisionView::from(decision);
        csv_writer.serialize(DecisionRow::from(&view))?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Decision counts per subject kind and verdict label.
pub fn decision_tally(decisions: &[AutomatedDecision]) -> BTreeMap<(&'static str, &'static str), usize> {
    let mut tally = BTreeMap::new();
    for decision in decisions {
        let key = (decision.subject.kind.label(), decision.decision.label());
        *tally.entry(key).or_insert(0) += 1;
    }
    tally
}

/// Decisions about one kind of subject, oldest first.
pub fn decisions_of_kind(decisions: &[AutomatedDecision], kind: SubjectKind) -> Vec<DecisionView> {
    let mut selected: Vec<&AutomatedDecision> = decisions
        .iter()
        .filter(|decision| decision.subject.kind == kind)
        .collect();
    selected.sort_by_key(|decision| decision.created_at);
    selected.into_iter().map(DecisionView::from).collect()
}
