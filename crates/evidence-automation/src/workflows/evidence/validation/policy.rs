use super::super::domain::ValidationStatus;
use super::codes::{HOURS_EXCEED_MAX, OUT_OF_STATE};

/// Facts that disqualify a document outright rather than asking for a human look.
pub(crate) fn is_disqualifying(code: &str) -> bool {
    code.contains("EXPIRED") || code == OUT_OF_STATE || code == HOURS_EXCEED_MAX
}

/// Zero errors pass; any disqualifying code fails; anything else goes to review.
pub fn derive_status(errors: &[String]) -> ValidationStatus {
    if errors.is_empty() {
        ValidationStatus::Passed
    } else if errors.iter().any(|code| is_disqualifying(code)) {
        ValidationStatus::Failed
    } else {
        ValidationStatus::NeedsReview
    }
}
