pub mod codes;
mod policy;
pub(crate) mod rules;

pub use policy::derive_status;
pub use rules::{parse_date, parse_hours};

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::classifier::DocumentTypeRegistry;
use super::domain::{DocumentType, ExtractedFields, ValidationStatus};
use super::ruleset::{AutomationRuleset, RulesetRules};

/// Type-specific check producing ordered reason codes.
pub type Validator = fn(&ExtractedFields, &RulesetRules, &ValidationContext) -> Vec<String>;

/// Business context a validator may consult beyond the extracted fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationContext {
    /// Reference date for expiry checks.
    pub today: NaiveDate,
    /// Applicant or partner state, used when the document does not state one.
    pub state: Option<String>,
}

impl ValidationContext {
    pub fn on(today: NaiveDate) -> Self {
        Self { today, state: None }
    }

    pub fn with_state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }
}

impl Default for ValidationContext {
    fn default() -> Self {
        Self::on(Utc::now().date_naive())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub status: ValidationStatus,
    pub errors: Vec<String>,
    pub ruleset_version: Option<String>,
}

/// Validate extracted fields against the active ruleset for the type. Types without a
/// validator always land in review with `NO_VALIDATOR`.
pub fn validate(
    registry: &DocumentTypeRegistry,
    document_type: DocumentType,
    fields: &ExtractedFields,
    ruleset: Option<&AutomationRuleset>,
    context: &ValidationContext,
) -> ValidationOutcome {
    let ruleset_version = ruleset.map(|ruleset| ruleset.version.clone());

    let Some(validator) = registry.validator(document_type) else {
        return ValidationOutcome {
            status: ValidationStatus::NeedsReview,
            errors: vec![codes::NO_VALIDATOR.to_string()],
            ruleset_version,
        };
    };

    let default_rules = RulesetRules::default();
    let rules = ruleset.map(|ruleset| &ruleset.rules).unwrap_or(&default_rules);
    let errors = validator(fields, rules, context);

    ValidationOutcome {
        status: derive_status(&errors),
        errors,
        ruleset_version,
    }
}
