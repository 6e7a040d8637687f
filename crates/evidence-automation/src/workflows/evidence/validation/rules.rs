use chrono::NaiveDate;

use super::super::domain::ExtractedFields;
use super::super::ruleset::RulesetRules;
use super::codes::{
    HOURS_EXCEED_MAX, INSURANCE_EXPIRED, LICENSE_EXPIRED, MISSING_DATE, MISSING_HOURS,
    MISSING_LICENSE_NUMBER, MISSING_POLICY_NUMBER, MISSING_SCHOOL_NAME, MISSING_STATE,
    OUT_OF_STATE,
};
use super::ValidationContext;

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%m-%d-%Y", "%B %d, %Y", "%b %d, %Y"];

/// Parse an hours figure such as `1,200` or `1200.5`.
pub fn parse_hours(raw: &str) -> Option<f64> {
    let cleaned: String = raw.chars().filter(|c| *c != ',').collect();
    cleaned
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|hours| hours.is_finite())
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(raw, format).ok())
}

fn has_field(fields: &ExtractedFields, name: &str) -> bool {
    fields
        .get(name)
        .map(|value| !value.trim().is_empty())
        .unwrap_or(false)
}

/// Unparseable dates are not treated as expired; the missing-field checks cover
/// documents that carry nothing usable.
fn expired(fields: &ExtractedFields, context: &ValidationContext) -> bool {
    fields
        .get("expiration_date")
        .and_then(|raw| parse_date(raw))
        .map(|expires| expires < context.today)
        .unwrap_or(false)
}

pub fn validate_transcript(
    fields: &ExtractedFields,
    rules: &RulesetRules,
    context: &ValidationContext,
) -> Vec<String> {
    let mut errors = Vec::new();

    if rules.require_school_name && !has_field(fields, "school_name") {
        errors.push(MISSING_SCHOOL_NAME.to_string());
    }
    if rules.require_hours && !has_field(fields, "total_hours") {
        errors.push(MISSING_HOURS.to_string());
    }
    if rules.require_date && !has_field(fields, "completion_date") {
        errors.push(MISSING_DATE.to_string());
    }

    if let Some(max_hours) = rules.max_transfer_hours {
        let hours = fields.get("total_hours").and_then(|raw| parse_hours(raw));
        if hours.map(|hours| hours > max_hours).unwrap_or(false) {
            errors.push(HOURS_EXCEED_MAX.to_string());
        }
    }

    let state = fields
        .get("state")
        .map(String::as_str)
        .or(context.state.as_deref())
        .filter(|state| !state.trim().is_empty());
    match state {
        Some(state) if rules.state_approved(state) == Some(false) => {
            errors.push(OUT_OF_STATE.to_string());
        }
        // A state-restricted ruleset cannot vouch for a transcript that names no state.
        None if rules.approved_states.is_some() => errors.push(MISSING_STATE.to_string()),
        _ => {}
    }

    errors
}

pub fn validate_license(
    fields: &ExtractedFields,
    rules: &RulesetRules,
    context: &ValidationContext,
) -> Vec<String> {
    let mut errors = Vec::new();

    if !has_field(fields, "license_number") {
        errors.push(MISSING_LICENSE_NUMBER.to_string());
    }
    if rules.license_must_be_valid && expired(fields, context) {
        errors.push(LICENSE_EXPIRED.to_string());
    }

    errors
}

pub fn validate_insurance(
    fields: &ExtractedFields,
    _rules: &RulesetRules,
    context: &ValidationContext,
) -> Vec<String> {
    let mut errors = Vec::new();

    if !has_field(fields, "policy_number") {
        errors.push(MISSING_POLICY_NUMBER.to_string());
    }
    if expired(fields, context) {
        errors.push(INSURANCE_EXPIRED.to_string());
    }

    errors
}
