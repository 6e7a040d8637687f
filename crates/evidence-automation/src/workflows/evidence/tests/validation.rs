use super::common::*;

use crate::workflows::evidence::classifier::DocumentTypeRegistry;
use crate::workflows::evidence::domain::{DocumentType, ExtractedFields, ValidationStatus};
use crate::workflows::evidence::ruleset::{AutomationRuleset, RulesetRules, LICENSE_APPROVAL};
use crate::workflows::evidence::validation::codes::{
    HOURS_EXCEED_MAX, INSURANCE_EXPIRED, LICENSE_EXPIRED, MISSING_HOURS, MISSING_LICENSE_NUMBER,
    MISSING_POLICY_NUMBER, MISSING_SCHOOL_NAME, MISSING_STATE, NO_VALIDATOR, OUT_OF_STATE,
};
use crate::workflows::evidence::validation::{
    derive_status, parse_date, parse_hours, validate, ValidationContext,
};

fn fields(pairs: &[(&str, &str)]) -> ExtractedFields {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn ruleset(rule_type: &str, rules: RulesetRules) -> AutomationRuleset {
    AutomationRuleset::new(rule_type, "test-v1", rules).activated()
}

#[test]
fn scenario_a_transcript_passes() {
    let registry = DocumentTypeRegistry::standard();
    let outcome = validate(
        &registry,
        DocumentType::Transcript,
        &fields(&[("total_hours", "1200"), ("state", "IN")]),
        Some(&ruleset("transcript_approval", transcript_rules())),
        &ValidationContext::on(today()),
    );

    assert_eq!(outcome.status, ValidationStatus::Passed);
    assert!(outcome.errors.is_empty());
    assert_eq!(outcome.ruleset_version.as_deref(), Some("test-v1"));
}

#[test]
fn scenario_b_out_of_state_fails() {
    let registry = DocumentTypeRegistry::standard();
    let outcome = validate(
        &registry,
        DocumentType::Transcript,
        &fields(&[("total_hours", "1200"), ("state", "OH")]),
        Some(&ruleset("transcript_approval", transcript_rules())),
        &ValidationContext::on(today()),
    );

    assert_eq!(outcome.status, ValidationStatus::Failed);
    assert_eq!(outcome.errors, vec![OUT_OF_STATE.to_string()]);
}

#[test]
fn hours_over_cap_fail_outright() {
    let registry = DocumentTypeRegistry::standard();
    for hours in ["1501", "2,000", "1500.5"] {
        let outcome = validate(
            &registry,
            DocumentType::Transcript,
            &fields(&[("total_hours", hours), ("state", "IN")]),
            Some(&ruleset("transcript_approval", transcript_rules())),
            &ValidationContext::on(today()),
        );

        assert_eq!(outcome.status, ValidationStatus::Failed, "hours {hours}");
        assert!(outcome.errors.contains(&HOURS_EXCEED_MAX.to_string()));
    }
}

#[test]
fn missing_required_fields_need_review() {
    let registry = DocumentTypeRegistry::standard();
    let rules = RulesetRules {
        require_school_name: true,
        ..transcript_rules()
    };

    let outcome = validate(
        &registry,
        DocumentType::Transcript,
        &fields(&[("state", "IN")]),
        Some(&ruleset("transcript_approval", rules)),
        &ValidationContext::on(today()),
    );

    assert_eq!(outcome.status, ValidationStatus::NeedsReview);
    assert_eq!(
        outcome.errors,
        vec![MISSING_SCHOOL_NAME.to_string(), MISSING_HOURS.to_string()]
    );
}

#[test]
fn transcript_without_state_uses_context_state() {
    let registry = DocumentTypeRegistry::standard();
    let outcome = validate(
        &registry,
        DocumentType::Transcript,
        &fields(&[("total_hours", "900")]),
        Some(&ruleset("transcript_approval", transcript_rules())),
        &ValidationContext::on(today()).with_state("KY"),
    );
    assert_eq!(outcome.errors, vec![OUT_OF_STATE.to_string()]);

}

#[test]
fn stateless_transcript_needs_review_under_state_list() {
    let registry = DocumentTypeRegistry::standard();
    let stateless = validate(
        &registry,
        DocumentType::Transcript,
        &fields(&[("total_hours", "900")]),
        Some(&ruleset("transcript_approval", transcript_rules())),
        &ValidationContext::on(today()),
    );
    assert_eq!(stateless.status, ValidationStatus::NeedsReview);
    assert_eq!(stateless.errors, vec![MISSING_STATE.to_string()]);

    let unrestricted = validate(
        &registry,
        DocumentType::Transcript,
        &fields(&[("total_hours", "900")]),
        Some(&ruleset(
            "transcript_approval",
            RulesetRules {
                approved_states: None,
                ..transcript_rules()
            },
        )),
        &ValidationContext::on(today()),
    );
    assert_eq!(unrestricted.status, ValidationStatus::Passed);
}

#[test]
fn expired_license_fails_when_rules_require_validity() {
    let registry = DocumentTypeRegistry::standard();
    let strict = ruleset(
        LICENSE_APPROVAL,
        RulesetRules {
            license_must_be_valid: true,
            ..RulesetRules::default()
        },
    );

    for expired_on in ["2020-06-30", "05/31/2025", "January 2, 2024"] {
        let outcome = validate(
            &registry,
            DocumentType::License,
            &fields(&[("license_number", "SL-1"), ("expiration_date", expired_on)]),
            Some(&strict),
            &ValidationContext::on(today()),
        );
        assert_eq!(outcome.status, ValidationStatus::Failed, "{expired_on}");
        assert_eq!(outcome.errors, vec![LICENSE_EXPIRED.to_string()]);
    }
}

#[test]
fn expired_license_passes_without_validity_rule() {
    let registry = DocumentTypeRegistry::standard();
    let outcome = validate(
        &registry,
        DocumentType::License,
        &fields(&[("license_number", "SL-1"), ("expiration_date", "2020-06-30")]),
        None,
        &ValidationContext::on(today()),
    );

    assert_eq!(outcome.status, ValidationStatus::Passed);
    assert_eq!(outcome.ruleset_version, None);
}

#[test]
fn license_number_is_always_checked() {
    let registry = DocumentTypeRegistry::standard();
    let outcome = validate(
        &registry,
        DocumentType::License,
        &ExtractedFields::new(),
        None,
        &ValidationContext::on(today()),
    );

    assert_eq!(outcome.status, ValidationStatus::NeedsReview);
    assert_eq!(outcome.errors, vec![MISSING_LICENSE_NUMBER.to_string()]);
}

#[test]
fn insurance_expiry_is_unconditional() {
    let registry = DocumentTypeRegistry::standard();
    let outcome = validate(
        &registry,
        DocumentType::Insurance,
        &fields(&[("expiration_date", "2024-12-31")]),
        None,
        &ValidationContext::on(today()),
    );

    assert_eq!(outcome.status, ValidationStatus::Failed);
    assert_eq!(
        outcome.errors,
        vec![
            MISSING_POLICY_NUMBER.to_string(),
            INSURANCE_EXPIRED.to_string()
        ]
    );
}

#[test]
fn unparseable_expiry_is_not_expired() {
    let registry = DocumentTypeRegistry::standard();
    let outcome = validate(
        &registry,
        DocumentType::Insurance,
        &fields(&[("policy_number", "GL-1"), ("expiration_date", "soon")]),
        None,
        &ValidationContext::on(today()),
    );

    assert_eq!(outcome.status, ValidationStatus::Passed);
}

#[test]
fn types_without_validator_need_review() {
    let registry = DocumentTypeRegistry::standard();
    for document_type in [DocumentType::Mou, DocumentType::Id, DocumentType::W2, DocumentType::Unknown] {
        let outcome = validate(
            &registry,
            document_type,
            &ExtractedFields::new(),
            None,
            &ValidationContext::on(today()),
        );
        assert_eq!(outcome.status, ValidationStatus::NeedsReview);
        assert_eq!(outcome.errors, vec![NO_VALIDATOR.to_string()]);
    }
}

#[test]
fn status_derivation_separates_disqualifying_codes() {
    assert_eq!(derive_status(&[]), ValidationStatus::Passed);
    assert_eq!(
        derive_status(&[MISSING_SCHOOL_NAME.to_string()]),
        ValidationStatus::NeedsReview
    );
    assert_eq!(
        derive_status(&[MISSING_SCHOOL_NAME.to_string(), "CUSTOM_EXPIRED".to_string()]),
        ValidationStatus::Failed
    );
    assert_eq!(
        derive_status(&[OUT_OF_STATE.to_string()]),
        ValidationStatus::Failed
    );
}

#[test]
fn parsers_accept_common_formats() {
    assert_eq!(parse_hours("1,200"), Some(1200.0));
    assert_eq!(parse_hours(" 87.5 "), Some(87.5));
    assert_eq!(parse_hours("twelve"), None);

    let expected = chrono::NaiveDate::from_ymd_opt(2026, 3, 4).expect("valid date");
    assert_eq!(parse_date("2026-03-04"), Some(expected));
    assert_eq!(parse_date("03/04/2026"), Some(expected));
    assert_eq!(parse_date("March 4, 2026"), Some(expected));
    assert_eq!(parse_date("Mar 4, 2026"), Some(expected));
    assert_eq!(parse_date("04.03.2026"), None);
}
