//! Machine-readable reason codes shown to reviewers and applicants.

pub const MISSING_SCHOOL_NAME: &str = "MISSING_SCHOOL_NAME";
pub const MISSING_HOURS: &str = "MISSING_HOURS";
pub const MISSING_DATE: &str = "MISSING_DATE";
pub const HOURS_EXCEED_MAX: &str = "HOURS_EXCEED_MAX";
pub const OUT_OF_STATE: &str = "OUT_OF_STATE";
pub const MISSING_STATE: &str = "MISSING_STATE";
pub const MISSING_LICENSE_NUMBER: &str = "MISSING_LICENSE_NUMBER";
pub const LICENSE_EXPIRED: &str = "LICENSE_EXPIRED";
pub const MISSING_POLICY_NUMBER: &str = "MISSING_POLICY_NUMBER";
pub const INSURANCE_EXPIRED: &str = "INSURANCE_EXPIRED";
pub const NO_VALIDATOR: &str = "NO_VALIDATOR";
pub const VALIDATION_PASSED: &str = "VALIDATION_PASSED";
