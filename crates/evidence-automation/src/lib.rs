//! Evidence processing and automated decisions for enrollment and partner onboarding.
//!
//! Uploaded documents are classified, mined for structured fields, validated against the
//! active ruleset for their type, and settled with an immutable audit decision. Partner
//! onboarding and transfer-hours credit are layered on top of the same pipeline.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
