use crate::config::TelemetryConfig;
use std::fmt;
use tracing_subscriber::filter::{Directive, ParseError};
use tracing_subscriber::EnvFilter;

#[derive(Debug)]
pub enum TelemetryError {
    EnvFilter { value: String, source: ParseError },
    Subscriber(Box<dyn std::error::Error + Send + Sync>),
}

impl fmt::Display for TelemetryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryError::EnvFilter { value, .. } => {
                write!(
                    f,
                    "invalid log level/filter '{}': unable to build EnvFilter",
                    value
                )
            }
            TelemetryError::Subscriber(err) => write!(f, "telemetry error: {err}"),
        }
    }
}

impl std::error::Error for TelemetryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TelemetryError::EnvFilter { source, .. } => Some(source),
            TelemetryError::Subscriber(err) => Some(&**err),
        }
    }
}

/// Build the filter used for pipeline logs.
///
/// `RUST_LOG` wins when present. Otherwise the configured level applies globally and the
/// optional pipeline level overrides it for this crate only, so decision and review-queue
/// events can be traced without raising the noise floor of the HTTP stack.
pub fn build_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter =
        EnvFilter::try_new(&config.log_level).map_err(|source| TelemetryError::EnvFilter {
            value: config.log_level.clone(),
            source,
        })?;

    if let Some(level) = &config.pipeline_log_level {
        let raw = format!("evidence_automation={level}");
        let directive: Directive = raw
            .parse()
            .map_err(|source| TelemetryError::EnvFilter { value: raw, source })?;
        filter = filter.add_directive(directive);
    }

    Ok(filter)
}

pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let env_filter = build_filter(config)?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Subscriber)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unparseable_pipeline_level() {
        std::env::remove_var("RUST_LOG");
        let config = TelemetryConfig {
            log_level: "info".to_string(),
            pipeline_log_level: Some("not a level=".to_string()),
        };

        match build_filter(&config) {
            Err(TelemetryError::EnvFilter { value, .. }) => {
                assert!(value.starts_with("evidence_automation="));
            }
            other => panic!("expected filter error, got {other:?}"),
        }
    }

    #[test]
    fn accepts_pipeline_override() {
        std::env::remove_var("RUST_LOG");
        let config = TelemetryConfig {
            log_level: "warn".to_string(),
            pipeline_log_level: Some("debug".to_string()),
        };

        let filter = build_filter(&config).expect("filter builds");
        assert!(filter.to_string().contains("evidence_automation=debug"));
    }
}
