use crate::config::ConfigError;
use crate::telemetry::TelemetryError;
use crate::workflows::evidence::{
    PipelineStage, ProcessingResult, RepositoryError, RulesetError, RulesetStoreError,
};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use std::fmt;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Io(std::io::Error),
    Server(axum::Error),
    Rulesets(RulesetError),
    Repository(RepositoryError),
    Pipeline {
        stage: Option<PipelineStage>,
        message: String,
    },
    Export(csv::Error),
}

impl AppError {
    /// Lift a failed pipeline run into an application error for command-line callers.
    pub fn pipeline(result: &ProcessingResult) -> Self {
        Self::Pipeline {
            stage: result.failed_stage,
            message: result
                .message
                .clone()
                .unwrap_or_else(|| format!("processing {} failed", result.document_id)),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Rulesets(err) => write!(f, "ruleset error: {}", err),
            AppError::Repository(err) => write!(f, "repository error: {}", err),
            AppError::Pipeline {
                stage: Some(stage),
                message,
            } => write!(f, "pipeline error at {}: {}", stage, message),
            AppError::Pipeline { message, .. } => write!(f, "pipeline error: {}", message),
            AppError::Export(err) => write!(f, "export error: {}", err),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Rulesets(err) => Some(err),
            AppError::Repository(err) => Some(err),
            AppError::Pipeline { .. } => None,
            AppError::Export(err) => Some(err),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Rulesets(_) => StatusCode::BAD_REQUEST,
            AppError::Repository(RepositoryError::NotFound) => StatusCode::NOT_FOUND,
            AppError::Repository(RepositoryError::Conflict) => StatusCode::CONFLICT,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Io(_)
            | AppError::Server(_)
            | AppError::Repository(_)
            | AppError::Pipeline { .. }
            | AppError::Export(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<RulesetError> for AppError {
    fn from(value: RulesetError) -> Self {
        Self::Rulesets(value)
    }
}

impl From<RepositoryError> for AppError {
    fn from(value: RepositoryError) -> Self {
        Self::Repository(value)
    }
}

impl From<RulesetStoreError> for AppError {
    fn from(value: RulesetStoreError) -> Self {
        match value {
            RulesetStoreError::Ruleset(err) => Self::Rulesets(err),
            RulesetStoreError::Repository(err) => Self::Repository(err),
        }
    }
}

impl From<csv::Error> for AppError {
    fn from(value: csv::Error) -> Self {
        Self::Export(value)
    }
}
