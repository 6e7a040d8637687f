use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the evidence service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub pipeline: PipelineConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        let pipeline_log_level = env::var("EVIDENCE_LOG_LEVEL")
            .ok()
            .filter(|value| !value.trim().is_empty());

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig {
                log_level,
                pipeline_log_level,
            },
            pipeline: PipelineConfig::from_env()?,
        })
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
    pub pipeline_log_level: Option<String>,
}

pub const DEFAULT_RETRY_ATTEMPTS: u32 = 2;
pub const DEFAULT_OCR_CONFIDENCE: f64 = 0.9;

/// Knobs for the document pipeline and its collaborators.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    /// Actor stamped on automated decisions.
    pub actor: String,
    /// Attempts for content fetch and OCR; decision recording is never retried.
    pub retry_attempts: u32,
    /// Confidence reported by the plain-text OCR adapter.
    pub ocr_confidence: f64,
    pub document_root: PathBuf,
    pub rulesets_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            actor: "system".to_string(),
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            ocr_confidence: DEFAULT_OCR_CONFIDENCE,
            document_root: PathBuf::from("./documents"),
            rulesets_path: None,
        }
    }
}

impl PipelineConfig {
    fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let actor = env::var("EVIDENCE_ACTOR")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or(defaults.actor);

        let retry_attempts = match env::var("EVIDENCE_RETRY_ATTEMPTS") {
            Ok(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|attempts| *attempts >= 1)
                .ok_or(ConfigError::InvalidRetryAttempts)?,
            Err(_) => defaults.retry_attempts,
        };

        let ocr_confidence = match env::var("EVIDENCE_OCR_CONFIDENCE") {
            Ok(raw) => raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|value| (0.0..=1.0).contains(value))
                .ok_or(ConfigError::InvalidOcrConfidence)?,
            Err(_) => defaults.ocr_confidence,
        };

        let document_root = env::var("EVIDENCE_DOCUMENT_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.document_root);

        let rulesets_path = env::var("EVIDENCE_RULESETS_PATH")
            .ok()
            .filter(|value| !value.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            actor,
            retry_attempts,
            ocr_confidence,
            document_root,
            rulesets_path,
        })
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidRetryAttempts,
    InvalidOcrConfidence,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidRetryAttempts => {
                write!(f, "EVIDENCE_RETRY_ATTEMPTS must be a whole number of at least 1")
            }
            ConfigError::InvalidOcrConfidence => {
                write!(f, "EVIDENCE_OCR_CONFIDENCE must be a number between 0 and 1")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            _ => None,
        }
    }
}
