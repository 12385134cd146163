use thiserror::Error;

#[derive(Error, Debug)]
pub enum EtlError {
    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Upstream unavailable after {attempts} attempt(s): {last_error}")]
    UpstreamUnavailable { attempts: u32, last_error: String },

    #[error("Upstream HTTP {status}: {body}")]
    UpstreamStatus { status: u16, body: String },

    #[error("Upstream reported Error (Type={kind}): {message}")]
    UpstreamStructured { kind: String, message: String },

    #[error("Upstream response malformed: {message}")]
    UpstreamMalformed { message: String },

    #[error("Run cancelled")]
    Cancelled,

    #[error("HTTP client error: {0}")]
    HttpClientError(#[from] reqwest::Error),

    #[error("URL error: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration error in {field}: {message}")]
    ConfigValidationError { field: String, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Upstream,
    Cancellation,
    Configuration,
    Output,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            reason: reason.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::UpstreamMalformed {
            message: message.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput { .. } => ErrorCategory::Input,
            Self::UpstreamUnavailable { .. }
            | Self::UpstreamStatus { .. }
            | Self::UpstreamStructured { .. }
            | Self::UpstreamMalformed { .. }
            | Self::HttpClientError(_) => ErrorCategory::Upstream,
            Self::Cancelled => ErrorCategory::Cancellation,
            Self::UrlError(_)
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => ErrorCategory::Configuration,
            Self::CsvError(_) | Self::IoError(_) | Self::SerializationError(_) => {
                ErrorCategory::Output
            }
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::Cancelled => ErrorSeverity::Low,
            Self::UpstreamUnavailable { .. } | Self::UpstreamStatus { .. } => {
                ErrorSeverity::Medium
            }
            Self::InvalidInput { .. }
            | Self::UpstreamStructured { .. }
            | Self::UpstreamMalformed { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. }
            | Self::UrlError(_) => ErrorSeverity::High,
            Self::HttpClientError(_)
            | Self::CsvError(_)
            | Self::IoError(_)
            | Self::SerializationError(_) => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::InvalidInput { .. } => {
                "Use dates in YYYY-MM-DD format with start before end, e.g. --start 2024-01-01 --end 2024-02-01"
            }
            Self::UpstreamUnavailable { .. } => {
                "The registry is busy or unreachable; retry later or raise retry.max_attempts"
            }
            Self::UpstreamStatus { .. } => "Check upstream.base_url and the query parameters",
            Self::UpstreamStructured { .. } => {
                "The registry rejected the filter; try another filter.date_literal or a smaller interval"
            }
            Self::UpstreamMalformed { .. } => {
                "The registry answered with an unexpected body; verify upstream.base_url"
            }
            Self::Cancelled => "The run was interrupted; start it again to fetch the full interval",
            Self::HttpClientError(_) => "Check network connectivity and TLS setup",
            Self::UrlError(_) => "Check the URLs in the [upstream] section of the config file",
            Self::InvalidConfigValueError { .. }
            | Self::ConfigValidationError { .. } => "Fix the configuration file and try again",
            Self::CsvError(_) | Self::IoError(_) | Self::SerializationError(_) => {
                "Check that the output location is writable"
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            Self::InvalidInput { reason } => format!("Invalid request: {}", reason),
            Self::Cancelled => "Fetch cancelled before completion, no output written".to_string(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;
