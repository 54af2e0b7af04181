//! Structured error handling for the presenter server
//!
//! A single error taxonomy shared by the session orchestrator, the speech
//! gateway and the HTTP surface. Upstream (gateway) failures are normalized
//! into these variants before they leave the pipeline.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::gateway::GatewayError;

/// Result type alias with PresenterError
pub type Result<T> = std::result::Result<T, PresenterError>;

/// One failed attempt against a speech engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineAttempt {
    /// Engine name
    pub engine: String,
    /// What went wrong
    pub error: String,
}

impl fmt::Display for EngineAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.engine, self.error)
    }
}

/// Main error type for the presenter
#[derive(Error, Debug, Clone)]
pub enum PresenterError {
    /// Bad theme, language or project id. Returned synchronously, no session is created.
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Project data or AI generator cannot be reached; fatal for a session
    #[error("Upstream unavailable ({service}): {message}")]
    UpstreamUnavailable {
        service: String,
        message: String,
    },

    /// Timeout, rate limit or 5xx on a single call; retried with backoff
    #[error("Transient upstream failure ({service}): {message}")]
    UpstreamTransient {
        service: String,
        message: String,
    },

    /// A single theme permanently failed to generate
    #[error("Content rejected for theme {theme}: {message}")]
    ContentRejected {
        theme: String,
        message: String,
    },

    /// Every speech engine failed or none supports the language
    #[error("Speech synthesis exhausted for language {language}: {}", format_attempts(.attempts))]
    SynthesisExhausted {
        language: String,
        attempts: Vec<EngineAttempt>,
    },

    /// Unknown or evicted session id
    #[error("Session not found: {session_id}")]
    SessionNotFound {
        session_id: String,
    },

    /// The operation was cancelled (session terminated)
    #[error("Cancelled: {reason}")]
    Cancelled {
        reason: String,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// I/O errors
    #[error("I/O error: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
    },

    /// Internal/bug errors
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        location: Option<String>,
    },
}

fn format_attempts(attempts: &[EngineAttempt]) -> String {
    if attempts.is_empty() {
        return "no engine supports this language".to_string();
    }
    attempts
        .iter()
        .map(|a| a.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl PresenterError {
    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a validation error for a specific request field
    pub fn invalid_field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a session-not-found error
    pub fn session_not_found(session_id: impl fmt::Display) -> Self {
        Self::SessionNotFound {
            session_id: session_id.to_string(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>, location: &str) -> Self {
        Self::Internal {
            message: message.into(),
            location: Some(location.to_string()),
        }
    }

    /// Stable machine-readable code, sent to clients alongside the message
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::UpstreamUnavailable { .. } => "UPSTREAM_UNAVAILABLE",
            Self::UpstreamTransient { .. } => "UPSTREAM_TRANSIENT",
            Self::ContentRejected { .. } => "CONTENT_REJECTED",
            Self::SynthesisExhausted { .. } => "SYNTHESIS_EXHAUSTED",
            Self::SessionNotFound { .. } => "SESSION_NOT_FOUND",
            Self::Cancelled { .. } => "CANCELLED",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Io { .. } => "IO_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Check if the failed operation may succeed when retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamTransient { .. })
    }
}

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add a simple message context
    fn context(self, msg: impl Into<String>) -> Result<T>;

    /// Attach the file path the failed I/O operation was working on
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, msg: impl Into<String>) -> Result<T> {
        self.map_err(|e| PresenterError::Io {
            message: format!("{}: {}", msg.into(), e),
            path: None,
        })
    }

    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| PresenterError::Io {
            message: e.to_string(),
            path: Some(path.into()),
        })
    }
}

impl From<GatewayError> for PresenterError {
    fn from(err: GatewayError) -> Self {
        if let GatewayError::Cancelled { .. } = err {
            return PresenterError::Cancelled {
                reason: err.to_string(),
            };
        }
        let service = err.service().to_string();
        if err.is_retryable() {
            PresenterError::UpstreamTransient {
                service,
                message: err.to_string(),
            }
        } else {
            PresenterError::UpstreamUnavailable {
                service,
                message: err.to_string(),
            }
        }
    }
}

impl From<std::io::Error> for PresenterError {
    fn from(err: std::io::Error) -> Self {
        PresenterError::Io {
            message: err.to_string(),
            path: None,
        }
    }
}

impl From<serde_json::Error> for PresenterError {
    fn from(err: serde_json::Error) -> Self {
        PresenterError::Internal {
            message: format!("JSON encoding failed: {}", err),
            location: None,
        }
    }
}

impl From<serde_yaml::Error> for PresenterError {
    fn from(err: serde_yaml::Error) -> Self {
        PresenterError::Config {
            message: err.to_string(),
            path: None,
        }
    }
}
