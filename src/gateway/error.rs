//! Gateway Error Handling
//!
//! Normalized failures of the project-data and content-generator services

use std::fmt;
use std::time::Duration;

use super::client::ServiceKind;

/// Gateway error types
#[derive(Debug, Clone)]
pub enum GatewayError {
    /// Connection refused, reset, DNS failure
    Unreachable {
        service: ServiceKind,
        message: String,
    },
    /// No response within the per-call timeout
    Timeout {
        service: ServiceKind,
        after: Duration,
    },
    /// HTTP 429
    RateLimited {
        service: ServiceKind,
        retry_after: Option<u64>,
    },
    /// HTTP 408 or 5xx
    Server {
        service: ServiceKind,
        status: u16,
        message: String,
    },
    /// HTTP 401 / 403
    Unauthorized {
        service: ServiceKind,
        status: u16,
        message: String,
    },
    /// Any other 4xx, or an error reported inside the response envelope
    InvalidRequest {
        service: ServiceKind,
        status: Option<u16>,
        message: String,
    },
    /// Content-policy rejection by the generator
    Rejected {
        service: ServiceKind,
        message: String,
    },
    /// Successful response that returned nothing usable
    Empty {
        service: ServiceKind,
    },
    /// Successful response that could not be decoded
    Protocol {
        service: ServiceKind,
        message: String,
    },
    /// The caller's cancellation token fired
    Cancelled {
        service: ServiceKind,
    },
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreachable { service, message } => {
                write!(f, "[{}] Service unreachable: {}", service, message)
            }
            Self::Timeout { service, after } => {
                write!(f, "[{}] Timed out after {}ms", service, after.as_millis())
            }
            Self::RateLimited { service, retry_after } => match retry_after {
                Some(secs) => write!(f, "[{}] Rate limit exceeded, retry after {} seconds", service, secs),
                None => write!(f, "[{}] Rate limit exceeded", service),
            },
            Self::Server { service, status, message } => {
                write!(f, "[{}] Server error ({}): {}", service, status, message)
            }
            Self::Unauthorized { service, status, message } => {
                write!(f, "[{}] Authorization rejected ({}): {}", service, status, message)
            }
            Self::InvalidRequest { service, status, message } => match status {
                Some(code) => write!(f, "[{}] Request rejected ({}): {}", service, code, message),
                None => write!(f, "[{}] Request rejected: {}", service, message),
            },
            Self::Rejected { service, message } => {
                write!(f, "[{}] Content rejected: {}", service, message)
            }
            Self::Empty { service } => write!(f, "[{}] Empty response", service),
            Self::Protocol { service, message } => {
                write!(f, "[{}] Malformed response: {}", service, message)
            }
            Self::Cancelled { service } => write!(f, "[{}] Call cancelled", service),
        }
    }
}

impl std::error::Error for GatewayError {}

impl GatewayError {
    pub fn unreachable(service: ServiceKind, message: impl Into<String>) -> Self {
        Self::Unreachable {
            service,
            message: message.into(),
        }
    }

    pub fn timeout(service: ServiceKind, after: Duration) -> Self {
        Self::Timeout { service, after }
    }

    pub fn rate_limited(service: ServiceKind, retry_after: Option<u64>) -> Self {
        Self::RateLimited { service, retry_after }
    }

    pub fn unauthorized(service: ServiceKind, status: u16, message: impl Into<String>) -> Self {
        Self::Unauthorized {
            service,
            status,
            message: message.into(),
        }
    }

    pub fn invalid_request(service: ServiceKind, message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            service,
            status: None,
            message: message.into(),
        }
    }

    pub fn rejected(service: ServiceKind, message: impl Into<String>) -> Self {
        Self::Rejected {
            service,
            message: message.into(),
        }
    }

    pub fn protocol(service: ServiceKind, message: impl Into<String>) -> Self {
        Self::Protocol {
            service,
            message: message.into(),
        }
    }

    pub fn cancelled(service: ServiceKind) -> Self {
        Self::Cancelled { service }
    }

    /// Classify a non-success HTTP status
    pub fn from_status(service: ServiceKind, status: u16, body: impl Into<String>) -> Self {
        let message = body.into();
        match status {
            401 | 403 => Self::Unauthorized { service, status, message },
            408 => Self::Server { service, status, message },
            429 => Self::RateLimited { service, retry_after: None },
            500..=599 => Self::Server { service, status, message },
            _ => Self::InvalidRequest {
                service,
                status: Some(status),
                message,
            },
        }
    }

    /// Classify a transport-level reqwest failure
    pub fn from_reqwest(service: ServiceKind, err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout { service, after: timeout }
        } else if err.is_decode() {
            Self::Protocol {
                service,
                message: err.to_string(),
            }
        } else if let Some(status) = err.status() {
            Self::from_status(service, status.as_u16(), err.to_string())
        } else {
            Self::Unreachable {
                service,
                message: err.to_string(),
            }
        }
    }

    /// Service that produced the error
    pub fn service(&self) -> ServiceKind {
        match self {
            Self::Unreachable { service, .. }
            | Self::Timeout { service, .. }
            | Self::RateLimited { service, .. }
            | Self::Server { service, .. }
            | Self::Unauthorized { service, .. }
            | Self::InvalidRequest { service, .. }
            | Self::Rejected { service, .. }
            | Self::Empty { service }
            | Self::Protocol { service, .. }
            | Self::Cancelled { service } => *service,
        }
    }

    /// The service refuses or cannot be reached at all, so retrying other
    /// calls to it is pointless once this call has given up
    pub fn is_service_down(&self) -> bool {
        matches!(self, Self::Unreachable { .. } | Self::Unauthorized { .. })
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Unreachable { .. }
                | Self::Timeout { .. }
                | Self::RateLimited { .. }
                | Self::Server { .. }
                | Self::Empty { .. }
        )
    }
}

/// Gateway result type
pub type GatewayResult<T> = Result<T, GatewayError>;
