//! Workspace error type.
//!
//! Each crate keeps its own error enum and converts into [`AppError`] at
//! the crate boundary; the HTTP layer renders `AppError` as JSON.

use std::fmt;

use thiserror::Error;

/// Error category. Its `Display` form is the machine-readable code sent to
/// HTTP clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown connection or resource.
    NotFound,
    /// Request carried no identity.
    Authentication,
    /// Malformed input.
    Validation,
    /// Capacity limit reached.
    RateLimit,
    /// Bug or unexpected runtime failure.
    Internal,
    /// Invalid or unreadable configuration.
    Configuration,
    /// A value could not be encoded.
    Serialization,
    /// Overloaded or shutting down; retrying later may succeed.
    ServiceUnavailable,
}

impl ErrorKind {
    /// Upper snake case code, e.g. `NOT_FOUND`.
    pub fn code(self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Authentication => "AUTHENTICATION",
            Self::Validation => "VALIDATION",
            Self::RateLimit => "RATE_LIMIT",
            Self::Internal => "INTERNAL",
            Self::Configuration => "CONFIGURATION",
            Self::Serialization => "SERIALIZATION",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Categorized error with an optional cause.
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    /// Category.
    pub kind: ErrorKind,
    /// Message safe to show to clients.
    pub message: String,
    /// Underlying cause, kept for logs.
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl AppError {
    /// Error without an underlying cause.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for [`ErrorKind::Authentication`].
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Authentication, message)
    }

    /// Shorthand for [`ErrorKind::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// Shorthand for [`ErrorKind::Internal`].
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Shorthand for [`ErrorKind::Configuration`].
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Configuration, message)
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        Self {
            kind: ErrorKind::Configuration,
            message: format!("Configuration error: {err}"),
            source: Some(Box::new(err)),
        }
    }
}
