//! Error types for the iCloud gateway.
//!
//! This module defines custom error types using `thiserror` for precise error handling.
//! `GatewayError` is the taxonomy every tool call failure is reported in; its
//! [`ErrorKind`] is the stable machine-readable part of a failure.

use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Stable failure kinds reported to tool callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unauthorized,
    AuthError,
    ConnectionError,
    InvalidArgument,
    NotFound,
    ProtocolError,
}

impl ErrorKind {
    /// The wire name of this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unauthorized => "unauthorized",
            Self::AuthError => "auth_error",
            Self::ConnectionError => "connection_error",
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::ProtocolError => "protocol_error",
        }
    }

    /// All kinds, in declaration order.
    pub const ALL: [ErrorKind; 6] = [
        Self::Unauthorized,
        Self::AuthError,
        Self::ConnectionError,
        Self::InvalidArgument,
        Self::NotFound,
        Self::ProtocolError,
    ];
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur while serving a tool call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// No usable credentials could be resolved for the request
    #[error("Authentication required: {0}")]
    Unauthorized(String),

    /// The upstream server rejected the credentials
    #[error("Upstream rejected credentials: {0}")]
    AuthFailed(String),

    /// The upstream server could not be reached
    #[error("Connection error: {0}")]
    Connection(String),

    /// The call did not finish within the configured timeout
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// A tool argument is missing or malformed
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The referenced calendar, event, contact or message does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Upstream returned an HTTP status outside the expected range
    #[error("Upstream error (status {status}): {message}")]
    Status { status: u16, message: String },

    /// Upstream answered with something the gateway could not use
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl GatewayError {
    /// Classify this error into the stable taxonomy.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::AuthFailed(_) => ErrorKind::AuthError,
            Self::Connection(_) | Self::Timeout(_) => ErrorKind::ConnectionError,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Status { .. } | Self::Protocol(_) => ErrorKind::ProtocolError,
        }
    }

    /// Map an HTTP status code returned by a DAV server.
    pub fn from_http_status(status: u16, context: &str) -> Self {
        match status {
            401 | 403 => Self::AuthFailed(format!("{} (HTTP {})", context, status)),
            404 | 410 => Self::NotFound(context.to_string()),
            412 => Self::Status {
                status,
                message: format!("{}: resource changed on the server (precondition failed)", context),
            },
            _ => Self::Status {
                status,
                message: context.to_string(),
            },
        }
    }
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Environment variable has invalid value
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue { var: String, reason: String },

    /// Failed to load .env file
    #[error("Failed to load .env file: {0}")]
    DotenvError(String),
}

/// Convenience type alias for Results with GatewayError
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Convenience type alias for Results with ConfigError
pub type ConfigResult<T> = Result<T, ConfigError>;
