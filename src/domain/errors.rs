//! Domain validation errors.

use crate::error::GatewayError;
use std::fmt;

/// Errors that can occur during domain value object validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided reference is empty.
    EmptyReference,

    /// The provided email address is invalid.
    InvalidEmail(String),

    /// The provided message id is not an IMAP UID.
    InvalidUid(String),
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyReference => write!(f, "Reference cannot be empty"),
            Self::InvalidEmail(email) => write!(f, "Invalid email address: {}", email),
            Self::InvalidUid(uid) => {
                write!(f, "Invalid message id (expected a numeric UID): {}", uid)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for GatewayError {
    fn from(err: ValidationError) -> Self {
        GatewayError::InvalidArgument(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_validation_error_is_invalid_argument() {
        let err: GatewayError = ValidationError::InvalidUid("abc".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(err.to_string().contains("abc"));
    }
}
