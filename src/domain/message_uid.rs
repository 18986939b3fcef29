//! MessageUid value object.

use super::errors::ValidationError;
use std::fmt;
use std::str::FromStr;

/// An IMAP message UID. Message ids exchanged with callers are UIDs rendered as
/// decimal strings, stable for the lifetime of the mailbox's UIDVALIDITY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageUid(u32);

impl MessageUid {
    pub fn new(uid: u32) -> Result<Self, ValidationError> {
        if uid == 0 {
            return Err(ValidationError::InvalidUid(uid.to_string()));
        }
        Ok(Self(uid))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl FromStr for MessageUid {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.parse::<u32>() {
            Ok(uid) if uid > 0 => Ok(Self(uid)),
            _ => Err(ValidationError::InvalidUid(s.to_string())),
        }
    }
}

impl fmt::Display for MessageUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
