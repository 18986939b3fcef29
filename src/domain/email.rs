//! EmailAddress value object.

use super::errors::ValidationError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// A type-safe wrapper for email addresses.
///
/// Validation is shallow: exactly one '@', a non-empty local part and a
/// dotted domain. A display-name form such as `Jane <jane@example.com>` is reduced to
/// the bare address.
///
/// # Example
///
/// ```
/// use icloud_gateway::domain::EmailAddress;
///
/// let email = EmailAddress::new("Jane <jane@example.com>").unwrap();
/// assert_eq!(email.as_str(), "jane@example.com");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmailAddress(String);

impl EmailAddress {
    /// Create a new EmailAddress, validating the format.
    ///
    /// # Errors
    ///
    /// Returns `ValidationError::InvalidEmail` if the email format is invalid.
    pub fn new(email: impl Into<String>) -> Result<Self, ValidationError> {
        let raw = email.into();
        let trimmed = raw.trim();
        let bare = match (trimmed.rfind('<'), trimmed.rfind('>')) {
            (Some(open), Some(close)) if open < close => trimmed[open + 1..close].trim(),
            _ => trimmed,
        };

        if !Self::is_valid(bare) {
            return Err(ValidationError::InvalidEmail(raw));
        }

        Ok(Self(bare.to_string()))
    }

    /// Parse a comma-separated recipient list. Blank entries are ignored.
    pub fn parse_list(list: &str) -> Result<Vec<Self>, ValidationError> {
        list.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(Self::new)
            .collect()
    }

    fn is_valid(email: &str) -> bool {
        let Some((local, domain)) = email.split_once('@') else {
            return false;
        };

        if local.is_empty() || domain.contains('@') {
            return false;
        }

        if email.chars().any(|c| c.is_whitespace() || c == ',') {
            return false;
        }

        domain.contains('.') && domain.split('.').all(|part| !part.is_empty())
    }

    /// Get the email address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert into the underlying String.
    pub fn into_inner(self) -> String {
        self.0
    }

    /// Get the domain part (after '@').
    pub fn domain(&self) -> &str {
        self.0.split_once('@').map(|(_, d)| d).unwrap_or_default()
    }

    /// A log-safe rendering that keeps only the first three characters.
    pub fn masked(&self) -> String {
        mask(&self.0)
    }
}

/// Mask an account identifier for logging.
pub fn mask(value: &str) -> String {
    let prefix: String = value.chars().take(3).collect();
    format!("{}***", prefix)
}

// Serde support - serialize as string
impl Serialize for EmailAddress {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

// Serde support - deserialize from string with validation
impl<'de> Deserialize<'de> for EmailAddress {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        EmailAddress::new(s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_validates_format() {
        assert!(EmailAddress::new("invalid").is_err());
        assert!(EmailAddress::new("@example.com").is_err());
        assert!(EmailAddress::new("user@").is_err());
        assert!(EmailAddress::new("user@domain").is_err());
        assert!(EmailAddress::new("user@@example.com").is_err());
        assert!(EmailAddress::new("two words@example.com").is_err());
        assert!(EmailAddress::new("valid@example.com").is_ok());
        assert!(EmailAddress::new("user.name+tag@example.co.uk").is_ok());
    }

    #[test]
    fn test_email_display_name_is_stripped() {
        let email = EmailAddress::new("  Jane Doe <jane@example.com> ").unwrap();
        assert_eq!(email.as_str(), "jane@example.com");
        assert_eq!(email.domain(), "example.com");
    }

    #[test]
    fn test_parse_list() {
        let list = EmailAddress::parse_list("a@example.com, b@example.org,,").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].as_str(), "b@example.org");

        let err = EmailAddress::parse_list("a@example.com, nope").unwrap_err();
        assert_eq!(err, ValidationError::InvalidEmail("nope".to_string()));

        assert!(EmailAddress::parse_list("").unwrap().is_empty());
    }

    #[test]
    fn test_masked() {
        let email = EmailAddress::new("someone@icloud.com").unwrap();
        assert_eq!(email.masked(), "som***");
        assert_eq!(mask("ab"), "ab***");
    }

    #[test]
    fn test_email_deserialization_invalid_fails() {
        let ok: EmailAddress = serde_json::from_str("\"user@example.com\"").unwrap();
        assert_eq!(ok.to_string(), "user@example.com");
        let result: Result<EmailAddress, _> = serde_json::from_str("\"invalid\"");
        assert!(result.is_err());
    }
}
