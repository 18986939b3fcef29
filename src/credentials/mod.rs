//! Request-scoped credentials.
//!
//! A [`Credentials`] value is built fresh for every tool call by the
//! [`CredentialResolver`] and dropped when the call ends. It is never cached.

pub mod resolver;

pub use resolver::{CredentialResolver, RequestMetadata};

use crate::config::ServerEndpoints;
use crate::domain::email::mask;
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

/// Account identity plus the upstream endpoints to use for one request.
#[derive(Clone)]
pub struct Credentials {
    email: String,
    secret: SecretString,
    endpoints: ServerEndpoints,
}

impl Credentials {
    pub fn new(email: impl Into<String>, secret: SecretString, endpoints: ServerEndpoints) -> Self {
        Self {
            email: email.into(),
            secret,
            endpoints,
        }
    }

    /// Account email, used as the login name for every protocol.
    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn secret(&self) -> &SecretString {
        &self.secret
    }

    pub fn endpoints(&self) -> &ServerEndpoints {
        &self.endpoints
    }

    /// Log-safe account label.
    pub fn masked_email(&self) -> String {
        mask(&self.email)
    }

    /// Remove any occurrence of the secret from a message bound for the caller.
    pub fn scrub(&self, message: &str) -> String {
        let secret = self.secret.expose_secret();
        if secret.is_empty() || !message.contains(secret.as_str()) {
            return message.to_string();
        }
        message.replace(secret.as_str(), "[REDACTED]")
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.masked_email())
            .field("secret", &"[REDACTED]")
            .field("endpoints", &self.endpoints)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Credentials {
        Credentials::new(
            "someone@icloud.com",
            SecretString::new("abcd-efgh-ijkl-mnop".to_string()),
            ServerEndpoints::default(),
        )
    }

    #[test]
    fn test_debug_never_shows_secret() {
        let rendered = format!("{:?}", creds());
        assert!(!rendered.contains("abcd-efgh-ijkl-mnop"));
        assert!(!rendered.contains("someone@icloud.com"));
        assert!(rendered.contains("som***"));
    }

    #[test]
    fn test_scrub() {
        let c = creds();
        let scrubbed = c.scrub("LOGIN someone abcd-efgh-ijkl-mnop failed");
        assert_eq!(scrubbed, "LOGIN someone [REDACTED] failed");
        assert_eq!(c.scrub("nothing here"), "nothing here");
    }
}
