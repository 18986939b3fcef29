//! Two-tier credential resolution: request metadata first, then process configuration.

use super::Credentials;
use crate::config::{Config, ServerEndpoints};
use crate::error::{GatewayError, GatewayResult};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use std::collections::HashMap;

pub const META_EMAIL: &str = "x-apple-email";
pub const META_PASSWORD: &str = "x-apple-app-specific-password";
pub const META_CALDAV_SERVER: &str = "x-caldav-server";
pub const META_CARDDAV_SERVER: &str = "x-carddav-server";
pub const META_IMAP_SERVER: &str = "x-imap-server";
pub const META_IMAP_PORT: &str = "x-imap-port";
pub const META_SMTP_SERVER: &str = "x-smtp-server";
pub const META_SMTP_PORT: &str = "x-smtp-port";

/// Header-equivalent fields attached to a tool call. Keys are case-insensitive.
#[derive(Default, Clone)]
pub struct RequestMetadata {
    fields: HashMap<String, String>,
}

impl RequestMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a JSON value. Non-objects yield empty metadata.
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Object(map) => Self::from_object(map),
            _ => Self::new(),
        }
    }

    /// Build from a JSON object. Strings and numbers are kept; other values are ignored.
    pub fn from_object(map: &Map<String, Value>) -> Self {
        let mut meta = Self::new();
        for (key, v) in map {
            match v {
                Value::String(s) => meta.insert(key, s.clone()),
                Value::Number(n) => meta.insert(key, n.to_string()),
                _ => {}
            }
        }
        meta
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.fields.insert(key.to_ascii_lowercase(), value.into());
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.insert(key, value);
        self
    }

    /// Trimmed, non-empty value for a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .get(&key.to_ascii_lowercase())
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

impl std::fmt::Debug for RequestMetadata {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut keys: Vec<&String> = self.fields.keys().collect();
        keys.sort();
        f.debug_struct("RequestMetadata").field("keys", &keys).finish()
    }
}

/// Resolves per-request credentials against the process-wide fallback.
#[derive(Clone)]
pub struct CredentialResolver {
    fallback_email: Option<String>,
    fallback_password: Option<SecretString>,
    default_endpoints: ServerEndpoints,
}

impl CredentialResolver {
    pub fn new(config: &Config) -> Self {
        Self {
            fallback_email: config.fallback_email.clone(),
            fallback_password: config.fallback_password.clone(),
            default_endpoints: config.endpoints.clone(),
        }
    }

    /// Resolve credentials for one request.
    ///
    /// Request metadata wins when it carries both an email and a password. Otherwise the
    /// configured fallback is used when it is complete. Anything else is `Unauthorized`.
    ///
    /// Server overrides in the metadata only apply to metadata credentials. The fallback
    /// account always talks to the configured endpoints.
    pub fn resolve(&self, meta: &RequestMetadata) -> GatewayResult<Credentials> {
        let (email, secret, endpoints) = match (meta.get(META_EMAIL), meta.get(META_PASSWORD)) {
            (Some(email), Some(password)) => (
                email.to_string(),
                SecretString::new(password.to_string()),
                self.resolve_endpoints(meta)?,
            ),
            _ => match (&self.fallback_email, &self.fallback_password) {
                (Some(email), Some(password)) if !password.expose_secret().is_empty() => {
                    if has_endpoint_override(meta) {
                        tracing::debug!("Ignoring server overrides for fallback credentials");
                    }
                    (
                        email.clone(),
                        password.clone(),
                        self.default_endpoints.clone(),
                    )
                }
                _ => {
                    return Err(GatewayError::Unauthorized(format!(
                        "provide {} and {} in the request metadata, or configure \
                         ICLOUD_EMAIL and ICLOUD_APP_SPECIFIC_PASSWORD",
                        META_EMAIL, META_PASSWORD
                    )))
                }
            },
        };

        Ok(Credentials::new(email, secret, endpoints))
    }

    fn resolve_endpoints(&self, meta: &RequestMetadata) -> GatewayResult<ServerEndpoints> {
        let defaults = &self.default_endpoints;
        Ok(ServerEndpoints {
            caldav_url: meta
                .get(META_CALDAV_SERVER)
                .map(normalize_dav_url)
                .unwrap_or_else(|| defaults.caldav_url.clone()),
            carddav_url: meta
                .get(META_CARDDAV_SERVER)
                .map(normalize_dav_url)
                .unwrap_or_else(|| defaults.carddav_url.clone()),
            imap_host: meta
                .get(META_IMAP_SERVER)
                .map(str::to_string)
                .unwrap_or_else(|| defaults.imap_host.clone()),
            imap_port: parse_port(meta, META_IMAP_PORT, defaults.imap_port)?,
            smtp_host: meta
                .get(META_SMTP_SERVER)
                .map(str::to_string)
                .unwrap_or_else(|| defaults.smtp_host.clone()),
            smtp_port: parse_port(meta, META_SMTP_PORT, defaults.smtp_port)?,
        })
    }
}

fn has_endpoint_override(meta: &RequestMetadata) -> bool {
    [
        META_CALDAV_SERVER,
        META_CARDDAV_SERVER,
        META_IMAP_SERVER,
        META_IMAP_PORT,
        META_SMTP_SERVER,
        META_SMTP_PORT,
    ]
    .iter()
    .any(|key| meta.get(key).is_some())
}

/// Bare hostnames are accepted for DAV overrides and assumed to be HTTPS.
fn normalize_dav_url(value: &str) -> String {
    if value.starts_with("http://") || value.starts_with("https://") {
        value.to_string()
    } else {
        format!("https://{}", value)
    }
}

fn parse_port(meta: &RequestMetadata, key: &str, default: u16) -> GatewayResult<u16> {
    match meta.get(key) {
        None => Ok(default),
        Some(raw) => match raw.parse::<u16>() {
            Ok(port) if port > 0 => Ok(port),
            _ => Err(GatewayError::InvalidArgument(format!(
                "{} must be a port number, got: {}",
                key, raw
            ))),
        },
    }
}
