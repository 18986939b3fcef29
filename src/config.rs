//! Configuration management for the iCloud gateway.
//!
//! This module handles loading and validating configuration from environment variables.
//! It avoids polluting stdout (which MCP uses for communication) by loading the .env
//! file through `dotenvy`, which never prints.
//!
//! Nothing here is mandatory: the fallback account is optional because credentials may
//! arrive with each request instead.

use crate::error::{ConfigError, ConfigResult};
use secrecy::SecretString;
use std::env;

pub const DEFAULT_CALDAV_SERVER: &str = "https://caldav.icloud.com";
pub const DEFAULT_CARDDAV_SERVER: &str = "https://contacts.icloud.com";
pub const DEFAULT_IMAP_SERVER: &str = "imap.mail.me.com";
pub const DEFAULT_IMAP_PORT: u16 = 993;
pub const DEFAULT_SMTP_SERVER: &str = "smtp.mail.me.com";
pub const DEFAULT_SMTP_PORT: u16 = 587;

/// Upstream endpoints for the four protocols.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerEndpoints {
    pub caldav_url: String,
    pub carddav_url: String,
    pub imap_host: String,
    pub imap_port: u16,
    pub smtp_host: String,
    pub smtp_port: u16,
}

impl Default for ServerEndpoints {
    fn default() -> Self {
        Self {
            caldav_url: DEFAULT_CALDAV_SERVER.to_string(),
            carddav_url: DEFAULT_CARDDAV_SERVER.to_string(),
            imap_host: DEFAULT_IMAP_SERVER.to_string(),
            imap_port: DEFAULT_IMAP_PORT,
            smtp_host: DEFAULT_SMTP_SERVER.to_string(),
            smtp_port: DEFAULT_SMTP_PORT,
        }
    }
}

/// Configuration for the iCloud gateway.
#[derive(Debug, Clone)]
pub struct Config {
    /// Fallback account email (`ICLOUD_EMAIL`)
    pub fallback_email: Option<String>,

    /// Fallback app-specific password (`ICLOUD_APP_SPECIFIC_PASSWORD`)
    pub fallback_password: Option<SecretString>,

    /// Default upstream endpoints, used when a request carries no overrides
    pub endpoints: ServerEndpoints,

    /// Upstream I/O timeout in seconds (default: 30)
    pub request_timeout: u64,

    /// Maximum number of tool calls served at once (default: 16)
    pub max_concurrent_calls: usize,

    /// Days before today covered by an unbounded event listing (default: 90)
    pub event_lookback_days: i64,

    /// Days after today covered by an unbounded event listing (default: 365)
    pub event_lookahead_days: i64,

    /// Mailbox used for non-permanent deletes when the server advertises no \Trash
    pub trash_folder: String,

    /// Log level (default: "error")
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional environment variables:
    /// - `ICLOUD_EMAIL` / `ICLOUD_APP_SPECIFIC_PASSWORD`: fallback account
    /// - `CALDAV_SERVER`, `CARDDAV_SERVER`: DAV base URLs
    /// - `IMAP_SERVER`, `IMAP_PORT`, `SMTP_SERVER`, `SMTP_PORT`: mail endpoints
    /// - `REQUEST_TIMEOUT`: upstream timeout in seconds (default: 30)
    /// - `MAX_CONCURRENT_CALLS`: in-flight tool call bound (default: 16)
    /// - `EVENT_LOOKBACK_DAYS` / `EVENT_LOOKAHEAD_DAYS`: default event window (90 / 365)
    /// - `MAIL_TRASH_FOLDER`: trash mailbox name (default: "Deleted Messages")
    /// - `LOG_LEVEL`: Logging level (default: "error")
    pub fn from_env() -> ConfigResult<Self> {
        // A missing .env is normal; a malformed one is not.
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(ConfigError::DotenvError(e.to_string()));
            }
        }

        let fallback_email = Self::non_empty_var("ICLOUD_EMAIL");
        let fallback_password =
            Self::non_empty_var("ICLOUD_APP_SPECIFIC_PASSWORD").map(SecretString::new);

        let defaults = ServerEndpoints::default();
        let caldav_url = Self::non_empty_var("CALDAV_SERVER").unwrap_or(defaults.caldav_url);
        let carddav_url = Self::non_empty_var("CARDDAV_SERVER").unwrap_or(defaults.carddav_url);

        for (var, value) in [("CALDAV_SERVER", &caldav_url), ("CARDDAV_SERVER", &carddav_url)] {
            if !value.starts_with("http://") && !value.starts_with("https://") {
                return Err(ConfigError::InvalidValue {
                    var: var.to_string(),
                    reason: "Must start with http:// or https://".to_string(),
                });
            }
        }

        let endpoints = ServerEndpoints {
            caldav_url,
            carddav_url,
            imap_host: Self::non_empty_var("IMAP_SERVER").unwrap_or(defaults.imap_host),
            imap_port: Self::parse_env_u16("IMAP_PORT", defaults.imap_port)?,
            smtp_host: Self::non_empty_var("SMTP_SERVER").unwrap_or(defaults.smtp_host),
            smtp_port: Self::parse_env_u16("SMTP_PORT", defaults.smtp_port)?,
        };

        let request_timeout = Self::parse_env_u64("REQUEST_TIMEOUT", 30)?;
        if request_timeout == 0 {
            return Err(ConfigError::InvalidValue {
                var: "REQUEST_TIMEOUT".to_string(),
                reason: "Must be greater than zero".to_string(),
            });
        }

        let max_concurrent_calls = Self::parse_env_u64("MAX_CONCURRENT_CALLS", 16)? as usize;
        if max_concurrent_calls == 0 {
            return Err(ConfigError::InvalidValue {
                var: "MAX_CONCURRENT_CALLS".to_string(),
                reason: "Must be greater than zero".to_string(),
            });
        }

        let event_lookback_days = Self::parse_env_u64("EVENT_LOOKBACK_DAYS", 90)? as i64;
        let event_lookahead_days = Self::parse_env_u64("EVENT_LOOKAHEAD_DAYS", 365)? as i64;

        let trash_folder =
            Self::non_empty_var("MAIL_TRASH_FOLDER").unwrap_or_else(|| "Deleted Messages".to_string());

        let log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "error".to_string());

        Ok(Config {
            fallback_email,
            fallback_password,
            endpoints,
            request_timeout,
            max_concurrent_calls,
            event_lookback_days,
            event_lookahead_days,
            trash_folder,
            log_level,
        })
    }

    /// Read a variable, treating blank values as unset.
    fn non_empty_var(var_name: &str) -> Option<String> {
        env::var(var_name)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    /// Parse an environment variable as u64 with a default value.
    fn parse_env_u64(var_name: &str, default: u64) -> ConfigResult<u64> {
        match env::var(var_name) {
            Ok(val) => val.trim().parse::<u64>().map_err(|_| ConfigError::InvalidValue {
                var: var_name.to_string(),
                reason: format!("Must be a positive number, got: {}", val),
            }),
            Err(_) => Ok(default),
        }
    }

    /// Parse an environment variable as a TCP port with a default value.
    fn parse_env_u16(var_name: &str, default: u16) -> ConfigResult<u16> {
        match env::var(var_name) {
            Ok(val) => match val.trim().parse::<u16>() {
                Ok(port) if port > 0 => Ok(port),
                _ => Err(ConfigError::InvalidValue {
                    var: var_name.to_string(),
                    reason: format!("Must be a port number between 1-65535, got: {}", val),
                }),
            },
            Err(_) => Ok(default),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            fallback_email: None,
            fallback_password: None,
            endpoints: ServerEndpoints::default(),
            request_timeout: 30,
            max_concurrent_calls: 16,
            event_lookback_days: 90,
            event_lookahead_days: 365,
            trash_folder: "Deleted Messages".to_string(),
            log_level: "error".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use serial_test::serial;
    use std::env;

    const MANAGED_VARS: [&str; 14] = [
        "ICLOUD_EMAIL",
        "ICLOUD_APP_SPECIFIC_PASSWORD",
        "CALDAV_SERVER",
        "CARDDAV_SERVER",
        "IMAP_SERVER",
        "IMAP_PORT",
        "SMTP_SERVER",
        "SMTP_PORT",
        "REQUEST_TIMEOUT",
        "MAX_CONCURRENT_CALLS",
        "EVENT_LOOKBACK_DAYS",
        "EVENT_LOOKAHEAD_DAYS",
        "MAIL_TRASH_FOLDER",
        "LOG_LEVEL",
    ];

    // Helper to set and unset env vars for testing
    struct EnvGuard {
        vars: Vec<String>,
    }

    impl EnvGuard {
        fn new() -> Self {
            for var in MANAGED_VARS {
                env::remove_var(var);
            }
            EnvGuard { vars: Vec::new() }
        }

        fn set(&mut self, key: &str, value: &str) {
            env::set_var(key, value);
            self.vars.push(key.to_string());
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for var in &self.vars {
                env::remove_var(var);
            }
        }
    }

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.request_timeout, 30);
        assert_eq!(config.max_concurrent_calls, 16);
        assert_eq!(config.event_lookback_days, 90);
        assert_eq!(config.event_lookahead_days, 365);
        assert_eq!(config.endpoints.imap_port, 993);
        assert_eq!(config.endpoints.smtp_port, 587);
        assert!(config.fallback_email.is_none());
    }

    #[test]
    #[serial]
    fn test_config_from_env_without_fallback_account() {
        let _guard = EnvGuard::new();

        let config = Config::from_env().unwrap();
        assert!(config.fallback_email.is_none());
        assert!(config.fallback_password.is_none());
        assert_eq!(config.endpoints, ServerEndpoints::default());
    }

    #[test]
    #[serial]
    fn test_config_from_env_valid() {
        let mut guard = EnvGuard::new();
        guard.set("ICLOUD_EMAIL", "user@icloud.com");
        guard.set("ICLOUD_APP_SPECIFIC_PASSWORD", "abcd-efgh-ijkl-mnop");
        guard.set("IMAP_PORT", "1993");
        guard.set("REQUEST_TIMEOUT", "12");
        guard.set("MAIL_TRASH_FOLDER", "Trash");

        let config = Config::from_env().unwrap();
        assert_eq!(config.fallback_email.as_deref(), Some("user@icloud.com"));
        assert_eq!(
            config.fallback_password.as_ref().unwrap().expose_secret(),
            "abcd-efgh-ijkl-mnop"
        );
        assert_eq!(config.endpoints.imap_port, 1993);
        assert_eq!(config.request_timeout, 12);
        assert_eq!(config.trash_folder, "Trash");
    }

    #[test]
    #[serial]
    fn test_config_blank_values_are_unset() {
        let mut guard = EnvGuard::new();
        guard.set("ICLOUD_EMAIL", "   ");
        guard.set("IMAP_SERVER", "");

        let config = Config::from_env().unwrap();
        assert!(config.fallback_email.is_none());
        assert_eq!(config.endpoints.imap_host, DEFAULT_IMAP_SERVER);
    }

    #[test]
    #[serial]
    fn test_config_from_env_invalid_url() {
        let mut guard = EnvGuard::new();
        guard.set("CALDAV_SERVER", "caldav.example.com");

        let result = Config::from_env();
        match result {
            Err(ConfigError::InvalidValue { var, .. }) => assert_eq!(var, "CALDAV_SERVER"),
            other => panic!("Expected InvalidValue error, got: {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_config_invalid_port() {
        let mut guard = EnvGuard::new();
        guard.set("SMTP_PORT", "70000");

        match Config::from_env() {
            Err(ConfigError::InvalidValue { var, .. }) => assert_eq!(var, "SMTP_PORT"),
            other => panic!("Expected InvalidValue error, got: {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_config_zero_timeout_rejected() {
        let mut guard = EnvGuard::new();
        guard.set("REQUEST_TIMEOUT", "0");

        match Config::from_env() {
            Err(ConfigError::InvalidValue { var, .. }) => assert_eq!(var, "REQUEST_TIMEOUT"),
            other => panic!("Expected InvalidValue error, got: {:?}", other),
        }
    }

    #[test]
    #[serial]
    fn test_parse_env_u64() {
        let mut guard = EnvGuard::new();
        guard.set("TEST_GATEWAY_U64", "42");

        let result = Config::parse_env_u64("TEST_GATEWAY_U64", 10);
        assert_eq!(result.unwrap(), 42);

        let result = Config::parse_env_u64("NONEXISTENT_GATEWAY_VAR", 10);
        assert_eq!(result.unwrap(), 10);
    }

    #[test]
    #[serial]
    fn test_parse_env_u64_invalid() {
        let mut guard = EnvGuard::new();
        guard.set("TEST_GATEWAY_U64_INVALID", "not-a-number");

        let result = Config::parse_env_u64("TEST_GATEWAY_U64_INVALID", 10);
        assert!(result.is_err());
    }
}
