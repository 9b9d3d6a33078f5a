//! IMAP connection configuration

use crate::error::{Error, Result};
use std::env;
use std::fmt;
use std::str::FromStr;

/// How the connection to the IMAP server is secured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Security {
    /// TLS from the first byte (IMAPS).
    #[default]
    Tls,
    /// Plain TCP upgraded with the STARTTLS command.
    StartTls,
    /// No transport security at all.
    Plain,
}

impl Security {
    /// The well-known port for this mode: 993 for implicit TLS, 143
    /// otherwise.
    #[must_use]
    pub const fn default_port(self) -> u16 {
        match self {
            Self::Tls => 993,
            Self::StartTls | Self::Plain => 143,
        }
    }
}

impl FromStr for Security {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "tls" | "ssl" | "imaps" => Ok(Self::Tls),
            "starttls" => Ok(Self::StartTls),
            "plain" | "none" => Ok(Self::Plain),
            other => Err(Error::Config(format!("Unknown security mode: {other}"))),
        }
    }
}

impl fmt::Display for Security {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Tls => "tls",
            Self::StartTls => "starttls",
            Self::Plain => "plain",
        })
    }
}

/// IMAP connection configuration
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub security: Security,
    /// Mailbox selected after login and before every search.
    pub mailbox: String,
    /// Skip certificate verification (self-signed test servers).
    pub accept_invalid_certs: bool,
}

impl ImapConfig {
    /// Configuration for a secure (implicit TLS) connection on port 993
    /// with the `INBOX` mailbox.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: Security::Tls.default_port(),
            username: username.into(),
            password: password.into(),
            security: Security::Tls,
            mailbox: "INBOX".to_string(),
            accept_invalid_certs: false,
        }
    }

    /// Switch the security mode. The port follows the mode's default;
    /// call [`ImapConfig::with_port`] afterwards to override it.
    #[must_use]
    pub const fn with_security(mut self, security: Security) -> Self {
        self.security = security;
        self.port = security.default_port();
        self
    }

    #[must_use]
    pub const fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    #[must_use]
    pub fn with_mailbox(mut self, mailbox: impl Into<String>) -> Self {
        self.mailbox = mailbox.into();
        self
    }

    #[must_use]
    pub const fn with_accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }

    /// Load IMAP configuration from environment variables
    ///
    /// Reads from `.env` file if present. Required variables:
    /// - `IMAP_HOST`
    /// - `IMAP_USERNAME`
    /// - `IMAP_PASSWORD`
    ///
    /// Optional (with defaults):
    /// - `IMAP_SECURITY` (default: `tls`; also `starttls`, `plain`)
    /// - `IMAP_PORT` (default: 993 for `tls`, 143 otherwise)
    /// - `IMAP_MAILBOX` (default: `INBOX`)
    /// - `IMAP_ACCEPT_INVALID_CERTS` (default: `false`)
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let security = match env::var("IMAP_SECURITY") {
            Ok(value) => value.parse()?,
            Err(_) => Security::default(),
        };

        let port = match env::var("IMAP_PORT") {
            Ok(value) => value
                .parse()
                .map_err(|e| Error::Config(format!("Invalid IMAP_PORT: {e}")))?,
            Err(_) => security.default_port(),
        };

        let accept_invalid_certs = match env::var("IMAP_ACCEPT_INVALID_CERTS") {
            Ok(value) => parse_bool(&value)
                .ok_or_else(|| Error::Config(format!("Invalid IMAP_ACCEPT_INVALID_CERTS: {value}")))?,
            Err(_) => false,
        };

        Ok(Self {
            host: env::var("IMAP_HOST").map_err(|_| Error::Config("IMAP_HOST not set".into()))?,
            port,
            username: env::var("IMAP_USERNAME")
                .map_err(|_| Error::Config("IMAP_USERNAME not set".into()))?,
            password: env::var("IMAP_PASSWORD")
                .map_err(|_| Error::Config("IMAP_PASSWORD not set".into()))?,
            security,
            mailbox: env::var("IMAP_MAILBOX").unwrap_or_else(|_| "INBOX".to_string()),
            accept_invalid_certs,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
