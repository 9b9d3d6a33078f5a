//! Error types for imap-testkit

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The server answered a command with a non-OK status.
    #[error("IMAP {command} failed with {status}: {response}")]
    Protocol {
        command: &'static str,
        status: String,
        response: String,
    },

    #[error("IMAP error: {0}")]
    Imap(String),

    #[error("No message received within {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Wait for message was cancelled")]
    Cancelled,

    #[error("Invalid state: {0}")]
    State(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Email parsing error: {0}")]
    Parse(String),

    #[error("Invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Map an `async-imap` failure of `command` onto the crate taxonomy.
    ///
    /// Tagged `NO`/`BAD` completions become [`Error::Protocol`] with the
    /// raw status and server text kept for diagnostics.
    pub(crate) fn from_imap(command: &'static str, err: async_imap::error::Error) -> Self {
        use async_imap::error::Error as ImapError;

        match err {
            ImapError::No(response) => Self::Protocol {
                command,
                status: "NO".to_string(),
                response,
            },
            ImapError::Bad(response) => Self::Protocol {
                command,
                status: "BAD".to_string(),
                response,
            },
            ImapError::Io(e) => Self::Io(e),
            other => Self::Imap(format!("{command} failed: {other}")),
        }
    }

    pub(crate) fn no_part_selected() -> Self {
        Self::State("no part currently selected".to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
