//! Message references and payloads

use serde::Serialize;
use std::fmt;

/// Opaque identifier of a message, as returned by a mailbox search.
///
/// The session hands out IMAP UIDs, which stay valid when other
/// messages are expunged. Callers should treat the value as opaque.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MessageRef(String);

impl MessageRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<u32> for MessageRef {
    fn from(uid: u32) -> Self {
        Self(uid.to_string())
    }
}

impl From<&str> for MessageRef {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for MessageRef {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Content returned by payload accessors and link fetches.
///
/// `Text` is produced only when a character set was declared and
/// decoding was requested; everything else is passed through as
/// `Raw` bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    Text(String),
    Raw(Vec<u8>),
}

impl Payload {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Raw(bytes) => bytes,
        }
    }

    /// The decoded text, if this payload was decoded.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Raw(_) => None,
        }
    }

    /// Text view of the payload; raw bytes are read as lossy UTF-8.
    #[must_use]
    pub fn into_text_lossy(self) -> String {
        match self {
            Self::Text(text) => text,
            Self::Raw(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        }
    }
}
