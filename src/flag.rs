//! Flag changes applied with IMAP STORE
//!
//! Only the two system flags this crate sets are modelled: `\Seen`
//! for marking messages read and `\Deleted` ahead of an expunge.

use std::fmt;

/// A system flag the session may add to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Message has been read (`\Seen`).
    Seen,
    /// Message is marked for deletion (`\Deleted`).
    Deleted,
}

impl Flag {
    /// The IMAP wire representation, including the leading backslash.
    #[must_use]
    pub const fn as_imap_str(self) -> &'static str {
        match self {
            Self::Seen => "\\Seen",
            Self::Deleted => "\\Deleted",
        }
    }

    /// The STORE data item that adds this flag, e.g. `+FLAGS (\Seen)`.
    #[must_use]
    pub fn add_query(self) -> String {
        format!("+FLAGS ({})", self.as_imap_str())
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_imap_str())
    }
}
