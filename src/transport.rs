//! The protocol-client seam between a mailbox session and the server
//!
//! [`MailboxSession`](crate::MailboxSession) only talks to the server
//! through [`Transport`]. [`ImapConnection`](crate::ImapConnection)
//! implements it over `async-imap`; tests drive the session with
//! scripted implementations.

use crate::error::Result;
use crate::flag::Flag;
use crate::message::MessageRef;
use async_trait::async_trait;

/// Which part of a message a fetch returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSection {
    /// The complete RFC 822 message, headers included.
    Full,
    /// The message body without its top-level headers.
    Text,
}

impl FetchSection {
    /// The FETCH data item. `PEEK` keeps the `\Seen` flag untouched.
    #[must_use]
    pub const fn as_query(self) -> &'static str {
        match self {
            Self::Full => "BODY.PEEK[]",
            Self::Text => "BODY.PEEK[TEXT]",
        }
    }
}

/// Mailbox-level IMAP operations used by a session.
///
/// Implementations report a non-OK server completion as
/// [`Error::Protocol`](crate::Error::Protocol).
#[async_trait]
pub trait Transport: Send {
    /// SELECT `mailbox`.
    async fn select(&mut self, mailbox: &str) -> Result<()>;

    /// SEARCH with a ready-made query, returning references in
    /// ascending order.
    async fn search(&mut self, query: &str) -> Result<Vec<MessageRef>>;

    /// FETCH one section of a message. A reference that matches no
    /// message is an error.
    async fn fetch(&mut self, reference: &MessageRef, section: FetchSection) -> Result<Vec<u8>>;

    /// STORE `+FLAGS (flag)` on a message.
    async fn add_flag(&mut self, reference: &MessageRef, flag: Flag) -> Result<()>;

    /// EXPUNGE messages flagged `\Deleted`.
    async fn expunge(&mut self) -> Result<()>;

    /// CLOSE the mailbox and end the connection.
    async fn close(&mut self) -> Result<()>;
}
