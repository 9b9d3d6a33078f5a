//! IMAP mailbox testing toolkit
//!
//! Connects to an IMAP mailbox, waits for a message matching a set of
//! [`Criteria`], and inspects what arrived: the body, the links in it,
//! and each MIME part of a multipart message.
//!
//! The keyword surface for acceptance tests is [`ImapLibrary`]. The
//! building blocks underneath it are [`MailboxSession`], which owns the
//! connection and the polling loop, and [`MultipartWalk`], which steps
//! through the parts of one fetched message.
//!
//! Any type implementing [`Transport`] can stand in for the network
//! connection, which is how the polling loop is tested without a server.

mod config;
mod connection;
mod criteria;
mod error;
mod flag;
mod library;
mod links;
mod message;
mod session;
mod transport;
mod walker;

pub use config::{ImapConfig, Security};
pub use connection::{ImapConnection, ImapSession, ImapStream, connect};
pub use criteria::Criteria;
pub use error::{Error, Result};
pub use flag::Flag;
pub use library::ImapLibrary;
pub use links::{extract_links, find_matches, open_url};
pub use message::{MessageRef, Payload};
pub use session::{MailboxSession, WaitOptions};
pub use transport::{FetchSection, Transport};
pub use walker::{MultipartWalk, ParsedMessage, Part};
