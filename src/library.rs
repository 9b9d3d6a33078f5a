//! Keyword facade for test suites
//!
//! [`ImapLibrary`] exposes one method per keyword of the mailbox
//! testing vocabulary. It holds at most one open [`MailboxSession`]
//! and an HTTP client for following links.
//!
//! ```no_run
//! use imap_testkit::{Criteria, ImapConfig, ImapLibrary, WaitOptions};
//! use std::time::Duration;
//!
//! # async fn run() -> imap_testkit::Result<()> {
//! let mut library = ImapLibrary::new();
//! library
//!     .open_mailbox(&ImapConfig::new("imap.example.com", "qa@example.com", "secret"))
//!     .await?;
//!
//! let latest = library
//!     .wait_for_email(
//!         &Criteria::new().sender("noreply@example.com"),
//!         WaitOptions::new(Duration::from_secs(300), Duration::from_secs(10)),
//!     )
//!     .await?;
//!
//! let page = library.open_link_from_email(&latest, 0).await?;
//! assert!(page.into_text_lossy().contains("Your email address has been updated"));
//! library.close_mailbox().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::ImapConfig;
use crate::criteria::Criteria;
use crate::error::{Error, Result};
use crate::links;
use crate::message::{MessageRef, Payload};
use crate::session::{MailboxSession, WaitOptions};
use crate::transport::Transport;
use tracing::warn;

/// Mailbox testing keywords.
pub struct ImapLibrary<T: Transport = crate::ImapConnection> {
    session: Option<MailboxSession<T>>,
    http: reqwest::Client,
}

impl ImapLibrary {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session: None,
            http: reqwest::Client::new(),
        }
    }

    /// Open Mailbox: connect, log in and select the mailbox.
    ///
    /// A mailbox that is already open is closed first; a failure to
    /// close it is logged and otherwise ignored.
    ///
    /// # Errors
    ///
    /// See [`MailboxSession::open`].
    pub async fn open_mailbox(&mut self, config: &ImapConfig) -> Result<()> {
        self.release_session().await;
        self.session = Some(MailboxSession::open(config).await?);
        Ok(())
    }
}

impl Default for ImapLibrary {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Transport> ImapLibrary<T> {
    /// Build a library around an existing session, e.g. one with a
    /// custom transport.
    #[must_use]
    pub fn with_session(session: MailboxSession<T>, http: reqwest::Client) -> Self {
        Self {
            session: Some(session),
            http,
        }
    }

    /// The open session.
    ///
    /// # Errors
    ///
    /// Returns [`Error::State`] if no mailbox is open.
    pub fn session(&mut self) -> Result<&mut MailboxSession<T>> {
        self.session
            .as_mut()
            .filter(|session| session.is_open())
            .ok_or_else(|| Error::State("no mailbox is open".to_string()))
    }

    /// Wait For Email: poll until a message matches and return the
    /// latest match.
    ///
    /// # Errors
    ///
    /// See [`MailboxSession::wait_for_message`].
    pub async fn wait_for_email(
        &mut self,
        criteria: &Criteria,
        options: WaitOptions,
    ) -> Result<MessageRef> {
        self.session()?.wait_for_message(criteria, options).await
    }

    /// Deprecated name of [`ImapLibrary::wait_for_email`].
    ///
    /// # Errors
    ///
    /// See [`MailboxSession::wait_for_message`].
    #[deprecated(note = "use `wait_for_email`")]
    pub async fn wait_for_mail(
        &mut self,
        criteria: &Criteria,
        options: WaitOptions,
    ) -> Result<MessageRef> {
        self.wait_for_email(criteria, options).await
    }

    /// Get Email Body.
    ///
    /// # Errors
    ///
    /// See [`MailboxSession::message_body`].
    pub async fn get_email_body(&mut self, reference: &MessageRef) -> Result<String> {
        self.session()?.message_body(reference).await
    }

    /// Get Links From Email: every `href` target of the body.
    ///
    /// # Errors
    ///
    /// See [`MailboxSession::message_body`].
    pub async fn get_links_from_email(&mut self, reference: &MessageRef) -> Result<Vec<String>> {
        let body = self.get_email_body(reference).await?;
        Ok(links::extract_links(&body))
    }

    /// Get Matches From Email: every match of `pattern` in the body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pattern`] for an invalid regex, or body errors.
    pub async fn get_matches_from_email(
        &mut self,
        reference: &MessageRef,
        pattern: &str,
    ) -> Result<Vec<String>> {
        let body = self.get_email_body(reference).await?;
        links::find_matches(&body, pattern)
    }

    /// Open Link From Email: fetch the `index`-th link of the body.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the body has no such link and
    /// [`Error::Http`] if the request fails.
    pub async fn open_link_from_email(
        &mut self,
        reference: &MessageRef,
        index: usize,
    ) -> Result<Payload> {
        let urls = self.get_links_from_email(reference).await?;
        let url = urls
            .get(index)
            .ok_or_else(|| Error::NotFound(format!("Link number {index} not found")))?;
        links::open_url(&self.http, url).await
    }

    /// Deprecated name of [`ImapLibrary::open_link_from_email`].
    ///
    /// # Errors
    ///
    /// See [`ImapLibrary::open_link_from_email`].
    #[deprecated(note = "use `open_link_from_email`")]
    pub async fn open_link_from_mail(
        &mut self,
        reference: &MessageRef,
        index: usize,
    ) -> Result<Payload> {
        self.open_link_from_email(reference, index).await
    }

    /// Delete Email.
    ///
    /// # Errors
    ///
    /// See [`MailboxSession::delete_message`].
    pub async fn delete_email(&mut self, reference: &MessageRef) -> Result<()> {
        self.session()?.delete_message(reference).await
    }

    /// Delete All Emails found by the last wait.
    ///
    /// # Errors
    ///
    /// See [`MailboxSession::delete_all_matched`].
    pub async fn delete_all_emails(&mut self) -> Result<usize> {
        self.session()?.delete_all_matched().await
    }

    /// Mark Email As Read.
    ///
    /// # Errors
    ///
    /// See [`MailboxSession::mark_read`].
    pub async fn mark_email_as_read(&mut self, reference: &MessageRef) -> Result<()> {
        self.session()?.mark_read(reference).await
    }

    /// Mark All Emails As Read found by the last wait.
    ///
    /// # Errors
    ///
    /// See [`MailboxSession::mark_all_matched_read`].
    pub async fn mark_all_emails_as_read(&mut self) -> Result<usize> {
        self.session()?.mark_all_matched_read().await
    }

    /// Deprecated name of [`ImapLibrary::mark_all_emails_as_read`].
    ///
    /// # Errors
    ///
    /// See [`MailboxSession::mark_all_matched_read`].
    #[deprecated(note = "use `mark_all_emails_as_read`")]
    pub async fn mark_as_read(&mut self) -> Result<usize> {
        self.mark_all_emails_as_read().await
    }

    async fn release_session(&mut self) {
        let Some(mut previous) = self.session.take() else {
            return;
        };
        if !previous.is_open() {
            return;
        }
        if let Err(e) = previous.close().await {
            warn!("Could not close previous mailbox {}: {}", previous.mailbox(), e);
        }
    }

    /// Close Mailbox.
    ///
    /// # Errors
    ///
    /// Returns [`Error::State`] if no mailbox is open.
    pub async fn close_mailbox(&mut self) -> Result<()> {
        self.session()?.close().await?;
        self.session = None;
        Ok(())
    }

    /// Walk Multipart Email: select the next part of `reference`.
    ///
    /// Returns the number of parts, or `None` once every part has been
    /// visited and the walk has been reset.
    ///
    /// # Errors
    ///
    /// See [`MailboxSession::walk_multipart`].
    pub async fn walk_multipart_email(&mut self, reference: &MessageRef) -> Result<Option<usize>> {
        self.session()?.walk_multipart(reference).await
    }

    /// Get Multipart Content Type of the current part.
    ///
    /// # Errors
    ///
    /// Returns [`Error::State`] when no part is selected.
    pub fn get_multipart_content_type(&mut self) -> Result<String> {
        Ok(self.session()?.walk().content_type()?.to_string())
    }

    /// Get Multipart Payload of the current part.
    ///
    /// # Errors
    ///
    /// Returns [`Error::State`] when no part is selected.
    pub fn get_multipart_payload(&mut self, decode: bool) -> Result<Payload> {
        self.session()?.walk().payload(decode)
    }

    /// Get Multipart Field Names of the walked message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::State`] when no part is selected.
    pub fn get_multipart_field_names(&mut self) -> Result<Vec<String>> {
        Ok(self
            .session()?
            .walk()
            .field_names()?
            .into_iter()
            .map(str::to_string)
            .collect())
    }

    /// Get Multipart Field: a header value of the walked message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::State`] when no part is selected.
    pub fn get_multipart_field(&mut self, name: &str) -> Result<Option<String>> {
        Ok(self.session()?.walk().field(name)?.map(str::to_string))
    }
}
