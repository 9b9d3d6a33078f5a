//! Mailbox session: connection lifecycle, search and the wait loop
//!
//! A [`MailboxSession`] owns one server connection, the result of the
//! last search and the multipart walk state. Every method takes
//! `&mut self`; one session is driven by one task at a time.

use crate::config::ImapConfig;
use crate::connection::{self, ImapConnection};
use crate::criteria::Criteria;
use crate::error::{Error, Result};
use crate::flag::Flag;
use crate::message::{MessageRef, Payload};
use crate::transport::{FetchSection, Transport};
use crate::walker::MultipartWalk;
use std::time::Duration;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Time budget for [`MailboxSession::wait_for_message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Total wall-clock budget for the wait.
    pub timeout: Duration,
    /// Pause between two searches.
    pub poll_interval: Duration,
}

impl WaitOptions {
    #[must_use]
    pub const fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self::new(Duration::from_secs(60), Duration::from_secs(10))
    }
}

/// An open mailbox on an IMAP server.
pub struct MailboxSession<T: Transport = ImapConnection> {
    transport: Option<T>,
    mailbox: String,
    matched: Vec<MessageRef>,
    walk: MultipartWalk,
}

impl MailboxSession<ImapConnection> {
    /// Connect, log in and select `config.mailbox`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`], [`Error::Tls`] or
    /// [`Error::Authentication`] when the connection cannot be set up,
    /// and [`Error::Protocol`] if the mailbox cannot be selected.
    pub async fn open(config: &ImapConfig) -> Result<Self> {
        let transport = connection::connect(config).await?;
        Self::with_transport(transport, config.mailbox.clone()).await
    }
}

impl<T: Transport> MailboxSession<T> {
    /// Wrap an already authenticated transport and select `mailbox`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if the mailbox cannot be selected.
    pub async fn with_transport(mut transport: T, mailbox: impl Into<String>) -> Result<Self> {
        let mailbox = mailbox.into();
        transport.select(&mailbox).await?;
        info!("Opened mailbox {}", mailbox);

        Ok(Self {
            transport: Some(transport),
            mailbox,
            matched: Vec::new(),
            walk: MultipartWalk::new(),
        })
    }

    #[must_use]
    pub const fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    #[must_use]
    pub fn mailbox(&self) -> &str {
        &self.mailbox
    }

    /// References found by the most recent search.
    #[must_use]
    pub fn matched(&self) -> &[MessageRef] {
        &self.matched
    }

    fn transport(&mut self) -> Result<&mut T> {
        self.transport
            .as_mut()
            .ok_or_else(|| Error::State("mailbox is not open".to_string()))
    }

    /// Re-select the mailbox and search it once.
    ///
    /// The mailbox is selected again before searching because some
    /// servers only report new mail to a fresh SELECT. The result
    /// replaces the remembered match set.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if SELECT or SEARCH is refused and
    /// [`Error::Config`] if a criteria value cannot be sent.
    pub async fn search(&mut self, criteria: &Criteria) -> Result<&[MessageRef]> {
        let query = criteria.query()?;
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| Error::State("mailbox is not open".to_string()))?;

        transport.select(&self.mailbox).await?;
        let found = transport.search(&query).await?;
        debug!("Search '{}' matched {} messages", query, found.len());

        self.matched = found;
        Ok(&self.matched)
    }

    /// Poll the mailbox until a message matches `criteria`.
    ///
    /// Returns the most recent match. The mailbox is searched at least
    /// once, even with a zero timeout; between searches the session
    /// sleeps `poll_interval`, shortened so the total wait never
    /// exceeds `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Timeout`] when nothing matched within the
    /// budget and [`Error::Protocol`] as soon as SELECT or SEARCH is
    /// refused.
    pub async fn wait_for_message(
        &mut self,
        criteria: &Criteria,
        options: WaitOptions,
    ) -> Result<MessageRef> {
        self.poll(criteria, options, None).await
    }

    /// [`MailboxSession::wait_for_message`] that can also be aborted
    /// through `cancel`. Cancellation takes effect between two
    /// searches and leaves the last observed match set in place.
    ///
    /// # Errors
    ///
    /// As [`MailboxSession::wait_for_message`], plus [`Error::Cancelled`].
    pub async fn wait_for_message_cancellable(
        &mut self,
        criteria: &Criteria,
        options: WaitOptions,
        cancel: &CancellationToken,
    ) -> Result<MessageRef> {
        self.poll(criteria, options, Some(cancel)).await
    }

    async fn poll(
        &mut self,
        criteria: &Criteria,
        options: WaitOptions,
        cancel: Option<&CancellationToken>,
    ) -> Result<MessageRef> {
        // A timeout too large to represent means waiting without a deadline.
        let deadline = Instant::now().checked_add(options.timeout);
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            if let Some(latest) = self.search(criteria).await?.last() {
                info!("Message {} matched after {} searches", latest, attempts);
                return Ok(latest.clone());
            }

            let remaining =
                deadline.map(|deadline| deadline.saturating_duration_since(Instant::now()));
            if remaining.is_some_and(|left| left.is_zero()) {
                warn!(
                    "No message matched '{}' within {:?}",
                    criteria.tokens().join(" "),
                    options.timeout
                );
                return Err(Error::Timeout {
                    timeout: options.timeout,
                });
            }

            let pause = remaining.map_or(options.poll_interval, |left| {
                options.poll_interval.min(left)
            });
            debug!("No match yet, polling again in {:?}", pause);

            match cancel {
                Some(token) => {
                    tokio::select! {
                        () = token.cancelled() => return Err(Error::Cancelled),
                        () = sleep(pause) => {}
                    }
                }
                None => sleep(pause).await,
            }
        }
    }

    /// Flag a message `\Deleted` and expunge it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if STORE or EXPUNGE is refused.
    pub async fn delete_message(&mut self, reference: &MessageRef) -> Result<()> {
        let transport = self.transport()?;
        transport.add_flag(reference, Flag::Deleted).await?;
        transport.expunge().await?;

        self.matched.retain(|matched| matched != reference);
        if self.walk.is_walking(reference) {
            self.walk.reset();
        }
        debug!("Deleted message {}", reference);
        Ok(())
    }

    /// Delete every message of the last search result, which is then
    /// emptied.
    ///
    /// Returns how many messages were flagged.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if STORE or EXPUNGE is refused.
    pub async fn delete_all_matched(&mut self) -> Result<usize> {
        let matched = self.matched.clone();
        let transport = self.transport()?;
        for reference in &matched {
            transport.add_flag(reference, Flag::Deleted).await?;
        }
        transport.expunge().await?;

        // Expunged UIDs are never reused, so nothing is left to act on.
        self.matched.clear();
        self.walk.reset();
        info!("Deleted {} matched messages", matched.len());
        Ok(matched.len())
    }

    /// Set `\Seen` on a message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if STORE is refused.
    pub async fn mark_read(&mut self, reference: &MessageRef) -> Result<()> {
        self.transport()?.add_flag(reference, Flag::Seen).await
    }

    /// Set `\Seen` on every message of the last search result.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if STORE is refused.
    pub async fn mark_all_matched_read(&mut self) -> Result<usize> {
        let matched = self.matched.clone();
        let transport = self.transport()?;
        for reference in &matched {
            transport.add_flag(reference, Flag::Seen).await?;
        }
        debug!("Marked {} matched messages read", matched.len());
        Ok(matched.len())
    }

    /// Close the mailbox and the connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::State`] if the session is already closed, or the
    /// server's error if CLOSE/LOGOUT fails (the session then stays
    /// open).
    pub async fn close(&mut self) -> Result<()> {
        let transport = self
            .transport
            .as_mut()
            .ok_or_else(|| Error::State("close called without an open mailbox".to_string()))?;
        transport.close().await?;

        self.transport = None;
        self.walk.reset();
        Ok(())
    }

    /// The complete raw message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Protocol`] if FETCH is refused and
    /// [`Error::NotFound`] if no message has this reference.
    pub async fn fetch_raw(&mut self, reference: &MessageRef) -> Result<Vec<u8>> {
        self.transport()?.fetch(reference, FetchSection::Full).await
    }

    /// The message body without headers, quoted-printable decoded.
    ///
    /// # Errors
    ///
    /// As [`MailboxSession::fetch_raw`].
    pub async fn fetch_body_text(&mut self, reference: &MessageRef) -> Result<String> {
        let body = self.transport()?.fetch(reference, FetchSection::Text).await?;
        let decoded = quoted_printable::decode(&body, quoted_printable::ParseMode::Robust)
            .map_err(|e| Error::Parse(e.to_string()))?;
        Ok(String::from_utf8_lossy(&decoded).into_owned())
    }

    /// The body of a message.
    ///
    /// While a multipart walk is active on `reference` this is the
    /// decoded payload of the current part; otherwise the text body is
    /// fetched from the server.
    ///
    /// # Errors
    ///
    /// As [`MailboxSession::fetch_raw`].
    pub async fn message_body(&mut self, reference: &MessageRef) -> Result<String> {
        if self.walk.retain(reference) {
            return Ok(self.walk.payload(true)?.into_text_lossy());
        }
        self.fetch_body_text(reference).await
    }

    /// Start or continue walking the parts of `reference`.
    ///
    /// The message is fetched and parsed only when the walk starts.
    /// Returns the total number of parts while a part is selected, and
    /// `None` once the walk has run past the last part.
    ///
    /// # Errors
    ///
    /// Returns fetch errors, or [`Error::Parse`] for unreadable MIME.
    pub async fn walk_multipart(&mut self, reference: &MessageRef) -> Result<Option<usize>> {
        if !self.walk.retain(reference) {
            let raw = self.fetch_raw(reference).await?;
            self.walk.begin(reference.clone(), &raw)?;
        }
        Ok(self.walk.advance())
    }

    /// The multipart walk state, for the per-part accessors.
    #[must_use]
    pub const fn walk(&self) -> &MultipartWalk {
        &self.walk
    }

    /// Content type of the current part.
    ///
    /// # Errors
    ///
    /// Returns [`Error::State`] when no part is selected.
    pub fn current_content_type(&self) -> Result<&str> {
        self.walk.content_type()
    }

    /// Payload of the current part.
    ///
    /// # Errors
    ///
    /// Returns [`Error::State`] when no part is selected.
    pub fn current_payload(&self, decode: bool) -> Result<Payload> {
        self.walk.payload(decode)
    }
}
