//! Mailbox search criteria
//!
//! A [`Criteria`] value is turned into IMAP SEARCH tokens in a fixed
//! order: sender, recipient, subject, body text, status. Supplying no
//! key at all searches for `UNSEEN` messages. Several keys are simply
//! concatenated, which IMAP servers evaluate as a logical AND.

use crate::error::{Error, Result};

/// Filter for [`crate::MailboxSession::wait_for_message`].
///
/// # Examples
///
/// ```
/// use imap_testkit::Criteria;
///
/// let criteria = Criteria::new()
///     .sender("noreply@example.com")
///     .subject("Welcome");
/// assert_eq!(
///     criteria.tokens(),
///     vec!["FROM", "noreply@example.com", "SUBJECT", "Welcome"]
/// );
/// assert_eq!(Criteria::new().tokens(), vec!["UNSEEN"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Criteria {
    pub sender: Option<String>,
    pub recipient: Option<String>,
    pub subject: Option<String>,
    pub text: Option<String>,
    /// A raw IMAP status key such as `UNSEEN`, `SEEN` or `ALL`.
    pub status: Option<String>,
}

/// One search term: a keyword and, for address/text keys, its value.
type Term<'a> = (&'a str, Option<&'a str>);

impl Criteria {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn sender(mut self, sender: impl Into<String>) -> Self {
        self.sender = Some(sender.into());
        self
    }

    #[must_use]
    pub fn recipient(mut self, recipient: impl Into<String>) -> Self {
        self.recipient = Some(recipient.into());
        self
    }

    #[must_use]
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    #[must_use]
    pub fn status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    /// The search tokens, unquoted, in derivation order.
    #[must_use]
    pub fn tokens(&self) -> Vec<String> {
        self.terms()
            .into_iter()
            .flat_map(|(key, value)| std::iter::once(key).chain(value))
            .map(str::to_string)
            .collect()
    }

    /// The SEARCH query as sent on the wire, with values quoted.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a value contains CR, LF or NUL,
    /// none of which can travel inside a single command line.
    pub fn query(&self) -> Result<String> {
        let terms = self
            .terms()
            .into_iter()
            .map(|(key, value)| {
                reject_line_breaks(key)?;
                Ok(match value {
                    Some(value) => format!("{key} {}", quote(reject_line_breaks(value)?)),
                    None => key.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(terms.join(" "))
    }

    fn terms(&self) -> Vec<Term<'_>> {
        let keyed = [
            ("FROM", self.sender.as_deref()),
            ("TO", self.recipient.as_deref()),
            ("SUBJECT", self.subject.as_deref()),
            ("TEXT", self.text.as_deref()),
        ];

        let mut terms: Vec<Term<'_>> = keyed
            .into_iter()
            .filter_map(|(key, value)| non_empty(value).map(|v| (key, Some(v))))
            .collect();

        if let Some(status) = non_empty(self.status.as_deref()) {
            terms.push((status, None));
        }
        if terms.is_empty() {
            terms.push(("UNSEEN", None));
        }
        terms
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

fn reject_line_breaks(value: &str) -> Result<&str> {
    if value.contains(['\r', '\n', '\0']) {
        return Err(Error::Config(format!(
            "Search value {value:?} contains a line break or NUL"
        )));
    }
    Ok(value)
}

/// Render `value` as an IMAP quoted string.
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{escaped}\"")
}
