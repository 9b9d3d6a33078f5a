//! Multipart message walk
//!
//! A [`MultipartWalk`] is a cursor over the MIME parts of one message.
//! It is either idle or walking a message identified by its
//! [`MessageRef`]; advancing past the last part clears everything and
//! returns to idle, so a drained walk cannot be mistaken for an active
//! one.
//!
//! The walk never talks to the server itself. The session fetches the
//! raw message and hands it to [`MultipartWalk::begin`].

use crate::error::{Error, Result};
use crate::message::{MessageRef, Payload};
use mailparse::ParsedMail;
use tracing::{debug, warn};

/// One node of a parsed message, in depth-first order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    content_type: String,
    charset: Option<String>,
    headers: Vec<(String, String)>,
    raw: Vec<u8>,
    /// Headers plus body, kept for decoding on demand.
    source: Vec<u8>,
}

impl Part {
    fn from_parsed(node: &ParsedMail<'_>) -> Result<Self> {
        let charset = node.ctype.params.get("charset").cloned();
        let (_, body_start) =
            mailparse::parse_headers(node.raw_bytes).map_err(|e| Error::Parse(e.to_string()))?;
        let raw = node.raw_bytes.get(body_start..).unwrap_or_default().to_vec();

        Ok(Self {
            content_type: node.ctype.mimetype.clone(),
            charset,
            headers: collect_headers(node),
            raw,
            source: node.raw_bytes.to_vec(),
        })
    }

    /// Lower-cased MIME type, e.g. `text/html`.
    #[must_use]
    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    /// The declared `charset` parameter, if any.
    #[must_use]
    pub fn charset(&self) -> Option<&str> {
        self.charset.as_deref()
    }

    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// The part body exactly as it appears in the message.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// The payload, decoded to text only when `decode` is set and the
    /// part declares a character set. A body that fails to decode (bad
    /// base64, for one) comes back raw.
    #[must_use]
    pub fn payload(&self, decode: bool) -> Payload {
        if !decode || self.charset.is_none() {
            return Payload::Raw(self.raw.clone());
        }
        // Transfer decoding and charset conversion in one step.
        match mailparse::parse_mail(&self.source).and_then(|node| node.get_body()) {
            Ok(text) => Payload::Text(text),
            Err(e) => {
                warn!(
                    "Cannot decode {} part, returning raw bytes: {}",
                    self.content_type, e
                );
                Payload::Raw(self.raw.clone())
            }
        }
    }
}

/// A message decomposed into its header fields and flattened parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessage {
    headers: Vec<(String, String)>,
    parts: Vec<Part>,
}

impl ParsedMessage {
    /// Parse a raw RFC 822 message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the MIME structure cannot be read.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let root = mailparse::parse_mail(raw).map_err(|e| Error::Parse(e.to_string()))?;

        let mut parts = Vec::new();
        flatten(&root, &mut parts)?;

        Ok(Self {
            headers: collect_headers(&root),
            parts,
        })
    }

    /// Top-level header fields, in message order.
    #[must_use]
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// All parts, the message itself first.
    #[must_use]
    pub fn parts(&self) -> &[Part] {
        &self.parts
    }
}

fn flatten(node: &ParsedMail<'_>, out: &mut Vec<Part>) -> Result<()> {
    out.push(Part::from_parsed(node)?);
    for sub in &node.subparts {
        flatten(sub, out)?;
    }
    Ok(())
}

fn collect_headers(node: &ParsedMail<'_>) -> Vec<(String, String)> {
    node.headers
        .iter()
        .map(|h| (h.get_key(), h.get_value()))
        .collect()
}

#[derive(Debug, Default)]
enum WalkState {
    #[default]
    Idle,
    Walking(ActiveWalk),
}

#[derive(Debug)]
struct ActiveWalk {
    reference: MessageRef,
    message: ParsedMessage,
    /// Index of the next part to hand out.
    cursor: usize,
}

impl ActiveWalk {
    fn current(&self) -> Option<&Part> {
        self.cursor
            .checked_sub(1)
            .and_then(|idx| self.message.parts.get(idx))
    }
}

/// Cursor over the parts of one message at a time.
#[derive(Debug, Default)]
pub struct MultipartWalk {
    state: WalkState,
}

impl MultipartWalk {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a walk over `reference` is in progress.
    #[must_use]
    pub fn is_walking(&self, reference: &MessageRef) -> bool {
        matches!(&self.state, WalkState::Walking(walk) if walk.reference == *reference)
    }

    /// Keep the walk only if it is over `reference`; a walk over any
    /// other message is dropped. Returns whether a walk remains.
    pub fn retain(&mut self, reference: &MessageRef) -> bool {
        if self.is_walking(reference) {
            return true;
        }
        self.reset();
        false
    }

    /// Start walking `raw`, replacing any previous walk. No part is
    /// current until the first [`MultipartWalk::advance`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] if the message cannot be parsed; the
    /// walk is left idle.
    pub fn begin(&mut self, reference: MessageRef, raw: &[u8]) -> Result<()> {
        self.reset();
        let message = ParsedMessage::parse(raw)?;
        debug!(
            "Walking message {} ({} parts)",
            reference,
            message.parts.len()
        );
        self.state = WalkState::Walking(ActiveWalk {
            reference,
            message,
            cursor: 0,
        });
        Ok(())
    }

    /// Move to the next part.
    ///
    /// Returns the total number of parts while parts remain. Past the
    /// last part the walk is cleared and `None` is returned.
    pub fn advance(&mut self) -> Option<usize> {
        let WalkState::Walking(walk) = &mut self.state else {
            return None;
        };

        let total = walk.message.parts.len();
        if walk.cursor < total {
            walk.cursor += 1;
            Some(total)
        } else {
            debug!("Walk over message {} exhausted", walk.reference);
            self.reset();
            None
        }
    }

    pub fn reset(&mut self) {
        self.state = WalkState::Idle;
    }

    /// The part the cursor is on.
    ///
    /// # Errors
    ///
    /// Returns [`Error::State`] when no part is selected.
    pub fn current_part(&self) -> Result<&Part> {
        match &self.state {
            WalkState::Walking(walk) => walk.current().ok_or_else(Error::no_part_selected),
            WalkState::Idle => Err(Error::no_part_selected()),
        }
    }

    /// # Errors
    ///
    /// Returns [`Error::State`] when no part is selected.
    pub fn content_type(&self) -> Result<&str> {
        Ok(self.current_part()?.content_type())
    }

    /// # Errors
    ///
    /// Returns [`Error::State`] when no part is selected.
    pub fn payload(&self, decode: bool) -> Result<Payload> {
        Ok(self.current_part()?.payload(decode))
    }

    /// Header field names of the walked message, in order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::State`] when no part is selected.
    pub fn field_names(&self) -> Result<Vec<&str>> {
        Ok(self
            .walked_message()?
            .headers
            .iter()
            .map(|(name, _)| name.as_str())
            .collect())
    }

    /// First value of the header field `name` (case-insensitive) of the
    /// walked message.
    ///
    /// # Errors
    ///
    /// Returns [`Error::State`] when no part is selected.
    pub fn field(&self, name: &str) -> Result<Option<&str>> {
        Ok(self
            .walked_message()?
            .headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str()))
    }

    fn walked_message(&self) -> Result<&ParsedMessage> {
        match &self.state {
            WalkState::Walking(walk) if walk.current().is_some() => Ok(&walk.message),
            _ => Err(Error::no_part_selected()),
        }
    }
}
