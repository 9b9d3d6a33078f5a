//! UID SEARCH command handler.
//!
//! Matches emails against parsed `SearchKey` criteria from imap-types.
//! We support:
//!
//! - `All`, `Unseen` / `Seen`, `Deleted` / `Undeleted` -- flag filters
//! - `From`, `To`, `Subject` -- substring of the header value
//! - `Text` -- substring anywhere in the message, `Body` -- in the body
//! - `And`, `Or`, `Not` -- logical combinators
//!
//! String keys match case-insensitively, as RFC 3501 Section 6.4.4
//! requires. The response format (RFC 3501 Section 7.2.5):
//!
//! ```text
//! * SEARCH 1 2 3
//! A0003 OK SEARCH completed
//! ```

use crate::fake_imap::io::write_line;
use crate::fake_imap::mailbox::{Mailbox, TestEmail};
use imap_codec::imap_types::core::AString;
use imap_codec::imap_types::search::SearchKey;
use mailparse::MailHeaderMap;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// Handle the UID SEARCH command. Returns matching UIDs from the
/// selected folder.
pub async fn handle_uid_search<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    criteria: &[SearchKey<'_>],
    mailbox: &Mailbox,
    selected_folder: Option<&str>,
    stream: &mut BufReader<S>,
) {
    let Some(folder_name) = selected_folder else {
        let resp = format!("{tag} BAD No folder selected\r\n");
        let _ = write_line(stream, &resp).await;
        return;
    };

    let Some(folder) = mailbox.get_folder(folder_name) else {
        let resp = format!("{tag} BAD Folder not found\r\n");
        let _ = write_line(stream, &resp).await;
        return;
    };

    let uids: Vec<String> = folder
        .emails
        .iter()
        .filter(|e| criteria.iter().all(|key| matches_key(e, key)))
        .map(|e| e.uid.to_string())
        .collect();

    // An empty result set is still "* SEARCH\r\n".
    let search_line = if uids.is_empty() {
        "* SEARCH\r\n".to_string()
    } else {
        format!("* SEARCH {}\r\n", uids.join(" "))
    };
    let _ = write_line(stream, &search_line).await;
    let resp = format!("{tag} OK SEARCH completed\r\n");
    let _ = write_line(stream, &resp).await;
}

/// Check if a test email matches a single `SearchKey`.
#[allow(clippy::match_same_arms)]
fn matches_key(email: &TestEmail, key: &SearchKey<'_>) -> bool {
    match key {
        SearchKey::All => true,
        SearchKey::Unseen => !email.seen,
        SearchKey::Seen => email.seen,
        SearchKey::Deleted => email.deleted,
        SearchKey::Undeleted => !email.deleted,
        SearchKey::From(value) => header_contains(email, "From", value),
        SearchKey::To(value) => header_contains(email, "To", value),
        SearchKey::Subject(value) => header_contains(email, "Subject", value),
        SearchKey::Text(value) => contains(&email.raw, value),
        SearchKey::Body(value) => contains(email.text(), value),
        SearchKey::And(keys) => keys.as_ref().iter().all(|k| matches_key(email, k)),
        SearchKey::Or(a, b) => matches_key(email, a) || matches_key(email, b),
        SearchKey::Not(k) => !matches_key(email, k),
        // Unsupported keys match nothing so tests notice.
        _ => false,
    }
}

fn needle(value: &AString<'_>) -> String {
    String::from_utf8_lossy(value.as_ref()).to_lowercase()
}

fn contains(haystack: &[u8], value: &AString<'_>) -> bool {
    String::from_utf8_lossy(haystack)
        .to_lowercase()
        .contains(&needle(value))
}

fn header_contains(email: &TestEmail, name: &str, value: &AString<'_>) -> bool {
    mailparse::parse_headers(&email.raw)
        .ok()
        .and_then(|(headers, _)| headers.get_first_value(name))
        .is_some_and(|header| header.to_lowercase().contains(&needle(value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::mailbox::MailboxBuilder;
    use tokio::io::BufReader;

    fn make_email(from: &str, to: &str, subject: &str, body: &str) -> Vec<u8> {
        format!("From: {from}\r\nTo: {to}\r\nSubject: {subject}\r\n\r\n{body}").into_bytes()
    }

    fn astring(value: &str) -> AString<'static> {
        AString::try_from(value.to_string()).unwrap()
    }

    fn mailbox() -> Mailbox {
        MailboxBuilder::new()
            .folder("INBOX")
            .email(
                1,
                true,
                &make_email("shop@example.com", "qa@example.com", "Order shipped", "Tracking"),
            )
            .email(
                2,
                false,
                &make_email("noreply@example.com", "qa@example.com", "Welcome aboard", "Hi"),
            )
            .email(
                3,
                false,
                &make_email("noreply@example.com", "ops@example.com", "Reset password", "Code"),
            )
            .build()
    }

    async fn run(
        tag: &str,
        criteria: &[SearchKey<'_>],
        mailbox: &Mailbox,
        selected: Option<&str>,
    ) -> String {
        let (client, server) = tokio::io::duplex(4096);
        let mut stream = BufReader::new(server);

        handle_uid_search(tag, criteria, mailbox, selected, &mut stream).await;
        drop(stream);

        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut BufReader::new(client), &mut buf)
            .await
            .unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[tokio::test]
    async fn search_all_returns_all_uids() {
        let output = run("A1", &[SearchKey::All], &mailbox(), Some("INBOX")).await;

        assert!(output.contains("* SEARCH 1 2 3\r\n"));
        assert!(output.contains("A1 OK SEARCH completed"));
    }

    #[tokio::test]
    async fn search_unseen_filters_seen() {
        let output = run("A1", &[SearchKey::Unseen], &mailbox(), Some("INBOX")).await;
        assert!(output.contains("* SEARCH 2 3\r\n"));
    }

    #[tokio::test]
    async fn header_keys_match_case_insensitive_substrings() {
        let output = run(
            "A1",
            &[SearchKey::From(astring("NOREPLY@")), SearchKey::To(astring("qa@"))],
            &mailbox(),
            Some("INBOX"),
        )
        .await;
        assert!(output.contains("* SEARCH 2\r\n"));

        let output = run(
            "A1",
            &[SearchKey::Subject(astring("password"))],
            &mailbox(),
            Some("INBOX"),
        )
        .await;
        assert!(output.contains("* SEARCH 3\r\n"));
    }

    #[tokio::test]
    async fn text_searches_headers_and_body() {
        let output = run(
            "A1",
            &[SearchKey::Text(astring("tracking"))],
            &mailbox(),
            Some("INBOX"),
        )
        .await;
        assert!(output.contains("* SEARCH 1\r\n"));
    }

    #[tokio::test]
    async fn no_match_returns_empty_search() {
        let output = run(
            "A1",
            &[SearchKey::Subject(astring("invoice"))],
            &mailbox(),
            Some("INBOX"),
        )
        .await;

        assert!(output.contains("* SEARCH\r\n"));
        assert!(output.contains("A1 OK SEARCH completed"));
    }

    #[tokio::test]
    async fn no_folder_selected_returns_bad() {
        let output = run("A1", &[SearchKey::All], &mailbox(), None).await;
        assert!(output.contains("A1 BAD No folder selected"));
    }

    #[tokio::test]
    async fn missing_folder_returns_bad() {
        let output = run("A1", &[SearchKey::All], &mailbox(), Some("Gone")).await;
        assert!(output.contains("A1 BAD Folder not found"));
    }
}
