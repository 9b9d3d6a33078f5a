//! UID STORE command handler.
//!
//! The client only ever adds `\Seen` or `\Deleted` to a single UID, but
//! the handler accepts the full `+FLAGS` / `-FLAGS` / `FLAGS` forms and
//! UID ranges so tests can set up state through the wire as well.
//!
//! Unless `.SILENT` was requested, each touched message is echoed as
//! `* <seq> FETCH (UID <uid> FLAGS (...))` before the tagged OK.

use crate::fake_imap::io::write_line;
use crate::fake_imap::mailbox::{Mailbox, TestEmail};
use imap_codec::imap_types::flag::{Flag, StoreResponse, StoreType};
use imap_codec::imap_types::sequence::{SeqOrUid, Sequence, SequenceSet};
use std::ops::RangeInclusive;
use std::sync::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// The borrowed pieces of a parsed `UID STORE` command.
pub struct StoreArgs<'a> {
    pub sequence_set: &'a SequenceSet,
    pub kind: &'a StoreType,
    pub response: &'a StoreResponse,
    pub flags: &'a [Flag<'a>],
}

impl StoreArgs<'_> {
    fn names(&self, flag: &Flag<'_>) -> bool {
        self.flags.iter().any(|f| f == flag)
    }

    /// Apply this store to one message.
    fn apply(&self, email: &mut TestEmail) {
        let seen = self.names(&Flag::Seen);
        let deleted = self.names(&Flag::Deleted);
        match self.kind {
            StoreType::Add => {
                email.seen |= seen;
                email.deleted |= deleted;
            }
            StoreType::Remove => {
                email.seen &= !seen;
                email.deleted &= !deleted;
            }
            StoreType::Replace => {
                email.seen = seen;
                email.deleted = deleted;
            }
        }
    }
}

/// UID ranges named by the set; `*` stands for the highest UID present.
fn uid_ranges(seq_set: &SequenceSet, highest: u32) -> Vec<RangeInclusive<u32>> {
    let resolve = |s: &SeqOrUid| match s {
        SeqOrUid::Value(v) => v.get(),
        SeqOrUid::Asterisk => highest,
    };
    seq_set
        .0
        .as_ref()
        .iter()
        .map(|seq| match seq {
            Sequence::Single(s) => resolve(s)..=resolve(s),
            Sequence::Range(a, b) => {
                let (a, b) = (resolve(a), resolve(b));
                a.min(b)..=a.max(b)
            }
        })
        .collect()
}

pub async fn handle_uid_store<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    args: &StoreArgs<'_>,
    mailbox: &Mutex<Mailbox>,
    selected_folder: Option<&str>,
    stream: &mut BufReader<S>,
) {
    let Some(folder_name) = selected_folder else {
        let resp = format!("{tag} BAD No folder selected\r\n");
        let _ = write_line(stream, &resp).await;
        return;
    };

    // Mutate under the lock, write afterwards.
    let updates: Option<Vec<String>> = {
        let mut mb = mailbox.lock().unwrap();
        mb.get_folder_mut(folder_name).map(|folder| {
            let highest = folder.emails.iter().map(|e| e.uid).max().unwrap_or(0);
            let ranges = uid_ranges(args.sequence_set, highest);
            folder
                .emails
                .iter_mut()
                .enumerate()
                .filter(|(_, e)| ranges.iter().any(|r| r.contains(&e.uid)))
                .map(|(idx, email)| {
                    args.apply(email);
                    format!(
                        "* {} FETCH (UID {} FLAGS ({}))\r\n",
                        idx + 1,
                        email.uid,
                        email.flag_list()
                    )
                })
                .collect()
        })
    };

    let Some(updates) = updates else {
        let resp = format!("{tag} BAD Folder not found\r\n");
        let _ = write_line(stream, &resp).await;
        return;
    };

    if !matches!(args.response, StoreResponse::Silent) {
        for line in &updates {
            if write_line(stream, line).await.is_err() {
                return;
            }
        }
    }

    let resp = format!("{tag} OK STORE completed\r\n");
    let _ = write_line(stream, &resp).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::mailbox::MailboxBuilder;
    use std::num::NonZeroU32;
    use tokio::io::AsyncReadExt;

    const RAW: &[u8] = b"From: shop@example.com\r\nSubject: Order\r\n\r\nThanks";

    fn uid(n: u32) -> SeqOrUid {
        SeqOrUid::Value(NonZeroU32::new(n).unwrap())
    }

    fn set(seqs: Vec<Sequence>) -> SequenceSet {
        SequenceSet(seqs.try_into().unwrap())
    }

    fn inbox(emails: &[(u32, bool)]) -> Mutex<Mailbox> {
        let builder = emails
            .iter()
            .fold(MailboxBuilder::new().folder("INBOX"), |b, &(n, seen)| {
                b.email(n, seen, RAW)
            });
        Mutex::new(builder.build())
    }

    fn flags_of(mb: &Mutex<Mailbox>) -> Vec<(bool, bool)> {
        mb.lock()
            .unwrap()
            .get_folder("INBOX")
            .unwrap()
            .emails
            .iter()
            .map(|e| (e.seen, e.deleted))
            .collect()
    }

    async fn store(
        seqs: &SequenceSet,
        kind: StoreType,
        response: StoreResponse,
        flags: &[Flag<'_>],
        mailbox: &Mutex<Mailbox>,
        selected: Option<&str>,
    ) -> String {
        let (mut client, server) = tokio::io::duplex(4096);
        let mut stream = BufReader::new(server);

        let args = StoreArgs {
            sequence_set: seqs,
            kind: &kind,
            response: &response,
            flags,
        };
        handle_uid_store("S1", &args, mailbox, selected, &mut stream).await;
        drop(stream);

        let mut out = String::new();
        client.read_to_string(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn adds_seen_to_one_uid() {
        let mb = inbox(&[(4, false), (9, false)]);

        let output = store(
            &set(vec![Sequence::Single(uid(9))]),
            StoreType::Add,
            StoreResponse::Answer,
            &[Flag::Seen],
            &mb,
            Some("INBOX"),
        )
        .await;

        assert_eq!(
            output,
            "* 2 FETCH (UID 9 FLAGS (\\Seen))\r\nS1 OK STORE completed\r\n"
        );
        assert_eq!(flags_of(&mb), vec![(false, false), (true, false)]);
    }

    #[tokio::test]
    async fn deleted_keeps_existing_seen() {
        let mb = inbox(&[(1, true)]);

        let output = store(
            &set(vec![Sequence::Single(uid(1))]),
            StoreType::Add,
            StoreResponse::Answer,
            &[Flag::Deleted],
            &mb,
            Some("INBOX"),
        )
        .await;

        assert!(output.contains("FLAGS (\\Seen \\Deleted)"));
        assert_eq!(flags_of(&mb), vec![(true, true)]);
    }

    #[tokio::test]
    async fn range_to_asterisk_clears_seen_silently() {
        let mb = inbox(&[(2, true), (5, true), (8, true)]);

        let output = store(
            &set(vec![Sequence::Range(uid(5), SeqOrUid::Asterisk)]),
            StoreType::Remove,
            StoreResponse::Silent,
            &[Flag::Seen],
            &mb,
            Some("INBOX"),
        )
        .await;

        assert_eq!(output, "S1 OK STORE completed\r\n");
        assert_eq!(
            flags_of(&mb),
            vec![(true, false), (false, false), (false, false)]
        );
    }

    #[tokio::test]
    async fn replace_sets_exact_flags() {
        let mb = inbox(&[(1, true)]);

        store(
            &set(vec![Sequence::Single(uid(1))]),
            StoreType::Replace,
            StoreResponse::Answer,
            &[Flag::Deleted],
            &mb,
            Some("INBOX"),
        )
        .await;

        assert_eq!(flags_of(&mb), vec![(false, true)]);
    }

    #[tokio::test]
    async fn unknown_uid_only_completes() {
        let mb = inbox(&[(1, false)]);

        let output = store(
            &set(vec![Sequence::Single(uid(42))]),
            StoreType::Add,
            StoreResponse::Answer,
            &[Flag::Seen],
            &mb,
            Some("INBOX"),
        )
        .await;

        assert_eq!(output, "S1 OK STORE completed\r\n");
        assert_eq!(flags_of(&mb), vec![(false, false)]);
    }

    #[tokio::test]
    async fn requires_selected_folder() {
        let mb = inbox(&[]);

        let output = store(
            &set(vec![Sequence::Single(uid(1))]),
            StoreType::Add,
            StoreResponse::Answer,
            &[Flag::Seen],
            &mb,
            None,
        )
        .await;

        assert_eq!(output, "S1 BAD No folder selected\r\n");
    }
}
