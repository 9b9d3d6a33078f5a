#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for driving the mailbox testing keywords by hand

use clap::{Parser, Subcommand};
use imap_testkit::{Criteria, ImapConfig, ImapLibrary, MessageRef, WaitOptions};
use serde::Serialize;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "imap-testkit")]
#[command(about = "Wait for and inspect messages in an IMAP mailbox")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Wait for a matching message and print its UID
    Wait {
        /// Sender address (FROM)
        #[arg(long)]
        from: Option<String>,

        /// Recipient address (TO)
        #[arg(long)]
        to: Option<String>,

        /// Subject substring
        #[arg(long)]
        subject: Option<String>,

        /// Body text substring
        #[arg(long)]
        text: Option<String>,

        /// Raw status token (defaults to UNSEEN)
        #[arg(long)]
        status: Option<String>,

        /// Seconds to wait before giving up
        #[arg(long, default_value = "60")]
        timeout: u64,

        /// Seconds between searches
        #[arg(long, default_value = "10")]
        poll: u64,
    },

    /// Print the decoded body text of a message
    Body {
        /// Message UID
        uid: String,
    },

    /// List the links in a message body
    Links {
        /// Message UID
        uid: String,
    },

    /// List the MIME parts of a message
    Parts {
        /// Message UID
        uid: String,
    },

    /// Delete a message and expunge the mailbox
    Delete {
        /// Message UID
        uid: String,
    },

    /// Mark a message as read
    MarkRead {
        /// Message UID
        uid: String,
    },
}

#[derive(Serialize)]
struct PartSummary {
    index: usize,
    content_type: String,
    size: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let config = ImapConfig::from_env()?;

    let mut library = ImapLibrary::new();
    library.open_mailbox(&config).await?;

    let outcome = run(&mut library, &args).await;
    library.close_mailbox().await?;
    outcome
}

async fn run(library: &mut ImapLibrary, args: &Args) -> anyhow::Result<()> {
    match &args.command {
        Command::Wait {
            from,
            to,
            subject,
            text,
            status,
            timeout,
            poll,
        } => {
            let criteria = Criteria {
                sender: from.clone(),
                recipient: to.clone(),
                subject: subject.clone(),
                text: text.clone(),
                status: status.clone(),
            };
            let options =
                WaitOptions::new(Duration::from_secs(*timeout), Duration::from_secs(*poll));
            let latest = library.wait_for_email(&criteria, options).await?;
            print_value(args, &latest, |uid| println!("{uid}"))?;
        }
        Command::Body { uid } => {
            let body = library.get_email_body(&MessageRef::new(uid)).await?;
            print_value(args, &body, |body| println!("{body}"))?;
        }
        Command::Links { uid } => {
            let links = library.get_links_from_email(&MessageRef::new(uid)).await?;
            print_value(args, &links, |links| {
                for link in links {
                    println!("{link}");
                }
            })?;
        }
        Command::Parts { uid } => {
            let parts = collect_parts(library, &MessageRef::new(uid)).await?;
            print_value(args, &parts, |parts| print_part_table(parts))?;
        }
        Command::Delete { uid } => {
            library.delete_email(&MessageRef::new(uid)).await?;
            if !args.json {
                println!("Deleted {uid}");
            }
        }
        Command::MarkRead { uid } => {
            library.mark_email_as_read(&MessageRef::new(uid)).await?;
            if !args.json {
                println!("Marked {uid} as read");
            }
        }
    }

    Ok(())
}

/// Walk every part of `reference` once.
async fn collect_parts(
    library: &mut ImapLibrary,
    reference: &MessageRef,
) -> anyhow::Result<Vec<PartSummary>> {
    let mut parts = Vec::new();
    while library.walk_multipart_email(reference).await?.is_some() {
        parts.push(PartSummary {
            index: parts.len(),
            content_type: library.get_multipart_content_type()?,
            size: library.get_multipart_payload(false)?.as_bytes().len(),
        });
    }
    Ok(parts)
}

fn print_value<T: Serialize + ?Sized>(
    args: &Args,
    value: &T,
    plain: impl FnOnce(&T),
) -> anyhow::Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(value)?);
    } else {
        plain(value);
    }
    Ok(())
}

fn print_part_table(parts: &[PartSummary]) {
    if parts.is_empty() {
        println!("No parts found.");
        return;
    }

    println!("{:<6} {:<40} {}", "Part", "Content-Type", "Bytes");
    println!("{}", "-".repeat(60));
    for part in parts {
        println!(
            "{:<6} {:<40} {}",
            part.index,
            truncate(&part.content_type, 38),
            part.size
        );
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
