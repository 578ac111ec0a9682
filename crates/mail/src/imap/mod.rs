//! Mailbox protocol integration
//!
//! This module provides:
//! - The [`Mailbox`] / [`MailboxConnector`] seam the sync engine talks to
//! - A blocking IMAP implementation over TLS or STARTTLS
//! - An in-memory implementation for tests
//! - Normalization of raw RFC 822 messages to domain models

mod client;
mod memory;
mod normalize;

pub use client::{ImapConnector, ImapMailbox};
pub use memory::{InMemoryConnector, InMemoryServer};
pub use normalize::{extract_body, normalize_message, thread_key_from_subject};

use anyhow::Result;
use chrono::NaiveDate;

use crate::models::Account;

/// State of a selected folder
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FolderStatus {
    /// UIDVALIDITY; a change invalidates every stored UID
    pub validity: u32,
}

/// One open, authenticated mailbox connection
///
/// All calls are blocking. UIDs are scoped to the most recently selected
/// folder.
pub trait Mailbox {
    /// Open a folder read-only. `Ok(None)` means the folder does not exist.
    fn select(&mut self, folder: &str) -> Result<Option<FolderStatus>>;

    /// UIDs of messages dated on or after `since`, ascending
    fn search_since(&mut self, since: NaiveDate) -> Result<Vec<u32>>;

    /// UIDs in the range `after+1:*`, ascending
    ///
    /// Like IMAP, may include a UID that is not greater than `after`.
    fn search_after(&mut self, after: u32) -> Result<Vec<u32>>;

    /// Raw RFC 822 bytes of one message, if it still exists
    fn fetch(&mut self, uid: u32) -> Result<Option<Vec<u8>>>;

    /// Names of every folder on the server
    fn list_folders(&mut self) -> Result<Vec<String>>;

    fn logout(&mut self) -> Result<()>;
}

/// Opens mailbox connections for configured accounts
pub trait MailboxConnector {
    fn connect(&self, account: &Account) -> Result<Box<dyn Mailbox>>;
}
