//! Blocking IMAP client
//!
//! Wraps the `imap` crate over `native-tls`. Folders are opened with
//! EXAMINE so fetching a message never changes its \Seen flag.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::{debug, info};
use native_tls::{TlsConnector, TlsStream};
use std::net::TcpStream;

use super::{FolderStatus, Mailbox, MailboxConnector};
use crate::models::Account;

type ImapSession = ::imap::Session<TlsStream<TcpStream>>;

/// Connects to real IMAP servers using each account's settings
#[derive(Debug, Default, Clone, Copy)]
pub struct ImapConnector;

impl ImapConnector {
    pub fn new() -> Self {
        Self
    }
}

impl MailboxConnector for ImapConnector {
    fn connect(&self, account: &Account) -> Result<Box<dyn Mailbox>> {
        let password = account.resolve_password()?;
        let mailbox = ImapMailbox::connect(account, &password)?;
        Ok(Box::new(mailbox))
    }
}

/// An authenticated IMAP session
pub struct ImapMailbox {
    session: ImapSession,
}

impl ImapMailbox {
    /// Connect and log in
    ///
    /// STARTTLS endpoints and local bridges (Proton Mail Bridge) present
    /// self-signed certificates, so verification is relaxed for them.
    pub fn connect(account: &Account, password: &str) -> Result<Self> {
        let host = account.imap_host.as_str();
        let port = account.imap_port;
        info!("[IMAP] Connecting to {}:{} as {}", host, port, account.user);

        let mut tls_builder = TlsConnector::builder();
        if account.imap_starttls || account.is_local() {
            tls_builder.danger_accept_invalid_certs(true);
            tls_builder.danger_accept_invalid_hostnames(true);
        }
        let tls = tls_builder.build().context("Failed to build TLS connector")?;

        let client = if account.imap_starttls {
            ::imap::connect_starttls((host, port), host, &tls)
        } else {
            ::imap::connect((host, port), host, &tls)
        }
        .with_context(|| format!("Failed to connect to {}:{}", host, port))?;

        let session = client
            .login(&account.user, password)
            .map_err(|(e, _client)| e)
            .with_context(|| format!("Login failed for {}", account.user))?;

        Ok(Self { session })
    }
}

impl Mailbox for ImapMailbox {
    fn select(&mut self, folder: &str) -> Result<Option<FolderStatus>> {
        match self.session.examine(folder) {
            Ok(mailbox) => Ok(Some(FolderStatus {
                validity: mailbox.uid_validity.unwrap_or(0),
            })),
            // NO/BAD: the server rejected the name (missing or renamed folder)
            Err(::imap::error::Error::No(msg)) | Err(::imap::error::Error::Bad(msg)) => {
                debug!("[IMAP] EXAMINE {} rejected: {}", folder, msg);
                Ok(None)
            }
            Err(e) => Err(e).with_context(|| format!("Failed to select {}", folder)),
        }
    }

    fn search_since(&mut self, since: NaiveDate) -> Result<Vec<u32>> {
        let query = format!("SINCE {}", since.format("%d-%b-%Y"));
        let mut uids: Vec<u32> = self
            .session
            .uid_search(&query)
            .with_context(|| format!("UID SEARCH {} failed", query))?
            .into_iter()
            .collect();
        uids.sort_unstable();
        Ok(uids)
    }

    fn search_after(&mut self, after: u32) -> Result<Vec<u32>> {
        let query = format!("UID {}:*", after.saturating_add(1));
        let mut uids: Vec<u32> = self
            .session
            .uid_search(&query)
            .with_context(|| format!("UID SEARCH {} failed", query))?
            .into_iter()
            .collect();
        uids.sort_unstable();
        Ok(uids)
    }

    fn fetch(&mut self, uid: u32) -> Result<Option<Vec<u8>>> {
        let fetches = self
            .session
            .uid_fetch(uid.to_string(), "RFC822")
            .with_context(|| format!("UID FETCH {} failed", uid))?;
        Ok(fetches
            .iter()
            .find_map(|f| f.body())
            .map(|body| body.to_vec()))
    }

    fn list_folders(&mut self) -> Result<Vec<String>> {
        let names = self
            .session
            .list(None, Some("*"))
            .context("LIST failed")?;
        Ok(names.iter().map(|n| n.name().to_string()).collect())
    }

    fn logout(&mut self) -> Result<()> {
        self.session.logout().context("LOGOUT failed")
    }
}
