//! In-memory mailbox implementation
//!
//! A deterministic stand-in for an IMAP server, used by tests. It mimics
//! the server behaviors the engine has to cope with: UIDVALIDITY resets,
//! `UID n:*` echoing the newest UID, and missing folders.

use anyhow::{Result, bail};
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::{FolderStatus, Mailbox, MailboxConnector};
use crate::models::Account;

struct StoredMessage {
    internal_date: NaiveDate,
    raw: Vec<u8>,
}

struct Folder {
    validity: u32,
    next_uid: u32,
    messages: BTreeMap<u32, StoredMessage>,
}

impl Folder {
    fn new(validity: u32) -> Self {
        Self {
            validity,
            next_uid: 1,
            messages: BTreeMap::new(),
        }
    }
}

/// Folders keyed by account name, then folder name
#[derive(Default)]
pub struct InMemoryServer {
    folders: RwLock<HashMap<String, HashMap<String, Folder>>>,
    failing_accounts: RwLock<HashSet<String>>,
    /// (account, folder, uid) for every fetch, in order
    fetch_log: RwLock<Vec<(String, String, u32)>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

impl InMemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or reset) a folder with the given UIDVALIDITY
    pub fn create_folder(&self, account: &str, folder: &str, validity: u32) {
        write(&self.folders)
            .entry(account.to_string())
            .or_default()
            .insert(folder.to_string(), Folder::new(validity));
    }

    /// Append a message and return its UID; creates the folder if needed
    pub fn append(
        &self,
        account: &str,
        folder: &str,
        internal_date: NaiveDate,
        raw: impl Into<Vec<u8>>,
    ) -> u32 {
        let mut folders = write(&self.folders);
        let folder = folders
            .entry(account.to_string())
            .or_default()
            .entry(folder.to_string())
            .or_insert_with(|| Folder::new(1));
        let uid = folder.next_uid;
        folder.next_uid += 1;
        folder.messages.insert(
            uid,
            StoredMessage {
                internal_date,
                raw: raw.into(),
            },
        );
        uid
    }

    /// Change a folder's UIDVALIDITY, as a server does after renumbering
    pub fn set_validity(&self, account: &str, folder: &str, validity: u32) {
        if let Some(f) = write(&self.folders)
            .get_mut(account)
            .and_then(|folders| folders.get_mut(folder))
        {
            f.validity = validity;
        }
    }

    /// Make every future connect for this account fail
    pub fn fail_connect(&self, account: &str) {
        write(&self.failing_accounts).insert(account.to_string());
    }

    /// UIDs fetched from one folder, in fetch order
    pub fn fetched(&self, account: &str, folder: &str) -> Vec<u32> {
        read(&self.fetch_log)
            .iter()
            .filter(|(a, f, _)| a == account && f == folder)
            .map(|(_, _, uid)| *uid)
            .collect()
    }

    pub fn clear_fetch_log(&self) {
        write(&self.fetch_log).clear();
    }
}

/// Connector handing out sessions on a shared [`InMemoryServer`]
#[derive(Clone)]
pub struct InMemoryConnector {
    server: Arc<InMemoryServer>,
}

impl InMemoryConnector {
    pub fn new(server: Arc<InMemoryServer>) -> Self {
        Self { server }
    }
}

impl MailboxConnector for InMemoryConnector {
    fn connect(&self, account: &Account) -> Result<Box<dyn Mailbox>> {
        if read(&self.server.failing_accounts).contains(&account.name) {
            bail!("Connection refused for account {}", account.name);
        }
        Ok(Box::new(InMemoryMailbox {
            server: Arc::clone(&self.server),
            account: account.name.clone(),
            selected: None,
        }))
    }
}

struct InMemoryMailbox {
    server: Arc<InMemoryServer>,
    account: String,
    selected: Option<String>,
}

impl InMemoryMailbox {
    fn with_folder<T>(&self, f: impl FnOnce(&Folder) -> T) -> Result<T> {
        let Some(name) = &self.selected else {
            bail!("No folder selected");
        };
        let folders = read(&self.server.folders);
        match folders.get(&self.account).and_then(|a| a.get(name)) {
            Some(folder) => Ok(f(folder)),
            None => bail!("Folder {} disappeared", name),
        }
    }
}

impl Mailbox for InMemoryMailbox {
    fn select(&mut self, folder: &str) -> Result<Option<FolderStatus>> {
        let folders = read(&self.server.folders);
        let status = folders
            .get(&self.account)
            .and_then(|a| a.get(folder))
            .map(|f| FolderStatus {
                validity: f.validity,
            });
        drop(folders);
        self.selected = status.map(|_| folder.to_string());
        Ok(status)
    }

    fn search_since(&mut self, since: NaiveDate) -> Result<Vec<u32>> {
        self.with_folder(|f| {
            f.messages
                .iter()
                .filter(|(_, m)| m.internal_date >= since)
                .map(|(uid, _)| *uid)
                .collect()
        })
    }

    fn search_after(&mut self, after: u32) -> Result<Vec<u32>> {
        self.with_folder(|f| {
            let newer: Vec<u32> = f.messages.range(after.saturating_add(1)..).map(|(uid, _)| *uid).collect();
            if newer.is_empty() {
                // `n:*` with n past the end still matches the newest message
                f.messages.keys().next_back().copied().into_iter().collect()
            } else {
                newer
            }
        })
    }

    fn fetch(&mut self, uid: u32) -> Result<Option<Vec<u8>>> {
        let raw = self.with_folder(|f| f.messages.get(&uid).map(|m| m.raw.clone()))?;
        if raw.is_some()
            && let Some(folder) = &self.selected
        {
            write(&self.server.fetch_log).push((self.account.clone(), folder.clone(), uid));
        }
        Ok(raw)
    }

    fn list_folders(&mut self) -> Result<Vec<String>> {
        let folders = read(&self.server.folders);
        let mut names: Vec<String> = folders
            .get(&self.account)
            .map(|a| a.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        Ok(names)
    }

    fn logout(&mut self) -> Result<()> {
        self.selected = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Provider;

    fn account(name: &str) -> Account {
        Account {
            name: name.to_string(),
            provider: Provider::Imap,
            user: "me".to_string(),
            password: Some("pw".to_string()),
            password_cmd: None,
            imap_host: "localhost".to_string(),
            imap_port: 993,
            imap_starttls: false,
            labels: vec![],
            sync_days: 30,
        }
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    #[test]
    fn test_select_missing_folder() {
        let server = Arc::new(InMemoryServer::new());
        let connector = InMemoryConnector::new(server);
        let mut mailbox = connector.connect(&account("work")).unwrap();
        assert_eq!(mailbox.select("INBOX").unwrap(), None);
    }

    #[test]
    fn test_search_after_echoes_newest() {
        let server = Arc::new(InMemoryServer::new());
        server.create_folder("work", "INBOX", 7);
        server.append("work", "INBOX", day(1), "a");
        server.append("work", "INBOX", day(2), "b");

        let connector = InMemoryConnector::new(Arc::clone(&server));
        let mut mailbox = connector.connect(&account("work")).unwrap();
        assert_eq!(mailbox.select("INBOX").unwrap(), Some(FolderStatus { validity: 7 }));
        assert_eq!(mailbox.search_after(0).unwrap(), vec![1, 2]);
        assert_eq!(mailbox.search_after(2).unwrap(), vec![2]);
        assert_eq!(mailbox.search_since(day(2)).unwrap(), vec![2]);
    }

    #[test]
    fn test_fetch_is_logged() {
        let server = Arc::new(InMemoryServer::new());
        let uid = server.append("work", "INBOX", day(1), "raw");

        let connector = InMemoryConnector::new(Arc::clone(&server));
        let mut mailbox = connector.connect(&account("work")).unwrap();
        mailbox.select("INBOX").unwrap();
        assert_eq!(mailbox.fetch(uid).unwrap(), Some(b"raw".to_vec()));
        assert_eq!(mailbox.fetch(99).unwrap(), None);
        assert_eq!(server.fetched("work", "INBOX"), vec![uid]);
    }

    #[test]
    fn test_fail_connect() {
        let server = Arc::new(InMemoryServer::new());
        server.fail_connect("work");
        let connector = InMemoryConnector::new(server);
        assert!(connector.connect(&account("work")).is_err());
        assert!(connector.connect(&account("home")).is_ok());
    }
}
