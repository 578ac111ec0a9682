//! Derived thread index
//!
//! `manifest.toml` summarizes the default store for other tools. It holds
//! no state of its own and can be regenerated from the documents at any
//! time.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::config::Contact;
use crate::models::EmailAddress;
use crate::storage::ThreadStore;

/// One thread in the manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub subject: String,
    /// Document file stem
    pub file: String,
    pub labels: Vec<String>,
    pub accounts: Vec<String>,
    /// Raw date of the newest message
    pub last_updated: String,
    /// Names of known contacts who sent a message in the thread
    pub contacts: Vec<String>,
}

/// Thread ID → entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub threads: BTreeMap<String, ManifestEntry>,
}

impl Manifest {
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize manifest")
    }

    /// Write atomically to `path`
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            config::ensure_dir(parent)?;
        }
        let temp_path = path.with_extension("toml.tmp");
        std::fs::write(&temp_path, self.to_toml()?)
            .with_context(|| format!("Failed to write {}", temp_path.display()))?;
        std::fs::rename(&temp_path, path)
            .with_context(|| format!("Failed to replace {}", path.display()))
    }
}

/// Build the manifest from every parseable document in `store`
///
/// Senders are matched by the address inside `<...>`, case-insensitively.
pub fn generate_manifest(store: &ThreadStore, contacts: &BTreeMap<String, Contact>) -> Result<Manifest> {
    let mut by_email: BTreeMap<String, &str> = BTreeMap::new();
    for (name, contact) in contacts {
        for email in &contact.emails {
            by_email.insert(email.to_lowercase(), name.as_str());
        }
    }

    let mut manifest = Manifest::default();
    for path in store.documents()? {
        let Some(thread) = store.load(&path)? else {
            warn!("[MANIFEST] Skipping unparseable {}", path.display());
            continue;
        };

        let mut matched: Vec<String> = Vec::new();
        for message in &thread.messages {
            let Some(address) = EmailAddress::from_angle(&message.from) else {
                continue;
            };
            if let Some(name) = by_email.get(&address.normalized())
                && !matched.iter().any(|m| m == *name)
            {
                matched.push(name.to_string());
            }
        }

        let file = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        manifest.threads.insert(
            thread.id.to_string(),
            ManifestEntry {
                subject: thread.subject,
                file,
                labels: thread.labels,
                accounts: thread.accounts,
                last_updated: thread.last_date,
                contacts: matched,
            },
        );
    }

    info!("[MANIFEST] Indexed {} thread(s)", manifest.threads.len());
    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Message, MessageId, ThreadId};
    use tempfile::TempDir;

    fn merge(store: &ThreadStore, thread: &str, subject: &str, from: &str, date: &str) {
        let message = Message::builder(MessageId::from_uid(1), ThreadId::new(thread))
            .from(from)
            .date(date)
            .subject(subject)
            .body("hi")
            .build();
        store.merge("INBOX", "work", &message, &ThreadId::new(thread)).unwrap();
    }

    fn contacts() -> BTreeMap<String, Contact> {
        BTreeMap::from([(
            "bob".to_string(),
            Contact {
                emails: vec!["Bob@Example.com".to_string()],
            },
        )])
    }

    #[test]
    fn test_matches_contacts_by_angle_address() {
        let dir = TempDir::new().unwrap();
        let store = ThreadStore::new(dir.path());
        merge(&store, "plan", "Plan", "Bob <bob@example.COM>", "Mon, 10 Feb 2025 10:00:00 +0000");
        merge(&store, "plan", "Plan", "bob@example.com", "Tue, 11 Feb 2025 10:00:00 +0000");
        merge(&store, "plan", "Plan", "Bob B. <bob@example.com>", "Wed, 12 Feb 2025 10:00:00 +0000");

        let manifest = generate_manifest(&store, &contacts()).unwrap();
        let entry = &manifest.threads["plan"];
        assert_eq!(entry.contacts, vec!["bob"]);
        assert_eq!(entry.file, "plan");
        assert_eq!(entry.labels, vec!["INBOX"]);
        assert_eq!(entry.accounts, vec!["work"]);
        assert_eq!(entry.last_updated, "Wed, 12 Feb 2025 10:00:00 +0000");
    }

    #[test]
    fn test_skips_unparseable_documents() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("junk.md"), "nothing here").unwrap();
        let store = ThreadStore::new(dir.path());
        merge(&store, "a", "A", "x@y", "Mon, 10 Feb 2025 10:00:00 +0000");

        let manifest = generate_manifest(&store, &BTreeMap::new()).unwrap();
        assert_eq!(manifest.threads.len(), 1);
        assert!(manifest.threads["a"].contacts.is_empty());
    }

    #[test]
    fn test_regeneration_is_stable() {
        let dir = TempDir::new().unwrap();
        let store = ThreadStore::new(dir.path().join("conversations"));
        merge(&store, "a", "A", "Bob <bob@example.com>", "Mon, 10 Feb 2025 10:00:00 +0000");
        merge(&store, "b", "B", "x@y", "Mon, 10 Feb 2025 10:00:00 +0000");

        let path = dir.path().join("manifest.toml");
        generate_manifest(&store, &contacts()).unwrap().write(&path).unwrap();
        let first = std::fs::read_to_string(&path).unwrap();
        generate_manifest(&store, &contacts()).unwrap().write(&path).unwrap();
        let second = std::fs::read_to_string(&path).unwrap();

        assert_eq!(first, second);
        let parsed: Manifest = toml::from_str(&first).unwrap();
        assert_eq!(parsed.threads["a"].contacts, vec!["bob"]);
        assert_eq!(parsed.threads["b"].subject, "B");
    }
}
