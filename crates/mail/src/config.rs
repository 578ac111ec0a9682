//! Sync configuration loading
//!
//! Reads `threadfold.json` from the config directory (or an explicit path)
//! and validates it into immutable structs. Validation happens once, before
//! any network I/O, so configuration mistakes surface as [`ConfigError`]s
//! instead of half-finished runs.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::models::{Account, Provider};

/// Config filename in the threadfold config directory
pub const CONFIG_FILE: &str = "threadfold.json";

const DEFAULT_IMAP_PORT: u16 = 993;
const DEFAULT_SYNC_DAYS: u32 = 3650;

/// A collaborator whose store receives the labels they claim
///
/// Labels are either plain (`"shared"`) or account-scoped
/// (`"work:INBOX"`). Plain labels obey the collaborator-level `account`
/// binding when it is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collaborator {
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub account: Option<String>,
    /// Root of the collaborator's store (defaults to `<data_dir>/for/<name>`)
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

/// A known correspondent, matched by address when building the manifest
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    #[serde(default)]
    pub emails: Vec<String>,
}

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    data_dir: Option<PathBuf>,
    #[serde(default)]
    accounts: BTreeMap<String, RawAccount>,
    #[serde(default)]
    collaborators: BTreeMap<String, Collaborator>,
    #[serde(default)]
    contacts: BTreeMap<String, Contact>,
}

#[derive(Deserialize)]
struct RawAccount {
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    user: String,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    password_cmd: Option<String>,
    #[serde(default)]
    imap_host: Option<String>,
    #[serde(default)]
    imap_port: Option<u16>,
    #[serde(default)]
    imap_starttls: Option<bool>,
    #[serde(default)]
    labels: Vec<String>,
    #[serde(default = "default_sync_days")]
    sync_days: u32,
}

fn default_sync_days() -> u32 {
    DEFAULT_SYNC_DAYS
}

impl RawAccount {
    /// Apply the provider preset and validate. Explicit fields win.
    fn into_account(self, name: &str) -> Result<Account, ConfigError> {
        let provider = match self.provider.as_deref() {
            None => Provider::default(),
            Some(value) => Provider::from_name(value).ok_or_else(|| ConfigError::UnknownProvider {
                account: name.to_string(),
                provider: value.to_string(),
            })?,
        };
        let preset = provider.preset();
        let imap_host = self
            .imap_host
            .filter(|h| !h.trim().is_empty())
            .or_else(|| preset.map(|p| p.host.to_string()))
            .ok_or_else(|| ConfigError::MissingHost {
                account: name.to_string(),
            })?;
        if self.user.trim().is_empty() {
            return Err(ConfigError::MissingUser {
                account: name.to_string(),
            });
        }
        if self.sync_days == 0 {
            return Err(ConfigError::InvalidSyncDays {
                account: name.to_string(),
            });
        }

        Ok(Account {
            name: name.to_string(),
            provider,
            user: self.user,
            password: self.password,
            password_cmd: self.password_cmd,
            imap_host,
            imap_port: self
                .imap_port
                .or(preset.map(|p| p.port))
                .unwrap_or(DEFAULT_IMAP_PORT),
            imap_starttls: self
                .imap_starttls
                .or(preset.map(|p| p.starttls))
                .unwrap_or(false),
            labels: self.labels,
            sync_days: self.sync_days,
        })
    }
}

/// Validated configuration, constructed once and passed into the engine
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Root of all local data (stores, cursor file, manifest)
    pub data_dir: PathBuf,
    pub accounts: BTreeMap<String, Account>,
    pub collaborators: BTreeMap<String, Collaborator>,
    pub contacts: BTreeMap<String, Contact>,
}

impl SyncConfig {
    /// Load from ~/.config/threadfold/threadfold.json
    pub fn load() -> Result<Self> {
        let path = Self::default_path().context("Could not determine config directory")?;
        Self::from_file(&path)
    }

    /// Default config file location
    pub fn default_path() -> Option<PathBuf> {
        config::config_path(CONFIG_FILE)
    }

    /// Load from a specific JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw: RawConfig = config::load_json_file(path)?;
        Ok(Self::from_raw(raw)?)
    }

    /// Parse from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawConfig = serde_json::from_str(json).context("Failed to parse config JSON")?;
        Ok(Self::from_raw(raw)?)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let data_dir = match raw.data_dir {
            Some(dir) => dir,
            None => config::default_data_dir().ok_or(ConfigError::NoDataDir)?,
        };

        let mut accounts = BTreeMap::new();
        for (name, raw_account) in raw.accounts {
            let account = raw_account.into_account(&name)?;
            accounts.insert(name, account);
        }

        for (name, collab) in &raw.collaborators {
            validate_collaborator(name, collab, &accounts)?;
        }

        Ok(Self {
            data_dir,
            accounts,
            collaborators: raw.collaborators,
            contacts: raw.contacts,
        })
    }

    /// Accounts selected by an optional name filter, in name order
    pub fn select_accounts(&self, filter: Option<&str>) -> Result<Vec<&Account>, ConfigError> {
        match filter {
            Some(name) => self
                .accounts
                .get(name)
                .map(|a| vec![a])
                .ok_or_else(|| ConfigError::UnknownAccount {
                    name: name.to_string(),
                    available: self.accounts.keys().cloned().collect(),
                }),
            None => Ok(self.accounts.values().collect()),
        }
    }

    /// Default (private) store directory
    pub fn conversations_dir(&self) -> PathBuf {
        self.data_dir.join("conversations")
    }

    /// Persisted cursor state
    pub fn state_file(&self) -> PathBuf {
        self.data_dir.join(".sync-state.json")
    }

    pub fn manifest_file(&self) -> PathBuf {
        self.data_dir.join("manifest.toml")
    }

    /// Store directory for a collaborator
    pub fn collaborator_dir(&self, name: &str, collab: &Collaborator) -> PathBuf {
        collab
            .directory
            .clone()
            .unwrap_or_else(|| self.data_dir.join("for").join(name))
            .join("conversations")
    }
}

fn validate_collaborator(
    name: &str,
    collab: &Collaborator,
    accounts: &BTreeMap<String, Account>,
) -> Result<(), ConfigError> {
    let check_account = |account: &str| {
        if accounts.contains_key(account) {
            Ok(())
        } else {
            Err(ConfigError::UnknownCollaboratorAccount {
                collaborator: name.to_string(),
                account: account.to_string(),
            })
        }
    };

    if let Some(account) = &collab.account {
        check_account(account)?;
    }
    for label in &collab.labels {
        let malformed = || ConfigError::InvalidLabel {
            collaborator: name.to_string(),
            label: label.clone(),
        };
        if label.trim().is_empty() {
            return Err(malformed());
        }
        if let Some((account, folder)) = label.split_once(':') {
            if account.is_empty() || folder.is_empty() {
                return Err(malformed());
            }
            check_account(account)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "data_dir": "/tmp/threadfold-test",
        "accounts": {
            "personal": {
                "provider": "gmail",
                "user": "me@gmail.com",
                "password": "pw",
                "labels": ["INBOX"]
            },
            "proton": {
                "provider": "protonmail-bridge",
                "user": "me@proton.me",
                "password_cmd": "pass proton",
                "imap_port": 1144,
                "sync_days": 30
            }
        },
        "collaborators": {
            "alice": { "labels": ["shared", "proton:Projects"], "account": "personal" }
        },
        "contacts": {
            "bob": { "emails": ["bob@example.com"] }
        }
    }"#;

    #[test]
    fn test_presets_fill_connection_fields() {
        let config = SyncConfig::from_json(SAMPLE).unwrap();

        let personal = &config.accounts["personal"];
        assert_eq!(personal.imap_host, "imap.gmail.com");
        assert_eq!(personal.imap_port, 993);
        assert!(!personal.imap_starttls);
        assert_eq!(personal.sync_days, 3650);

        let proton = &config.accounts["proton"];
        assert_eq!(proton.imap_host, "127.0.0.1");
        assert_eq!(proton.imap_port, 1144);
        assert!(proton.imap_starttls);
        assert_eq!(proton.sync_days, 30);
    }

    #[test]
    fn test_paths() {
        let config = SyncConfig::from_json(SAMPLE).unwrap();
        assert_eq!(
            config.conversations_dir(),
            PathBuf::from("/tmp/threadfold-test/conversations")
        );
        assert_eq!(
            config.state_file(),
            PathBuf::from("/tmp/threadfold-test/.sync-state.json")
        );
        let alice = &config.collaborators["alice"];
        assert_eq!(
            config.collaborator_dir("alice", alice),
            PathBuf::from("/tmp/threadfold-test/for/alice/conversations")
        );
    }

    #[test]
    fn test_select_accounts() {
        let config = SyncConfig::from_json(SAMPLE).unwrap();
        assert_eq!(config.select_accounts(None).unwrap().len(), 2);
        assert_eq!(config.select_accounts(Some("proton")).unwrap()[0].name, "proton");

        let err = config.select_accounts(Some("work")).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownAccount { .. }));
    }

    #[test]
    fn test_generic_imap_requires_host() {
        let json = r#"{"data_dir": "/tmp/x", "accounts": {"work": {"user": "me"}}}"#;
        let err = SyncConfig::from_json(json).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::MissingHost {
                account: "work".to_string()
            })
        );
    }

    #[test]
    fn test_zero_sync_days_rejected() {
        let json = r#"{"data_dir": "/tmp/x", "accounts": {"work": {"user": "me", "imap_host": "h", "sync_days": 0}}}"#;
        let err = SyncConfig::from_json(json).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::InvalidSyncDays { .. })
        ));
    }

    #[test]
    fn test_malformed_scoped_label_rejected() {
        let json = r#"{
            "data_dir": "/tmp/x",
            "accounts": {"work": {"user": "me", "imap_host": "h"}},
            "collaborators": {"alice": {"labels": [":INBOX"]}}
        }"#;
        let err = SyncConfig::from_json(json).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::InvalidLabel { .. })
        ));
    }

    #[test]
    fn test_collaborator_unknown_account_rejected() {
        let json = r#"{
            "data_dir": "/tmp/x",
            "accounts": {"work": {"user": "me", "imap_host": "h"}},
            "collaborators": {"alice": {"labels": ["shared"], "account": "home"}}
        }"#;
        let err = SyncConfig::from_json(json).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::UnknownCollaboratorAccount { .. })
        ));
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let json = r#"{"data_dir": "/tmp/x", "accounts": {"work": {"user": "me", "provider": "aol"}}}"#;
        let err = SyncConfig::from_json(json).unwrap_err();
        assert_eq!(
            err.downcast_ref::<ConfigError>(),
            Some(&ConfigError::UnknownProvider {
                account: "work".to_string(),
                provider: "aol".to_string()
            })
        );
    }
}
