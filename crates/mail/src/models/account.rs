//! Account model representing one configured IMAP mailbox

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Well-known providers that pre-fill connection settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
    /// Generic IMAP server, all settings explicit
    #[default]
    Imap,
    Gmail,
    ProtonmailBridge,
}

/// Connection settings a provider implies
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImapPreset {
    pub host: &'static str,
    pub port: u16,
    pub starttls: bool,
}

impl Provider {
    /// Parse a config value (`imap`, `gmail`, `protonmail-bridge`)
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "imap" => Some(Provider::Imap),
            "gmail" => Some(Provider::Gmail),
            "protonmail-bridge" | "protonmail" => Some(Provider::ProtonmailBridge),
            _ => None,
        }
    }

    pub fn preset(&self) -> Option<ImapPreset> {
        match self {
            Provider::Imap => None,
            Provider::Gmail => Some(ImapPreset {
                host: "imap.gmail.com",
                port: 993,
                starttls: false,
            }),
            Provider::ProtonmailBridge => Some(ImapPreset {
                host: "127.0.0.1",
                port: 1143,
                starttls: true,
            }),
        }
    }
}

/// A validated, immutable account configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    /// Configuration key (e.g. "work")
    pub name: String,
    pub provider: Provider,
    /// IMAP login
    pub user: String,
    pub password: Option<String>,
    /// Shell command printing the password on stdout
    pub password_cmd: Option<String>,
    pub imap_host: String,
    pub imap_port: u16,
    pub imap_starttls: bool,
    /// Folders synced for this account
    pub labels: Vec<String>,
    /// Lookback window for full fetches, in whole days
    pub sync_days: u32,
}

impl Account {
    /// Local bridges present self-signed certificates
    pub fn is_local(&self) -> bool {
        matches!(self.imap_host.as_str(), "127.0.0.1" | "localhost")
    }

    /// Resolve the IMAP password: inline value if set, else run `password_cmd`
    pub fn resolve_password(&self) -> Result<String> {
        if let Some(password) = self.password.as_deref().filter(|p| !p.is_empty()) {
            return Ok(password.to_string());
        }
        if let Some(cmd) = self.password_cmd.as_deref().filter(|c| !c.is_empty()) {
            let output = std::process::Command::new("sh")
                .arg("-c")
                .arg(cmd)
                .output()
                .with_context(|| format!("Failed to run password_cmd for account {}", self.name))?;
            if !output.status.success() {
                bail!(
                    "password_cmd failed for account {}: {}",
                    self.name,
                    String::from_utf8_lossy(&output.stderr).trim()
                );
            }
            return Ok(String::from_utf8_lossy(&output.stdout).trim().to_string());
        }
        bail!("Account {} has no password or password_cmd", self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account() -> Account {
        Account {
            name: "work".to_string(),
            provider: Provider::Imap,
            user: "me@example.com".to_string(),
            password: None,
            password_cmd: None,
            imap_host: "imap.example.com".to_string(),
            imap_port: 993,
            imap_starttls: false,
            labels: vec!["INBOX".to_string()],
            sync_days: 30,
        }
    }

    #[test]
    fn test_provider_presets() {
        assert_eq!(Provider::Imap.preset(), None);
        assert_eq!(Provider::Gmail.preset().unwrap().host, "imap.gmail.com");
        let bridge = Provider::ProtonmailBridge.preset().unwrap();
        assert_eq!(bridge.port, 1143);
        assert!(bridge.starttls);
    }

    #[test]
    fn test_provider_deserialize() {
        let p: Provider = serde_json::from_str("\"protonmail-bridge\"").unwrap();
        assert_eq!(p, Provider::ProtonmailBridge);
        assert!(serde_json::from_str::<Provider>("\"hotmail\"").is_err());
    }

    #[test]
    fn test_provider_from_name() {
        assert_eq!(Provider::from_name("Gmail"), Some(Provider::Gmail));
        assert_eq!(Provider::from_name("protonmail-bridge"), Some(Provider::ProtonmailBridge));
        assert_eq!(Provider::from_name("aol"), None);
    }

    #[test]
    fn test_resolve_inline_password() {
        let acct = Account {
            password: Some("secret".to_string()),
            password_cmd: Some("echo ignored".to_string()),
            ..account()
        };
        assert_eq!(acct.resolve_password().unwrap(), "secret");
    }

    #[cfg(unix)]
    #[test]
    fn test_resolve_password_cmd() {
        let acct = Account {
            password_cmd: Some("echo from-cmd".to_string()),
            ..account()
        };
        assert_eq!(acct.resolve_password().unwrap(), "from-cmd");

        let failing = Account {
            password_cmd: Some("exit 3".to_string()),
            ..account()
        };
        assert!(failing.resolve_password().is_err());
    }

    #[test]
    fn test_missing_password() {
        assert!(account().resolve_password().is_err());
    }

    #[test]
    fn test_is_local() {
        assert!(!account().is_local());
        let local = Account {
            imap_host: "localhost".to_string(),
            ..account()
        };
        assert!(local.is_local());
    }
}
