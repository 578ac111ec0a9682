//! Typed configuration errors
//!
//! Everything else in the crate is reported through `anyhow`; configuration
//! problems get their own type so drivers can tell "fix your config" apart
//! from a transient failure.

/// A configuration problem detected before any network I/O
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Unknown account: {name}\nAvailable: {}", available.join(", "))]
    UnknownAccount { name: String, available: Vec<String> },

    #[error("Account {account}: no IMAP host configured and provider has no preset")]
    MissingHost { account: String },

    #[error("Account {account}: unknown provider {provider:?}")]
    UnknownProvider { account: String, provider: String },

    #[error("Account {account}: user is empty")]
    MissingUser { account: String },

    #[error("Account {account}: sync_days must be at least 1")]
    InvalidSyncDays { account: String },

    #[error("Collaborator {collaborator}: malformed label {label:?} (expected \"account:label\")")]
    InvalidLabel { collaborator: String, label: String },

    #[error("Collaborator {collaborator}: account {account} is not configured")]
    UnknownCollaboratorAccount { collaborator: String, account: String },

    #[error("Could not determine a data directory; set data_dir in the config")]
    NoDataDir,
}
