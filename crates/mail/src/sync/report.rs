//! Run reports

use std::path::PathBuf;

use crate::models::SyncMode;

/// What happened to one folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelOutcome {
    Synced {
        mode: SyncMode,
        /// UIDs fetched from the server
        fetched: usize,
        /// Messages appended to a document (duplicates excluded)
        merged: usize,
    },
    /// The folder could not be selected
    FolderMissing,
    /// Fetching or merging failed part way; the cursor was not advanced
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelReport {
    pub label: String,
    pub outcome: LabelOutcome,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountOutcome {
    Synced,
    /// Connecting or authenticating failed; no folder was touched
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountReport {
    pub name: String,
    pub outcome: AccountOutcome,
    pub labels: Vec<LabelReport>,
}

impl AccountReport {
    /// True unless the account or any folder failed. A missing folder
    /// does not count as a failure.
    pub fn is_complete(&self) -> bool {
        self.outcome == AccountOutcome::Synced
            && self
                .labels
                .iter()
                .all(|l| !matches!(l.outcome, LabelOutcome::Failed(_)))
    }
}

/// Summary of one [`SyncEngine::run_once`](super::SyncEngine::run_once)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub accounts: Vec<AccountReport>,
    /// Documents deleted by orphan reconciliation
    pub orphans_removed: Vec<PathBuf>,
    /// Messages appended across all accounts
    pub messages_merged: usize,
}

impl SyncReport {
    pub fn account(&self, name: &str) -> Option<&AccountReport> {
        self.accounts.iter().find(|a| a.name == name)
    }

    pub fn failed_accounts(&self) -> impl Iterator<Item = &AccountReport> {
        self.accounts
            .iter()
            .filter(|a| matches!(a.outcome, AccountOutcome::Failed(_)))
    }

    pub fn is_complete(&self) -> bool {
        self.accounts.iter().all(AccountReport::is_complete)
    }
}
