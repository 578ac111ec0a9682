//! Cursor state tracking for incremental folder sync

use chrono::{Days, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Account bucket that receives cursors migrated from the legacy flat format
pub const LEGACY_ACCOUNT: &str = "_legacy";

/// Fetch progress for one folder of one account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCursor {
    /// Folder UIDVALIDITY the cursor was recorded under
    #[serde(rename = "uidvalidity")]
    pub validity: u32,
    /// Highest UID merged so far
    #[serde(rename = "last_uid")]
    pub highest_seen: u32,
}

impl LabelCursor {
    pub fn new(validity: u32, highest_seen: u32) -> Self {
        Self {
            validity,
            highest_seen,
        }
    }
}

/// Cursors for every folder of one account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountCursor {
    #[serde(default)]
    pub labels: BTreeMap<String, LabelCursor>,
}

impl AccountCursor {
    pub fn get(&self, label: &str) -> Option<&LabelCursor> {
        self.labels.get(label)
    }

    pub fn record(&mut self, label: &str, cursor: LabelCursor) {
        self.labels.insert(label.to_string(), cursor);
    }
}

/// Persisted fetch progress: account → label → cursor
///
/// `labels` holds the pre-account flat format. It is migrated into the
/// [`LEGACY_ACCOUNT`] bucket on load unless `accounts` is already populated,
/// in which case it is carried through untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CursorState {
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountCursor>,
    #[serde(default)]
    pub labels: BTreeMap<String, LabelCursor>,
}

impl CursorState {
    /// Decode persisted state, migrating the legacy flat format
    pub fn from_json(data: &[u8]) -> serde_json::Result<Self> {
        let mut state: CursorState = serde_json::from_slice(data)?;
        state.migrate_legacy();
        Ok(state)
    }

    /// Move a legacy top-level label map into the `_legacy` account
    ///
    /// Returns true if a migration happened.
    pub fn migrate_legacy(&mut self) -> bool {
        if !self.accounts.is_empty() || self.labels.is_empty() {
            return false;
        }
        let labels = std::mem::take(&mut self.labels);
        self.accounts
            .insert(LEGACY_ACCOUNT.to_string(), AccountCursor { labels });
        true
    }

    /// Cursor bucket for an account, created on first use
    pub fn account_mut(&mut self, account: &str) -> &mut AccountCursor {
        self.accounts.entry(account.to_string()).or_default()
    }

    pub fn cursor(&self, account: &str, label: &str) -> Option<&LabelCursor> {
        self.accounts.get(account).and_then(|a| a.get(label))
    }
}

/// Why a folder is being fetched in full
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FullReason {
    Requested,
    NoPriorState,
    ValidityChanged { previous: u32, current: u32 },
}

/// How a folder should be fetched this run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Everything inside the lookback window
    Full(FullReason),
    /// Only UIDs strictly greater than `after`
    Incremental { after: u32 },
}

/// Decide between a full and an incremental fetch
///
/// A changed validity token means stored UIDs no longer address the same
/// messages, so the prior high-water mark cannot be used.
pub fn decide_mode(prior: Option<&LabelCursor>, current_validity: u32, full_requested: bool) -> SyncMode {
    match prior {
        _ if full_requested => SyncMode::Full(FullReason::Requested),
        None => SyncMode::Full(FullReason::NoPriorState),
        Some(p) if p.validity != current_validity => SyncMode::Full(FullReason::ValidityChanged {
            previous: p.validity,
            current: current_validity,
        }),
        Some(p) => SyncMode::Incremental {
            after: p.highest_seen,
        },
    }
}

/// Drop UIDs that are not strictly newer than the cursor
///
/// IMAP answers `UID n:*` with the highest existing UID even when nothing is
/// newer than `n`.
pub fn filter_new_uids(uids: impl IntoIterator<Item = u32>, after: u32) -> Vec<u32> {
    let mut uids: Vec<u32> = uids.into_iter().filter(|&u| u > after).collect();
    uids.sort_unstable();
    uids.dedup();
    uids
}

/// First day of the lookback window, counting from local midnight today
pub fn since_date(window_days: u32) -> NaiveDate {
    window_start(Local::now().date_naive(), window_days)
}

/// First day of a lookback window ending on `today`
pub fn window_start(today: NaiveDate, window_days: u32) -> NaiveDate {
    today
        .checked_sub_days(Days::new(u64::from(window_days)))
        .unwrap_or(NaiveDate::MIN)
}
