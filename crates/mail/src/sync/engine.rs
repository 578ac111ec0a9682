//! Sync orchestration
//!
//! One run walks the selected accounts in name order, one connection at a
//! time, and every folder of an account in turn. A failing account or
//! folder is logged and reported; the run carries on. Cursor state is
//! loaded once at the start and saved once at the end.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::Result;
use log::{debug, info, warn};

use super::report::{AccountOutcome, AccountReport, LabelOutcome, LabelReport, SyncReport};
use crate::config::SyncConfig;
use crate::imap::{Mailbox, MailboxConnector, normalize_message};
use crate::manifest::{Manifest, generate_manifest};
use crate::models::{
    Account, AccountCursor, CursorState, FullReason, LabelCursor, SyncMode, decide_mode,
    filter_new_uids, since_date,
};
use crate::routing::{LabelRoutes, RouteReport, apply_routes, build_routes};
use crate::storage::{CursorStore, ThreadStore};

/// Options for one run
#[derive(Debug, Clone, Default)]
pub struct SyncOptions {
    /// Ignore cursors and re-fetch each folder's lookback window
    pub full: bool,
    /// Only sync this account
    pub account: Option<String>,
}

impl SyncOptions {
    pub fn full() -> Self {
        Self {
            full: true,
            account: None,
        }
    }

    pub fn account(mut self, name: impl Into<String>) -> Self {
        self.account = Some(name.into());
        self
    }
}

/// Drives mailbox connections into the document stores
pub struct SyncEngine<'a> {
    config: &'a SyncConfig,
    connector: &'a dyn MailboxConnector,
}

/// Per-run mutable context threaded through account and folder syncs
struct RunContext {
    full: bool,
    /// Documents written during a full run
    touched: HashSet<PathBuf>,
    messages_merged: usize,
}

impl<'a> SyncEngine<'a> {
    pub fn new(config: &'a SyncConfig, connector: &'a dyn MailboxConnector) -> Self {
        Self { config, connector }
    }

    /// Run one sync pass
    ///
    /// Only configuration problems (an unknown account filter) and a failure
    /// to save cursor state are returned as errors. Everything else is
    /// recorded in the report.
    pub fn run_once(&self, options: &SyncOptions) -> Result<SyncReport> {
        let start = Instant::now();
        let accounts = self.config.select_accounts(options.account.as_deref())?;

        let cursor_store = CursorStore::new(self.config.state_file());
        let mut state = match cursor_store.load() {
            Ok(state) => state,
            Err(e) => {
                warn!("[SYNC] Could not load cursor state, starting fresh: {:#}", e);
                CursorState::default()
            }
        };

        let default_store = ThreadStore::new(self.config.conversations_dir());
        let mut ctx = RunContext {
            full: options.full,
            touched: HashSet::new(),
            messages_merged: 0,
        };
        let mut report = SyncReport::default();

        for account in accounts {
            let cursors = state.account_mut(&account.name);
            let account_report = self.sync_account(account, default_store.dir(), cursors, &mut ctx);
            report.accounts.push(account_report);
        }
        report.messages_merged = ctx.messages_merged;

        if options.full {
            report.orphans_removed = self.reconcile_orphans(options, &report, &default_store, &ctx);
        }

        cursor_store.save(&state)?;

        if let Err(e) = self.rebuild_manifest() {
            warn!("[MANIFEST] Failed to regenerate manifest: {:#}", e);
        }

        info!(
            "[SYNC] Run complete in {}ms: {} account(s), {} message(s) merged, {} orphan(s) removed",
            start.elapsed().as_millis(),
            report.accounts.len(),
            report.messages_merged,
            report.orphans_removed.len()
        );
        Ok(report)
    }

    /// Sync every folder of one account over a single connection
    fn sync_account(
        &self,
        account: &Account,
        default_dir: &Path,
        cursors: &mut AccountCursor,
        ctx: &mut RunContext,
    ) -> AccountReport {
        let routes = build_routes(self.config, Some(&account.name));
        let labels = routes.union_labels(&account.labels);
        let mut report = AccountReport {
            name: account.name.clone(),
            outcome: AccountOutcome::Synced,
            labels: Vec::new(),
        };

        if labels.is_empty() {
            info!("[SYNC] {}: no labels configured, skipping", account.name);
            return report;
        }

        info!(
            "[SYNC] {}: connecting to {}:{} as {}",
            account.name, account.imap_host, account.imap_port, account.user
        );
        let mut mailbox = match self.connector.connect(account) {
            Ok(mailbox) => mailbox,
            Err(e) => {
                warn!("[SYNC] {}: connection failed, skipping account: {:#}", account.name, e);
                report.outcome = AccountOutcome::Failed(format!("{:#}", e));
                return report;
            }
        };

        for label in labels {
            let outcome = match self.sync_label(
                mailbox.as_mut(),
                account,
                &label,
                &routes,
                default_dir,
                cursors,
                ctx,
            ) {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("[SYNC] {}: label {} failed: {:#}", account.name, label, e);
                    LabelOutcome::Failed(format!("{:#}", e))
                }
            };
            report.labels.push(LabelReport { label, outcome });
        }

        // Some servers (Proton Mail Bridge) answer LOGOUT with responses
        // the client cannot parse; everything is already merged by now.
        if let Err(e) = mailbox.logout() {
            debug!("[SYNC] {}: logout failed: {:#}", account.name, e);
        }
        report
    }

    /// Fetch one folder's new messages and merge them
    #[allow(clippy::too_many_arguments)]
    fn sync_label(
        &self,
        mailbox: &mut dyn Mailbox,
        account: &Account,
        label: &str,
        routes: &LabelRoutes,
        default_dir: &Path,
        cursors: &mut AccountCursor,
        ctx: &mut RunContext,
    ) -> Result<LabelOutcome> {
        info!("[SYNC] {}: syncing label {}", account.name, label);

        let Some(status) = mailbox.select(label)? else {
            warn!("[SYNC] {}: label {} not found, skipping", account.name, label);
            return Ok(LabelOutcome::FolderMissing);
        };

        let prior = cursors.get(label).copied();
        let mode = decide_mode(prior.as_ref(), status.validity, ctx.full);
        let uids = match mode {
            SyncMode::Full(reason) => {
                match reason {
                    FullReason::Requested => info!("[SYNC]   Full sync requested"),
                    FullReason::NoPriorState => info!("[SYNC]   No prior state, doing full sync"),
                    FullReason::ValidityChanged { previous, current } => info!(
                        "[SYNC]   UIDVALIDITY changed ({} -> {}), doing full resync",
                        previous, current
                    ),
                }
                let since = since_date(account.sync_days);
                debug!("[SYNC]   Searching since {}", since);
                let mut uids = mailbox.search_since(since)?;
                uids.sort_unstable();
                uids.dedup();
                uids
            }
            SyncMode::Incremental { after } => filter_new_uids(mailbox.search_after(after)?, after),
        };

        // Stored UIDs only carry over while UIDVALIDITY is unchanged
        let mut highest = prior
            .filter(|p| p.validity == status.validity)
            .map(|p| p.highest_seen)
            .unwrap_or(0);

        if uids.is_empty() {
            info!("[SYNC]   No new messages");
            cursors.record(label, LabelCursor::new(status.validity, highest));
            return Ok(LabelOutcome::Synced {
                mode,
                fetched: 0,
                merged: 0,
            });
        }

        info!("[SYNC]   Fetching {} message(s)", uids.len());
        let store = ThreadStore::new(routes.destination(label, default_dir));
        let mut merged = 0;
        for &uid in &uids {
            highest = highest.max(uid);

            let Some(raw) = mailbox.fetch(uid)? else {
                debug!("[SYNC]   UID {} vanished before fetch", uid);
                continue;
            };
            let message = match normalize_message(&raw, uid) {
                Ok(message) => message,
                Err(e) => {
                    warn!("[SYNC]   Skipping UID {}: {:#}", uid, e);
                    continue;
                }
            };

            let outcome = store.merge(label, &account.name, &message, &message.thread_id)?;
            if outcome.appended {
                merged += 1;
            }
            if ctx.full {
                ctx.touched.insert(outcome.path);
            }
        }

        cursors.record(label, LabelCursor::new(status.validity, highest));
        ctx.messages_merged += merged;
        Ok(LabelOutcome::Synced {
            mode,
            fetched: uids.len(),
            merged,
        })
    }

    /// Delete default-store documents not written during this full run
    ///
    /// Skipped when the touched set cannot be trusted: an account filter
    /// leaves other accounts' threads untouched, and a failed account or
    /// folder leaves its threads untouched.
    fn reconcile_orphans(
        &self,
        options: &SyncOptions,
        report: &SyncReport,
        default_store: &ThreadStore,
        ctx: &RunContext,
    ) -> Vec<PathBuf> {
        if options.account.is_some() {
            info!("[SYNC] Account filter set; skipping orphan cleanup");
            return Vec::new();
        }
        if !report.is_complete() {
            warn!("[SYNC] Some accounts or labels failed; skipping orphan cleanup");
            return Vec::new();
        }

        match default_store.remove_orphans(&ctx.touched) {
            Ok(removed) => {
                for path in &removed {
                    info!("[SYNC] Removed orphan: {}", path.display());
                }
                removed
            }
            Err(e) => {
                warn!("[SYNC] Orphan cleanup failed: {:#}", e);
                Vec::new()
            }
        }
    }

    /// Remote folder names of one account
    pub fn list_folders(&self, account_name: &str) -> Result<Vec<String>> {
        let account = self
            .config
            .select_accounts(Some(account_name))?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Unknown account: {}", account_name))?;

        let mut mailbox = self.connector.connect(account)?;
        let folders = mailbox.list_folders()?;
        if let Err(e) = mailbox.logout() {
            debug!("[SYNC] {}: logout failed: {:#}", account.name, e);
        }
        Ok(folders)
    }

    /// Regenerate `manifest.toml` from the default store
    pub fn rebuild_manifest(&self) -> Result<Manifest> {
        let store = ThreadStore::new(self.config.conversations_dir());
        let manifest = generate_manifest(&store, &self.config.contacts)?;
        manifest.write(&self.config.manifest_file())?;
        Ok(manifest)
    }

    /// Copy already-synced documents into collaborator stores
    pub fn apply_routes(&self) -> Result<RouteReport> {
        let routes = build_routes(self.config, None);
        let store = ThreadStore::new(self.config.conversations_dir());
        apply_routes(&routes, &store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imap::{InMemoryConnector, InMemoryServer};
    use chrono::{Days, Local};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn config(data_dir: &Path) -> SyncConfig {
        let json = format!(
            r#"{{
                "data_dir": {:?},
                "accounts": {{
                    "work": {{"user": "me", "imap_host": "h", "labels": ["INBOX"], "sync_days": 30}}
                }}
            }}"#,
            data_dir.to_string_lossy()
        );
        SyncConfig::from_json(&json).unwrap()
    }

    fn raw(subject: &str, from: &str, date: &str) -> String {
        format!("From: {}\r\nSubject: {}\r\nDate: {}\r\n\r\nbody of {}\r\n", from, subject, date, subject)
    }

    fn recent() -> chrono::NaiveDate {
        Local::now().date_naive().checked_sub_days(Days::new(1)).unwrap()
    }

    #[test]
    fn test_missing_folder_is_reported() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path());
        let server = Arc::new(InMemoryServer::new());
        let connector = InMemoryConnector::new(server);

        let report = SyncEngine::new(&cfg, &connector)
            .run_once(&SyncOptions::default())
            .unwrap();

        let work = report.account("work").unwrap();
        assert_eq!(work.outcome, AccountOutcome::Synced);
        assert_eq!(work.labels[0].outcome, LabelOutcome::FolderMissing);
        assert!(report.is_complete());
    }

    #[test]
    fn test_cursor_covers_unmergeable_uids() {
        let dir = TempDir::new().unwrap();
        let cfg = config(dir.path());
        let server = Arc::new(InMemoryServer::new());
        server.create_folder("work", "INBOX", 1);
        server.append("work", "INBOX", recent(), raw("A", "a@x", "Mon, 10 Feb 2025 10:00:00 +0000"));
        server.append("work", "INBOX", recent(), vec![0xff, 0xfe, b'\r', b'\n']);
        let connector = InMemoryConnector::new(Arc::clone(&server));

        SyncEngine::new(&cfg, &connector)
            .run_once(&SyncOptions::default())
            .unwrap();

        let state = CursorStore::new(cfg.state_file()).load().unwrap();
        assert_eq!(state.cursor("work", "INBOX"), Some(&LabelCursor::new(1, 2)));
    }

    #[test]
    fn test_options_builder() {
        let options = SyncOptions::full().account("work");
        assert!(options.full);
        assert_eq!(options.account.as_deref(), Some("work"));
    }
}
