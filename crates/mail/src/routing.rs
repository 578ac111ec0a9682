//! Label routing to collaborator stores
//!
//! Routes are recomputed from configuration on every run and never
//! persisted. A label with no route lands in the account's default store.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{info, warn};

use crate::config::SyncConfig;
use crate::storage::{ThreadStore, parse_thread_markdown};

/// `label → destination store directory`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelRoutes {
    routes: BTreeMap<String, PathBuf>,
}

impl LabelRoutes {
    pub fn get(&self, label: &str) -> Option<&Path> {
        self.routes.get(label).map(PathBuf::as_path)
    }

    /// Destination for `label`, falling back to `default_dir`
    pub fn destination<'a>(&'a self, label: &str, default_dir: &'a Path) -> &'a Path {
        self.get(label).unwrap_or(default_dir)
    }

    /// Routed labels in name order
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.routes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// `account_labels` followed by routed labels, first occurrence kept
    pub fn union_labels(&self, account_labels: &[String]) -> Vec<String> {
        let mut all: Vec<String> = Vec::with_capacity(account_labels.len() + self.routes.len());
        for label in account_labels.iter().map(String::as_str).chain(self.labels()) {
            if !all.iter().any(|l| l == label) {
                all.push(label.to_string());
            }
        }
        all
    }
}

/// Build the routes visible to one account (or to all, with `None`)
///
/// - `account:label` claims apply only when the filter is unset or names
///   that account; the route key is the bare label.
/// - Plain claims apply unless both the filter and the collaborator's
///   `account` binding are set and differ.
///
/// Collaborators are visited in name order. When two claim the same label
/// the later one wins and a warning is logged.
pub fn build_routes(config: &SyncConfig, account_filter: Option<&str>) -> LabelRoutes {
    let mut claims: BTreeMap<String, (&str, PathBuf)> = BTreeMap::new();

    for (name, collab) in &config.collaborators {
        let dir = config.collaborator_dir(name, collab);
        for claim in &collab.labels {
            let label = match claim.split_once(':') {
                Some((account, label)) => {
                    if account_filter.is_some_and(|f| f != account) {
                        continue;
                    }
                    label
                }
                None => {
                    if let (Some(filter), Some(bound)) = (account_filter, collab.account.as_deref())
                        && filter != bound
                    {
                        continue;
                    }
                    claim.as_str()
                }
            };

            if let Some((previous, previous_dir)) = claims.get(label)
                && *previous != name.as_str()
                && *previous_dir != dir
            {
                warn!(
                    "[ROUTE] Label {} claimed by both {} and {}; routing to {}",
                    label, previous, name, name
                );
            }
            claims.insert(label.to_string(), (name.as_str(), dir.clone()));
        }
    }

    LabelRoutes {
        routes: claims
            .into_iter()
            .map(|(label, (_, dir))| (label, dir))
            .collect(),
    }
}

/// Outcome of [`apply_routes`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouteReport {
    /// Documents copied (one per routed label match)
    pub copied: usize,
    /// Unparseable documents left alone
    pub skipped: usize,
}

/// Copy documents already in the default store into the collaborator
/// stores their labels route to
///
/// Used after collaborator configuration changes, so threads synced before
/// a route existed reach the new destination. File names are preserved.
pub fn apply_routes(routes: &LabelRoutes, default_store: &ThreadStore) -> Result<RouteReport> {
    let mut report = RouteReport::default();
    if routes.is_empty() {
        info!("[ROUTE] No routes configured");
        return Ok(report);
    }

    for path in default_store.documents()? {
        let text = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let Some(thread) = parse_thread_markdown(&text) else {
            report.skipped += 1;
            continue;
        };
        let Some(file_name) = path.file_name() else {
            continue;
        };

        for label in &thread.labels {
            let Some(dest_dir) = routes.get(label) else {
                continue;
            };
            config::ensure_dir(dest_dir)?;
            let dest = dest_dir.join(file_name);
            fs::copy(&path, &dest).with_context(|| {
                format!("Failed to copy {} to {}", path.display(), dest.display())
            })?;
            info!("[ROUTE] {} -> {}", file_name.to_string_lossy(), dest_dir.display());
            report.copied += 1;
        }
    }

    if report.skipped > 0 {
        warn!("[ROUTE] Skipped {} unparseable document(s)", report.skipped);
    }
    info!("[ROUTE] Routing complete: {} document(s) copied", report.copied);
    Ok(report)
}
