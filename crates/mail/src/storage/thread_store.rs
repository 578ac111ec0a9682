//! Directory of markdown thread documents
//!
//! The files are the only durable representation of a thread: every merge
//! reads, mutates and rewrites one document. Lookups scan the directory,
//! which stays small because each store is scoped to one destination.

use std::collections::HashSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;

use super::markdown::{parse_thread_markdown, read_thread_id, thread_to_markdown};
use crate::models::{Message, Thread, ThreadId, parse_date};

static NON_ALNUM_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("valid regex"));

const MAX_SLUG_LEN: usize = 60;
const UNTITLED: &str = "untitled";

/// Result of merging one message into a store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Document that now holds the thread
    pub path: PathBuf,
    /// False when the message was already present
    pub appended: bool,
}

/// A store directory of thread documents
#[derive(Debug, Clone)]
pub struct ThreadStore {
    dir: PathBuf,
}

impl ThreadStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Every `*.md` document, sorted by path. A missing directory is empty.
    pub fn documents(&self) -> Result<Vec<PathBuf>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to read store {}", self.dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "md") {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Locate the document whose `Thread ID` equals `id`
    pub fn find(&self, id: &ThreadId) -> Result<Option<PathBuf>> {
        for path in self.documents()? {
            let text = read_document(&path)?;
            if read_thread_id(&text) == Some(id.as_str()) {
                return Ok(Some(path));
            }
        }
        Ok(None)
    }

    /// Parse one document; `None` if it is malformed
    pub fn load(&self, path: &Path) -> Result<Option<Thread>> {
        Ok(parse_thread_markdown(&read_document(path)?))
    }

    /// Merge a message into its thread document, creating it if needed
    ///
    /// Labels and accounts accumulate. A message whose `(from, date)` is
    /// already present is not appended again, but the document is still
    /// rewritten. Once a file is named it is never renamed.
    pub fn merge(
        &self,
        label: &str,
        account: &str,
        message: &Message,
        thread_id: &ThreadId,
    ) -> Result<MergeOutcome> {
        let existing = self.find(thread_id)?;
        let mut thread = match &existing {
            Some(path) => match self.load(path)? {
                Some(thread) => thread,
                None => {
                    let backup = backup_path(path);
                    warn!(
                        "[STORE] {} is malformed; keeping a copy at {} and starting fresh",
                        path.display(),
                        backup.display()
                    );
                    fs::copy(path, &backup)
                        .with_context(|| format!("Failed to back up {}", path.display()))?;
                    Thread::new(thread_id.clone(), message.subject.clone())
                }
            },
            None => Thread::new(thread_id.clone(), message.subject.clone()),
        };

        thread.add_label(label);
        thread.add_account(account);
        let appended = thread.push_message(message.clone());

        let path = match existing {
            Some(path) => path,
            None => {
                config::ensure_dir(&self.dir)?;
                self.unique_path(&slugify(&thread.subject))
            }
        };
        write_document(&path, &thread_to_markdown(&thread))?;
        set_mtime(&path, &thread.last_date)?;

        if appended {
            info!("[STORE] Wrote: {} ({} messages)", path.display(), thread.messages.len());
        } else {
            debug!("[STORE] Refreshed {}", path.display());
        }
        Ok(MergeOutcome { path, appended })
    }

    /// Delete every document not in `keep`; returns the removed paths
    pub fn remove_orphans(&self, keep: &HashSet<PathBuf>) -> Result<Vec<PathBuf>> {
        let mut removed = Vec::new();
        for path in self.documents()? {
            if keep.contains(&path) {
                continue;
            }
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove orphan {}", path.display()))?;
            removed.push(path);
        }
        Ok(removed)
    }

    /// First free `<slug>.md`, then `<slug>-2.md`, `<slug>-3.md`, ...
    ///
    /// Only called when no document holds the thread yet, so any existing
    /// file with the candidate name belongs to another thread.
    fn unique_path(&self, slug: &str) -> PathBuf {
        let mut candidate = self.dir.join(format!("{}.md", slug));
        let mut n = 2;
        while candidate.exists() {
            candidate = self.dir.join(format!("{}-{}.md", slug, n));
            n += 1;
        }
        candidate
    }
}

/// Filesystem-safe base name for a subject
///
/// Lowercase, runs of anything but `[a-z0-9]` collapsed to one hyphen,
/// trimmed of hyphens, at most 60 bytes; `untitled` when nothing is left.
pub fn slugify(subject: &str) -> String {
    let lowered = subject.to_lowercase();
    let collapsed = NON_ALNUM_RE.replace_all(&lowered, "-");
    let trimmed = collapsed.trim_matches('-');

    let mut end = trimmed.len().min(MAX_SLUG_LEN);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    let slug = trimmed[..end].trim_end_matches('-');
    if slug.is_empty() {
        UNTITLED.to_string()
    } else {
        slug.to_string()
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".bak");
    PathBuf::from(name)
}

fn read_document(path: &Path) -> Result<String> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn write_document(path: &Path, content: &str) -> Result<()> {
    let temp_path = path.with_extension("md.tmp");
    fs::write(&temp_path, content)
        .with_context(|| format!("Failed to write {}", temp_path.display()))?;
    fs::rename(&temp_path, path).with_context(|| format!("Failed to replace {}", path.display()))
}

/// Set the file's modification time to a message date; no-op if unparseable
fn set_mtime(path: &Path, date: &str) -> Result<()> {
    let Some(when) = parse_date(date) else {
        debug!("[STORE] Unparseable date {:?}; leaving mtime of {}", date, path.display());
        return Ok(());
    };
    let file = File::options()
        .write(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    file.set_modified(SystemTime::from(when))
        .with_context(|| format!("Failed to set mtime on {}", path.display()))
}
