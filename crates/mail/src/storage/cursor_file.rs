//! Persisted cursor state
//!
//! One JSON file, loaded once at the start of a run and rewritten once at
//! the end.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use log::info;

use crate::models::{CursorState, LEGACY_ACCOUNT};

/// JSON file holding [`CursorState`]
#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Load state, or an empty default when the file does not exist
    ///
    /// A legacy flat `labels` map is migrated into the `_legacy` account.
    pub fn load(&self) -> Result<CursorState> {
        if !self.path.exists() {
            return Ok(CursorState::default());
        }
        let data = fs::read(&self.path)
            .with_context(|| format!("Failed to read {}", self.path.display()))?;
        let state = CursorState::from_json(&data)
            .with_context(|| format!("Failed to parse {}", self.path.display()))?;
        if state.accounts.contains_key(LEGACY_ACCOUNT) {
            info!("[SYNC] Cursor state carries legacy label cursors under {}", LEGACY_ACCOUNT);
        }
        Ok(state)
    }

    /// Rewrite the whole file
    pub fn save(&self, state: &CursorState) -> Result<()> {
        config::save_json_file(&self.path, state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LabelCursor;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_is_default() {
        let dir = TempDir::new().unwrap();
        let store = CursorStore::new(dir.path().join(".sync-state.json"));
        assert_eq!(store.load().unwrap(), CursorState::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = TempDir::new().unwrap();
        let store = CursorStore::new(dir.path().join("nested").join(".sync-state.json"));

        let mut state = CursorState::default();
        state.account_mut("work").record("INBOX", LabelCursor::new(3, 42));
        store.save(&state).unwrap();

        assert_eq!(store.load().unwrap(), state);
    }

    #[test]
    fn test_legacy_file_migrated_on_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".sync-state.json");
        fs::write(&path, r#"{"labels": {"INBOX": {"uidvalidity": 1, "last_uid": 500}}}"#).unwrap();

        let state = CursorStore::new(&path).load().unwrap();
        assert_eq!(state.cursor(LEGACY_ACCOUNT, "INBOX"), Some(&LabelCursor::new(1, 500)));
        assert!(state.labels.is_empty());
    }

    #[test]
    fn test_corrupt_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".sync-state.json");
        fs::write(&path, "{not json").unwrap();
        assert!(CursorStore::new(&path).load().is_err());
    }
}
