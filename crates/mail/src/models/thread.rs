//! Thread model representing one conversation document

use serde::{Deserialize, Serialize};

use super::Message;

/// Thread identity: the normalized subject key of the first message
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadId(pub String);

impl ThreadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ThreadId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ThreadId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A thread is the unit of the document store
///
/// Labels and accounts only ever accumulate. Messages are kept sorted by
/// parsed date and are unique by `(from, date)`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Thread {
    pub id: ThreadId,
    /// Subject of the first message
    pub subject: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub accounts: Vec<String>,
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Raw date string of the newest message
    #[serde(default)]
    pub last_date: String,
}

impl Thread {
    /// Start an empty thread
    pub fn new(id: ThreadId, subject: impl Into<String>) -> Self {
        Self {
            id,
            subject: subject.into(),
            ..Default::default()
        }
    }

    /// Add a label if not already present. Returns true if it was added.
    pub fn add_label(&mut self, label: &str) -> bool {
        add_unique(&mut self.labels, label)
    }

    /// Add an account if not already present. Returns true if it was added.
    pub fn add_account(&mut self, account: &str) -> bool {
        add_unique(&mut self.accounts, account)
    }

    /// Whether a message with the same `(from, date)` is already present
    pub fn contains(&self, message: &Message) -> bool {
        let key = message.dedup_key();
        self.messages.iter().any(|m| m.dedup_key() == key)
    }

    /// Append a message, keeping chronological order and `last_date` current
    ///
    /// Returns false (and leaves the thread untouched) for a duplicate.
    pub fn push_message(&mut self, message: Message) -> bool {
        if self.contains(&message) {
            return false;
        }
        self.messages.push(message);
        // Stable: equal or unparseable dates keep their arrival order
        self.messages.sort_by_key(|m| m.sort_key());
        self.last_date = self
            .messages
            .last()
            .map(|m| m.date.clone())
            .unwrap_or_default();
        true
    }
}

fn add_unique(values: &mut Vec<String>, value: &str) -> bool {
    if value.is_empty() || values.iter().any(|v| v == value) {
        return false;
    }
    values.push(value.to_string());
    true
}
