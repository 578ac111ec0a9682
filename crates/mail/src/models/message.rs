//! Message model representing one fetched mail message

use super::ThreadId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Protocol-assigned identifier for a message (IMAP UID within one folder)
///
/// Messages read back from a thread document have no UID; they carry an
/// empty identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn from_uid(uid: u32) -> Self {
        Self(uid.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An email address with optional display name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailAddress {
    /// Display name (e.g., "John Doe")
    pub name: Option<String>,
    /// Email address (e.g., "john@example.com")
    pub email: String,
}

impl EmailAddress {
    /// Parse an address only if it carries an `<addr>` token
    pub fn from_angle(s: &str) -> Option<Self> {
        let s = s.trim();
        let angle_start = s.rfind('<')?;
        let angle_end = s.rfind('>')?;
        if angle_start >= angle_end {
            return None;
        }
        let email = s[angle_start + 1..angle_end].trim();
        if email.is_empty() {
            return None;
        }
        let name = s[..angle_start].trim().trim_matches('"').trim();
        Some(Self {
            name: (!name.is_empty()).then(|| name.to_string()),
            email: email.to_string(),
        })
    }

    /// Lowercased address, used for contact matching
    pub fn normalized(&self) -> String {
        self.email.to_lowercase()
    }
}

/// A single normalized message
///
/// `from` and `date` are kept exactly as the protocol delivered them: the
/// pair is the deduplication key inside a thread and `date` is the
/// authoritative ordering source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Folder-scoped UID (empty when read back from a document)
    pub id: MessageId,
    /// Thread key derived from the subject
    pub thread_id: ThreadId,
    /// Raw decoded `From` header
    pub from: String,
    /// Raw `Date` header
    pub date: String,
    /// Decoded subject line
    pub subject: String,
    /// Plain-text body, possibly empty
    pub body: String,
}

impl Message {
    pub fn builder(id: MessageId, thread_id: ThreadId) -> MessageBuilder {
        MessageBuilder::new(id, thread_id)
    }

    /// Parsed `date`, or `None` if it could not be parsed
    pub fn parsed_date(&self) -> Option<DateTime<Utc>> {
        parse_date(&self.date)
    }

    /// Sort key for chronological ordering; unparseable dates sort first
    pub fn sort_key(&self) -> DateTime<Utc> {
        date_sort_key(&self.date)
    }

    /// Deduplication key inside a thread
    pub fn dedup_key(&self) -> (&str, &str) {
        (self.from.as_str(), self.date.as_str())
    }
}

/// Parse a protocol date header
///
/// Tries strict RFC 2822 first, then mailparse's lenient parser.
pub fn parse_date(date: &str) -> Option<DateTime<Utc>> {
    let date = date.trim();
    if date.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(date) {
        return Some(dt.with_timezone(&Utc));
    }
    mailparse::dateparse(date)
        .ok()
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
}

/// Sort key for a raw date; unparseable dates map to the earliest instant
pub fn date_sort_key(date: &str) -> DateTime<Utc> {
    parse_date(date).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Builder for creating Message instances
pub struct MessageBuilder {
    id: MessageId,
    thread_id: ThreadId,
    from: String,
    date: String,
    subject: String,
    body: String,
}

impl MessageBuilder {
    fn new(id: MessageId, thread_id: ThreadId) -> Self {
        Self {
            id,
            thread_id,
            from: String::new(),
            date: String::new(),
            subject: String::new(),
            body: String::new(),
        }
    }

    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    pub fn date(mut self, date: impl Into<String>) -> Self {
        self.date = date.into();
        self
    }

    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = subject.into();
        self
    }

    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Message {
        Message {
            id: self.id,
            thread_id: self.thread_id,
            from: self.from,
            date: self.date,
            subject: self.subject,
            body: self.body,
        }
    }
}
