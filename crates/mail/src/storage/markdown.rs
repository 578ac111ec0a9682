//! Markdown thread document codec
//!
//! ```text
//! # <Subject>
//!
//! **Labels**: a, b
//! **Accounts**: x
//! **Thread ID**: <key>
//! **Last updated**: <date>
//!
//! ---
//!
//! ## <Sender> — <Date>
//!
//! <body>
//! ```

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{Message, MessageId, Thread, ThreadId};

static META_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\*\*(.+?)\*\*:\s*(.+)$").expect("valid regex"));
static MESSAGE_HEADER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^## (.*) \x{2014} (.*)$").expect("valid regex"));

const SEPARATOR: &str = "---";

/// Render a thread as a markdown document
pub fn thread_to_markdown(thread: &Thread) -> String {
    let mut lines: Vec<String> = vec![
        format!("# {}", thread.subject),
        String::new(),
        format!("**Labels**: {}", thread.labels.join(", ")),
        format!("**Accounts**: {}", thread.accounts.join(", ")),
        format!("**Thread ID**: {}", thread.id),
        format!("**Last updated**: {}", thread.last_date),
        String::new(),
    ];
    for message in &thread.messages {
        lines.push(SEPARATOR.to_string());
        lines.push(String::new());
        lines.push(format!("## {} \u{2014} {}", message.from, message.date));
        lines.push(String::new());
        lines.push(message.body.trim().to_string());
        lines.push(String::new());
    }
    lines.join("\n")
}

/// Parse a markdown document back into a thread
///
/// Returns `None` when there is no `# ` title line. Metadata is only read
/// from the header block, so a body quoting `**Labels**:` is inert.
pub fn parse_thread_markdown(text: &str) -> Option<Thread> {
    let lines: Vec<&str> = text.lines().collect();
    let subject = lines
        .iter()
        .find_map(|l| l.strip_prefix("# "))
        .map(str::trim)
        .filter(|s| !s.is_empty())?;

    let first_message = lines
        .iter()
        .position(|l| MESSAGE_HEADER_RE.is_match(l))
        .unwrap_or(lines.len());

    let mut thread = Thread::new(ThreadId::default(), subject);
    for line in &lines[..first_message] {
        let Some(caps) = META_RE.captures(line) else {
            continue;
        };
        let value = caps[2].trim();
        match &caps[1] {
            "Labels" => thread.labels = split_list(value),
            // Older documents carried a single label
            "Label" => thread.labels = vec![value.to_string()],
            "Accounts" => thread.accounts = split_list(value),
            "Thread ID" => thread.id = ThreadId::new(value),
            "Last updated" => thread.last_date = value.to_string(),
            _ => {}
        }
    }

    let mut current: Option<(String, String, Vec<&str>)> = None;
    for &line in &lines[first_message..] {
        if let Some(caps) = MESSAGE_HEADER_RE.captures(line) {
            if let Some(mut done) = current.take() {
                strip_separator(&mut done.2);
                let message = finish_message(&thread, done);
                thread.messages.push(message);
            }
            current = Some((caps[1].to_string(), caps[2].to_string(), Vec::new()));
        } else if let Some((_, _, body)) = current.as_mut() {
            body.push(line);
        }
    }
    if let Some(done) = current.take() {
        let message = finish_message(&thread, done);
        thread.messages.push(message);
    }

    Some(thread)
}

/// Thread ID from the header block, without parsing messages
///
/// A present but blank field yields `Some("")`: subjects made only of a
/// reply prefix key to the empty thread ID and must still be found.
pub fn read_thread_id(text: &str) -> Option<&str> {
    text.lines()
        .take_while(|l| !MESSAGE_HEADER_RE.is_match(l))
        .find_map(|l| l.strip_prefix("**Thread ID**:"))
        .map(str::trim)
}

/// Drop the `---` line that separates a body from the next message
fn strip_separator(body: &mut Vec<&str>) {
    while body.last().is_some_and(|l| l.trim().is_empty()) {
        body.pop();
    }
    if body.last().is_some_and(|l| l.trim() == SEPARATOR) {
        body.pop();
    }
}

fn finish_message(thread: &Thread, (from, date, body): (String, String, Vec<&str>)) -> Message {
    Message::builder(MessageId::default(), thread.id.clone())
        .from(from)
        .date(date)
        .subject(thread.subject.clone())
        .body(body.join("\n").trim())
        .build()
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
