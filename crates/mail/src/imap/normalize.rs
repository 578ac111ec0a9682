//! Raw message normalization
//!
//! Converts RFC 822 bytes fetched from a folder into domain [`Message`]s.

use anyhow::{Context, Result};
use mailparse::{DispositionType, MailHeaderMap, ParsedMail};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{Message, MessageId, ThreadId};

static REPLY_PREFIX_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(re|fwd?):\s*").expect("valid regex"));

const NO_SUBJECT: &str = "(no subject)";

/// Normalize one raw message fetched under `uid`
pub fn normalize_message(raw: &[u8], uid: u32) -> Result<Message> {
    let parsed =
        mailparse::parse_mail(raw).with_context(|| format!("Failed to parse message UID {}", uid))?;

    // get_first_value decodes RFC 2047 encoded words
    let subject = parsed
        .headers
        .get_first_value("Subject")
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| NO_SUBJECT.to_string());
    let from = parsed
        .headers
        .get_first_value("From")
        .map(|s| s.trim().to_string())
        .unwrap_or_default();
    let date = parsed
        .headers
        .get_first_value("Date")
        .map(|s| s.trim().to_string())
        .unwrap_or_default();

    let thread_id = ThreadId::new(thread_key_from_subject(&subject));
    let body = extract_body(&parsed);

    Ok(Message::builder(MessageId::from_uid(uid), thread_id)
        .from(from)
        .date(date)
        .subject(subject)
        .body(body)
        .build())
}

/// Derive the merge key for a subject line
///
/// Strips exactly one leading `Re:`, `Fwd:` or `Fw:` (case-insensitive),
/// then lowercases and trims. `Re: Re: x` keys as `re: x`.
pub fn thread_key_from_subject(subject: &str) -> String {
    let lowered = subject.trim().to_lowercase();
    REPLY_PREFIX_RE.replace(&lowered, "").trim().to_string()
}

/// Extract the plain-text body
///
/// Single-part messages yield their decoded body whatever the type. For
/// multipart messages, the first `text/plain` leaf that is not an
/// attachment wins; no such part yields an empty string.
pub fn extract_body(parsed: &ParsedMail) -> String {
    if parsed.subparts.is_empty() {
        return decode_body(parsed);
    }
    find_plain_text(&parsed.subparts).unwrap_or_default()
}

/// Depth-first search for the first inline text/plain leaf
fn find_plain_text(parts: &[ParsedMail]) -> Option<String> {
    for part in parts {
        if !part.subparts.is_empty() {
            if let Some(text) = find_plain_text(&part.subparts) {
                return Some(text);
            }
            continue;
        }
        if part.ctype.mimetype.eq_ignore_ascii_case("text/plain") && !is_attachment(part) {
            return Some(decode_body(part));
        }
    }
    None
}

fn is_attachment(part: &ParsedMail) -> bool {
    part.get_content_disposition().disposition == DispositionType::Attachment
}

/// Decode with the declared charset, falling back to lossy UTF-8
fn decode_body(part: &ParsedMail) -> String {
    match part.get_body() {
        Ok(body) => body,
        Err(_) => part
            .get_body_raw()
            .map(|raw| String::from_utf8_lossy(&raw).into_owned())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_thread_key_strips_one_prefix() {
        assert_eq!(thread_key_from_subject("Re: Hello World"), "hello world");
        assert_eq!(thread_key_from_subject("Fwd: Hello World"), "hello world");
        assert_eq!(thread_key_from_subject("Fw: Hello World"), "hello world");
        assert_eq!(thread_key_from_subject("RE:Hello World"), "hello world");
        assert_eq!(thread_key_from_subject("  Hello World  "), "hello world");
    }

    #[test]
    fn test_thread_key_not_recursive() {
        assert_eq!(thread_key_from_subject("Re: Re: Hello"), "re: hello");
        assert_eq!(thread_key_from_subject("Reply needed"), "reply needed");
    }

    #[test]
    fn test_normalize_simple_message() {
        let raw = b"From: Alice <alice@example.com>\r\n\
Subject: Re: Lunch\r\n\
Date: Mon, 10 Feb 2025 10:00:00 +0000\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
See you at noon.\r\n";
        let msg = normalize_message(raw, 42).unwrap();

        assert_eq!(msg.id.as_str(), "42");
        assert_eq!(msg.thread_id.as_str(), "lunch");
        assert_eq!(msg.from, "Alice <alice@example.com>");
        assert_eq!(msg.date, "Mon, 10 Feb 2025 10:00:00 +0000");
        assert_eq!(msg.subject, "Re: Lunch");
        assert_eq!(msg.body.trim(), "See you at noon.");
    }

    #[test]
    fn test_normalize_decodes_encoded_headers() {
        let raw = b"From: =?utf-8?q?J=C3=BCrgen?= <j@example.com>\r\n\
Subject: =?utf-8?b?SGVsbG8gV8O2cmxk?=\r\n\
Date: Mon, 10 Feb 2025 10:00:00 +0000\r\n\
\r\n\
body\r\n";
        let msg = normalize_message(raw, 1).unwrap();
        assert_eq!(msg.from, "J\u{fc}rgen <j@example.com>");
        assert_eq!(msg.subject, "Hello W\u{f6}rld");
    }

    #[test]
    fn test_missing_subject_defaults() {
        let raw = b"From: a@example.com\r\n\r\nhi\r\n";
        let msg = normalize_message(raw, 1).unwrap();
        assert_eq!(msg.subject, "(no subject)");
        assert_eq!(msg.date, "");
    }

    #[test]
    fn test_multipart_prefers_inline_plain_text() {
        let raw = b"From: a@example.com\r\n\
Subject: Report\r\n\
Content-Type: multipart/mixed; boundary=\"outer\"\r\n\
\r\n\
--outer\r\n\
Content-Type: text/plain\r\n\
Content-Disposition: attachment; filename=\"notes.txt\"\r\n\
\r\n\
attached notes\r\n\
--outer\r\n\
Content-Type: multipart/alternative; boundary=\"inner\"\r\n\
\r\n\
--inner\r\n\
Content-Type: text/html\r\n\
\r\n\
<p>html body</p>\r\n\
--inner\r\n\
Content-Type: text/plain; charset=iso-8859-1\r\n\
Content-Transfer-Encoding: quoted-printable\r\n\
\r\n\
Caf=E9 body\r\n\
--inner--\r\n\
--outer--\r\n";
        let msg = normalize_message(raw, 1).unwrap();
        assert_eq!(msg.body.trim(), "Caf\u{e9} body");
    }

    #[test]
    fn test_multipart_without_plain_text_is_empty() {
        let raw = b"From: a@example.com\r\n\
Subject: Html only\r\n\
Content-Type: multipart/alternative; boundary=\"b\"\r\n\
\r\n\
--b\r\n\
Content-Type: text/html\r\n\
\r\n\
<p>hi</p>\r\n\
--b--\r\n";
        let msg = normalize_message(raw, 1).unwrap();
        assert_eq!(msg.body, "");
    }

    #[test]
    fn test_unknown_charset_decodes_with_replacement() {
        let raw = b"From: a@example.com\r\n\
Subject: Odd bytes\r\n\
Content-Type: text/plain; charset=x-unknown\r\n\
\r\n\
caf\xff\xfe ok\r\n";
        let msg = normalize_message(raw, 1).unwrap();
        assert!(msg.body.contains('\u{FFFD}'));
        assert!(msg.body.starts_with("caf"));
        assert!(msg.body.trim_end().ends_with(" ok"));
    }

    #[test]
    fn test_prefix_only_subject_keys_empty() {
        let raw = b"From: a@example.com\r\n\
Subject: Re:\r\n\
\r\n\
hi\r\n";
        let msg = normalize_message(raw, 1).unwrap();
        assert_eq!(msg.subject, "Re:");
        assert_eq!(msg.thread_id.as_str(), "");
        assert_eq!(thread_key_from_subject("FW: "), "");
    }
}
