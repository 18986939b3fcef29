//! IMAP mailboxes and RFC 5322 messages.

use crate::models::{Folder, Message};
use crate::session::{FetchedMessage, MailboxInfo};
use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use mailparse::{DispositionType, MailHeaderMap, ParsedMail};

pub fn normalize_folder(mailbox: &MailboxInfo) -> Folder {
    Folder {
        name: mailbox.name.clone(),
        delimiter: mailbox.delimiter.clone(),
        flags: mailbox.flags.clone(),
    }
}

/// Decode a fetched message. Bodies are only filled in when `include_body` is set.
pub fn normalize_message(fetched: &FetchedMessage, folder: &str, include_body: bool) -> Message {
    let mut message = Message {
        id: fetched.uid.to_string(),
        folder: folder.to_string(),
        flags: fetched.flags.clone(),
        ..Message::default()
    };

    let parsed = match mailparse::parse_mail(&fetched.raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            message
                .warnings
                .push(format!("unparseable message: {}", e));
            return message;
        }
    };

    let header = |name: &str| {
        parsed
            .headers
            .get_first_value(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    message.subject = header("Subject");
    message.from = header("From");
    message.to = header("To");
    message.cc = header("Cc");
    message.date = header("Date");

    if let Some(ref date) = message.date {
        match parse_date(date) {
            Some(dt) => message.timestamp = Some(dt.to_rfc3339_opts(SecondsFormat::Secs, true)),
            None => message
                .warnings
                .push(format!("unparseable Date header {:?}", date)),
        }
    }

    if include_body {
        let mut bodies = Bodies::default();
        collect_bodies(&parsed, &mut bodies, &mut message.warnings);
        message.body_text = Some(bodies.text.unwrap_or_default());
        message.body_html = Some(bodies.html.unwrap_or_default());
    }

    message
}

/// RFC 2822 first, then the lenient parser for headers with trailing comments or
/// missing weekdays. The lenient parser yields 0 for input with no date in it.
fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.with_timezone(&Utc));
    }
    match mailparse::dateparse(value) {
        Ok(secs) if secs > 0 => Utc.timestamp_opt(secs, 0).single(),
        _ => None,
    }
}

#[derive(Default)]
struct Bodies {
    text: Option<String>,
    html: Option<String>,
}

/// First `text/plain` and first `text/html` leaf, skipping attachments.
fn collect_bodies(part: &ParsedMail<'_>, bodies: &mut Bodies, warnings: &mut Vec<String>) {
    if !part.subparts.is_empty() {
        for sub in &part.subparts {
            collect_bodies(sub, bodies, warnings);
        }
        return;
    }
    if part.get_content_disposition().disposition == DispositionType::Attachment {
        return;
    }

    let slot = match part.ctype.mimetype.to_ascii_lowercase().as_str() {
        "text/plain" => &mut bodies.text,
        "text/html" => &mut bodies.html,
        _ => return,
    };
    if slot.is_some() {
        return;
    }
    match part.get_body() {
        Ok(body) => *slot = Some(body),
        Err(e) => warnings.push(format!("undecodable {} part: {}", part.ctype.mimetype, e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetched(raw: &str) -> FetchedMessage {
        FetchedMessage {
            uid: 42,
            flags: vec!["\\Seen".to_string()],
            raw: raw.as_bytes().to_vec(),
        }
    }

    #[test]
    fn test_headers_are_decoded() {
        let message = normalize_message(
            &fetched(
                "Subject: =?UTF-8?B?Q2Fmw6kgbWVldGluZw==?=\r\nFrom: Ann <ann@example.com>\r\nTo: bob@example.com\r\nDate: Tue, 1 Oct 2024 10:00:00 +0000\r\n\r\n",
            ),
            "INBOX",
            false,
        );
        assert_eq!(message.id, "42");
        assert_eq!(message.subject.as_deref(), Some("Café meeting"));
        assert_eq!(message.from.as_deref(), Some("Ann <ann@example.com>"));
        assert_eq!(message.cc, None);
        assert_eq!(message.timestamp.as_deref(), Some("2024-10-01T10:00:00Z"));
        assert_eq!(message.body_text, None);
        assert!(message.warnings.is_empty());
    }

    #[test]
    fn test_date_with_trailing_comment() {
        let message = normalize_message(
            &fetched("Date: Tue, 1 Oct 2024 12:00:00 +0200 (CEST)\r\n\r\n"),
            "INBOX",
            false,
        );
        assert_eq!(message.timestamp.as_deref(), Some("2024-10-01T10:00:00Z"));
    }

    #[test]
    fn test_multipart_bodies() {
        let raw = "Subject: Report\r\n\
MIME-Version: 1.0\r\n\
Content-Type: multipart/mixed; boundary=\"b1\"\r\n\
\r\n\
--b1\r\n\
Content-Type: multipart/alternative; boundary=\"b2\"\r\n\
\r\n\
--b2\r\n\
Content-Type: text/plain; charset=utf-8\r\n\
\r\n\
Plain body\r\n\
--b2\r\n\
Content-Type: text/html; charset=utf-8\r\n\
\r\n\
<p>Html body</p>\r\n\
--b2--\r\n\
--b1\r\n\
Content-Type: text/plain\r\n\
Content-Disposition: attachment; filename=\"notes.txt\"\r\n\
\r\n\
attached\r\n\
--b1--\r\n";
        let message = normalize_message(&fetched(raw), "INBOX", true);
        assert_eq!(message.body_text.as_deref().map(str::trim), Some("Plain body"));
        assert_eq!(
            message.body_html.as_deref().map(str::trim),
            Some("<p>Html body</p>")
        );
    }

    #[test]
    fn test_bad_date_is_a_warning() {
        let message = normalize_message(
            &fetched("Subject: x\r\nDate: someday\r\n\r\nbody"),
            "Archive",
            true,
        );
        assert_eq!(message.date.as_deref(), Some("someday"));
        assert_eq!(message.timestamp, None);
        assert_eq!(message.warnings.len(), 1);
        assert_eq!(message.body_text.as_deref(), Some("body"));
        assert_eq!(message.folder, "Archive");
    }
}
