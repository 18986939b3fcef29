//! Mailbox and message records.

use serde::Serialize;

/// An IMAP mailbox.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Folder {
    pub name: String,
    pub delimiter: Option<String>,
    /// Mailbox attributes such as `\HasNoChildren` or `\Trash`
    pub flags: Vec<String>,
}

/// A mail message. Header fields are decoded from RFC 2047 encoded words.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct Message {
    /// IMAP UID within `folder`
    pub id: String,
    pub folder: String,
    pub subject: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub cc: Option<String>,

    /// `Date` header as sent
    pub date: Option<String>,
    /// `Date` header as RFC 3339, when it parses
    pub timestamp: Option<String>,

    pub flags: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body_html: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}
