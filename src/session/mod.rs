//! Short-lived upstream sessions.
//!
//! A [`Session`] is an open, authenticated handle to exactly one protocol. Sessions are
//! opened by a [`SessionFactory`] after credentials are resolved, owned by a single tool
//! call, and released by a [`SessionGuard`] on every exit path.
//!
//! All session traits are synchronous. The dispatcher drives them from
//! `tokio::task::spawn_blocking`, the same way the HTTP client is used elsewhere.

pub mod abort;
pub mod dav;
pub mod factory;
pub mod imap;
pub mod multistatus;
pub mod smtp;

pub use abort::{AbortOnDrop, AbortSignal};
pub use factory::{SessionFactory, UpstreamSessionFactory};

use crate::domain::EmailAddress;
use crate::error::{GatewayError, GatewayResult};
use crate::metrics::Metrics;
use chrono::{DateTime, Utc};
use std::fmt;
use tracing::debug;

/// The four upstream protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProtocolKind {
    CalDav,
    CardDav,
    Imap,
    Smtp,
}

impl ProtocolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CalDav => "caldav",
            Self::CardDav => "carddav",
            Self::Imap => "imap",
            Self::Smtp => "smtp",
        }
    }
}

impl fmt::Display for ProtocolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A calendar or address book found under the account's home set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavCollection {
    /// Absolute URL of the collection
    pub href: String,
    pub display_name: Option<String>,
    pub is_calendar: bool,
    pub is_addressbook: bool,
    /// Supported calendar components (`VEVENT`, `VTODO`, ...); empty when not advertised
    pub components: Vec<String>,
}

/// A single calendar object or vCard resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DavObject {
    /// Absolute URL of the resource
    pub href: String,
    pub etag: Option<String>,
    /// Resource body; `None` when the server returned no data for it
    pub data: Option<String>,
}

/// What a collection REPORT should return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DavQuery {
    /// VEVENTs overlapping `[start, end)`
    Events {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
    /// Every vCard in an address book
    Contacts,
}

/// Write precondition for PUT.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// The resource must not exist yet (`If-None-Match: *`)
    Create,
    /// The resource must still carry this ETag (`If-Match`); unconditional when `None`
    Update(Option<String>),
}

/// Operations available on an authenticated CalDAV or CardDAV session.
pub trait DavSession: Send {
    /// Calendars or address books directly below the home set.
    fn collections(&mut self) -> GatewayResult<Vec<DavCollection>>;

    /// Run a calendar-query or addressbook-query REPORT against a collection.
    fn query(&mut self, collection_href: &str, query: &DavQuery) -> GatewayResult<Vec<DavObject>>;

    fn get(&mut self, href: &str) -> GatewayResult<DavObject>;

    /// Store a resource, returning the new ETag if the server sent one.
    fn put(
        &mut self,
        href: &str,
        body: &str,
        precondition: &Precondition,
    ) -> GatewayResult<Option<String>>;

    fn delete(&mut self, href: &str) -> GatewayResult<()>;

    fn close(&mut self);
}

/// A mailbox as reported by IMAP LIST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxInfo {
    pub name: String,
    pub delimiter: Option<String>,
    pub flags: Vec<String>,
}

/// Raw message data returned by a UID FETCH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedMessage {
    pub uid: u32,
    pub flags: Vec<String>,
    /// RFC 5322 header block, or the full message when the body was requested
    pub raw: Vec<u8>,
}

/// Message selection for UID SEARCH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailSearch {
    All,
    Unseen,
    /// A single UID, used to check that a message exists
    Uid(u32),
    /// Matches the text in `SUBJECT` or `FROM`
    SubjectOrFrom(String),
}

/// Operations available on an authenticated IMAP session.
pub trait ImapSession: Send {
    fn list_folders(&mut self) -> GatewayResult<Vec<MailboxInfo>>;

    /// Select a mailbox; a missing mailbox is `NotFound`.
    fn select(&mut self, folder: &str) -> GatewayResult<()>;

    fn search(&mut self, criteria: &MailSearch) -> GatewayResult<Vec<u32>>;

    /// Fetch messages by UID. Headers only unless `with_body` is set; never sets `\Seen`.
    fn fetch(&mut self, uids: &[u32], with_body: bool) -> GatewayResult<Vec<FetchedMessage>>;

    fn has_capability(&mut self, capability: &str) -> GatewayResult<bool>;

    fn copy(&mut self, uid: u32, dest_folder: &str) -> GatewayResult<()>;

    /// RFC 6851 UID MOVE. Callers check the `MOVE` capability first.
    fn move_message(&mut self, uid: u32, dest_folder: &str) -> GatewayResult<()>;

    fn add_flags(&mut self, uid: u32, flags: &[&str]) -> GatewayResult<()>;

    fn remove_flags(&mut self, uid: u32, flags: &[&str]) -> GatewayResult<()>;

    /// Permanently remove a message already flagged `\Deleted`.
    fn expunge(&mut self, uid: u32) -> GatewayResult<()>;

    fn logout(&mut self);
}

/// A fully validated message ready for SMTP submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub from: EmailAddress,
    pub to: Vec<EmailAddress>,
    pub cc: Vec<EmailAddress>,
    pub bcc: Vec<EmailAddress>,
    pub subject: String,
    pub body: String,
    pub html: bool,
}

/// Operations available on an authenticated SMTP session.
pub trait SmtpSession: Send {
    fn send(&mut self, mail: &OutgoingMail) -> GatewayResult<()>;

    fn quit(&mut self);
}

/// An open session to one upstream protocol.
pub enum Session {
    CalDav(Box<dyn DavSession>),
    CardDav(Box<dyn DavSession>),
    Imap(Box<dyn ImapSession>),
    Smtp(Box<dyn SmtpSession>),
}

impl Session {
    pub fn kind(&self) -> ProtocolKind {
        match self {
            Self::CalDav(_) => ProtocolKind::CalDav,
            Self::CardDav(_) => ProtocolKind::CardDav,
            Self::Imap(_) => ProtocolKind::Imap,
            Self::Smtp(_) => ProtocolKind::Smtp,
        }
    }

    pub fn as_dav(&mut self) -> GatewayResult<&mut dyn DavSession> {
        match self {
            Self::CalDav(s) | Self::CardDav(s) => Ok(s.as_mut()),
            other => Err(wrong_session("DAV", other.kind())),
        }
    }

    pub fn as_imap(&mut self) -> GatewayResult<&mut dyn ImapSession> {
        match self {
            Self::Imap(s) => Ok(s.as_mut()),
            other => Err(wrong_session("IMAP", other.kind())),
        }
    }

    pub fn as_smtp(&mut self) -> GatewayResult<&mut dyn SmtpSession> {
        match self {
            Self::Smtp(s) => Ok(s.as_mut()),
            other => Err(wrong_session("SMTP", other.kind())),
        }
    }

    /// Route every upstream command through a check of `abort`.
    fn checked(self, abort: AbortSignal) -> Self {
        match self {
            Self::CalDav(inner) => Self::CalDav(Box::new(Checked { inner, abort })),
            Self::CardDav(inner) => Self::CardDav(Box::new(Checked { inner, abort })),
            Self::Imap(inner) => Self::Imap(Box::new(Checked { inner, abort })),
            Self::Smtp(inner) => Self::Smtp(Box::new(Checked { inner, abort })),
        }
    }

    /// Tear the session down. Errors during teardown are swallowed by each protocol.
    pub fn close(&mut self) {
        match self {
            Self::CalDav(s) | Self::CardDav(s) => s.close(),
            Self::Imap(s) => s.logout(),
            Self::Smtp(s) => s.quit(),
        }
    }
}

fn wrong_session(wanted: &str, got: ProtocolKind) -> GatewayError {
    GatewayError::Protocol(format!("expected a {} session, got {}", wanted, got))
}

/// A session whose commands fail fast once the call has been aborted.
struct Checked<S: ?Sized> {
    inner: Box<S>,
    abort: AbortSignal,
}

impl DavSession for Checked<dyn DavSession> {
    fn collections(&mut self) -> GatewayResult<Vec<DavCollection>> {
        self.abort.check()?;
        self.inner.collections()
    }

    fn query(&mut self, collection_href: &str, query: &DavQuery) -> GatewayResult<Vec<DavObject>> {
        self.abort.check()?;
        self.inner.query(collection_href, query)
    }

    fn get(&mut self, href: &str) -> GatewayResult<DavObject> {
        self.abort.check()?;
        self.inner.get(href)
    }

    fn put(
        &mut self,
        href: &str,
        body: &str,
        precondition: &Precondition,
    ) -> GatewayResult<Option<String>> {
        self.abort.check()?;
        self.inner.put(href, body, precondition)
    }

    fn delete(&mut self, href: &str) -> GatewayResult<()> {
        self.abort.check()?;
        self.inner.delete(href)
    }

    fn close(&mut self) {
        self.inner.close()
    }
}

impl ImapSession for Checked<dyn ImapSession> {
    fn list_folders(&mut self) -> GatewayResult<Vec<MailboxInfo>> {
        self.abort.check()?;
        self.inner.list_folders()
    }

    fn select(&mut self, folder: &str) -> GatewayResult<()> {
        self.abort.check()?;
        self.inner.select(folder)
    }

    fn search(&mut self, criteria: &MailSearch) -> GatewayResult<Vec<u32>> {
        self.abort.check()?;
        self.inner.search(criteria)
    }

    fn fetch(&mut self, uids: &[u32], with_body: bool) -> GatewayResult<Vec<FetchedMessage>> {
        self.abort.check()?;
        self.inner.fetch(uids, with_body)
    }

    fn has_capability(&mut self, capability: &str) -> GatewayResult<bool> {
        self.abort.check()?;
        self.inner.has_capability(capability)
    }

    fn copy(&mut self, uid: u32, dest_folder: &str) -> GatewayResult<()> {
        self.abort.check()?;
        self.inner.copy(uid, dest_folder)
    }

    fn move_message(&mut self, uid: u32, dest_folder: &str) -> GatewayResult<()> {
        self.abort.check()?;
        self.inner.move_message(uid, dest_folder)
    }

    fn add_flags(&mut self, uid: u32, flags: &[&str]) -> GatewayResult<()> {
        self.abort.check()?;
        self.inner.add_flags(uid, flags)
    }

    fn remove_flags(&mut self, uid: u32, flags: &[&str]) -> GatewayResult<()> {
        self.abort.check()?;
        self.inner.remove_flags(uid, flags)
    }

    fn expunge(&mut self, uid: u32) -> GatewayResult<()> {
        self.abort.check()?;
        self.inner.expunge(uid)
    }

    fn logout(&mut self) {
        self.inner.logout()
    }
}

impl SmtpSession for Checked<dyn SmtpSession> {
    fn send(&mut self, mail: &OutgoingMail) -> GatewayResult<()> {
        self.abort.check()?;
        self.inner.send(mail)
    }

    fn quit(&mut self) {
        self.inner.quit()
    }
}

/// Owns an open session and closes it when dropped.
pub struct SessionGuard {
    session: Session,
    metrics: Metrics,
}

impl SessionGuard {
    /// Take ownership of `session`. Commands issued through the guard fail once `abort`
    /// has fired.
    pub fn new(session: Session, metrics: Metrics, abort: AbortSignal) -> Self {
        metrics.record_session_opened();
        debug!(protocol = %session.kind(), "session opened");
        Self {
            session: session.checked(abort),
            metrics,
        }
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        self.session.close();
        self.metrics.record_session_closed();
        debug!(protocol = %self.session.kind(), "session closed");
    }
}

/// Quote a string for use as an IMAP quoted string.
pub(crate) fn imap_quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for c in value.chars() {
        if c == '"' || c == '\\' {
            quoted.push('\\');
        }
        if c != '\r' && c != '\n' {
            quoted.push(c);
        }
    }
    quoted.push('"');
    quoted
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    struct NullSmtp(Arc<AtomicBool>);

    impl SmtpSession for NullSmtp {
        fn send(&mut self, _mail: &OutgoingMail) -> GatewayResult<()> {
            Err(GatewayError::Protocol("rejected".to_string()))
        }

        fn quit(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_guard_closes_on_drop() {
        let quit = Arc::new(AtomicBool::new(false));
        let metrics = Metrics::new();
        {
            let mut guard = SessionGuard::new(
                Session::Smtp(Box::new(NullSmtp(quit.clone()))),
                metrics.clone(),
                AbortSignal::new(),
            );
            assert_eq!(metrics.sessions_open(), 1);
            assert!(guard.session_mut().as_dav().is_err());
        }
        assert!(quit.load(Ordering::SeqCst));
        assert_eq!(metrics.sessions_open(), 0);
        assert_eq!(metrics.sessions_closed_total(), 1);
    }

    struct CountingSmtp(Arc<AtomicUsize>);

    impl SmtpSession for CountingSmtp {
        fn send(&mut self, _mail: &OutgoingMail) -> GatewayResult<()> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn quit(&mut self) {}
    }

    fn mail() -> OutgoingMail {
        OutgoingMail {
            from: EmailAddress::new("me@icloud.com").unwrap(),
            to: vec![EmailAddress::new("you@example.com").unwrap()],
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: "Hi".to_string(),
            body: "Hello".to_string(),
            html: false,
        }
    }

    #[test]
    fn test_aborted_guard_issues_no_commands() {
        let sent = Arc::new(AtomicUsize::new(0));
        let abort = AbortSignal::new();
        let mut guard = SessionGuard::new(
            Session::Smtp(Box::new(CountingSmtp(sent.clone()))),
            Metrics::new(),
            abort.clone(),
        );

        guard.session_mut().as_smtp().unwrap().send(&mail()).unwrap();
        abort.abort();
        let error = guard
            .session_mut()
            .as_smtp()
            .unwrap()
            .send(&mail())
            .unwrap_err();

        assert_eq!(error.kind(), crate::error::ErrorKind::ConnectionError);
        assert_eq!(sent.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_imap_quote() {
        assert_eq!(imap_quote("INBOX"), "\"INBOX\"");
        assert_eq!(imap_quote("Deleted Messages"), "\"Deleted Messages\"");
        assert_eq!(imap_quote(r#"a"b\c"#), r#""a\"b\\c""#);
        assert_eq!(imap_quote("x\r\ny"), "\"xy\"");
    }
}
