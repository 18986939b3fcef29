use super::mock_sessions::{MockDav, MockImap, MockSmtp};
use icloud_gateway::credentials::Credentials;
use icloud_gateway::error::{GatewayError, GatewayResult};
use icloud_gateway::session::{
    AbortSignal, DavCollection, DavObject, FetchedMessage, MailboxInfo, OutgoingMail,
    ProtocolKind, Session, SessionFactory,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Shared upstream state behind every mock session.
///
/// Sessions read and write this state, so a test can seed fixtures, run a tool call and
/// then inspect what the "server" saw.
#[allow(dead_code)]
#[derive(Default)]
pub struct MockUpstream {
    pub open_attempts: AtomicUsize,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub opened_kinds: Mutex<Vec<ProtocolKind>>,

    /// Returned by the next `open` instead of a session
    pub open_error: Mutex<Option<GatewayError>>,
    /// Applied inside every session operation; cut short when the call is aborted
    pub latency: Mutex<Option<Duration>>,

    pub collections: Mutex<Vec<DavCollection>>,
    pub objects: Mutex<BTreeMap<String, DavObject>>,
    pub etag_counter: AtomicUsize,

    pub folders: Mutex<Vec<MailboxInfo>>,
    /// Messages per folder
    pub mailboxes: Mutex<BTreeMap<String, Vec<FetchedMessage>>>,
    pub capabilities: Mutex<Vec<String>>,
    /// One line per mutating IMAP command, e.g. `MOVE 42 Trash`
    pub imap_log: Mutex<Vec<String>>,

    pub sent: Mutex<Vec<OutgoingMail>>,
}

#[allow(dead_code)]
impl MockUpstream {
    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn open_attempts(&self) -> usize {
        self.open_attempts.load(Ordering::SeqCst)
    }

    pub fn fail_open_with(&self, error: GatewayError) {
        *self.open_error.lock().unwrap() = Some(error);
    }

    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = Some(latency);
    }

    pub fn add_collection(&self, collection: DavCollection) {
        self.collections.lock().unwrap().push(collection);
    }

    pub fn add_object(&self, href: &str, data: &str) {
        let etag = self.next_etag();
        self.objects.lock().unwrap().insert(
            href.to_string(),
            DavObject {
                href: href.to_string(),
                etag: Some(etag),
                data: Some(data.to_string()),
            },
        );
    }

    pub fn object(&self, href: &str) -> Option<DavObject> {
        self.objects.lock().unwrap().get(href).cloned()
    }

    pub fn next_etag(&self) -> String {
        format!("\"{}\"", self.etag_counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    pub fn add_folder(&self, name: &str, flags: &[&str]) {
        self.folders.lock().unwrap().push(MailboxInfo {
            name: name.to_string(),
            delimiter: Some("/".to_string()),
            flags: flags.iter().map(|f| f.to_string()).collect(),
        });
        self.mailboxes
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default();
    }

    pub fn add_message(&self, folder: &str, uid: u32, flags: &[&str], raw: &str) {
        self.mailboxes
            .lock()
            .unwrap()
            .entry(folder.to_string())
            .or_default()
            .push(FetchedMessage {
                uid,
                flags: flags.iter().map(|f| f.to_string()).collect(),
                raw: raw.as_bytes().to_vec(),
            });
    }

    pub fn add_capability(&self, capability: &str) {
        self.capabilities.lock().unwrap().push(capability.to_string());
    }

    pub fn imap_log(&self) -> Vec<String> {
        self.imap_log.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }

    /// Sleep for the configured latency. An abort interrupts the wait the way a shut
    /// down socket interrupts a blocked read.
    pub(crate) fn simulate_latency(&self, abort: &AbortSignal) -> GatewayResult<()> {
        let latency = *self.latency.lock().unwrap();
        if let Some(latency) = latency {
            let started = Instant::now();
            while started.elapsed() < latency {
                if abort.is_aborted() {
                    return Err(GatewayError::Connection("connection reset".to_string()));
                }
                std::thread::sleep(Duration::from_millis(5));
            }
        }
        Ok(())
    }

    pub(crate) fn record_close(&self) {
        self.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Session factory handing out in-memory sessions and counting their lifecycle.
#[allow(dead_code)]
#[derive(Clone, Default)]
pub struct MockSessionFactory {
    pub upstream: Arc<MockUpstream>,
}

#[allow(dead_code)]
impl MockSessionFactory {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionFactory for MockSessionFactory {
    fn open(
        &self,
        _creds: &Credentials,
        kind: ProtocolKind,
        abort: &AbortSignal,
    ) -> GatewayResult<Session> {
        self.upstream.open_attempts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.upstream.open_error.lock().unwrap().clone() {
            return Err(error);
        }

        self.upstream.opened.fetch_add(1, Ordering::SeqCst);
        self.upstream.opened_kinds.lock().unwrap().push(kind);

        let upstream = Arc::clone(&self.upstream);
        let abort = abort.clone();
        Ok(match kind {
            ProtocolKind::CalDav => Session::CalDav(Box::new(MockDav::new(upstream, abort))),
            ProtocolKind::CardDav => Session::CardDav(Box::new(MockDav::new(upstream, abort))),
            ProtocolKind::Imap => Session::Imap(Box::new(MockImap::new(upstream, abort))),
            ProtocolKind::Smtp => Session::Smtp(Box::new(MockSmtp::new(upstream, abort))),
        })
    }
}
