//! IMAP over implicit TLS, using the synchronous `imap` crate.

use super::{imap_quote, AbortSignal, FetchedMessage, ImapSession, MailSearch, MailboxInfo};
use crate::credentials::Credentials;
use crate::error::{GatewayError, GatewayResult};
use imap::types::{Flag, NameAttribute};
use native_tls::{TlsConnector, TlsStream};
use secrecy::ExposeSecret;
use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;
use tracing::{debug, warn};

type TlsSession = imap::Session<TlsStream<TcpStream>>;

/// An authenticated IMAP session.
pub struct ImapClient {
    session: Option<TlsSession>,
}

impl ImapClient {
    /// Connect, negotiate TLS and LOGIN. Firing `abort` shuts the socket down.
    pub fn connect(
        creds: &Credentials,
        timeout: Duration,
        abort: &AbortSignal,
    ) -> GatewayResult<Self> {
        let host = creds.endpoints().imap_host.as_str();
        let port = creds.endpoints().imap_port;

        let tcp = open_tcp(host, port, timeout)?;
        let socket = tcp
            .try_clone()
            .map_err(|e| GatewayError::Connection(format!("IMAP socket error: {}", e)))?;
        abort.on_abort(move || {
            let _ = socket.shutdown(Shutdown::Both);
        });
        abort.check()?;
        let connector = TlsConnector::builder()
            .build()
            .map_err(|e| GatewayError::Connection(format!("TLS setup failed: {}", e)))?;
        let tls = connector.connect(host, tcp).map_err(|e| {
            GatewayError::Connection(format!("TLS handshake with {} failed: {}", host, e))
        })?;

        let mut client = imap::Client::new(tls);
        client.read_greeting().map_err(map_error)?;

        let session = client
            .login(creds.email(), creds.secret().expose_secret())
            .map_err(|(e, _client)| match e {
                imap::error::Error::No(_) | imap::error::Error::Bad(_) => {
                    GatewayError::AuthFailed("IMAP LOGIN rejected".to_string())
                }
                other => map_error(other),
            })?;

        debug!(host, port, "IMAP login complete");
        Ok(Self {
            session: Some(session),
        })
    }

    fn session(&mut self) -> GatewayResult<&mut TlsSession> {
        self.session
            .as_mut()
            .ok_or_else(|| GatewayError::Protocol("IMAP session already closed".to_string()))
    }

    fn store(&mut self, uid: u32, query: String) -> GatewayResult<()> {
        let session = self.session()?;
        session
            .uid_store(uid.to_string(), query)
            .map(|_| ())
            .map_err(map_error)
    }
}

pub(crate) fn open_tcp(host: &str, port: u16, timeout: Duration) -> GatewayResult<TcpStream> {
    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| GatewayError::Connection(format!("cannot resolve {}: {}", host, e)))?;

    let mut last_error = None;
    for addr in addrs {
        match TcpStream::connect_timeout(&addr, timeout) {
            Ok(stream) => {
                stream
                    .set_read_timeout(Some(timeout))
                    .and_then(|_| stream.set_write_timeout(Some(timeout)))
                    .map_err(|e| GatewayError::Connection(e.to_string()))?;
                return Ok(stream);
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(GatewayError::Connection(match last_error {
        Some(e) => format!("cannot connect to {}:{}: {}", host, port, e),
        None => format!("no addresses found for {}", host),
    }))
}

/// Map an imap error to a GatewayError.
fn map_error(error: imap::error::Error) -> GatewayError {
    use imap::error::Error;
    match error {
        Error::Io(e) => GatewayError::Connection(format!("IMAP I/O error: {}", e)),
        Error::ConnectionLost => GatewayError::Connection("IMAP connection lost".to_string()),
        Error::Tls(e) => GatewayError::Connection(format!("IMAP TLS error: {}", e)),
        Error::No(msg) => GatewayError::Protocol(format!("IMAP NO: {}", msg)),
        Error::Bad(msg) => GatewayError::Protocol(format!("IMAP BAD: {}", msg)),
        other => GatewayError::Protocol(format!("IMAP error: {}", other)),
    }
}

fn flag_name(flag: &Flag<'_>) -> String {
    match flag {
        Flag::Seen => "\\Seen".to_string(),
        Flag::Answered => "\\Answered".to_string(),
        Flag::Flagged => "\\Flagged".to_string(),
        Flag::Deleted => "\\Deleted".to_string(),
        Flag::Draft => "\\Draft".to_string(),
        Flag::Recent => "\\Recent".to_string(),
        Flag::MayCreate => "\\*".to_string(),
        Flag::Custom(name) => name.to_string(),
    }
}

fn attribute_name(attr: &NameAttribute<'_>) -> String {
    match attr {
        NameAttribute::NoInferiors => "\\Noinferiors".to_string(),
        NameAttribute::NoSelect => "\\Noselect".to_string(),
        NameAttribute::Marked => "\\Marked".to_string(),
        NameAttribute::Unmarked => "\\Unmarked".to_string(),
        NameAttribute::Custom(name) => name.to_string(),
    }
}

/// The UID SEARCH criteria for a [`MailSearch`].
pub(crate) fn search_query(criteria: &MailSearch) -> String {
    match criteria {
        MailSearch::All => "ALL".to_string(),
        MailSearch::Unseen => "UNSEEN".to_string(),
        MailSearch::Uid(uid) => format!("UID {}", uid),
        MailSearch::SubjectOrFrom(text) => {
            let quoted = imap_quote(text);
            format!("OR SUBJECT {} FROM {}", quoted, quoted)
        }
    }
}

impl ImapSession for ImapClient {
    fn list_folders(&mut self) -> GatewayResult<Vec<MailboxInfo>> {
        let session = self.session()?;
        let names = session.list(Some(""), Some("*")).map_err(map_error)?;
        Ok(names
            .iter()
            .map(|name| MailboxInfo {
                name: name.name().to_string(),
                delimiter: name.delimiter().map(str::to_string),
                flags: name.attributes().iter().map(attribute_name).collect(),
            })
            .collect())
    }

    fn select(&mut self, folder: &str) -> GatewayResult<()> {
        let session = self.session()?;
        session.select(folder).map_err(|e| match e {
            imap::error::Error::No(_) => GatewayError::NotFound(format!("folder {}", folder)),
            other => map_error(other),
        })?;
        Ok(())
    }

    fn search(&mut self, criteria: &MailSearch) -> GatewayResult<Vec<u32>> {
        let session = self.session()?;
        let uids = session
            .uid_search(search_query(criteria))
            .map_err(map_error)?;
        let mut uids: Vec<u32> = uids.into_iter().collect();
        uids.sort_unstable();
        Ok(uids)
    }

    fn fetch(&mut self, uids: &[u32], with_body: bool) -> GatewayResult<Vec<FetchedMessage>> {
        if uids.is_empty() {
            return Ok(Vec::new());
        }
        let set = uids
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let query = if with_body {
            "(UID FLAGS BODY.PEEK[])"
        } else {
            "(UID FLAGS RFC822.HEADER)"
        };

        let session = self.session()?;
        let fetches = session.uid_fetch(set, query).map_err(map_error)?;

        let mut messages = Vec::with_capacity(fetches.len());
        for fetch in fetches.iter() {
            let Some(uid) = fetch.uid else {
                warn!("FETCH response without UID skipped");
                continue;
            };
            let raw = if with_body {
                fetch.body()
            } else {
                fetch.header()
            };
            messages.push(FetchedMessage {
                uid,
                flags: fetch.flags().iter().map(flag_name).collect(),
                raw: raw.map(<[u8]>::to_vec).unwrap_or_default(),
            });
        }
        Ok(messages)
    }

    fn has_capability(&mut self, capability: &str) -> GatewayResult<bool> {
        let session = self.session()?;
        let caps = session.capabilities().map_err(map_error)?;
        Ok(caps.has_str(capability))
    }

    fn copy(&mut self, uid: u32, dest_folder: &str) -> GatewayResult<()> {
        let session = self.session()?;
        session
            .run_command_and_check_ok(format!("UID COPY {} {}", uid, imap_quote(dest_folder)))
            .map_err(map_error)
    }

    fn move_message(&mut self, uid: u32, dest_folder: &str) -> GatewayResult<()> {
        let session = self.session()?;
        session
            .run_command_and_check_ok(format!("UID MOVE {} {}", uid, imap_quote(dest_folder)))
            .map_err(map_error)
    }

    fn add_flags(&mut self, uid: u32, flags: &[&str]) -> GatewayResult<()> {
        self.store(uid, format!("+FLAGS.SILENT ({})", flags.join(" ")))
    }

    fn remove_flags(&mut self, uid: u32, flags: &[&str]) -> GatewayResult<()> {
        self.store(uid, format!("-FLAGS.SILENT ({})", flags.join(" ")))
    }

    fn expunge(&mut self, uid: u32) -> GatewayResult<()> {
        let uidplus = self.has_capability("UIDPLUS")?;
        let session = self.session()?;
        if uidplus {
            session
                .run_command_and_check_ok(format!("UID EXPUNGE {}", uid))
                .map_err(map_error)
        } else {
            session.expunge().map(|_| ()).map_err(map_error)
        }
    }

    fn logout(&mut self) {
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.logout() {
                debug!("IMAP logout failed: {}", e);
            }
        }
    }
}
