//! Opening sessions for resolved credentials.

use super::dav::DavClient;
use super::imap::ImapClient;
use super::smtp::SmtpClient;
use super::{AbortSignal, ProtocolKind, Session};
use crate::credentials::Credentials;
use crate::error::GatewayResult;
use std::time::Duration;
use tracing::debug;

/// Opens a fresh, authenticated session for one request.
///
/// Implementations are blocking and are called from `spawn_blocking`. A returned session
/// is fully usable; failures surface as `AuthFailed` or `Connection` errors, never as a
/// half-open session. Connections register with `abort` so a timed-out call can tear
/// down its sockets.
pub trait SessionFactory: Send + Sync {
    fn open(
        &self,
        creds: &Credentials,
        kind: ProtocolKind,
        abort: &AbortSignal,
    ) -> GatewayResult<Session>;
}

/// Factory connecting to the real upstream servers.
#[derive(Debug, Clone)]
pub struct UpstreamSessionFactory {
    timeout: Duration,
}

impl UpstreamSessionFactory {
    /// Create a factory whose sockets use the given connect/read/write timeout.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl SessionFactory for UpstreamSessionFactory {
    fn open(
        &self,
        creds: &Credentials,
        kind: ProtocolKind,
        abort: &AbortSignal,
    ) -> GatewayResult<Session> {
        debug!(protocol = %kind, account = %creds.masked_email(), "opening session");
        abort.check()?;
        let session = match kind {
            ProtocolKind::CalDav => Session::CalDav(Box::new(DavClient::connect(
                creds,
                kind,
                self.timeout,
                abort,
            )?)),
            ProtocolKind::CardDav => Session::CardDav(Box::new(DavClient::connect(
                creds,
                kind,
                self.timeout,
                abort,
            )?)),
            ProtocolKind::Imap => {
                Session::Imap(Box::new(ImapClient::connect(creds, self.timeout, abort)?))
            }
            ProtocolKind::Smtp => {
                Session::Smtp(Box::new(SmtpClient::connect(creds, self.timeout, abort)?))
            }
        };
        Ok(session)
    }
}
