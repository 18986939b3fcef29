//! SMTP submission with `lettre`'s low-level connection.
//!
//! Port 465 uses implicit TLS; every other port connects in clear text and must upgrade
//! with STARTTLS before AUTH.

use super::{AbortSignal, OutgoingMail, SmtpSession};
use crate::credentials::Credentials;
use crate::domain::EmailAddress;
use crate::error::{GatewayError, GatewayResult};
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::{Credentials as SmtpCredentials, Mechanism};
use lettre::transport::smtp::client::{SmtpConnection, TlsParameters};
use lettre::transport::smtp::extension::ClientId;
use lettre::{Address, Message};
use secrecy::ExposeSecret;
use std::time::Duration;
use tracing::debug;

const IMPLICIT_TLS_PORT: u16 = 465;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connect,
    Auth,
    Send,
}

/// An authenticated SMTP connection.
pub struct SmtpClient {
    connection: Option<SmtpConnection>,
}

impl SmtpClient {
    /// Connect, secure the channel and authenticate. `abort` is checked between steps.
    pub fn connect(
        creds: &Credentials,
        timeout: Duration,
        abort: &AbortSignal,
    ) -> GatewayResult<Self> {
        let host = creds.endpoints().smtp_host.clone();
        let port = creds.endpoints().smtp_port;
        let hello = ClientId::default();

        let tls = TlsParameters::new(host.clone())
            .map_err(|e| GatewayError::Connection(format!("TLS setup failed: {}", e)))?;

        let implicit_tls = (port == IMPLICIT_TLS_PORT).then_some(&tls);
        let mut connection =
            SmtpConnection::connect((host.as_str(), port), Some(timeout), &hello, implicit_tls, None)
                .map_err(|e| map_error(e, Phase::Connect))?;

        if let Err(e) = abort.check() {
            connection.abort();
            return Err(e);
        }

        if port != IMPLICIT_TLS_PORT {
            if !connection.can_starttls() {
                connection.abort();
                return Err(GatewayError::Protocol(format!(
                    "{} does not offer STARTTLS",
                    host
                )));
            }
            connection
                .starttls(&tls, &hello)
                .map_err(|e| map_error(e, Phase::Connect))?;
        }

        if let Err(e) = abort.check() {
            connection.abort();
            return Err(e);
        }

        let smtp_creds = SmtpCredentials::new(
            creds.email().to_string(),
            creds.secret().expose_secret().to_string(),
        );
        if let Err(e) = connection.auth(&[Mechanism::Plain, Mechanism::Login], &smtp_creds) {
            connection.abort();
            return Err(map_error(e, Phase::Auth));
        }

        debug!(host = %host, port, "SMTP authenticated");
        Ok(Self {
            connection: Some(connection),
        })
    }
}

fn map_error(error: lettre::transport::smtp::Error, phase: Phase) -> GatewayError {
    let rejected_credentials = error
        .status()
        .map(|code| code.to_string() == "535")
        .unwrap_or(false);

    if rejected_credentials || (phase == Phase::Auth && error.is_permanent()) {
        return GatewayError::AuthFailed("SMTP AUTH rejected".to_string());
    }
    if error.is_permanent() || error.is_transient() || error.is_client() {
        return GatewayError::Protocol(format!("SMTP error: {}", error));
    }
    GatewayError::Connection(format!("SMTP connection error: {}", error))
}

fn mailbox(address: &EmailAddress) -> GatewayResult<Mailbox> {
    let parsed: Address = address
        .as_str()
        .parse()
        .map_err(|e| GatewayError::InvalidArgument(format!("{}: {}", address, e)))?;
    Ok(Mailbox::new(None, parsed))
}

/// Build the RFC 5322 message. Bcc recipients go into the envelope only.
pub fn build_message(mail: &OutgoingMail) -> GatewayResult<Message> {
    let mut builder = Message::builder()
        .from(mailbox(&mail.from)?)
        .subject(mail.subject.as_str());

    for to in &mail.to {
        builder = builder.to(mailbox(to)?);
    }
    for cc in &mail.cc {
        builder = builder.cc(mailbox(cc)?);
    }
    for bcc in &mail.bcc {
        builder = builder.bcc(mailbox(bcc)?);
    }

    let content_type = if mail.html {
        ContentType::TEXT_HTML
    } else {
        ContentType::TEXT_PLAIN
    };

    builder
        .header(content_type)
        .body(mail.body.clone())
        .map_err(|e| GatewayError::InvalidArgument(format!("cannot build message: {}", e)))
}

impl SmtpSession for SmtpClient {
    fn send(&mut self, mail: &OutgoingMail) -> GatewayResult<()> {
        let message = build_message(mail)?;
        let connection = self
            .connection
            .as_mut()
            .ok_or_else(|| GatewayError::Protocol("SMTP session already closed".to_string()))?;

        connection
            .send(message.envelope(), &message.formatted())
            .map_err(|e| map_error(e, Phase::Send))?;
        Ok(())
    }

    fn quit(&mut self) {
        if let Some(mut connection) = self.connection.take() {
            if let Err(e) = connection.quit() {
                debug!("SMTP QUIT failed: {}", e);
                connection.abort();
            }
        }
    }
}
