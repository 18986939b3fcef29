//! CalDAV and CardDAV over HTTPS.
//!
//! This module provides a synchronous client built on `ureq`. A [`DavClient`] is created by
//! running the discovery handshake (current-user-principal, then the home set), so an
//! instance only exists once the server has accepted the credentials.

use super::multistatus::{parse_multistatus, DavResponse};
use super::{
    AbortSignal, DavCollection, DavObject, DavQuery, DavSession, Precondition, ProtocolKind,
};
use crate::credentials::Credentials;
use crate::error::{GatewayError, GatewayResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// iCloud moves accounts between partition hosts with redirects.
const MAX_REDIRECTS: usize = 5;

const PRINCIPAL_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop><d:current-user-principal/></d:prop>
</d:propfind>"#;

const CALENDAR_HOME_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:prop><c:calendar-home-set/></d:prop>
</d:propfind>"#;

const ADDRESSBOOK_HOME_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:" xmlns:card="urn:ietf:params:xml:ns:carddav">
  <d:prop><card:addressbook-home-set/></d:prop>
</d:propfind>"#;

const COLLECTIONS_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:prop>
    <d:displayname/>
    <d:resourcetype/>
    <d:getetag/>
    <c:supported-calendar-component-set/>
  </d:prop>
</d:propfind>"#;

const ADDRESSBOOK_QUERY_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<card:addressbook-query xmlns:d="DAV:" xmlns:card="urn:ietf:params:xml:ns:carddav">
  <d:prop><d:getetag/><card:address-data/></d:prop>
  <card:filter/>
</card:addressbook-query>"#;

fn calendar_query_body(start: &DateTime<Utc>, end: &DateTime<Utc>) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<c:calendar-query xmlns:d="DAV:" xmlns:c="urn:ietf:params:xml:ns:caldav">
  <d:prop><d:getetag/><c:calendar-data/></d:prop>
  <c:filter>
    <c:comp-filter name="VCALENDAR">
      <c:comp-filter name="VEVENT"><c:time-range start="{}" end="{}"/></c:comp-filter>
    </c:comp-filter>
  </c:filter>
</c:calendar-query>"#,
        start.format("%Y%m%dT%H%M%SZ"),
        end.format("%Y%m%dT%H%M%SZ")
    )
}

/// A successful HTTP exchange, after redirects.
struct DavReply {
    /// The URL that finally answered; relative hrefs resolve against it
    url: Url,
    etag: Option<String>,
    body: String,
}

/// The hosts allowed to receive the account's Authorization header: the configured
/// server and its sibling partitions (`p07-caldav.icloud.com` next to
/// `caldav.icloud.com`). IP literals and single-label hosts match exactly.
#[derive(Debug, Clone)]
struct TrustedOrigin {
    scheme: String,
    host: String,
    port: Option<u16>,
    domain_suffix: Option<String>,
}

impl TrustedOrigin {
    fn new(base: &Url) -> GatewayResult<Self> {
        let host = base
            .host_str()
            .ok_or_else(|| GatewayError::InvalidArgument(format!("server URL {} has no host", base)))?
            .to_ascii_lowercase();

        let domain_suffix = match base.host() {
            Some(url::Host::Domain(_)) => {
                let labels: Vec<&str> = host.split('.').collect();
                match labels.len() {
                    0 | 1 => None,
                    2 => Some(host.clone()),
                    _ => Some(labels[1..].join(".")),
                }
            }
            _ => None,
        };

        Ok(Self {
            scheme: base.scheme().to_string(),
            port: base.port_or_known_default(),
            host,
            domain_suffix,
        })
    }

    fn allows(&self, url: &Url) -> bool {
        let scheme_ok = url.scheme() == self.scheme
            || (self.scheme == "http" && url.scheme() == "https");
        let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
            return false;
        };
        if !scheme_ok {
            return false;
        }
        match &self.domain_suffix {
            Some(suffix) => host == self.host || host.ends_with(&format!(".{}", suffix)),
            None => host == self.host && url.port_or_known_default() == self.port,
        }
    }
}

/// HTTP client for one CalDAV or CardDAV session.
pub struct DavClient {
    agent: ureq::Agent,
    authorization: String,
    kind: ProtocolKind,
    trusted: TrustedOrigin,
    abort: AbortSignal,
    home: Url,
    home_str: String,
    closed: bool,
}

impl DavClient {
    /// Authenticate and discover the home set.
    ///
    /// # Errors
    ///
    /// `AuthFailed` when the server rejects the credentials, `Connection` when it cannot be
    /// reached, `Protocol` when discovery does not yield a home set or points at a host
    /// outside the configured server's family.
    pub fn connect(
        creds: &Credentials,
        kind: ProtocolKind,
        timeout: Duration,
        abort: &AbortSignal,
    ) -> GatewayResult<Self> {
        let endpoint = match kind {
            ProtocolKind::CalDav => &creds.endpoints().caldav_url,
            ProtocolKind::CardDav => &creds.endpoints().carddav_url,
            other => {
                return Err(GatewayError::Protocol(format!(
                    "{} is not a DAV protocol",
                    other
                )))
            }
        };
        let base = Url::parse(endpoint).map_err(|e| {
            GatewayError::InvalidArgument(format!("invalid {} server URL: {}", kind, e))
        })?;

        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .timeout_write(timeout)
            .redirects(0)
            .build();

        let token = STANDARD.encode(format!(
            "{}:{}",
            creds.email(),
            creds.secret().expose_secret()
        ));

        let mut client = Self {
            agent,
            authorization: format!("Basic {}", token),
            kind,
            trusted: TrustedOrigin::new(&base)?,
            abort: abort.clone(),
            home_str: base.to_string(),
            home: base.clone(),
            closed: false,
        };

        let home = client.discover(&base)?;
        debug!(protocol = %kind, home = %home, "DAV discovery complete");
        client.home_str = home.to_string();
        client.home = home;
        Ok(client)
    }

    fn discover(&self, base: &Url) -> GatewayResult<Url> {
        let reply = self.send("PROPFIND", base, Some("0"), Some(PRINCIPAL_BODY), None)?;
        let principal = parse_multistatus(&reply.body)?
            .into_iter()
            .find_map(|r| r.props.principal_href)
            .ok_or_else(|| {
                GatewayError::Protocol("server did not report a current-user-principal".to_string())
            })?;
        let principal = join(&reply.url, &principal)?;

        let body = match self.kind {
            ProtocolKind::CalDav => CALENDAR_HOME_BODY,
            _ => ADDRESSBOOK_HOME_BODY,
        };
        let reply = self.send("PROPFIND", &principal, Some("0"), Some(body), None)?;
        let home = parse_multistatus(&reply.body)?
            .into_iter()
            .find_map(|r| match self.kind {
                ProtocolKind::CalDav => r.props.calendar_home,
                _ => r.props.addressbook_home,
            })
            .ok_or_else(|| {
                GatewayError::Protocol(format!("server did not report a {} home set", self.kind))
            })?;

        join(&reply.url, &home)
    }

    /// Execute one request, following redirects manually so the Authorization header
    /// survives partition changes. Every hop must stay within the trusted origin.
    fn send(
        &self,
        method: &str,
        url: &Url,
        depth: Option<&str>,
        body: Option<&str>,
        precondition: Option<&Precondition>,
    ) -> GatewayResult<DavReply> {
        if self.closed {
            return Err(GatewayError::Protocol("session already closed".to_string()));
        }
        let mut current = url.clone();

        for _ in 0..=MAX_REDIRECTS {
            self.abort.check()?;
            if !self.trusted.allows(&current) {
                return Err(GatewayError::Protocol(format!(
                    "{} {}: refusing to send credentials to {}",
                    method,
                    url.path(),
                    current.host_str().unwrap_or("an unknown host")
                )));
            }

            let mut request = self
                .agent
                .request(method, current.as_str())
                .set("Authorization", &self.authorization);

            if let Some(depth) = depth {
                request = request.set("Depth", depth);
            }
            match precondition {
                Some(Precondition::Create) => request = request.set("If-None-Match", "*"),
                Some(Precondition::Update(Some(etag))) => request = request.set("If-Match", etag),
                _ => {}
            }

            debug!("{} {}", method, current);
            let result = match body {
                Some(body) => {
                    let content_type = match (method, self.kind) {
                        ("PUT", ProtocolKind::CardDav) => "text/vcard; charset=utf-8",
                        ("PUT", _) => "text/calendar; charset=utf-8",
                        _ => "application/xml; charset=utf-8",
                    };
                    request.set("Content-Type", content_type).send_string(body)
                }
                None => request.call(),
            };

            match result {
                Ok(response) if (300..400).contains(&response.status()) => {
                    let location = response.header("Location").ok_or_else(|| {
                        GatewayError::Protocol(format!(
                            "{} {}: redirect without Location",
                            method,
                            current.path()
                        ))
                    })?;
                    current = join(&current, location)?;
                }
                Ok(response) => {
                    let etag = response.header("ETag").map(str::to_string);
                    let body = response.into_string().map_err(|e| {
                        GatewayError::Connection(format!("failed to read response: {}", e))
                    })?;
                    return Ok(DavReply {
                        url: current,
                        etag,
                        body,
                    });
                }
                Err(e) => return Err(map_error(e, method, &current)),
            }
        }

        Err(GatewayError::Protocol(format!(
            "{} {}: too many redirects",
            method,
            url.path()
        )))
    }

    /// Resolve a caller-supplied reference against the home set.
    fn resolve(&self, href: &str) -> GatewayResult<Url> {
        let url = self
            .home
            .join(href)
            .map_err(|e| GatewayError::InvalidArgument(format!("invalid reference {:?}: {}", href, e)))?;
        if !self.trusted.allows(&url) {
            return Err(GatewayError::InvalidArgument(format!(
                "reference {:?} points outside the account's server",
                href
            )));
        }
        Ok(url)
    }

    fn is_home(&self, url: &Url) -> bool {
        url.as_str().trim_end_matches('/') == self.home_str.trim_end_matches('/')
    }
}

fn join(base: &Url, href: &str) -> GatewayResult<Url> {
    base.join(href)
        .map_err(|e| GatewayError::Protocol(format!("invalid href {:?}: {}", href, e)))
}

/// Map a ureq error to a GatewayError.
fn map_error(error: ureq::Error, method: &str, url: &Url) -> GatewayError {
    let context = format!("{} {}", method, url.path());
    match error {
        ureq::Error::Status(code, _) => GatewayError::from_http_status(code, &context),
        ureq::Error::Transport(transport) => {
            GatewayError::Connection(format!("{}: {}", context, transport))
        }
    }
}

fn is_success(response: &DavResponse) -> bool {
    response.status.map_or(true, |s| (200..300).contains(&s))
}

impl DavSession for DavClient {
    fn collections(&mut self) -> GatewayResult<Vec<DavCollection>> {
        let reply = self.send("PROPFIND", &self.home, Some("1"), Some(COLLECTIONS_BODY), None)?;
        let mut collections = Vec::new();

        for response in parse_multistatus(&reply.body)? {
            if !is_success(&response) {
                continue;
            }
            let url = join(&reply.url, &response.href)?;
            if self.is_home(&url) {
                continue;
            }
            let props = response.props;
            let is_calendar = props.has_type("calendar");
            let is_addressbook = props.has_type("addressbook");
            if !is_calendar && !is_addressbook {
                continue;
            }
            collections.push(DavCollection {
                href: url.to_string(),
                display_name: props.display_name.filter(|n| !n.trim().is_empty()),
                is_calendar,
                is_addressbook,
                components: props.components,
            });
        }

        Ok(collections)
    }

    fn query(&mut self, collection_href: &str, query: &DavQuery) -> GatewayResult<Vec<DavObject>> {
        let collection = self.resolve(collection_href)?;
        let body = match query {
            DavQuery::Events { start, end } => calendar_query_body(start, end),
            DavQuery::Contacts => ADDRESSBOOK_QUERY_BODY.to_string(),
        };
        let reply = self.send("REPORT", &collection, Some("1"), Some(&body), None)?;

        let collection_str = collection.as_str().trim_end_matches('/').to_string();
        let mut objects = Vec::new();
        for response in parse_multistatus(&reply.body)? {
            if !is_success(&response) {
                continue;
            }
            let url = join(&reply.url, &response.href)?;
            if url.as_str().trim_end_matches('/') == collection_str {
                continue;
            }
            objects.push(DavObject {
                href: url.to_string(),
                etag: response.props.etag,
                data: response.props.calendar_data.or(response.props.address_data),
            });
        }

        Ok(objects)
    }

    fn get(&mut self, href: &str) -> GatewayResult<DavObject> {
        let url = self.resolve(href)?;
        let reply = self.send("GET", &url, None, None, None)?;
        Ok(DavObject {
            href: reply.url.to_string(),
            etag: reply.etag,
            data: Some(reply.body),
        })
    }

    fn put(
        &mut self,
        href: &str,
        body: &str,
        precondition: &Precondition,
    ) -> GatewayResult<Option<String>> {
        let url = self.resolve(href)?;
        let reply = self.send("PUT", &url, None, Some(body), Some(precondition))?;
        Ok(reply.etag)
    }

    fn delete(&mut self, href: &str) -> GatewayResult<()> {
        let url = self.resolve(href)?;
        self.send("DELETE", &url, None, None, None)?;
        Ok(())
    }

    fn close(&mut self) {
        // HTTP is request/response; dropping the agent releases pooled connections.
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_calendar_query_time_range() {
        let body = calendar_query_body(
            &Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            &Utc.with_ymd_and_hms(2024, 2, 1, 12, 30, 0).unwrap(),
        );
        assert!(body.contains(r#"start="20240101T000000Z""#));
        assert!(body.contains(r#"end="20240201T123000Z""#));
        assert!(body.contains(r#"<c:comp-filter name="VCALENDAR">"#));
    }

    #[test]
    fn test_trusted_origin_allows_partitions() {
        let trusted = TrustedOrigin::new(&Url::parse("https://caldav.icloud.com").unwrap()).unwrap();
        let allowed = |s: &str| trusted.allows(&Url::parse(s).unwrap());

        assert!(allowed("https://caldav.icloud.com/123/"));
        assert!(allowed("https://p07-caldav.icloud.com:443/123/calendars/"));
        assert!(!allowed("http://p07-caldav.icloud.com/123/"));
        assert!(!allowed("https://evil.example/x.ics"));
        assert!(!allowed("https://icloud.com.evil.example/x.ics"));
    }

    #[test]
    fn test_trusted_origin_ip_matches_exactly() {
        let trusted = TrustedOrigin::new(&Url::parse("http://127.0.0.1:8080").unwrap()).unwrap();
        let allowed = |s: &str| trusted.allows(&Url::parse(s).unwrap());

        assert!(allowed("http://127.0.0.1:8080/a.ics"));
        assert!(!allowed("http://127.0.0.1:9090/a.ics"));
        assert!(!allowed("http://127.0.0.2:8080/a.ics"));
    }

    #[test]
    fn test_join_relative_and_absolute() {
        let base = Url::parse("https://caldav.icloud.com/123/principal/").unwrap();
        assert_eq!(
            join(&base, "/123/calendars/").unwrap().as_str(),
            "https://caldav.icloud.com/123/calendars/"
        );
        assert_eq!(
            join(&base, "https://p07-caldav.icloud.com:443/123/calendars/")
                .unwrap()
                .as_str(),
            "https://p07-caldav.icloud.com/123/calendars/"
        );
    }
}
