//! WebDAV multistatus (RFC 4918 §13) parsing.
//!
//! Only the properties the gateway asks for are extracted. Namespaces are ignored and
//! elements are matched on their local name, which is enough for CalDAV and CardDAV
//! servers that reuse the standard prefixes inconsistently.

use crate::error::{GatewayError, GatewayResult};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// Properties found in the successful propstats of one response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DavProps {
    pub display_name: Option<String>,
    pub etag: Option<String>,
    /// Local names of the `resourcetype` children (`collection`, `calendar`, ...)
    pub resource_types: Vec<String>,
    /// `name` attributes of `supported-calendar-component-set/comp`
    pub components: Vec<String>,
    pub calendar_data: Option<String>,
    pub address_data: Option<String>,
    pub principal_href: Option<String>,
    pub calendar_home: Option<String>,
    pub addressbook_home: Option<String>,
}

impl DavProps {
    fn merge(&mut self, other: DavProps) {
        self.display_name = self.display_name.take().or(other.display_name);
        self.etag = self.etag.take().or(other.etag);
        self.calendar_data = self.calendar_data.take().or(other.calendar_data);
        self.address_data = self.address_data.take().or(other.address_data);
        self.principal_href = self.principal_href.take().or(other.principal_href);
        self.calendar_home = self.calendar_home.take().or(other.calendar_home);
        self.addressbook_home = self.addressbook_home.take().or(other.addressbook_home);
        self.resource_types.extend(other.resource_types);
        self.components.extend(other.components);
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.resource_types.iter().any(|t| t == name)
    }
}

/// One `<response>` element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DavResponse {
    pub href: String,
    /// Response-level status, present when the whole resource failed
    pub status: Option<u16>,
    pub props: DavProps,
}

fn status_code(line: &str) -> Option<u16> {
    line.split_whitespace().nth(1)?.parse().ok()
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).into_owned()
}

fn parse_error(err: impl std::fmt::Display) -> GatewayError {
    GatewayError::Protocol(format!("Malformed multistatus response: {}", err))
}

/// Parse a multistatus body into its responses.
pub fn parse_multistatus(xml: &str) -> GatewayResult<Vec<DavResponse>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut responses = Vec::new();
    let mut stack: Vec<String> = Vec::new();
    let mut text = String::new();

    let mut response: Option<DavResponse> = None;
    let mut propstat: Option<(DavProps, Option<u16>)> = None;
    let mut saw_multistatus = false;

    let mut buf = Vec::new();
    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                let name = local_name(e);
                text.clear();
                match name.as_str() {
                    "multistatus" => saw_multistatus = true,
                    "response" => response = Some(DavResponse::default()),
                    "propstat" => propstat = Some((DavProps::default(), None)),
                    _ => record_marker(&stack, &name, e, propstat.as_mut()),
                }
                stack.push(name);
            }
            Ok(Event::Empty(ref e)) => {
                let name = local_name(e);
                record_marker(&stack, &name, e, propstat.as_mut());
            }
            Ok(Event::Text(ref e)) => {
                let chunk = e.unescape().map_err(parse_error)?;
                text.push_str(&chunk);
            }
            Ok(Event::CData(e)) => {
                text.push_str(&String::from_utf8_lossy(&e.into_inner()));
            }
            Ok(Event::End(_)) => {
                let Some(name) = stack.pop() else {
                    return Err(parse_error("unbalanced end tag"));
                };
                let parent = stack.last().map(String::as_str).unwrap_or("");
                let value = std::mem::take(&mut text);

                match name.as_str() {
                    "response" => {
                        if let Some(r) = response.take() {
                            responses.push(r);
                        }
                    }
                    "propstat" => {
                        if let (Some((props, status)), Some(r)) =
                            (propstat.take(), response.as_mut())
                        {
                            if status.map_or(true, |s| (200..300).contains(&s)) {
                                r.props.merge(props);
                            }
                        }
                    }
                    "status" if parent == "propstat" => {
                        if let Some((_, status)) = propstat.as_mut() {
                            *status = status_code(&value);
                        }
                    }
                    "status" if parent == "response" => {
                        if let Some(r) = response.as_mut() {
                            r.status = status_code(&value);
                        }
                    }
                    "href" => match parent {
                        "response" => {
                            if let Some(r) = response.as_mut() {
                                r.href = value;
                            }
                        }
                        "current-user-principal" => {
                            set_prop(&mut propstat, |p| p.principal_href = Some(value))
                        }
                        "calendar-home-set" => {
                            set_prop(&mut propstat, |p| p.calendar_home = Some(value))
                        }
                        "addressbook-home-set" => {
                            set_prop(&mut propstat, |p| p.addressbook_home = Some(value))
                        }
                        _ => {}
                    },
                    "displayname" => set_prop(&mut propstat, |p| p.display_name = Some(value)),
                    "getetag" => set_prop(&mut propstat, |p| p.etag = Some(value)),
                    "calendar-data" => set_prop(&mut propstat, |p| p.calendar_data = Some(value)),
                    "address-data" => set_prop(&mut propstat, |p| p.address_data = Some(value)),
                    _ => {}
                }
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(parse_error(e)),
            _ => {}
        }
        buf.clear();
    }

    if !saw_multistatus {
        return Err(parse_error("missing multistatus element"));
    }

    Ok(responses)
}

fn set_prop(propstat: &mut Option<(DavProps, Option<u16>)>, apply: impl FnOnce(&mut DavProps)) {
    if let Some((props, _)) = propstat.as_mut() {
        apply(props);
    }
}

/// Record resourcetype children and supported components, which carry no text.
fn record_marker(
    stack: &[String],
    name: &str,
    e: &BytesStart<'_>,
    propstat: Option<&mut (DavProps, Option<u16>)>,
) {
    let Some((props, _)) = propstat else {
        return;
    };
    match stack.last().map(String::as_str) {
        Some("resourcetype") => props.resource_types.push(name.to_string()),
        Some("supported-calendar-component-set") if name == "comp" => {
            if let Ok(Some(attr)) = e.try_get_attribute("name") {
                if let Ok(value) = attr.unescape_value() {
                    props.components.push(value.to_ascii_uppercase());
                }
            }
        }
        _ => {}
    }
}
