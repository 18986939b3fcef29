//! Calendar tools over CalDAV.

use super::{parse_args, required, unknown_action, NoArgs, ProtocolAdapter};
use crate::config::Config;
use crate::credentials::Credentials;
use crate::domain::{EmailAddress, ResourceRef};
use crate::error::{GatewayError, GatewayResult};
use crate::formats::ical::{self, EventPatch, EventTime, NewEvent};
use crate::models::{Ack, Event, ToolOutput};
use crate::normalizer::{normalize_calendar, normalize_event, EventView};
use crate::session::{DavCollection, DavObject, DavQuery, DavSession, Precondition, ProtocolKind, Session};
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListEventsArgs {
    /// Calendar URL or id (all event calendars when omitted)
    #[serde(default)]
    pub calendar_id: Option<String>,
    /// Window start: YYYY-MM-DD, YYYY-MM-DDTHH:MM:SS or RFC 3339
    #[serde(default)]
    pub start_date: Option<String>,
    /// Window end; a date-only value includes that whole day
    #[serde(default)]
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateEventArgs {
    pub summary: String,
    /// Start: a date (all-day event), a local date-time, or RFC 3339
    pub start: String,
    pub end: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    /// Attendee email addresses to invite
    #[serde(default)]
    pub attendees: Option<Vec<String>>,
    /// Target calendar URL or id (first event calendar when omitted)
    #[serde(default)]
    pub calendar_id: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateEventArgs {
    /// Event URL as returned by list/search
    pub event_id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub start: Option<String>,
    #[serde(default)]
    pub end: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    /// Replaces the attendee list
    #[serde(default)]
    pub attendees: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct EventIdArgs {
    /// Event URL as returned by list/search
    pub event_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchEventsArgs {
    /// Text matched against summary, description and location
    pub query: String,
    #[serde(default)]
    pub calendar_id: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub end_date: Option<String>,
}

/// A bounded time range, `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub enum CalendarAction {
    ListCalendars,
    ListEvents {
        calendar: Option<ResourceRef>,
        window: Window,
    },
    CreateEvent {
        calendar: Option<ResourceRef>,
        event: NewEvent,
    },
    UpdateEvent {
        event: ResourceRef,
        patch: EventPatch,
    },
    DeleteEvent {
        event: ResourceRef,
    },
    SearchEvents {
        query: String,
        calendar: Option<ResourceRef>,
        window: Window,
    },
}

/// Calendar operations against CalDAV.
#[derive(Debug, Clone)]
pub struct CalendarAdapter {
    lookback_days: i64,
    lookahead_days: i64,
}

impl CalendarAdapter {
    pub fn new(config: &Config) -> Self {
        Self {
            lookback_days: config.event_lookback_days,
            lookahead_days: config.event_lookahead_days,
        }
    }

    /// Resolve optional bounds, filling gaps from the default window around `now`.
    pub fn window(
        &self,
        start: Option<&str>,
        end: Option<&str>,
        now: DateTime<Utc>,
    ) -> GatewayResult<Window> {
        let start = match start {
            Some(value) => parse_bound("start_date", value, false)?,
            None => now - Duration::days(self.lookback_days),
        };
        let end = match end {
            Some(value) => parse_bound("end_date", value, true)?,
            None => start.max(now) + Duration::days(self.lookahead_days),
        };
        if start >= end {
            return Err(GatewayError::InvalidArgument(
                "start_date must be before end_date".to_string(),
            ));
        }
        Ok(Window { start, end })
    }

    fn list_events(
        &self,
        dav: &mut dyn DavSession,
        calendar: Option<&ResourceRef>,
        window: Window,
    ) -> GatewayResult<Vec<Event>> {
        let targets = match calendar {
            Some(reference) => vec![resolve_calendar(dav, reference)?],
            None => event_calendars(dav)?
                .into_iter()
                .map(|c| c.href)
                .collect(),
        };

        let query = DavQuery::Events {
            start: window.start,
            end: window.end,
        };
        let mut views: Vec<EventView> = Vec::new();
        for href in &targets {
            let objects = dav.query(href, &query)?;
            views.extend(
                objects
                    .iter()
                    .map(|o| normalize_event(o, Some(href.as_str())))
                    .filter(|v| v.overlaps(window.start, window.end)),
            );
        }
        debug!(calendars = targets.len(), events = views.len(), "listed events");

        views.sort_by_key(|v| (v.start.is_none(), v.start.map(|t| t.as_utc())));
        Ok(views.into_iter().map(|v| v.record).collect())
    }
}

fn parse_bound(field: &str, value: &str, is_end: bool) -> GatewayResult<DateTime<Utc>> {
    let time = parse_time(field, value)?;
    Ok(match time {
        EventTime::Date(date) if is_end => {
            Utc.from_utc_datetime(&date.and_time(NaiveTime::MIN)) + Duration::days(1)
        }
        other => other.as_utc(),
    })
}

fn parse_time(field: &str, value: &str) -> GatewayResult<EventTime> {
    EventTime::parse_argument(value)
        .map_err(|e| GatewayError::InvalidArgument(format!("{}: {}", field, e)))
}

fn parse_attendees(attendees: Option<Vec<String>>) -> GatewayResult<Option<Vec<EmailAddress>>> {
    attendees
        .map(|list| {
            list.into_iter()
                .map(|a| EmailAddress::new(a).map_err(GatewayError::from))
                .collect()
        })
        .transpose()
}

fn optional_ref(value: Option<String>) -> GatewayResult<Option<ResourceRef>> {
    Ok(value
        .filter(|v| !v.trim().is_empty())
        .map(ResourceRef::new)
        .transpose()?)
}

fn is_reminder_list(collection: &DavCollection) -> bool {
    collection.display_name.as_deref().is_some_and(|name| {
        name.contains('\u{26A0}') || name.to_lowercase().contains("reminder")
    })
}

/// Calendars that hold events. Falls back to every calendar when the filter empties the list.
fn event_calendars(dav: &mut dyn DavSession) -> GatewayResult<Vec<DavCollection>> {
    let calendars: Vec<DavCollection> = dav
        .collections()?
        .into_iter()
        .filter(|c| c.is_calendar)
        .collect();
    let usable: Vec<DavCollection> = calendars
        .iter()
        .filter(|c| normalize_calendar(c).supports_events && !is_reminder_list(c))
        .cloned()
        .collect();
    Ok(if usable.is_empty() { calendars } else { usable })
}

/// A calendar URL is used as given; a bare id or name is looked up.
fn resolve_calendar(dav: &mut dyn DavSession, reference: &ResourceRef) -> GatewayResult<String> {
    let wanted = reference.as_str().trim();
    if wanted.contains('/') {
        return Ok(wanted.to_string());
    }
    dav.collections()?
        .into_iter()
        .filter(|c| c.is_calendar)
        .map(|c| normalize_calendar(&c))
        .find(|c| c.id == wanted || c.name.eq_ignore_ascii_case(wanted))
        .map(|c| c.url)
        .ok_or_else(|| GatewayError::NotFound(format!("Calendar {}", wanted)))
}

impl ProtocolAdapter for CalendarAdapter {
    type Action = CalendarAction;

    fn domain(&self) -> &'static str {
        "calendar"
    }

    fn parse(&self, action: &str, arguments: Value) -> GatewayResult<CalendarAction> {
        let now = Utc::now();
        match action {
            "list_calendars" => {
                parse_args::<NoArgs>(arguments)?;
                Ok(CalendarAction::ListCalendars)
            }
            "list_events" => {
                let args: ListEventsArgs = parse_args(arguments)?;
                Ok(CalendarAction::ListEvents {
                    calendar: optional_ref(args.calendar_id)?,
                    window: self.window(args.start_date.as_deref(), args.end_date.as_deref(), now)?,
                })
            }
            "create_event" => {
                let args: CreateEventArgs = parse_args(arguments)?;
                let start = parse_time("start", &args.start)?;
                let end = parse_time("end", &args.end)?;
                if end.as_utc() < start.as_utc() {
                    return Err(GatewayError::InvalidArgument(
                        "end must not be before start".to_string(),
                    ));
                }
                Ok(CalendarAction::CreateEvent {
                    calendar: optional_ref(args.calendar_id)?,
                    event: NewEvent {
                        uid: Uuid::new_v4().to_string().to_uppercase(),
                        summary: required("summary", args.summary)?,
                        start,
                        end,
                        description: args.description,
                        location: args.location,
                        attendees: parse_attendees(args.attendees)?.unwrap_or_default(),
                    },
                })
            }
            "update_event" => {
                let args: UpdateEventArgs = parse_args(arguments)?;
                let patch = EventPatch {
                    summary: args.summary,
                    start: args.start.as_deref().map(|s| parse_time("start", s)).transpose()?,
                    end: args.end.as_deref().map(|s| parse_time("end", s)).transpose()?,
                    description: args.description,
                    location: args.location,
                    attendees: parse_attendees(args.attendees)?,
                };
                if patch.is_empty() {
                    return Err(GatewayError::InvalidArgument(
                        "no fields to update".to_string(),
                    ));
                }
                Ok(CalendarAction::UpdateEvent {
                    event: ResourceRef::new(args.event_id)?,
                    patch,
                })
            }
            "delete_event" => {
                let args: EventIdArgs = parse_args(arguments)?;
                Ok(CalendarAction::DeleteEvent {
                    event: ResourceRef::new(args.event_id)?,
                })
            }
            "search_events" => {
                let args: SearchEventsArgs = parse_args(arguments)?;
                Ok(CalendarAction::SearchEvents {
                    query: required("query", args.query)?,
                    calendar: optional_ref(args.calendar_id)?,
                    window: self.window(args.start_date.as_deref(), args.end_date.as_deref(), now)?,
                })
            }
            other => Err(unknown_action(self.domain(), other)),
        }
    }

    fn protocol(&self, _action: &CalendarAction) -> ProtocolKind {
        ProtocolKind::CalDav
    }

    fn execute(
        &self,
        session: &mut Session,
        _credentials: &Credentials,
        action: CalendarAction,
    ) -> GatewayResult<ToolOutput> {
        let dav = session.as_dav()?;

        match action {
            CalendarAction::ListCalendars => {
                let calendars = dav
                    .collections()?
                    .iter()
                    .filter(|c| c.is_calendar)
                    .map(normalize_calendar)
                    .collect();
                Ok(ToolOutput::Calendars(calendars))
            }

            CalendarAction::ListEvents { calendar, window } => Ok(ToolOutput::Events(
                self.list_events(dav, calendar.as_ref(), window)?,
            )),

            CalendarAction::SearchEvents {
                query,
                calendar,
                window,
            } => {
                let events = self
                    .list_events(dav, calendar.as_ref(), window)?
                    .into_iter()
                    .filter(|e| e.matches_text(&query))
                    .collect();
                Ok(ToolOutput::Events(events))
            }

            CalendarAction::CreateEvent { calendar, event } => {
                let collection = match calendar {
                    Some(reference) => resolve_calendar(dav, &reference)?,
                    None => event_calendars(dav)?
                        .into_iter()
                        .next()
                        .map(|c| c.href)
                        .ok_or_else(|| {
                            GatewayError::NotFound("No calendar accepts events".to_string())
                        })?,
                };

                let href = format!("{}/{}.ics", collection.trim_end_matches('/'), event.uid);
                let body = ical::build_event(&event);
                let etag = dav.put(&href, &body, &Precondition::Create)?;
                debug!(href = %href, "created event");

                let object = DavObject {
                    href,
                    etag,
                    data: Some(body),
                };
                Ok(ToolOutput::Event(normalize_event(&object, Some(collection.as_str())).record))
            }

            CalendarAction::UpdateEvent { event, patch } => {
                let stored = dav.get(event.as_str())?;
                let data = stored.data.as_deref().ok_or_else(|| {
                    GatewayError::Protocol(format!("Event {} has no calendar data", event))
                })?;
                let merged = ical::merge_event(data, &patch, Utc::now())
                    .map_err(GatewayError::Protocol)?;
                let etag = dav.put(
                    event.as_str(),
                    &merged,
                    &Precondition::Update(stored.etag.clone()),
                )?;

                let object = DavObject {
                    href: stored.href,
                    etag,
                    data: Some(merged),
                };
                Ok(ToolOutput::Event(normalize_event(&object, None).record))
            }

            CalendarAction::DeleteEvent { event } => {
                dav.delete(event.as_str())?;
                Ok(ToolOutput::Ack(Ack::success(format!("Event {} deleted", event))))
            }
        }
    }
}
