//! iCalendar VEVENT building, reading and merge-updating.
//!
//! New events are built with the `icalendar` crate. Updates are applied line by line on
//! the stored object so that properties the gateway does not model (alarms, recurrence
//! rules, attendee parameters, vendor extensions) survive untouched.

use super::contentline::{escape_text, render, unescape_text, unfold, ContentLine};
use crate::domain::EmailAddress;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeZone, Utc};
use icalendar::{Calendar, CalendarComponent, Component, Event, EventLike};

/// A DTSTART/DTEND value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventTime {
    /// All-day value (`VALUE=DATE`)
    Date(NaiveDate),
    /// Local time without a zone
    Floating(NaiveDateTime),
    Utc(DateTime<Utc>),
}

impl EventTime {
    /// Parse a caller-supplied date: `YYYY-MM-DD`, naive `YYYY-MM-DDTHH:MM[:SS]`, or RFC 3339.
    pub fn parse_argument(value: &str) -> Result<Self, String> {
        let value = value.trim();
        if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            return Ok(Self::Date(date));
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Ok(Self::Utc(dt.with_timezone(&Utc)));
        }
        for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
            if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
                return Ok(Self::Floating(dt));
            }
        }
        Err(format!(
            "unrecognized date {:?} (expected YYYY-MM-DD, YYYY-MM-DDTHH:MM:SS or RFC 3339)",
            value
        ))
    }

    /// Parse an iCalendar DATE or DATE-TIME value. `TZID` values are read as floating.
    pub fn from_ical(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.len() == 8 {
            return NaiveDate::parse_from_str(value, "%Y%m%d").ok().map(Self::Date);
        }
        if let Some(utc) = value.strip_suffix('Z') {
            return NaiveDateTime::parse_from_str(utc, "%Y%m%dT%H%M%S")
                .ok()
                .map(|dt| Self::Utc(Utc.from_utc_datetime(&dt)));
        }
        NaiveDateTime::parse_from_str(value, "%Y%m%dT%H%M%S")
            .ok()
            .map(Self::Floating)
    }

    pub fn is_date(&self) -> bool {
        matches!(self, Self::Date(_))
    }

    /// The iCalendar value text.
    pub fn to_ical(&self) -> String {
        match self {
            Self::Date(d) => d.format("%Y%m%d").to_string(),
            Self::Floating(dt) => dt.format("%Y%m%dT%H%M%S").to_string(),
            Self::Utc(dt) => dt.format("%Y%m%dT%H%M%SZ").to_string(),
        }
    }

    /// ISO 8601 rendering for tool results.
    pub fn to_iso(&self) -> String {
        match self {
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::Floating(dt) => dt.format("%Y-%m-%dT%H:%M:%S").to_string(),
            Self::Utc(dt) => dt.to_rfc3339_opts(SecondsFormat::Secs, true),
        }
    }

    /// Instant used for window comparisons. Floating and date values are read as UTC.
    pub fn as_utc(&self) -> DateTime<Utc> {
        match self {
            Self::Date(d) => Utc.from_utc_datetime(&d.and_time(NaiveTime::MIN)),
            Self::Floating(dt) => Utc.from_utc_datetime(dt),
            Self::Utc(dt) => *dt,
        }
    }

    fn content_line(&self, name: &str) -> ContentLine {
        let line = ContentLine::new(name, self.to_ical());
        if self.is_date() {
            line.with_param("VALUE", "DATE")
        } else {
            line
        }
    }

    /// Property key for the `icalendar` builder, carrying `VALUE=DATE` for all-day values.
    fn property_key(&self, name: &str) -> String {
        if self.is_date() {
            format!("{};VALUE=DATE", name)
        } else {
            name.to_string()
        }
    }
}

/// Fields for a new event.
#[derive(Debug, Clone)]
pub struct NewEvent {
    pub uid: String,
    pub summary: String,
    pub start: EventTime,
    pub end: EventTime,
    pub description: Option<String>,
    pub location: Option<String>,
    pub attendees: Vec<EmailAddress>,
}

/// Fields to change on an existing event. `None` leaves a field as it is.
#[derive(Debug, Clone, Default)]
pub struct EventPatch {
    pub summary: Option<String>,
    pub start: Option<EventTime>,
    pub end: Option<EventTime>,
    pub description: Option<String>,
    pub location: Option<String>,
    /// Replaces the attendee list when present
    pub attendees: Option<Vec<EmailAddress>>,
}

impl EventPatch {
    pub fn is_empty(&self) -> bool {
        self.summary.is_none()
            && self.start.is_none()
            && self.end.is_none()
            && self.description.is_none()
            && self.location.is_none()
            && self.attendees.is_none()
    }
}

/// The fields read from the first VEVENT of a calendar object.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VEventData {
    pub uid: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_raw: Option<String>,
    pub end_raw: Option<String>,
    pub attendees: Vec<String>,
    pub recurring: bool,
}

impl VEventData {
    pub fn start(&self) -> Option<EventTime> {
        self.start_raw.as_deref().and_then(EventTime::from_ical)
    }

    pub fn end(&self) -> Option<EventTime> {
        self.end_raw.as_deref().and_then(EventTime::from_ical)
    }
}

/// Build a VCALENDAR containing a single VEVENT.
pub fn build_event(event: &NewEvent) -> String {
    let mut vevent = Event::new();
    vevent.uid(&event.uid);
    vevent.summary(&event.summary);
    vevent.add_property(&event.start.property_key("DTSTART"), event.start.to_ical());
    vevent.add_property(&event.end.property_key("DTEND"), event.end.to_ical());

    if let Some(ref description) = event.description {
        vevent.description(description);
    }
    if let Some(ref location) = event.location {
        vevent.location(location);
    }
    for attendee in &event.attendees {
        vevent.add_multi_property("ATTENDEE", &format!("mailto:{}", attendee));
    }

    Calendar::new().push(vevent).done().to_string()
}

/// Read the first VEVENT of a calendar object.
pub fn parse_event(data: &str) -> Result<VEventData, String> {
    let calendar: Calendar = data
        .parse()
        .map_err(|e| format!("failed to parse iCalendar data: {}", e))?;

    let vevent = calendar
        .components
        .iter()
        .find_map(|c| match c {
            CalendarComponent::Event(e) => Some(e),
            _ => None,
        })
        .ok_or_else(|| "calendar object contains no VEVENT".to_string())?;

    let text = |name: &str| {
        vevent
            .property_value(name)
            .map(unescape_text)
            .filter(|v| !v.is_empty())
    };

    let mut data_out = VEventData {
        uid: text("UID"),
        summary: text("SUMMARY"),
        description: text("DESCRIPTION"),
        location: text("LOCATION"),
        start_raw: vevent.property_value("DTSTART").map(str::to_string),
        end_raw: vevent.property_value("DTEND").map(str::to_string),
        attendees: Vec::new(),
        recurring: vevent.property_value("RRULE").is_some(),
    };

    for line in vevent_lines(data)? {
        if line.name == "ATTENDEE" {
            let value = line.value.trim();
            let address = value
                .strip_prefix("mailto:")
                .or_else(|| value.strip_prefix("MAILTO:"))
                .unwrap_or(value);
            data_out.attendees.push(address.to_string());
        }
    }

    Ok(data_out)
}

/// Top-level property lines of the first VEVENT (alarm sub-components excluded).
fn vevent_lines(data: &str) -> Result<Vec<ContentLine>, String> {
    let mut lines = Vec::new();
    let mut depth = 0usize;
    let mut in_event = false;

    for raw in unfold(data) {
        let line = ContentLine::parse(&raw).ok_or_else(|| format!("malformed line {:?}", raw))?;
        match (line.name.as_str(), line.value.to_ascii_uppercase().as_str()) {
            ("BEGIN", "VEVENT") if !in_event && depth == 0 => {
                in_event = true;
                depth = 1;
            }
            ("BEGIN", _) if in_event => depth += 1,
            ("END", "VEVENT") if in_event && depth == 1 => return Ok(lines),
            ("END", _) if in_event => depth = depth.saturating_sub(1),
            _ if in_event && depth == 1 => lines.push(line),
            _ => {}
        }
    }

    if in_event {
        Err("unterminated VEVENT".to_string())
    } else {
        Ok(lines)
    }
}

/// Apply a patch to a stored calendar object, keeping every property it does not touch.
pub fn merge_event(existing: &str, patch: &EventPatch, now: DateTime<Utc>) -> Result<String, String> {
    let mut lines = Vec::new();
    for raw in unfold(existing) {
        lines.push(ContentLine::parse(&raw).ok_or_else(|| format!("malformed line {:?}", raw))?);
    }

    let begin = lines
        .iter()
        .position(|l| l.name == "BEGIN" && l.value.eq_ignore_ascii_case("VEVENT"))
        .ok_or_else(|| "calendar object contains no VEVENT".to_string())?;

    let mut replaced: Vec<&str> = vec!["DTSTAMP", "LAST-MODIFIED"];
    let mut additions = vec![
        ContentLine::new("DTSTAMP", now.format("%Y%m%dT%H%M%SZ").to_string()),
        ContentLine::new("LAST-MODIFIED", now.format("%Y%m%dT%H%M%SZ").to_string()),
    ];

    if let Some(ref summary) = patch.summary {
        replaced.push("SUMMARY");
        additions.push(ContentLine::new("SUMMARY", escape_text(summary)));
    }
    if let Some(ref description) = patch.description {
        replaced.push("DESCRIPTION");
        if !description.is_empty() {
            additions.push(ContentLine::new("DESCRIPTION", escape_text(description)));
        }
    }
    if let Some(ref location) = patch.location {
        replaced.push("LOCATION");
        if !location.is_empty() {
            additions.push(ContentLine::new("LOCATION", escape_text(location)));
        }
    }
    if let Some(start) = patch.start {
        replaced.push("DTSTART");
        additions.push(start.content_line("DTSTART"));
    }
    if let Some(end) = patch.end {
        replaced.extend(["DTEND", "DURATION"]);
        additions.push(end.content_line("DTEND"));
    }
    if let Some(ref attendees) = patch.attendees {
        replaced.push("ATTENDEE");
        for attendee in attendees {
            additions.push(ContentLine::new("ATTENDEE", format!("mailto:{}", attendee)));
        }
    }

    let mut sequence: Option<u32> = None;
    let mut merged = Vec::with_capacity(lines.len() + additions.len());
    let mut depth = 0usize;
    let mut in_event = false;
    let mut done = false;

    for (i, line) in lines.into_iter().enumerate() {
        if i == begin {
            in_event = true;
            depth = 1;
            merged.push(line);
            merged.append(&mut additions);
            continue;
        }
        if in_event && !done {
            if line.name == "BEGIN" {
                depth += 1;
            } else if line.name == "END" {
                depth -= 1;
                if depth == 0 {
                    done = true;
                    let next = sequence.map_or(1, |s| s + 1);
                    merged.push(ContentLine::new("SEQUENCE", next.to_string()));
                }
            } else if depth == 1 {
                if line.name == "SEQUENCE" {
                    sequence = line.value.trim().parse().ok();
                    continue;
                }
                if replaced.contains(&line.name.as_str()) {
                    continue;
                }
            }
        }
        merged.push(line);
    }

    Ok(render(&merged))
}
