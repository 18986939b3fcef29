//! Calendar collections and VEVENT objects.

use super::last_segment;
use crate::formats::ical::{self, EventTime};
use crate::models::{Calendar, Event};
use crate::session::{DavCollection, DavObject};
use chrono::{DateTime, Duration, Utc};

pub fn normalize_calendar(collection: &DavCollection) -> Calendar {
    let id = last_segment(&collection.href).to_string();
    Calendar {
        name: collection
            .display_name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| id.clone()),
        id,
        url: collection.href.clone(),
        supports_events: collection.components.is_empty()
            || collection
                .components
                .iter()
                .any(|c| c.eq_ignore_ascii_case("VEVENT")),
    }
}

/// A normalized event plus the parsed times used for window filtering.
#[derive(Debug, Clone)]
pub struct EventView {
    pub record: Event,
    pub start: Option<EventTime>,
    pub end: Option<EventTime>,
    pub recurring: bool,
}

impl EventView {
    /// Whether the event overlaps `[window_start, window_end)`.
    ///
    /// Recurring events and events without a readable start are kept: the server already
    /// matched them against the window and dropping them would hide data.
    pub fn overlaps(&self, window_start: DateTime<Utc>, window_end: DateTime<Utc>) -> bool {
        if self.recurring {
            return true;
        }
        let Some(start) = self.start else {
            return true;
        };

        let begins = start.as_utc();
        let ends = match (self.end, start) {
            (Some(end), _) => end.as_utc(),
            (None, EventTime::Date(_)) => begins + Duration::days(1),
            (None, _) => begins,
        };

        begins < window_end && (ends > window_start || begins >= window_start)
    }
}

pub fn normalize_event(object: &DavObject, calendar: Option<&str>) -> EventView {
    let mut view = EventView {
        record: Event {
            id: object.href.clone(),
            url: object.href.clone(),
            calendar: calendar.map(str::to_string),
            ..Event::default()
        },
        start: None,
        end: None,
        recurring: false,
    };

    let Some(data) = object.data.as_deref() else {
        view.record
            .warnings
            .push("server returned no calendar data".to_string());
        return view;
    };

    let parsed = match ical::parse_event(data) {
        Ok(parsed) => parsed,
        Err(e) => {
            view.record.warnings.push(e);
            return view;
        }
    };

    view.start = parsed.start();
    view.end = parsed.end();
    view.recurring = parsed.recurring;

    let record = &mut view.record;
    match (&parsed.start_raw, view.start) {
        (None, _) => record.warnings.push("event has no DTSTART".to_string()),
        (Some(raw), None) => record
            .warnings
            .push(format!("unrecognized DTSTART value {:?}", raw)),
        _ => {}
    }
    if let (Some(raw), None) = (&parsed.end_raw, view.end) {
        record
            .warnings
            .push(format!("unrecognized DTEND value {:?}", raw));
    }

    record.uid = parsed.uid;
    record.summary = parsed.summary;
    record.description = parsed.description;
    record.location = parsed.location;
    record.attendees = parsed.attendees;
    record.start = view.start.map(|t| t.to_iso());
    record.end = view.end.map(|t| t.to_iso());
    record.all_day = view.start.is_some_and(|t| t.is_date());

    view
}
