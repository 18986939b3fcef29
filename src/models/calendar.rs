//! Calendar and event records.

use serde::Serialize;

/// A calendar collection.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Calendar {
    /// Last path segment of the collection URL
    pub id: String,
    pub name: String,
    pub url: String,
    /// Whether the collection accepts VEVENT components
    pub supports_events: bool,
}

/// A calendar event.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct Event {
    /// Opaque reference to pass back to update/delete (the object URL)
    pub id: String,
    pub url: String,
    pub uid: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,

    /// ISO 8601 date (all-day) or date-time
    pub start: Option<String>,
    pub end: Option<String>,
    pub all_day: bool,

    pub attendees: Vec<String>,

    /// URL of the calendar the event was read from, when known
    pub calendar: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Event {
    /// Case-insensitive substring match on summary, description and location.
    pub fn matches_text(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        [&self.summary, &self.description, &self.location]
            .into_iter()
            .flatten()
            .any(|field| field.to_lowercase().contains(&query))
    }
}
