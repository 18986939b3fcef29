//! Conversion of protocol-native objects into tool-result records.
//!
//! Every function here is infallible: malformed upstream data degrades to empty fields
//! plus an entry in the record's `warnings`, so one bad item never hides its siblings.

pub mod calendar;
pub mod contacts;
pub mod mail;

pub use calendar::{normalize_calendar, normalize_event, EventView};
pub use contacts::normalize_contact;
pub use mail::{normalize_folder, normalize_message};

use crate::error::{GatewayError, GatewayResult};
use crate::models::ToolOutput;
use serde_json::Value;

/// Serialize an adapter result into the JSON payload sent to the caller.
pub fn to_payload(output: &ToolOutput) -> GatewayResult<Value> {
    let value = match output {
        ToolOutput::Calendars(items) => serde_json::to_value(items),
        ToolOutput::Events(items) => serde_json::to_value(items),
        ToolOutput::Event(item) => serde_json::to_value(item),
        ToolOutput::Contacts(items) => serde_json::to_value(items),
        ToolOutput::Contact(item) => serde_json::to_value(item),
        ToolOutput::Folders(items) => serde_json::to_value(items),
        ToolOutput::Messages(items) => serde_json::to_value(items),
        ToolOutput::Message(item) => serde_json::to_value(item),
        ToolOutput::Ack(ack) => serde_json::to_value(ack),
    };
    value.map_err(|e| GatewayError::Protocol(format!("Failed to serialize result: {}", e)))
}

/// Last non-empty path segment of a URL, used as a short display id.
pub(crate) fn last_segment(href: &str) -> &str {
    href.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or(href)
}
