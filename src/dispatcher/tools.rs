//! The tool catalog: names, descriptions and argument schemas.

use crate::adapters::calendar::{
    CreateEventArgs, EventIdArgs, ListEventsArgs, SearchEventsArgs, UpdateEventArgs,
};
use crate::adapters::contacts::{
    ContactIdArgs, CreateContactArgs, ListContactsArgs, SearchContactsArgs, UpdateContactArgs,
};
use crate::adapters::mail::{
    DeleteArgs, GetMessageArgs, GetMessagesArgs, ListMessagesArgs, MarkArgs, MoveArgs,
    SearchMessagesArgs, SendArgs,
};
use crate::adapters::NoArgs;
use rmcp::handler::server::common::cached_schema_for_type;
use rmcp::model::JsonObject;
use std::sync::Arc;

/// One entry of the catalog.
#[derive(Clone, Copy)]
pub struct ToolSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// JSON schema of the argument object
    pub input_schema: fn() -> Arc<JsonObject>,
}

impl std::fmt::Debug for ToolSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSpec").field("name", &self.name).finish()
    }
}

macro_rules! tool {
    ($name:literal, $args:ty, $description:literal) => {
        ToolSpec {
            name: $name,
            description: $description,
            input_schema: cached_schema_for_type::<$args>,
        }
    };
}

/// Every tool the gateway serves, grouped by domain.
pub const TOOLS: &[ToolSpec] = &[
    tool!("calendar_list_calendars", NoArgs, "List all calendars with their ids, names and URLs."),
    tool!(
        "calendar_list_events",
        ListEventsArgs,
        "List events in a time window. Without dates, covers the default window around today."
    ),
    tool!(
        "calendar_create_event",
        CreateEventArgs,
        "Create an event. Date-only start and end create an all-day event."
    ),
    tool!(
        "calendar_update_event",
        UpdateEventArgs,
        "Update an event. Only the fields given are changed."
    ),
    tool!("calendar_delete_event", EventIdArgs, "Delete an event."),
    tool!(
        "calendar_search_events",
        SearchEventsArgs,
        "Search events by text in summary, description or location."
    ),
    tool!("contacts_list", ListContactsArgs, "List contacts from the address book."),
    tool!("contacts_get", ContactIdArgs, "Get one contact by its URL."),
    tool!("contacts_create", CreateContactArgs, "Create a contact."),
    tool!(
        "contacts_update",
        UpdateContactArgs,
        "Update a contact. Only the fields given are changed; lists replace the stored list."
    ),
    tool!("contacts_delete", ContactIdArgs, "Delete a contact."),
    tool!(
        "contacts_search",
        SearchContactsArgs,
        "Search contacts by name, email address or phone number."
    ),
    tool!("email_list_folders", NoArgs, "List mail folders."),
    tool!(
        "email_list_messages",
        ListMessagesArgs,
        "List the newest messages in a folder, optionally unread only."
    ),
    tool!(
        "email_get_message",
        GetMessageArgs,
        "Get one message with headers and, by default, its body. Does not mark it read."
    ),
    tool!(
        "email_get_messages",
        GetMessagesArgs,
        "Get several messages by id. Missing ids come back with a warning."
    ),
    tool!(
        "email_search",
        SearchMessagesArgs,
        "Search a folder by subject or sender."
    ),
    tool!("email_send", SendArgs, "Send a message over SMTP."),
    tool!("email_move", MoveArgs, "Move a message to another folder."),
    tool!(
        "email_delete",
        DeleteArgs,
        "Delete a message: move it to the trash folder, or expunge it when permanent."
    ),
    tool!("email_mark_read", MarkArgs, "Mark a message as read."),
    tool!("email_mark_unread", MarkArgs, "Mark a message as unread."),
];

/// Look up a tool by name.
pub fn find(name: &str) -> Option<&'static ToolSpec> {
    TOOLS.iter().find(|t| t.name == name)
}
