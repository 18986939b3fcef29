//! Normalized records returned by tool calls.
//!
//! These are plain serializable structs built by the normalizer from protocol-native
//! objects. They carry no connection state and are discarded once a response is sent.

pub mod calendar;
pub mod contact;
pub mod mail;

pub use calendar::{Calendar, Event};
pub use contact::Contact;
pub use mail::{Folder, Message};

use serde::Serialize;

/// Acknowledgement for operations that return no record (delete, move, mark, send).
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Ack {
    pub status: &'static str,
    pub message: String,
}

impl Ack {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            status: "success",
            message: message.into(),
        }
    }
}

/// The typed result of one adapter operation, before it is turned into JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolOutput {
    Calendars(Vec<Calendar>),
    Events(Vec<Event>),
    Event(Event),
    Contacts(Vec<Contact>),
    Contact(Contact),
    Folders(Vec<Folder>),
    Messages(Vec<Message>),
    Message(Message),
    Ack(Ack),
}
