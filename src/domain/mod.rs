//! Domain value objects and types.
//!
//! This module contains type-safe wrappers for the identifiers the gateway hands
//! back and forth: recipient addresses, opaque DAV resource references and IMAP UIDs.
//! They validate at construction time so malformed arguments are rejected before any
//! upstream connection is opened.

pub mod email;
pub mod errors;
pub mod message_uid;
pub mod resource_ref;

pub use email::EmailAddress;
pub use errors::ValidationError;
pub use message_uid::MessageUid;
pub use resource_ref::ResourceRef;
