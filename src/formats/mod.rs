//! Wire formats stored on DAV servers.

pub mod contentline;
pub mod ical;
pub mod vcard;
