//! Contact record.

use serde::Serialize;

/// A contact read from an address book.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct Contact {
    /// Opaque reference to pass back to get/update/delete (the vCard URL)
    pub id: String,
    pub url: String,
    pub uid: Option<String>,
    pub name: Option<String>,
    pub phones: Vec<String>,
    pub emails: Vec<String>,
    pub addresses: Vec<String>,
    pub organization: Option<String>,
    pub title: Option<String>,

    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Contact {
    /// Case-insensitive substring match on name, emails and phone numbers.
    pub fn matches_text(&self, query: &str) -> bool {
        let query = query.to_lowercase();
        self.name
            .iter()
            .chain(self.emails.iter())
            .chain(self.phones.iter())
            .any(|field| field.to_lowercase().contains(&query))
    }
}
