//! vCard resources.

use crate::formats::vcard::{VCard, VCardData};
use crate::models::Contact;
use crate::session::DavObject;

/// Normalize a vCard resource. Returns `None` for contact-group cards.
pub fn normalize_contact(object: &DavObject) -> Option<Contact> {
    let mut contact = Contact {
        id: object.href.clone(),
        url: object.href.clone(),
        ..Contact::default()
    };

    let Some(data) = object.data.as_deref() else {
        contact
            .warnings
            .push("server returned no vCard data".to_string());
        return Some(contact);
    };

    let card = match VCard::parse(data) {
        Ok(card) => card,
        Err(e) => {
            contact.warnings.push(e);
            return Some(contact);
        }
    };
    if card.is_group() {
        return None;
    }

    let fields = VCardData::from_card(&card);
    if fields.name.is_none() {
        contact.warnings.push("vCard has no FN or N".to_string());
    }
    contact.uid = fields.uid;
    contact.name = fields.name;
    contact.phones = fields.phones;
    contact.emails = fields.emails;
    contact.addresses = fields.addresses;
    contact.organization = fields.organization;
    contact.title = fields.title;

    Some(contact)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object(data: &str) -> DavObject {
        DavObject {
            href: "https://contacts.example.com/1/card/a.vcf".to_string(),
            etag: None,
            data: Some(data.to_string()),
        }
    }

    #[test]
    fn test_normalize_contact() {
        let contact = normalize_contact(&object(
            "BEGIN:VCARD\r\nVERSION:3.0\r\nFN:Ann Lee\r\nEMAIL:ann@example.com\r\nORG:Lee & Co;Sales\r\nEND:VCARD\r\n",
        ))
        .unwrap();
        assert_eq!(contact.name.as_deref(), Some("Ann Lee"));
        assert_eq!(contact.emails, vec!["ann@example.com"]);
        assert_eq!(contact.organization.as_deref(), Some("Lee & Co"));
        assert!(contact.warnings.is_empty());
    }

    #[test]
    fn test_group_is_skipped() {
        assert!(normalize_contact(&object(
            "BEGIN:VCARD\r\nVERSION:3.0\r\nFN:Family\r\nX-ADDRESSBOOKSERVER-KIND:group\r\nEND:VCARD\r\n",
        ))
        .is_none());
    }

    #[test]
    fn test_malformed_card_keeps_reference() {
        let contact = normalize_contact(&object("garbage")).unwrap();
        assert_eq!(contact.id, "https://contacts.example.com/1/card/a.vcf");
        assert_eq!(contact.name, None);
        assert_eq!(contact.warnings.len(), 1);
    }
}
