//! vCard 3.0 reading, building and merge-updating.
//!
//! A card is kept as its ordered list of content lines. Updates replace only the
//! properties they name, so photos, labels, notes and vendor extensions are preserved.

use super::contentline::{
    escape_text, render, split_structured, unescape_text, unfold, ContentLine,
};
use crate::domain::EmailAddress;

const ADR_COMPONENTS: usize = 7;

/// One parsed vCard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VCard {
    lines: Vec<ContentLine>,
}

impl VCard {
    /// Parse the first `BEGIN:VCARD`..`END:VCARD` block.
    pub fn parse(data: &str) -> Result<Self, String> {
        let mut lines = Vec::new();
        let mut inside = false;

        for raw in unfold(data) {
            let line =
                ContentLine::parse(&raw).ok_or_else(|| format!("malformed vCard line {:?}", raw))?;
            match (line.name.as_str(), inside) {
                ("BEGIN", false) if line.value.eq_ignore_ascii_case("VCARD") => inside = true,
                ("END", true) if line.value.eq_ignore_ascii_case("VCARD") => {
                    return Ok(Self { lines });
                }
                (_, true) => lines.push(line),
                _ => {}
            }
        }

        if inside {
            Err("unterminated vCard".to_string())
        } else {
            Err("no vCard found".to_string())
        }
    }

    fn with_lines(lines: Vec<ContentLine>) -> Self {
        Self { lines }
    }

    /// Render with BEGIN/END wrappers and CRLF line endings.
    pub fn render(&self) -> String {
        let mut all = Vec::with_capacity(self.lines.len() + 2);
        all.push(ContentLine::new("BEGIN", "VCARD"));
        all.extend(self.lines.iter().cloned());
        all.push(ContentLine::new("END", "VCARD"));
        render(&all)
    }

    /// First value of a property, unescaped and non-empty.
    pub fn value(&self, name: &str) -> Option<String> {
        self.lines
            .iter()
            .find(|l| l.name.eq_ignore_ascii_case(name))
            .map(|l| unescape_text(l.value.trim()))
            .filter(|v| !v.is_empty())
    }

    /// Every line of a property, grouped lines included.
    pub fn lines_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a ContentLine> + 'a {
        self.lines
            .iter()
            .filter(move |l| l.name.eq_ignore_ascii_case(name))
    }

    /// Whether this card describes a contact group rather than a person.
    pub fn is_group(&self) -> bool {
        ["X-ADDRESSBOOKSERVER-KIND", "KIND"].iter().any(|name| {
            self.value(name)
                .is_some_and(|v| v.eq_ignore_ascii_case("group"))
        })
    }

    /// Replace every line of `name` with `replacements`, placed where the first old line was.
    pub fn replace(&mut self, name: &str, replacements: Vec<ContentLine>) {
        let position = self
            .lines
            .iter()
            .position(|l| l.name.eq_ignore_ascii_case(name))
            .unwrap_or(self.lines.len());
        self.lines.retain(|l| !l.name.eq_ignore_ascii_case(name));
        let at = position.min(self.lines.len());
        self.lines.splice(at..at, replacements);
    }
}

/// Fields for a new contact.
#[derive(Debug, Clone, Default)]
pub struct NewContact {
    pub uid: String,
    pub name: String,
    pub phones: Vec<String>,
    pub emails: Vec<EmailAddress>,
    pub addresses: Vec<String>,
    pub organization: Option<String>,
    pub title: Option<String>,
}

/// Fields to change on an existing contact. Lists replace the stored list when present.
#[derive(Debug, Clone, Default)]
pub struct ContactPatch {
    pub name: Option<String>,
    pub phones: Option<Vec<String>>,
    pub emails: Option<Vec<EmailAddress>>,
    pub addresses: Option<Vec<String>>,
    pub organization: Option<String>,
    pub title: Option<String>,
}

impl ContactPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.phones.is_none()
            && self.emails.is_none()
            && self.addresses.is_none()
            && self.organization.is_none()
            && self.title.is_none()
    }
}

/// Fields read from a card.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VCardData {
    pub uid: Option<String>,
    pub name: Option<String>,
    pub phones: Vec<String>,
    pub emails: Vec<String>,
    pub addresses: Vec<String>,
    pub organization: Option<String>,
    pub title: Option<String>,
}

fn name_lines(name: &str) -> (ContentLine, ContentLine) {
    (
        ContentLine::new("FN", escape_text(name)),
        ContentLine::new("N", format!(";{};;;", escape_text(name))),
    )
}

fn phone_line(phone: &str) -> ContentLine {
    ContentLine::new("TEL", escape_text(phone)).with_param("TYPE", "CELL")
}

fn email_line(email: &EmailAddress) -> ContentLine {
    ContentLine::new("EMAIL", email.as_str()).with_param("TYPE", "INTERNET")
}

/// Free-text addresses go into the street component.
fn address_line(address: &str) -> ContentLine {
    ContentLine::new("ADR", format!(";;{};;;;", escape_text(address)))
}

fn single(name: &str, value: &str) -> Vec<ContentLine> {
    if value.trim().is_empty() {
        Vec::new()
    } else {
        vec![ContentLine::new(name, escape_text(value))]
    }
}

/// Build a vCard 3.0 for a new contact.
pub fn build_contact(contact: &NewContact) -> String {
    let (full_name, structured) = name_lines(&contact.name);
    let mut lines = vec![
        ContentLine::new("VERSION", "3.0"),
        ContentLine::new("PRODID", "-//icloud-gateway//EN"),
        ContentLine::new("UID", contact.uid.clone()),
        full_name,
        structured,
    ];

    lines.extend(contact.phones.iter().map(|p| phone_line(p)));
    lines.extend(contact.emails.iter().map(email_line));
    lines.extend(contact.addresses.iter().map(|a| address_line(a)));
    if let Some(ref organization) = contact.organization {
        lines.extend(single("ORG", organization));
    }
    if let Some(ref title) = contact.title {
        lines.extend(single("TITLE", title));
    }

    VCard::with_lines(lines).render()
}

/// Apply a patch to a stored card.
pub fn merge_contact(existing: &str, patch: &ContactPatch) -> Result<String, String> {
    let mut card = VCard::parse(existing)?;

    if let Some(ref name) = patch.name {
        let (full_name, structured) = name_lines(name);
        card.replace("FN", vec![full_name]);
        card.replace("N", vec![structured]);
    }
    if let Some(ref phones) = patch.phones {
        card.replace("TEL", phones.iter().map(|p| phone_line(p)).collect());
    }
    if let Some(ref emails) = patch.emails {
        card.replace("EMAIL", emails.iter().map(email_line).collect());
    }
    if let Some(ref addresses) = patch.addresses {
        card.replace("ADR", addresses.iter().map(|a| address_line(a)).collect());
    }
    if let Some(ref organization) = patch.organization {
        card.replace("ORG", single("ORG", organization));
    }
    if let Some(ref title) = patch.title {
        card.replace("TITLE", single("TITLE", title));
    }

    Ok(card.render())
}

/// Render an ADR value as one line of text.
fn format_address(value: &str) -> Option<String> {
    let parts = split_structured(value, ';');
    let text = parts
        .iter()
        .take(ADR_COMPONENTS)
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect::<Vec<_>>()
        .join(", ");
    (!text.is_empty()).then_some(text)
}

/// `FN`, or the given and family parts of `N` when `FN` is absent.
fn display_name(card: &VCard) -> Option<String> {
    card.value("FN").or_else(|| {
        let n = card.lines_named("N").next()?;
        let parts = split_structured(&n.value, ';');
        let given = parts.get(1).map(String::as_str).unwrap_or("");
        let family = parts.first().map(String::as_str).unwrap_or("");
        let joined = format!("{} {}", given.trim(), family.trim());
        let joined = joined.trim();
        (!joined.is_empty()).then(|| joined.to_string())
    })
}

impl VCardData {
    pub fn from_card(card: &VCard) -> Self {
        let list = |name: &str| {
            card.lines_named(name)
                .map(|l| unescape_text(l.value.trim()))
                .filter(|v| !v.is_empty())
                .collect::<Vec<_>>()
        };

        Self {
            uid: card.value("UID"),
            name: display_name(card),
            phones: list("TEL"),
            emails: list("EMAIL"),
            addresses: card
                .lines_named("ADR")
                .filter_map(|l| format_address(&l.value))
                .collect(),
            organization: card
                .lines_named("ORG")
                .next()
                .and_then(|l| split_structured(&l.value, ';').into_iter().next())
                .filter(|o| !o.trim().is_empty()),
            title: card.value("TITLE"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STORED: &str = "BEGIN:VCARD\r\n\
VERSION:3.0\r\n\
PRODID:-//Apple Inc.//iOS 17.0//EN\r\n\
N:Doe;Jane;;;\r\n\
FN:Jane Doe\r\n\
ORG:Acme Corp;Research\r\n\
TITLE:Engineer\r\n\
item1.EMAIL;type=INTERNET;type=pref:jane@example.com\r\n\
item1.X-ABLabel:_$!<Work>!$_\r\n\
TEL;type=CELL;type=VOICE;type=pref:+1 555 0100\r\n\
ADR;type=HOME:;;1 Main St\\, Apt 2;Springfield;IL;62701;USA\r\n\
NOTE:Met at the conference\r\n\
PHOTO;ENCODING=b;TYPE=JPEG:AAAA\r\n\
UID:1234-ABCD\r\n\
END:VCARD\r\n";

    #[test]
    fn test_read_fields() {
        let data = VCardData::from_card(&VCard::parse(STORED).unwrap());
        assert_eq!(data.name.as_deref(), Some("Jane Doe"));
        assert_eq!(data.uid.as_deref(), Some("1234-ABCD"));
        assert_eq!(data.emails, vec!["jane@example.com"]);
        assert_eq!(data.phones, vec!["+1 555 0100"]);
        assert_eq!(
            data.addresses,
            vec!["1 Main St, Apt 2, Springfield, IL, 62701, USA"]
        );
        assert_eq!(data.organization.as_deref(), Some("Acme Corp"));
        assert_eq!(data.title.as_deref(), Some("Engineer"));
    }

    #[test]
    fn test_name_falls_back_to_n() {
        let card = VCard::parse("BEGIN:VCARD\r\nVERSION:3.0\r\nN:Smith;John;;;\r\nEND:VCARD\r\n")
            .unwrap();
        assert_eq!(VCardData::from_card(&card).name.as_deref(), Some("John Smith"));
    }

    #[test]
    fn test_group_detection() {
        let group = VCard::parse(
            "BEGIN:VCARD\r\nVERSION:3.0\r\nFN:Team\r\nX-ADDRESSBOOKSERVER-KIND:group\r\nEND:VCARD\r\n",
        )
        .unwrap();
        assert!(group.is_group());
        assert!(!VCard::parse(STORED).unwrap().is_group());
    }

    #[test]
    fn test_parse_errors() {
        assert!(VCard::parse("hello").is_err());
        assert!(VCard::parse("BEGIN:VCARD\r\nFN:x\r\n").is_err());
    }

    #[test]
    fn test_build_contact() {
        let card = build_contact(&NewContact {
            uid: "uid-1".to_string(),
            name: "Ann Lee".to_string(),
            phones: vec!["+1 555 0199".to_string()],
            emails: vec![EmailAddress::new("ann@example.com").unwrap()],
            addresses: vec!["5 Elm St, Portland".to_string()],
            organization: Some("Lee & Co".to_string()),
            title: None,
        });

        assert!(card.starts_with("BEGIN:VCARD\r\nVERSION:3.0\r\n"));
        assert!(card.contains("FN:Ann Lee\r\n"));
        assert!(card.contains("N:;Ann Lee;;;\r\n"));
        assert!(card.contains("TEL;TYPE=CELL:+1 555 0199\r\n"));
        assert!(card.contains("EMAIL;TYPE=INTERNET:ann@example.com\r\n"));
        assert!(card.contains("ADR:;;5 Elm St\\, Portland;;;;\r\n"));
        assert!(card.contains("ORG:Lee & Co\r\n"));
        assert!(!card.contains("TITLE"));
        assert!(card.ends_with("END:VCARD\r\n"));

        let data = VCardData::from_card(&VCard::parse(&card).unwrap());
        assert_eq!(data.addresses, vec!["5 Elm St, Portland"]);
    }

    #[test]
    fn test_merge_keeps_unpatched_properties() {
        let patch = ContactPatch {
            title: Some("Director".to_string()),
            ..ContactPatch::default()
        };
        let merged = merge_contact(STORED, &patch).unwrap();

        assert!(merged.contains("TITLE:Director\r\n"));
        assert!(merged.contains("NOTE:Met at the conference\r\n"));
        assert!(merged.contains("PHOTO;ENCODING=b;TYPE=JPEG:AAAA\r\n"));
        assert!(merged.contains("item1.X-ABLABEL:_$!<Work>!$_\r\n"));

        let data = VCardData::from_card(&VCard::parse(&merged).unwrap());
        assert_eq!(data.name.as_deref(), Some("Jane Doe"));
        assert_eq!(data.emails, vec!["jane@example.com"]);
        assert_eq!(data.phones, vec!["+1 555 0100"]);
    }

    #[test]
    fn test_merge_replaces_lists() {
        let patch = ContactPatch {
            phones: Some(vec!["+44 20 7946 0000".to_string(), "+44 20 7946 0001".to_string()]),
            emails: Some(Vec::new()),
            organization: Some(String::new()),
            ..ContactPatch::default()
        };
        let merged = merge_contact(STORED, &patch).unwrap();
        let data = VCardData::from_card(&VCard::parse(&merged).unwrap());

        assert_eq!(data.phones, vec!["+44 20 7946 0000", "+44 20 7946 0001"]);
        assert!(data.emails.is_empty());
        assert_eq!(data.organization, None);
        assert_eq!(data.title.as_deref(), Some("Engineer"));
    }
}
