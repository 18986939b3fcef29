//! Contact tools over CardDAV.

use super::{parse_args, required, unknown_action, ProtocolAdapter};
use crate::credentials::Credentials;
use crate::domain::{EmailAddress, ResourceRef};
use crate::error::{GatewayError, GatewayResult};
use crate::formats::vcard::{self, ContactPatch, NewContact};
use crate::models::{Ack, Contact, ToolOutput};
use crate::normalizer::normalize_contact;
use crate::session::{DavObject, DavQuery, DavSession, Precondition, ProtocolKind, Session};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListContactsArgs {
    /// Maximum number of contacts to return
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ContactIdArgs {
    /// Contact URL as returned by list/search
    pub contact_id: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateContactArgs {
    /// Full name
    pub name: String,
    #[serde(default)]
    pub phones: Option<Vec<String>>,
    #[serde(default)]
    pub emails: Option<Vec<String>>,
    /// Postal addresses as free text
    #[serde(default)]
    pub addresses: Option<Vec<String>>,
    #[serde(default)]
    pub organization: Option<String>,
    /// Job title
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateContactArgs {
    /// Contact URL as returned by list/search
    pub contact_id: String,
    #[serde(default)]
    pub name: Option<String>,
    /// Replaces every phone number
    #[serde(default)]
    pub phones: Option<Vec<String>>,
    /// Replaces every email address
    #[serde(default)]
    pub emails: Option<Vec<String>>,
    /// Replaces every postal address
    #[serde(default)]
    pub addresses: Option<Vec<String>>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchContactsArgs {
    /// Text matched against name, email addresses and phone numbers
    pub query: String,
}

#[derive(Debug, Clone)]
pub enum ContactsAction {
    List { limit: Option<usize> },
    Get { contact: ResourceRef },
    Create { contact: NewContact },
    Update { contact: ResourceRef, patch: ContactPatch },
    Delete { contact: ResourceRef },
    Search { query: String },
}

/// Contact operations against the account's first address book.
#[derive(Debug, Clone, Default)]
pub struct ContactsAdapter;

impl ContactsAdapter {
    pub fn new() -> Self {
        Self
    }
}

fn parse_emails(emails: Option<Vec<String>>) -> GatewayResult<Option<Vec<EmailAddress>>> {
    emails
        .map(|list| {
            list.into_iter()
                .map(|e| EmailAddress::new(e).map_err(GatewayError::from))
                .collect()
        })
        .transpose()
}

fn address_book(dav: &mut dyn DavSession) -> GatewayResult<String> {
    dav.collections()?
        .into_iter()
        .find(|c| c.is_addressbook)
        .map(|c| c.href)
        .ok_or_else(|| GatewayError::NotFound("No address book found".to_string()))
}

fn all_contacts(dav: &mut dyn DavSession) -> GatewayResult<Vec<Contact>> {
    let book = address_book(dav)?;
    let objects = dav.query(&book, &DavQuery::Contacts)?;
    let contacts: Vec<Contact> = objects.iter().filter_map(normalize_contact).collect();
    debug!(cards = objects.len(), contacts = contacts.len(), "read address book");
    Ok(contacts)
}

fn contact_from(object: &DavObject) -> GatewayResult<Contact> {
    normalize_contact(object).ok_or_else(|| {
        GatewayError::NotFound(format!("{} is a contact group, not a contact", object.href))
    })
}

impl ProtocolAdapter for ContactsAdapter {
    type Action = ContactsAction;

    fn domain(&self) -> &'static str {
        "contacts"
    }

    fn parse(&self, action: &str, arguments: Value) -> GatewayResult<ContactsAction> {
        match action {
            "list" => {
                let args: ListContactsArgs = parse_args(arguments)?;
                if args.limit == Some(0) {
                    return Err(GatewayError::InvalidArgument(
                        "limit must be greater than 0".to_string(),
                    ));
                }
                Ok(ContactsAction::List { limit: args.limit })
            }
            "get" => {
                let args: ContactIdArgs = parse_args(arguments)?;
                Ok(ContactsAction::Get {
                    contact: ResourceRef::new(args.contact_id)?,
                })
            }
            "create" => {
                let args: CreateContactArgs = parse_args(arguments)?;
                Ok(ContactsAction::Create {
                    contact: NewContact {
                        uid: Uuid::new_v4().to_string().to_uppercase(),
                        name: required("name", args.name)?,
                        phones: args.phones.unwrap_or_default(),
                        emails: parse_emails(args.emails)?.unwrap_or_default(),
                        addresses: args.addresses.unwrap_or_default(),
                        organization: args.organization,
                        title: args.title,
                    },
                })
            }
            "update" => {
                let args: UpdateContactArgs = parse_args(arguments)?;
                let patch = ContactPatch {
                    name: args.name.map(|n| required("name", n)).transpose()?,
                    phones: args.phones,
                    emails: parse_emails(args.emails)?,
                    addresses: args.addresses,
                    organization: args.organization,
                    title: args.title,
                };
                if patch.is_empty() {
                    return Err(GatewayError::InvalidArgument(
                        "no fields to update".to_string(),
                    ));
                }
                Ok(ContactsAction::Update {
                    contact: ResourceRef::new(args.contact_id)?,
                    patch,
                })
            }
            "delete" => {
                let args: ContactIdArgs = parse_args(arguments)?;
                Ok(ContactsAction::Delete {
                    contact: ResourceRef::new(args.contact_id)?,
                })
            }
            "search" => {
                let args: SearchContactsArgs = parse_args(arguments)?;
                Ok(ContactsAction::Search {
                    query: required("query", args.query)?,
                })
            }
            other => Err(unknown_action(self.domain(), other)),
        }
    }

    fn protocol(&self, _action: &ContactsAction) -> ProtocolKind {
        ProtocolKind::CardDav
    }

    fn execute(
        &self,
        session: &mut Session,
        _credentials: &Credentials,
        action: ContactsAction,
    ) -> GatewayResult<ToolOutput> {
        let dav = session.as_dav()?;

        match action {
            ContactsAction::List { limit } => {
                let mut contacts = all_contacts(dav)?;
                if let Some(limit) = limit {
                    contacts.truncate(limit);
                }
                Ok(ToolOutput::Contacts(contacts))
            }

            ContactsAction::Search { query } => {
                let contacts = all_contacts(dav)?
                    .into_iter()
                    .filter(|c| c.matches_text(&query))
                    .collect();
                Ok(ToolOutput::Contacts(contacts))
            }

            ContactsAction::Get { contact } => {
                let object = dav.get(contact.as_str())?;
                Ok(ToolOutput::Contact(contact_from(&object)?))
            }

            ContactsAction::Create { contact } => {
                let book = address_book(dav)?;
                let href = format!("{}/{}.vcf", book.trim_end_matches('/'), contact.uid);
                let body = vcard::build_contact(&contact);
                let etag = dav.put(&href, &body, &Precondition::Create)?;
                debug!(href = %href, "created contact");

                let object = DavObject {
                    href,
                    etag,
                    data: Some(body),
                };
                Ok(ToolOutput::Contact(contact_from(&object)?))
            }

            ContactsAction::Update { contact, patch } => {
                let stored = dav.get(contact.as_str())?;
                let data = stored.data.as_deref().ok_or_else(|| {
                    GatewayError::Protocol(format!("Contact {} has no vCard data", contact))
                })?;
                let merged = vcard::merge_contact(data, &patch).map_err(GatewayError::Protocol)?;
                let etag = dav.put(
                    contact.as_str(),
                    &merged,
                    &Precondition::Update(stored.etag.clone()),
                )?;

                let object = DavObject {
                    href: stored.href,
                    etag,
                    data: Some(merged),
                };
                Ok(ToolOutput::Contact(contact_from(&object)?))
            }

            ContactsAction::Delete { contact } => {
                dav.delete(contact.as_str())?;
                Ok(ToolOutput::Ack(Ack::success(format!("Contact {} deleted", contact))))
            }
        }
    }
}
