//! Mail tools over IMAP (reading, moving, flagging) and SMTP (sending).

use super::{parse_args, required, unknown_action, NoArgs, ProtocolAdapter};
use crate::config::Config;
use crate::credentials::Credentials;
use crate::domain::{EmailAddress, MessageUid};
use crate::error::{GatewayError, GatewayResult};
use crate::models::{Ack, Message, ToolOutput};
use crate::normalizer::{normalize_folder, normalize_message};
use crate::session::{ImapSession, MailSearch, OutgoingMail, ProtocolKind, Session};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::debug;

const DEFAULT_FOLDER: &str = "INBOX";
const DEFAULT_LIMIT: usize = 50;
const SEEN: &str = "\\Seen";
const DELETED: &str = "\\Deleted";

fn default_folder() -> String {
    DEFAULT_FOLDER.to_string()
}

fn default_true() -> bool {
    true
}

/// A message id given either as a number or as a numeric string.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum MessageIdArg {
    Number(u64),
    Text(String),
}

impl MessageIdArg {
    fn to_uid(&self) -> GatewayResult<MessageUid> {
        match self {
            Self::Number(n) => u32::try_from(*n)
                .map_err(|_| {
                    GatewayError::InvalidArgument(format!("message id {} is out of range", n))
                })
                .and_then(|n| MessageUid::new(n).map_err(GatewayError::from)),
            Self::Text(s) => Ok(s.parse::<MessageUid>()?),
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListMessagesArgs {
    #[serde(default = "default_folder")]
    pub folder: String,
    /// Maximum number of messages, newest first (default 50)
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub unread_only: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetMessageArgs {
    /// IMAP UID as returned by list/search
    pub message_id: MessageIdArg,
    #[serde(default = "default_folder")]
    pub folder: String,
    #[serde(default = "default_true")]
    pub include_body: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetMessagesArgs {
    pub message_ids: Vec<MessageIdArg>,
    #[serde(default = "default_folder")]
    pub folder: String,
    #[serde(default = "default_true")]
    pub include_body: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchMessagesArgs {
    /// Text matched against the Subject and From headers
    pub query: String,
    #[serde(default = "default_folder")]
    pub folder: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SendArgs {
    /// Recipient address, or several separated by commas
    pub to: String,
    pub subject: String,
    pub body: String,
    /// Comma-separated CC recipients
    #[serde(default)]
    pub cc: Option<String>,
    /// Comma-separated BCC recipients
    #[serde(default)]
    pub bcc: Option<String>,
    /// Send the body as text/html
    #[serde(default)]
    pub html: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MoveArgs {
    pub message_id: MessageIdArg,
    #[serde(alias = "folder")]
    pub from_folder: String,
    #[serde(alias = "dest_folder")]
    pub to_folder: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct DeleteArgs {
    pub message_id: MessageIdArg,
    #[serde(default = "default_folder")]
    pub folder: String,
    /// Expunge instead of moving to the trash folder
    #[serde(default)]
    pub permanent: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct MarkArgs {
    pub message_id: MessageIdArg,
    #[serde(default = "default_folder")]
    pub folder: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailAction {
    ListFolders,
    ListMessages {
        folder: String,
        limit: usize,
        unread_only: bool,
    },
    GetMessage {
        folder: String,
        uid: MessageUid,
        include_body: bool,
    },
    GetMessages {
        folder: String,
        uids: Vec<MessageUid>,
        include_body: bool,
    },
    Search {
        folder: String,
        query: String,
        limit: usize,
    },
    Send {
        to: Vec<EmailAddress>,
        cc: Vec<EmailAddress>,
        bcc: Vec<EmailAddress>,
        subject: String,
        body: String,
        html: bool,
    },
    Move {
        folder: String,
        uid: MessageUid,
        dest_folder: String,
    },
    Delete {
        folder: String,
        uid: MessageUid,
        permanent: bool,
    },
    SetSeen {
        folder: String,
        uid: MessageUid,
        seen: bool,
    },
}

/// Mail operations.
#[derive(Debug, Clone)]
pub struct MailAdapter {
    trash_folder: String,
}

impl MailAdapter {
    pub fn new(config: &Config) -> Self {
        Self {
            trash_folder: config.trash_folder.clone(),
        }
    }

    /// The `\Trash` special-use mailbox, or the configured name.
    fn trash_folder(&self, imap: &mut dyn ImapSession) -> GatewayResult<String> {
        let folders = imap.list_folders()?;
        Ok(folders
            .into_iter()
            .find(|f| f.flags.iter().any(|flag| flag.eq_ignore_ascii_case("\\Trash")))
            .map(|f| f.name)
            .unwrap_or_else(|| self.trash_folder.clone()))
    }
}

fn folder_arg(value: String) -> GatewayResult<String> {
    required("folder", value)
}

fn limit_arg(limit: Option<usize>) -> GatewayResult<usize> {
    match limit {
        Some(0) => Err(GatewayError::InvalidArgument(
            "limit must be greater than 0".to_string(),
        )),
        Some(n) => Ok(n),
        None => Ok(DEFAULT_LIMIT),
    }
}

fn optional_list(value: Option<String>) -> GatewayResult<Vec<EmailAddress>> {
    Ok(value
        .as_deref()
        .map(EmailAddress::parse_list)
        .transpose()?
        .unwrap_or_default())
}

/// Select `folder` and fail with `NotFound` unless `uid` exists in it.
fn select_existing(imap: &mut dyn ImapSession, folder: &str, uid: MessageUid) -> GatewayResult<()> {
    imap.select(folder)?;
    if imap.search(&MailSearch::Uid(uid.get()))?.is_empty() {
        return Err(GatewayError::NotFound(format!(
            "Message {} not found in {}",
            uid, folder
        )));
    }
    Ok(())
}

/// MOVE when the server supports it, otherwise COPY, flag `\Deleted` and expunge.
fn move_message(imap: &mut dyn ImapSession, uid: MessageUid, dest_folder: &str) -> GatewayResult<()> {
    if imap.has_capability("MOVE")? {
        imap.move_message(uid.get(), dest_folder)
    } else {
        imap.copy(uid.get(), dest_folder)?;
        imap.add_flags(uid.get(), &[DELETED])?;
        imap.expunge(uid.get())
    }
}

/// The newest `limit` UIDs, newest first.
fn newest(mut uids: Vec<u32>, limit: usize) -> Vec<u32> {
    uids.sort_unstable();
    uids.into_iter().rev().take(limit).collect()
}

/// Fetch headers and return messages in the order of `uids`.
fn fetch_ordered(
    imap: &mut dyn ImapSession,
    folder: &str,
    uids: &[u32],
    include_body: bool,
) -> GatewayResult<Vec<Message>> {
    if uids.is_empty() {
        return Ok(Vec::new());
    }
    let mut fetched: HashMap<u32, _> = imap
        .fetch(uids, include_body)?
        .into_iter()
        .map(|m| (m.uid, m))
        .collect();

    Ok(uids
        .iter()
        .map(|uid| match fetched.remove(uid) {
            Some(message) => normalize_message(&message, folder, include_body),
            None => Message {
                id: uid.to_string(),
                folder: folder.to_string(),
                warnings: vec![format!("message {} not found", uid)],
                ..Message::default()
            },
        })
        .collect())
}

impl ProtocolAdapter for MailAdapter {
    type Action = MailAction;

    fn domain(&self) -> &'static str {
        "email"
    }

    fn parse(&self, action: &str, arguments: Value) -> GatewayResult<MailAction> {
        match action {
            "list_folders" => {
                parse_args::<NoArgs>(arguments)?;
                Ok(MailAction::ListFolders)
            }
            "list_messages" => {
                let args: ListMessagesArgs = parse_args(arguments)?;
                Ok(MailAction::ListMessages {
                    folder: folder_arg(args.folder)?,
                    limit: limit_arg(args.limit)?,
                    unread_only: args.unread_only,
                })
            }
            "get_message" => {
                let args: GetMessageArgs = parse_args(arguments)?;
                Ok(MailAction::GetMessage {
                    folder: folder_arg(args.folder)?,
                    uid: args.message_id.to_uid()?,
                    include_body: args.include_body,
                })
            }
            "get_messages" => {
                let args: GetMessagesArgs = parse_args(arguments)?;
                if args.message_ids.is_empty() {
                    return Err(GatewayError::InvalidArgument(
                        "message_ids must not be empty".to_string(),
                    ));
                }
                Ok(MailAction::GetMessages {
                    folder: folder_arg(args.folder)?,
                    uids: args
                        .message_ids
                        .iter()
                        .map(MessageIdArg::to_uid)
                        .collect::<GatewayResult<_>>()?,
                    include_body: args.include_body,
                })
            }
            "search" => {
                let args: SearchMessagesArgs = parse_args(arguments)?;
                Ok(MailAction::Search {
                    folder: folder_arg(args.folder)?,
                    query: required("query", args.query)?,
                    limit: limit_arg(args.limit)?,
                })
            }
            "send" => {
                let args: SendArgs = parse_args(arguments)?;
                let to = EmailAddress::parse_list(&args.to)?;
                if to.is_empty() {
                    return Err(GatewayError::InvalidArgument(
                        "to must name at least one recipient".to_string(),
                    ));
                }
                Ok(MailAction::Send {
                    to,
                    cc: optional_list(args.cc)?,
                    bcc: optional_list(args.bcc)?,
                    subject: args.subject,
                    body: args.body,
                    html: args.html,
                })
            }
            "move" => {
                let args: MoveArgs = parse_args(arguments)?;
                Ok(MailAction::Move {
                    folder: required("from_folder", args.from_folder)?,
                    uid: args.message_id.to_uid()?,
                    dest_folder: required("to_folder", args.to_folder)?,
                })
            }
            "delete" => {
                let args: DeleteArgs = parse_args(arguments)?;
                Ok(MailAction::Delete {
                    folder: folder_arg(args.folder)?,
                    uid: args.message_id.to_uid()?,
                    permanent: args.permanent,
                })
            }
            "mark_read" | "mark_unread" => {
                let args: MarkArgs = parse_args(arguments)?;
                Ok(MailAction::SetSeen {
                    folder: folder_arg(args.folder)?,
                    uid: args.message_id.to_uid()?,
                    seen: action == "mark_read",
                })
            }
            other => Err(unknown_action(self.domain(), other)),
        }
    }

    fn protocol(&self, action: &MailAction) -> ProtocolKind {
        match action {
            MailAction::Send { .. } => ProtocolKind::Smtp,
            _ => ProtocolKind::Imap,
        }
    }

    fn execute(
        &self,
        session: &mut Session,
        credentials: &Credentials,
        action: MailAction,
    ) -> GatewayResult<ToolOutput> {
        match action {
            MailAction::Send {
                to,
                cc,
                bcc,
                subject,
                body,
                html,
            } => {
                let mail = OutgoingMail {
                    from: EmailAddress::new(credentials.email())?,
                    to,
                    cc,
                    bcc,
                    subject,
                    body,
                    html,
                };
                session.as_smtp()?.send(&mail)?;
                let recipients: Vec<&str> = mail.to.iter().map(EmailAddress::as_str).collect();
                Ok(ToolOutput::Ack(Ack::success(format!(
                    "Email sent successfully to {}",
                    recipients.join(", ")
                ))))
            }
            other => self.execute_imap(session.as_imap()?, other),
        }
    }
}

impl MailAdapter {
    fn execute_imap(
        &self,
        imap: &mut dyn ImapSession,
        action: MailAction,
    ) -> GatewayResult<ToolOutput> {
        match action {
            MailAction::ListFolders => {
                let folders = imap.list_folders()?.iter().map(normalize_folder).collect();
                Ok(ToolOutput::Folders(folders))
            }

            MailAction::ListMessages {
                folder,
                limit,
                unread_only,
            } => {
                imap.select(&folder)?;
                let criteria = if unread_only {
                    MailSearch::Unseen
                } else {
                    MailSearch::All
                };
                let uids = newest(imap.search(&criteria)?, limit);
                debug!(folder = %folder, count = uids.len(), "listing messages");
                Ok(ToolOutput::Messages(fetch_ordered(imap, &folder, &uids, false)?))
            }

            MailAction::Search {
                folder,
                query,
                limit,
            } => {
                imap.select(&folder)?;
                let uids = newest(imap.search(&MailSearch::SubjectOrFrom(query))?, limit);
                Ok(ToolOutput::Messages(fetch_ordered(imap, &folder, &uids, false)?))
            }

            MailAction::GetMessage {
                folder,
                uid,
                include_body,
            } => {
                select_existing(imap, &folder, uid)?;
                let fetched = imap
                    .fetch(&[uid.get()], include_body)?
                    .into_iter()
                    .find(|m| m.uid == uid.get())
                    .ok_or_else(|| {
                        GatewayError::NotFound(format!("Message {} not found in {}", uid, folder))
                    })?;
                Ok(ToolOutput::Message(normalize_message(
                    &fetched,
                    &folder,
                    include_body,
                )))
            }

            MailAction::GetMessages {
                folder,
                uids,
                include_body,
            } => {
                imap.select(&folder)?;
                let uids: Vec<u32> = uids.iter().map(|u| u.get()).collect();
                Ok(ToolOutput::Messages(fetch_ordered(
                    imap,
                    &folder,
                    &uids,
                    include_body,
                )?))
            }

            MailAction::Move {
                folder,
                uid,
                dest_folder,
            } => {
                select_existing(imap, &folder, uid)?;
                move_message(imap, uid, &dest_folder)?;
                Ok(ToolOutput::Ack(Ack::success(format!(
                    "Message {} moved from {} to {}",
                    uid, folder, dest_folder
                ))))
            }

            MailAction::Delete {
                folder,
                uid,
                permanent,
            } => {
                let trash = self.trash_folder(imap)?;
                select_existing(imap, &folder, uid)?;

                if permanent || folder == trash {
                    imap.add_flags(uid.get(), &[DELETED])?;
                    imap.expunge(uid.get())?;
                    Ok(ToolOutput::Ack(Ack::success(format!(
                        "Message {} permanently deleted",
                        uid
                    ))))
                } else {
                    move_message(imap, uid, &trash)?;
                    Ok(ToolOutput::Ack(Ack::success(format!(
                        "Message {} moved to {}",
                        uid, trash
                    ))))
                }
            }

            MailAction::SetSeen { folder, uid, seen } => {
                select_existing(imap, &folder, uid)?;
                if seen {
                    imap.add_flags(uid.get(), &[SEEN])?;
                } else {
                    imap.remove_flags(uid.get(), &[SEEN])?;
                }
                let state = if seen { "read" } else { "unread" };
                Ok(ToolOutput::Ack(Ack::success(format!(
                    "Message {} marked as {}",
                    uid, state
                ))))
            }

            MailAction::Send { .. } => Err(GatewayError::Protocol(
                "send requires an SMTP session".to_string(),
            )),
        }
    }
}
