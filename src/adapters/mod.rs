//! Protocol adapters.
//!
//! Each adapter turns a tool action plus its JSON arguments into a validated action,
//! names the protocol it needs, and executes it against a session the dispatcher opened.
//! The dispatcher is generic over [`ProtocolAdapter`]; only the choice of adapter is
//! protocol-specific.

pub mod calendar;
pub mod contacts;
pub mod mail;

pub use calendar::CalendarAdapter;
pub use contacts::ContactsAdapter;
pub use mail::MailAdapter;

use crate::credentials::Credentials;
use crate::error::{GatewayError, GatewayResult};
use crate::models::ToolOutput;
use crate::session::{ProtocolKind, Session};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

/// The capability interface every adapter implements.
pub trait ProtocolAdapter: Send + Sync + 'static {
    /// A fully validated operation, ready to run.
    type Action: Send + 'static;

    /// Tool-name prefix served by this adapter (`calendar`, `contacts`, `email`).
    fn domain(&self) -> &'static str;

    /// Validate arguments for `action`. Runs before any session is opened.
    fn parse(&self, action: &str, arguments: Value) -> GatewayResult<Self::Action>;

    fn protocol(&self, action: &Self::Action) -> ProtocolKind;

    /// Run the action. Blocking; called from a worker thread.
    fn execute(
        &self,
        session: &mut Session,
        credentials: &Credentials,
        action: Self::Action,
    ) -> GatewayResult<ToolOutput>;
}

/// Deserialize tool arguments. A missing argument object is read as `{}`.
pub(crate) fn parse_args<T: DeserializeOwned>(arguments: Value) -> GatewayResult<T> {
    let arguments = match arguments {
        Value::Null => Value::Object(Default::default()),
        other => other,
    };
    serde_json::from_value(arguments).map_err(|e| GatewayError::InvalidArgument(e.to_string()))
}

pub(crate) fn unknown_action(domain: &str, action: &str) -> GatewayError {
    GatewayError::InvalidArgument(format!("Unknown tool: {}_{}", domain, action))
}

/// Reject blank required strings.
pub(crate) fn required(field: &str, value: String) -> GatewayResult<String> {
    if value.trim().is_empty() {
        return Err(GatewayError::InvalidArgument(format!(
            "{} must not be empty",
            field
        )));
    }
    Ok(value)
}

/// Tools that take no arguments.
#[derive(Debug, Default, Deserialize, JsonSchema)]
pub struct NoArgs {}
