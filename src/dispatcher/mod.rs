//! The uniform entry point for tool calls.
//!
//! Every call walks the same path: resolve credentials, validate arguments, open a
//! session, execute one adapter operation, normalize the result. The session is owned by
//! a [`SessionGuard`] inside a blocking worker, so it is closed on every exit path.
//! A timeout or a dropped caller fires the call's [`AbortSignal`]: no further upstream
//! command is issued and open sockets are shut down.

pub mod tools;

use crate::adapters::{CalendarAdapter, ContactsAdapter, MailAdapter, ProtocolAdapter};
use crate::config::Config;
use crate::credentials::{CredentialResolver, Credentials, RequestMetadata};
use crate::error::{ErrorKind, GatewayError};
use crate::metrics::{CallTimer, Metrics};
use crate::normalizer;
use crate::session::{AbortSignal, SessionFactory, SessionGuard};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};
use uuid::Uuid;

/// One incoming tool invocation.
#[derive(Debug, Clone)]
pub struct ToolRequest {
    pub tool_name: String,
    pub arguments: Value,
    pub metadata: RequestMetadata,
}

impl ToolRequest {
    pub fn new(tool_name: impl Into<String>, arguments: Value, metadata: RequestMetadata) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            metadata,
        }
    }
}

/// Outcome of a tool call.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult {
    Success(Value),
    Failure { kind: ErrorKind, message: String },
}

impl ToolResult {
    fn failure(error: &GatewayError, credentials: Option<&Credentials>) -> Self {
        let message = error.to_string();
        Self::Failure {
            kind: error.kind(),
            message: match credentials {
                Some(creds) => creds.scrub(&message),
                None => message,
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Success(_) => None,
            Self::Failure { kind, .. } => Some(*kind),
        }
    }

    /// The payload, or `{"error": {"kind", "message"}}`.
    pub fn into_json(self) -> Value {
        match self {
            Self::Success(value) => value,
            Self::Failure { kind, message } => json!({
                "error": { "kind": kind, "message": message }
            }),
        }
    }
}

/// Routes tool calls to adapters and owns the per-call session lifecycle.
#[derive(Clone)]
pub struct Dispatcher {
    resolver: CredentialResolver,
    factory: Arc<dyn SessionFactory>,
    calendar: Arc<CalendarAdapter>,
    contacts: Arc<ContactsAdapter>,
    mail: Arc<MailAdapter>,
    limiter: Arc<Semaphore>,
    timeout: Duration,
    metrics: Metrics,
}

impl Dispatcher {
    pub fn new(config: &Config, factory: Arc<dyn SessionFactory>, metrics: Metrics) -> Self {
        Self {
            resolver: CredentialResolver::new(config),
            factory,
            calendar: Arc::new(CalendarAdapter::new(config)),
            contacts: Arc::new(ContactsAdapter::new()),
            mail: Arc::new(MailAdapter::new(config)),
            limiter: Arc::new(Semaphore::new(config.max_concurrent_calls)),
            timeout: Duration::from_secs(config.request_timeout),
            metrics,
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Serve one tool call. Never panics and never returns an error: failures are
    /// reported as [`ToolResult::Failure`].
    pub async fn dispatch(&self, request: ToolRequest) -> ToolResult {
        let call_id = short_id();
        let timer = CallTimer::new(self.metrics.clone());

        let result = match request.tool_name.split_once('_') {
            Some((domain, action)) if tools::find(&request.tool_name).is_some() => {
                if domain == self.calendar.domain() {
                    self.run(&self.calendar, action, &request, &call_id).await
                } else if domain == self.contacts.domain() {
                    self.run(&self.contacts, action, &request, &call_id).await
                } else if domain == self.mail.domain() {
                    self.run(&self.mail, action, &request, &call_id).await
                } else {
                    Err(unknown_tool(&request.tool_name))
                }
            }
            _ => Err(unknown_tool(&request.tool_name)),
        };

        match result {
            Ok(value) => {
                debug!(call_id = %call_id, tool = %request.tool_name, state = "success", "tool call finished");
                timer.complete();
                ToolResult::Success(value)
            }
            Err(failure) => {
                if let ToolResult::Failure { kind, .. } = &failure {
                    warn!(call_id = %call_id, tool = %request.tool_name, kind = %kind, "tool call failed");
                    timer.complete_with_error(*kind);
                }
                failure
            }
        }
    }

    async fn run<A: ProtocolAdapter>(
        &self,
        adapter: &Arc<A>,
        action: &str,
        request: &ToolRequest,
        call_id: &str,
    ) -> Result<Value, ToolResult> {
        let tool = request.tool_name.as_str();

        debug!(call_id, tool, state = "resolving", "resolving credentials");
        let credentials = self
            .resolver
            .resolve(&request.metadata)
            .map_err(|e| ToolResult::failure(&e, None))?;
        let fail = |e: GatewayError| ToolResult::failure(&e, Some(&credentials));

        let action = adapter.parse(action, request.arguments.clone()).map_err(fail)?;
        let protocol = adapter.protocol(&action);

        // One deadline covers waiting for a slot and the upstream work.
        let deadline = tokio::time::Instant::now() + self.timeout;
        let timed_out = || {
            warn!(call_id, tool, timeout_secs = self.timeout.as_secs(), "tool call timed out");
            GatewayError::Timeout(self.timeout.as_secs())
        };

        let slot = self.limiter.clone().acquire_owned();
        let permit = match tokio::time::timeout_at(deadline, slot).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => {
                return Err(fail(GatewayError::Connection(
                    "dispatcher is shutting down".to_string(),
                )))
            }
            Err(_) => return Err(fail(timed_out())),
        };

        debug!(call_id, tool, state = "session_open", protocol = %protocol, account = %credentials.masked_email(), "opening session");
        let abort = AbortSignal::new();
        let abort_on_drop = abort.abort_on_drop();
        let factory = Arc::clone(&self.factory);
        let metrics = self.metrics.clone();
        let worker_adapter = Arc::clone(adapter);
        let worker_credentials = credentials.clone();
        let worker_abort = abort.clone();
        let worker_call_id = call_id.to_string();
        let worker_tool = tool.to_string();

        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            worker_abort.check()?;
            let session = factory.open(&worker_credentials, protocol, &worker_abort)?;
            let mut guard = SessionGuard::new(session, metrics, worker_abort);
            debug!(call_id = %worker_call_id, tool = %worker_tool, state = "executing", "session open");
            worker_adapter.execute(guard.session_mut(), &worker_credentials, action)
        });

        let output = match tokio::time::timeout_at(deadline, task).await {
            Ok(Ok(result)) => {
                abort_on_drop.disarm();
                result
            }
            Ok(Err(join_error)) => Err(GatewayError::Protocol(format!(
                "Task join error: {}",
                join_error
            ))),
            Err(_) => {
                abort.abort();
                Err(timed_out())
            }
        }
        .map_err(fail)?;

        debug!(call_id, tool, state = "normalizing", "normalizing result");
        normalizer::to_payload(&output).map_err(fail)
    }
}

fn unknown_tool(name: &str) -> ToolResult {
    ToolResult::failure(
        &GatewayError::InvalidArgument(format!("Unknown tool: {}", name)),
        None,
    )
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}
