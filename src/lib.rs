//! iCloud Gateway - a stateless MCP server in front of iCloud Calendar, Contacts and Mail.
//!
//! Every tool call is served with credentials taken from the request (or a configured
//! fallback), over a session opened for that call alone and closed before the response
//! is returned. Nothing about the account outlives the call.
//!
//! # Architecture
//!
//! - **dispatcher**: tool catalog, per-call pipeline, timeouts and concurrency bound
//! - **credentials**: request-scoped credential resolution
//! - **session**: CalDAV/CardDAV, IMAP and SMTP sessions and the factory that opens them
//! - **adapters**: one per domain, turning tool arguments into protocol operations
//! - **formats**: iCalendar and vCard building, parsing and merging
//! - **normalizer**: upstream records to stable JSON models
//! - **models**, **domain**: output records and validated value types
//! - **server**: MCP protocol handler and health report
//! - **config**, **error**, **metrics**: ambient plumbing

pub mod adapters;
pub mod config;
pub mod credentials;
pub mod dispatcher;
pub mod domain;
pub mod error;
pub mod formats;
pub mod metrics;
pub mod models;
pub mod normalizer;
pub mod server;
pub mod session;

pub use config::Config;
pub use credentials::{CredentialResolver, Credentials, RequestMetadata};
pub use dispatcher::{Dispatcher, ToolRequest, ToolResult};
pub use error::{ConfigError, ErrorKind, GatewayError, GatewayResult};
pub use metrics::{CallTimer, Metrics, MetricsSummary};
pub use server::{HealthReport, IcloudGatewayServer};
pub use session::{SessionFactory, UpstreamSessionFactory};
