//! MCP handler for the iCloud gateway.
//!
//! The tool catalog is static, so `list_tools` and `call_tool` are implemented by hand
//! against the [`crate::dispatcher::tools::TOOLS`] table instead of a generated router.

use crate::credentials::RequestMetadata;
use crate::dispatcher::tools::TOOLS;
use crate::dispatcher::{Dispatcher, ToolRequest, ToolResult};
use crate::error::GatewayError;
use crate::server::health::{HealthReport, HEALTH_URI};
use rmcp::model::*;
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler};
use serde_json::Value;
use tracing::debug;

/// The gateway server exposing calendar, contacts and email tools.
#[derive(Clone)]
pub struct IcloudGatewayServer {
    dispatcher: Dispatcher,
}

impl IcloudGatewayServer {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Every tool in the catalog, in MCP form.
    pub fn tools() -> Vec<Tool> {
        TOOLS
            .iter()
            .map(|spec| Tool::new(spec.name, spec.description, (spec.input_schema)()))
            .collect()
    }
}

/// The live health report as resource contents.
fn health_contents(dispatcher: &Dispatcher) -> ResourceContents {
    let report = HealthReport::from_metrics(dispatcher.metrics());
    let text = serde_json::to_string(&report).unwrap_or_else(|_| "{}".to_string());
    ResourceContents::TextResourceContents {
        uri: HEALTH_URI.to_string(),
        mime_type: Some("application/json".to_string()),
        text,
        meta: None,
    }
}

fn to_call_result(result: ToolResult) -> CallToolResult {
    let is_success = result.is_success();
    let body = result.into_json();
    let text = serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string());
    if is_success {
        CallToolResult::success(vec![Content::text(text)])
    } else {
        CallToolResult::error(vec![Content::text(text)])
    }
}

impl ServerHandler for IcloudGatewayServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities {
                tools: Some(Default::default()),
                resources: Some(Default::default()),
                ..Default::default()
            },
            server_info: Implementation {
                name: "icloud-gateway".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                title: None,
                website_url: None,
            },
            instructions: Some("Stateless gateway to iCloud Calendar, Contacts and Mail. Pass x-apple-email and x-apple-app-specific-password in the request metadata, or configure a fallback account.".into()),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult::with_all_items(Self::tools()))
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let metadata = RequestMetadata::from_object(&context.meta.0);
        let arguments = request.arguments.map(Value::Object).unwrap_or(Value::Null);
        let tool_request = ToolRequest::new(request.name.to_string(), arguments, metadata);

        let result = tokio::select! {
            result = self.dispatcher.dispatch(tool_request) => result,
            _ = context.ct.cancelled() => {
                debug!(tool = %request.name, "tool call cancelled by client");
                let error = GatewayError::Connection("request cancelled by the client".to_string());
                ToolResult::Failure { kind: error.kind(), message: error.to_string() }
            }
        };

        Ok(to_call_result(result))
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let mut health = RawResource::new(HEALTH_URI, "health");
        health.description = Some("Readiness and activity of this gateway process".to_string());
        health.mime_type = Some("application/json".to_string());
        Ok(ListResourcesResult::with_all_items(vec![health.no_annotation()]))
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        if request.uri != HEALTH_URI {
            return Err(McpError::resource_not_found(
                format!("Unknown resource: {}", request.uri),
                None,
            ));
        }
        Ok(ReadResourceResult {
            contents: vec![health_contents(&self.dispatcher)],
        })
    }
}
