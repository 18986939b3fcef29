//! MCP server for the iCloud gateway.
//!
//! Exposes the tool catalog over the Model Context Protocol on stdin/stdout.

pub mod handlers;
pub mod health;

pub use handlers::IcloudGatewayServer;
pub use health::HealthReport;

use anyhow::Result;
use rmcp::transport::io::stdio;
use rmcp::ServiceExt;

/// Run the gateway with stdio transport until the client disconnects.
pub async fn run_server(server: IcloudGatewayServer) -> Result<()> {
    let service = server.serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}
