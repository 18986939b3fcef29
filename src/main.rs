//! iCloud Gateway - Main entry point
//!
//! Serves the MCP tool catalog on stdin/stdout. `--health` checks that the configuration
//! loads, prints a readiness report and exits; live gauges are served by the running
//! server as the `health://status` resource.

use anyhow::Result;
use icloud_gateway::{Config, Dispatcher, HealthReport, IcloudGatewayServer, Metrics, UpstreamSessionFactory};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    // Load configuration before logging so LOG_LEVEL from .env applies
    let config = Config::from_env();

    // stderr only: stdout carries the MCP stream
    let default_level = config
        .as_ref()
        .map(|c| c.log_level.clone())
        .unwrap_or_else(|_| "error".to_string());
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = match config {
        Ok(cfg) => {
            info!("Configuration loaded successfully");
            cfg
        }
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if std::env::args().any(|arg| arg == "--health") {
        println!("{}", serde_json::to_string(&HealthReport::startup())?);
        return Ok(());
    }

    let metrics = Metrics::new();

    let factory = Arc::new(UpstreamSessionFactory::new(Duration::from_secs(
        config.request_timeout,
    )));
    let dispatcher = Dispatcher::new(&config, factory, metrics);
    let server = IcloudGatewayServer::new(dispatcher);

    info!(
        fallback_account = config.fallback_email.is_some(),
        timeout_secs = config.request_timeout,
        max_concurrent_calls = config.max_concurrent_calls,
        "iCloud gateway initialized"
    );

    info!("Starting MCP server with stdio transport");
    icloud_gateway::server::run_server(server.clone()).await?;

    let summary = server.dispatcher().metrics().summary();
    info!(
        tool_calls = summary.tool_calls_total,
        failures = summary.failures_total,
        avg_ms = summary.call_duration_avg_ms,
        "session totals"
    );

    info!("iCloud gateway shutdown complete");
    Ok(())
}
