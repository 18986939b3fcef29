//! Readiness report for supervisors and container health checks.
//!
//! A running server serves the live report as the MCP resource [`HEALTH_URI`]. The
//! `--health` command runs in its own process and can only confirm that the
//! configuration loads, so its report carries no activity gauges.

use crate::metrics::Metrics;
use serde::Serialize;

/// Resource URI of the live report.
pub const HEALTH_URI: &str = "health://status";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HealthReport {
    pub ready: bool,
    pub version: &'static str,
    #[serde(flatten)]
    pub activity: Option<Activity>,
}

/// Gauges and counters of the serving process.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Activity {
    pub in_flight_calls: u64,
    pub sessions_open: u64,
    pub tool_calls_total: u64,
    pub failures_total: u64,
    pub call_duration_avg_ms: f64,
}

impl HealthReport {
    /// Live report for the process owning `metrics`.
    pub fn from_metrics(metrics: &Metrics) -> Self {
        let summary = metrics.summary();
        Self {
            ready: true,
            version: env!("CARGO_PKG_VERSION"),
            activity: Some(Activity {
                in_flight_calls: summary.in_flight_calls,
                sessions_open: summary
                    .sessions_opened_total
                    .saturating_sub(summary.sessions_closed_total),
                tool_calls_total: summary.tool_calls_total,
                failures_total: summary.failures_total,
                call_duration_avg_ms: summary.call_duration_avg_ms,
            }),
        }
    }

    /// Report for the `--health` command, printed once configuration has loaded.
    pub fn startup() -> Self {
        Self {
            ready: true,
            version: env!("CARGO_PKG_VERSION"),
            activity: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::time::Duration;

    #[test]
    fn test_health_reflects_gauges() {
        let metrics = Metrics::new();
        metrics.record_session_opened();
        metrics.record_tool_call(Duration::from_millis(40));
        metrics.record_failure(ErrorKind::NotFound);

        let report = HealthReport::from_metrics(&metrics);
        assert!(report.ready);
        let activity = report.activity.clone().unwrap();
        assert_eq!(activity.sessions_open, 1);
        assert_eq!(activity.in_flight_calls, 0);
        assert_eq!(activity.tool_calls_total, 1);
        assert_eq!(activity.failures_total, 1);

        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["ready"], true);
        assert_eq!(value["sessions_open"], 1);
        assert_eq!(value["call_duration_avg_ms"], 40.0);
        assert!(value["version"].is_string());
    }

    #[test]
    fn test_startup_report_has_no_gauges() {
        let value = serde_json::to_value(HealthReport::startup()).unwrap();
        assert_eq!(value["ready"], true);
        assert!(value.get("in_flight_calls").is_none());
        assert!(value.get("sessions_open").is_none());
    }
}
