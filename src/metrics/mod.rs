//! Basic metrics instrumentation for tracking tool calls and upstream sessions.
//!
//! Provides counters and duration tracking. The health report reads its gauges from here.

use crate::error::ErrorKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Metrics collector shared by the dispatcher and the session layer.
#[derive(Debug, Clone)]
pub struct Metrics {
    /// Total number of tool calls received
    tool_calls_total: Arc<AtomicU64>,

    /// Tool calls currently being served
    in_flight_calls: Arc<AtomicU64>,

    /// Failures, indexed like `ErrorKind::ALL`
    failures_by_kind: Arc<[AtomicU64; 6]>,

    /// Total duration of all tool calls in milliseconds
    call_duration_total_ms: Arc<AtomicU64>,

    /// Upstream sessions successfully opened
    sessions_opened_total: Arc<AtomicU64>,

    /// Upstream sessions closed
    sessions_closed_total: Arc<AtomicU64>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

fn kind_index(kind: ErrorKind) -> usize {
    ErrorKind::ALL
        .iter()
        .position(|k| *k == kind)
        .unwrap_or(ErrorKind::ALL.len() - 1)
}

impl Metrics {
    /// Create a new metrics collector.
    pub fn new() -> Self {
        Self {
            tool_calls_total: Arc::new(AtomicU64::new(0)),
            in_flight_calls: Arc::new(AtomicU64::new(0)),
            failures_by_kind: Arc::new(Default::default()),
            call_duration_total_ms: Arc::new(AtomicU64::new(0)),
            sessions_opened_total: Arc::new(AtomicU64::new(0)),
            sessions_closed_total: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Record a finished tool call with its duration.
    pub fn record_tool_call(&self, duration: Duration) {
        self.tool_calls_total.fetch_add(1, Ordering::Relaxed);
        self.call_duration_total_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    /// Record a failed tool call.
    pub fn record_failure(&self, kind: ErrorKind) {
        self.failures_by_kind[kind_index(kind)].fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_opened(&self) {
        self.sessions_opened_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_session_closed(&self) {
        self.sessions_closed_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Get total tool calls.
    pub fn tool_calls_total(&self) -> u64 {
        self.tool_calls_total.load(Ordering::Relaxed)
    }

    /// Get the number of calls currently in flight.
    pub fn in_flight_calls(&self) -> u64 {
        self.in_flight_calls.load(Ordering::Relaxed)
    }

    /// Get failures of one kind.
    pub fn failures(&self, kind: ErrorKind) -> u64 {
        self.failures_by_kind[kind_index(kind)].load(Ordering::Relaxed)
    }

    /// Get failures across every kind.
    pub fn failures_total(&self) -> u64 {
        self.failures_by_kind
            .iter()
            .map(|c| c.load(Ordering::Relaxed))
            .sum()
    }

    pub fn sessions_opened_total(&self) -> u64 {
        self.sessions_opened_total.load(Ordering::Relaxed)
    }

    pub fn sessions_closed_total(&self) -> u64 {
        self.sessions_closed_total.load(Ordering::Relaxed)
    }

    /// Sessions opened but not yet closed.
    pub fn sessions_open(&self) -> u64 {
        self.sessions_opened_total()
            .saturating_sub(self.sessions_closed_total())
    }

    /// Get average tool call duration in milliseconds.
    pub fn call_duration_avg_ms(&self) -> f64 {
        let total = self.call_duration_total_ms.load(Ordering::Relaxed);
        let count = self.tool_calls_total.load(Ordering::Relaxed);
        if count == 0 {
            0.0
        } else {
            total as f64 / count as f64
        }
    }

    /// Get a summary of all metrics.
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            tool_calls_total: self.tool_calls_total(),
            in_flight_calls: self.in_flight_calls(),
            failures_total: self.failures_total(),
            call_duration_avg_ms: self.call_duration_avg_ms(),
            sessions_opened_total: self.sessions_opened_total(),
            sessions_closed_total: self.sessions_closed_total(),
        }
    }
}

/// A snapshot of metrics values.
#[derive(Debug, Clone)]
pub struct MetricsSummary {
    pub tool_calls_total: u64,
    pub in_flight_calls: u64,
    pub failures_total: u64,
    pub call_duration_avg_ms: f64,
    pub sessions_opened_total: u64,
    pub sessions_closed_total: u64,
}

/// Helper for timing a tool call. Counts the call as in flight until it completes
/// or is dropped.
pub struct CallTimer {
    start: Instant,
    metrics: Metrics,
    finished: bool,
}

impl CallTimer {
    /// Start timing a tool call.
    pub fn new(metrics: Metrics) -> Self {
        metrics.in_flight_calls.fetch_add(1, Ordering::Relaxed);
        Self {
            start: Instant::now(),
            metrics,
            finished: false,
        }
    }

    /// Complete the timing and record the duration.
    pub fn complete(mut self) {
        self.finish();
    }

    /// Complete the timing and record as a failure of the given kind.
    pub fn complete_with_error(mut self, kind: ErrorKind) {
        self.finish();
        self.metrics.record_failure(kind);
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.metrics.record_tool_call(self.start.elapsed());
            self.metrics.in_flight_calls.fetch_sub(1, Ordering::Relaxed);
        }
    }
}

impl Drop for CallTimer {
    fn drop(&mut self) {
        self.finish();
    }
}
